//! Store and commit-loop configuration
//!
//! Stored as JSON, by default in `~/.config/chunkmerge/config.json`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Tunables for file-backed stores and the commit loop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// zstd level for chunk frames; 0 stores chunks uncompressed
    pub compression_level: i32,
    /// Re-hash chunk bytes on every read from disk
    pub verify_reads: bool,
    /// How many lost root races a commit tolerates before giving up
    pub max_commit_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            compression_level: 3,
            verify_reads: true,
            max_commit_retries: 16,
        }
    }
}

impl StoreConfig {
    /// Default config file location
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not find config directory".into()))?;
        Ok(config_dir.join("chunkmerge").join("config.json"))
    }

    /// Load from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: StoreConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, falling back to defaults when absent
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write as pretty JSON, creating parent directories
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config dir: {}", e)))?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let levels = zstd::compression_level_range();
        if self.compression_level != 0 && !levels.contains(&self.compression_level) {
            return Err(Error::Config(format!(
                "compression_level {} outside {:?}",
                self.compression_level, levels
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = StoreConfig {
            compression_level: 0,
            verify_reads: false,
            max_commit_retries: 2,
        };
        config.save(&path).unwrap();

        assert_eq!(StoreConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"max_commit_retries": 4}"#).unwrap();

        let config = StoreConfig::load(&path).unwrap();
        assert_eq!(config.max_commit_retries, 4);
        assert_eq!(config.compression_level, 3);
        assert!(config.verify_reads);
    }

    #[test]
    fn test_rejects_bad_level() {
        let config = StoreConfig {
            compression_level: 10_000,
            ..StoreConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
