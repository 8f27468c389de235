//! Error types for chunkmerge

use crate::merge::Conflict;
use thiserror::Error;

/// Result type alias for chunkmerge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in chunkmerge operations
///
/// A missing chunk on `get` and a lost root race on `update_root` are not
/// errors; they are reported through `Option` and `bool` respectively.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A chunk that a value graph points at is not in the store
    #[error("Chunk not found: {0}")]
    NotFound(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid store file: {0}")]
    InvalidFile(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Merge conflict: {0}")]
    Conflict(Box<Conflict>),

    #[error("Root update lost {attempts} races in a row")]
    RetriesExhausted { attempts: u32 },

    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    /// The conflict carried by this error, if it is a merge conflict
    pub fn as_conflict(&self) -> Option<&Conflict> {
        match self {
            Error::Conflict(conflict) => Some(conflict),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

impl From<Conflict> for Error {
    fn from(conflict: Conflict) -> Self {
        Error::Conflict(Box::new(conflict))
    }
}
