//! In-memory chunk store

use super::ChunkStore;
use crate::model::{Chunk, ContentRef};
use crate::Result;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// A chunk store held entirely in memory
///
/// Useful for tests and for short-lived sessions. Independent instances share
/// nothing, so any number can coexist in one process.
pub struct MemoryStore {
    chunks: RwLock<HashMap<ContentRef, Chunk>>,
    root: Mutex<ContentRef>,
}

impl MemoryStore {
    /// Create an empty store whose root is `ContentRef::ZERO`
    pub fn new() -> Self {
        MemoryStore {
            chunks: RwLock::new(HashMap::new()),
            root: Mutex::new(ContentRef::ZERO),
        }
    }

    /// Total payload bytes across all chunks
    pub fn total_bytes(&self) -> u64 {
        self.chunks.read().values().map(|c| c.len() as u64).sum()
    }

    /// All refs held, sorted
    pub fn refs(&self) -> Vec<ContentRef> {
        let mut refs: Vec<_> = self.chunks.read().keys().copied().collect();
        refs.sort();
        refs
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkStore for MemoryStore {
    fn get(&self, content_ref: &ContentRef) -> Result<Option<Chunk>> {
        Ok(self.chunks.read().get(content_ref).cloned())
    }

    fn has(&self, content_ref: &ContentRef) -> Result<bool> {
        Ok(self.chunks.read().contains_key(content_ref))
    }

    fn put(&self, chunk: Chunk) -> Result<ContentRef> {
        let content_ref = chunk.content_ref();
        self.chunks.write().entry(content_ref).or_insert(chunk);
        Ok(content_ref)
    }

    fn root(&self) -> ContentRef {
        *self.root.lock()
    }

    fn update_root(&self, new_root: ContentRef, expected: ContentRef) -> Result<bool> {
        let mut root = self.root.lock();
        if *root != expected {
            debug!(expected = %expected.short(), actual = %root.short(), "root update rejected");
            return Ok(false);
        }
        *root = new_root;
        Ok(true)
    }

    fn len(&self) -> usize {
        self.chunks.read().len()
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("chunk_count", &self.len())
            .field("root", &self.root())
            .finish()
    }
}
