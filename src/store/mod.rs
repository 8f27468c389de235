//! Content-addressed chunk store
//!
//! Chunks are stored under the BLAKE3 hash of their bytes. A store also holds
//! exactly one root ref, which only moves through a compare-and-swap.
//!
//! Two backends implement [`ChunkStore`]: [`MemoryStore`] for tests and
//! embedding, and [`FileStore`], a single append-only file with zstd frames.

mod file_store;
mod frame;
mod memory;
mod writer;

pub use file_store::FileStore;
pub use frame::Codec;
pub use memory::MemoryStore;
pub use writer::ChunkWriter;

use crate::model::{Chunk, ContentRef};
use crate::Result;

/// A deduplicating blob store with an atomically swappable root
///
/// Implementations must uphold:
/// - a chunk is stored under `ContentRef::of(chunk.data())` and never changes;
/// - writing identical bytes twice stores one chunk and yields the same ref,
///   including when the writes race;
/// - `update_root` is linearizable: of N callers racing with the same
///   `expected`, exactly one observes `true`.
pub trait ChunkStore: Send + Sync {
    /// Fetch a chunk. Unknown refs yield `Ok(None)`.
    fn get(&self, content_ref: &ContentRef) -> Result<Option<Chunk>>;

    /// Check whether a chunk is present
    fn has(&self, content_ref: &ContentRef) -> Result<bool>;

    /// Store a finished chunk. A no-op if the ref is already present.
    fn put(&self, chunk: Chunk) -> Result<ContentRef>;

    /// The current root ref (`ContentRef::ZERO` for a fresh store)
    fn root(&self) -> ContentRef;

    /// Replace the root with `new_root` if it currently equals `expected`.
    ///
    /// Returns `Ok(false)` without touching the root when another writer got
    /// there first; the caller should re-read [`root`](Self::root) and retry.
    fn update_root(&self, new_root: ContentRef, expected: ContentRef) -> Result<bool>;

    /// Number of distinct chunks held
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open a write buffer that commits into this store
    ///
    /// Through a `&dyn ChunkStore`, use [`ChunkWriter::new`] instead.
    fn begin_put(&self) -> ChunkWriter<'_>
    where
        Self: Sized,
    {
        ChunkWriter::new(self)
    }
}
