//! Single-use write handle for building a chunk from pieces

use super::ChunkStore;
use crate::model::{Chunk, ContentHasher, ContentRef};
use crate::Result;
use bytes::BytesMut;
use std::io;
use tracing::debug;

/// Buffered writer that becomes exactly one chunk
///
/// [`commit`](Self::commit) consumes the writer, so reuse is a compile error.
/// A writer held behind `&mut` can be committed with
/// [`finish`](Self::finish); any write or commit after that panics.
pub struct ChunkWriter<'a> {
    store: &'a (dyn ChunkStore + 'a),
    pending: Option<Pending>,
}

struct Pending {
    buf: BytesMut,
    hasher: ContentHasher,
}

impl<'a> ChunkWriter<'a> {
    pub fn new(store: &'a (dyn ChunkStore + 'a)) -> Self {
        ChunkWriter {
            store,
            pending: Some(Pending {
                buf: BytesMut::new(),
                hasher: ContentHasher::new(),
            }),
        }
    }

    /// Append bytes to the chunk
    pub fn append(&mut self, data: &[u8]) {
        let pending = self.pending_mut();
        pending.buf.extend_from_slice(data);
        pending.hasher.update(data);
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.pending.as_ref().map_or(0, |p| p.buf.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this writer has already produced its chunk
    pub fn is_committed(&self) -> bool {
        self.pending.is_none()
    }

    /// Hash the buffered bytes, store them, and return the ref
    pub fn commit(mut self) -> Result<ContentRef> {
        self.finish()
    }

    /// Commit in place. The writer is dead afterwards.
    ///
    /// # Panics
    ///
    /// If the writer was already committed.
    pub fn finish(&mut self) -> Result<ContentRef> {
        let Pending { buf, hasher } = self.pending.take().unwrap_or_else(|| used_after_commit());
        let chunk = Chunk::from_parts(hasher.finalize(), buf.freeze());
        let size = chunk.len();
        let content_ref = self.store.put(chunk)?;
        debug!(chunk = %content_ref.short(), size, "chunk committed");
        Ok(content_ref)
    }

    fn pending_mut(&mut self) -> &mut Pending {
        match self.pending.as_mut() {
            Some(pending) => pending,
            None => used_after_commit(),
        }
    }
}

#[cold]
fn used_after_commit() -> ! {
    panic!("chunk writer used after commit")
}

impl io::Write for ChunkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ChunkWriter<'_> {
    fn drop(&mut self) {
        if let Some(pending) = &self.pending {
            if !pending.buf.is_empty() {
                debug!(size = pending.buf.len(), "discarding uncommitted chunk writer");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::io::Write;

    #[test]
    fn test_pieces_hash_like_whole() {
        let store = MemoryStore::new();
        let mut writer = store.begin_put();
        writer.append(b"hello ");
        writer.write_all(b"world").unwrap();
        assert_eq!(writer.len(), 11);

        let r = writer.commit().unwrap();
        assert_eq!(r, ContentRef::of(b"hello world"));
        assert_eq!(store.get(&r).unwrap().unwrap().data(), b"hello world");
    }

    #[test]
    fn test_through_trait_object() {
        let store = MemoryStore::new();
        let dyn_store: &dyn ChunkStore = &store;
        let mut writer = ChunkWriter::new(dyn_store);
        writer.append(b"via dyn");
        let r = writer.commit().unwrap();
        assert!(store.has(&r).unwrap());
    }

    #[test]
    fn test_empty_chunk_is_storable() {
        let store = MemoryStore::new();
        let r = store.begin_put().commit().unwrap();
        assert_eq!(r, ContentRef::of(b""));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_finish_marks_committed() {
        let store = MemoryStore::new();
        let mut writer = store.begin_put();
        writer.append(b"x");
        writer.finish().unwrap();
        assert!(writer.is_committed());
        assert_eq!(writer.len(), 0);
    }

    #[test]
    #[should_panic(expected = "chunk writer used after commit")]
    fn test_write_after_finish_panics() {
        let store = MemoryStore::new();
        let mut writer = store.begin_put();
        writer.append(b"x");
        writer.finish().unwrap();
        writer.append(b"y");
    }

    #[test]
    #[should_panic(expected = "chunk writer used after commit")]
    fn test_double_finish_panics() {
        let store = MemoryStore::new();
        let mut writer = store.begin_put();
        writer.finish().unwrap();
        let _ = writer.finish();
    }

    #[test]
    fn test_dropped_writer_stores_nothing() {
        let store = MemoryStore::new();
        {
            let mut writer = store.begin_put();
            writer.append(b"abandoned");
        }
        assert!(store.is_empty());
    }
}
