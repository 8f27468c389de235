//! Chunk type - the unit of content-addressed storage

use super::ContentRef;
use bytes::Bytes;

/// An immutable byte blob together with the ref derived from it
///
/// The ref is computed once at construction; `chunk.content_ref()` always
/// equals `ContentRef::of(chunk.data())`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chunk {
    content_ref: ContentRef,
    data: Bytes,
}

impl Chunk {
    /// Create a chunk, hashing its data
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Chunk {
            content_ref: ContentRef::of(&data),
            data,
        }
    }

    /// Assemble a chunk from a ref computed elsewhere. The ref is not
    /// re-checked against the bytes.
    pub(crate) fn from_parts(content_ref: ContentRef, data: Bytes) -> Self {
        Chunk { content_ref, data }
    }

    pub fn content_ref(&self) -> ContentRef {
        self.content_ref
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Cheap clone of the underlying buffer
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_matches_content() {
        let chunk = Chunk::new(b"abc".to_vec());
        assert_eq!(chunk.content_ref(), ContentRef::of(b"abc"));
        assert_eq!(chunk.data(), b"abc");
        assert_eq!(chunk.len(), 3);
    }

    #[test]
    fn test_equal_bytes_equal_chunks() {
        let a = Chunk::new(Bytes::from_static(b"same"));
        let b = Chunk::new(b"same".to_vec());
        assert_eq!(a, b);
    }
}
