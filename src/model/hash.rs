//! Content references and the hasher that produces them

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte BLAKE3 digest naming a chunk by its content
///
/// Equal bytes always produce equal refs. The zero ref is reserved for the
/// empty root and never addresses a chunk.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentRef([u8; 32]);

impl ContentRef {
    /// The zero ref (initial root, "no value")
    pub const ZERO: ContentRef = ContentRef([0u8; 32]);

    /// Width of a ref in bytes
    pub const LEN: usize = 32;

    /// Create a ref from raw digest bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        ContentRef(bytes)
    }

    /// Hash a complete byte sequence
    pub fn of(data: &[u8]) -> Self {
        ContentRef(*blake3::hash(data).as_bytes())
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != Self::LEN {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(ContentRef(arr))
    }

    /// Short prefix for display (first 7 chars, like git)
    pub fn short(&self) -> String {
        self.to_hex()[..7].to_string()
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentRef({})", self.short())
    }
}

impl Default for ContentRef {
    fn default() -> Self {
        ContentRef::ZERO
    }
}

impl AsRef<[u8]> for ContentRef {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Incremental digest over bytes written in pieces
///
/// Feeding the same bytes in any split yields the same ref as
/// [`ContentRef::of`] on the concatenation.
#[derive(Clone, Default)]
pub struct ContentHasher {
    inner: blake3::Hasher,
}

impl ContentHasher {
    pub fn new() -> Self {
        ContentHasher {
            inner: blake3::Hasher::new(),
        }
    }

    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    pub fn finalize(&self) -> ContentRef {
        ContentRef(*self.inner.finalize().as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ref_of_is_deterministic() {
        let r1 = ContentRef::of(b"hello");
        let r2 = ContentRef::of(b"hello");
        let r3 = ContentRef::of(b"world");

        assert_eq!(r1, r2);
        assert_ne!(r1, r3);
        assert!(!r1.is_zero());
    }

    #[test]
    fn test_hex_roundtrip() {
        let r1 = ContentRef::of(b"test data");
        let r2 = ContentRef::from_hex(&r1.to_hex()).unwrap();
        assert_eq!(r1, r2);
        assert!(ContentRef::from_hex("abcd").is_err());
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut hasher = ContentHasher::new();
        hasher.update(b"hel").update(b"lo ").update(b"world");
        assert_eq!(hasher.finalize(), ContentRef::of(b"hello world"));
    }

    #[test]
    fn test_short_and_default() {
        assert_eq!(ContentRef::of(b"x").short().len(), 7);
        assert!(ContentRef::default().is_zero());
    }
}
