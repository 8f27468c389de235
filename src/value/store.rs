//! Reading and writing values through a chunk store

use super::{codec, Value};
use crate::model::ContentRef;
use crate::store::{ChunkStore, ChunkWriter};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::trace;

/// Value-level view of a [`ChunkStore`]
///
/// Decoded values are cached by ref. Chunks never change, so the cache can
/// only ever hold correct entries.
pub struct ValueStore<'a> {
    store: &'a dyn ChunkStore,
    cache: Mutex<HashMap<ContentRef, Value>>,
}

impl<'a> ValueStore<'a> {
    pub fn new(store: &'a dyn ChunkStore) -> Self {
        ValueStore {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Encode a value into a new chunk and return its ref
    pub fn write_value(&self, value: &Value) -> Result<ContentRef> {
        let mut writer = ChunkWriter::new(self.store);
        codec::encode_into(&mut writer, value)?;
        let content_ref = writer.commit()?;
        self.cache.lock().insert(content_ref, value.clone());
        Ok(content_ref)
    }

    /// Load a value. `Ok(None)` if no chunk has that ref.
    pub fn read_value(&self, content_ref: &ContentRef) -> Result<Option<Value>> {
        if let Some(value) = self.cache.lock().get(content_ref) {
            return Ok(Some(value.clone()));
        }

        let Some(chunk) = self.store.get(content_ref)? else {
            return Ok(None);
        };
        trace!(chunk = %content_ref.short(), size = chunk.len(), "decoding value");

        let value = codec::decode(chunk.data())?;
        self.cache.lock().insert(*content_ref, value.clone());
        Ok(Some(value))
    }

    /// Load a value that must exist, e.g. the target of a `Ref`
    pub fn load(&self, content_ref: &ContentRef) -> Result<Value> {
        self.read_value(content_ref)?
            .ok_or_else(|| Error::NotFound(content_ref.to_hex()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_write_then_read() {
        let chunks = MemoryStore::new();
        let values = ValueStore::new(&chunks);

        let value = Value::structure("Foo", [("life", 42)]);
        let r = values.write_value(&value).unwrap();

        assert_eq!(values.load(&r).unwrap(), value);
        // A fresh view decodes from the chunk rather than the cache
        assert_eq!(ValueStore::new(&chunks).load(&r).unwrap(), value);
    }

    #[test]
    fn test_identical_values_share_a_chunk() {
        let chunks = MemoryStore::new();
        let values = ValueStore::new(&chunks);

        let r1 = values.write_value(&Value::set([1, 2, 3])).unwrap();
        let r2 = values.write_value(&Value::set([3, 2, 1])).unwrap();
        assert_eq!(r1, r2);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_missing_value() {
        let chunks = MemoryStore::new();
        let values = ValueStore::new(&chunks);
        let missing = ContentRef::of(b"missing");

        assert!(values.read_value(&missing).unwrap().is_none());
        assert!(matches!(values.load(&missing), Err(Error::NotFound(_))));
    }
}
