//! Chunk encoding of values
//!
//! A value chunk is a tag byte followed by the bincode form of the value.
//! The tag lets a reader tell value chunks from arbitrary blobs.

use super::Value;
use crate::{Error, Result};
use std::io::Write;

const VALUE_TAG: u8 = b'V';

/// Encode a value into chunk bytes
pub fn encode(value: &Value) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    encode_into(&mut out, value)?;
    Ok(out)
}

/// Stream a value's chunk bytes into a writer
pub fn encode_into<W: Write>(mut writer: W, value: &Value) -> Result<()> {
    writer.write_all(&[VALUE_TAG])?;
    bincode::serialize_into(writer, value)?;
    Ok(())
}

/// Decode chunk bytes produced by [`encode`]
pub fn decode(data: &[u8]) -> Result<Value> {
    match data.split_first() {
        Some((&VALUE_TAG, body)) => Ok(bincode::deserialize(body)?),
        Some((tag, _)) => Err(Error::Corruption(format!("Not a value chunk (tag {})", tag))),
        None => Err(Error::Corruption("Empty value chunk".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentRef;

    #[test]
    fn test_nested_value_roundtrip() {
        let value = Value::map([
            ("name", Value::structure("Person", [("age", 42)])),
            ("tags", Value::set(["a", "b"])),
            ("path", Value::list([Value::from(1), Value::reference(ContentRef::of(b"x"))])),
        ]);

        let bytes = encode(&value).unwrap();
        assert_eq!(decode(&bytes).unwrap(), value);
    }

    #[test]
    fn test_equal_values_encode_identically() {
        let a = Value::map([("x", 1), ("y", 2)]);
        let b = Value::map([("y", 2), ("x", 1)]);
        assert_eq!(encode(&a).unwrap(), encode(&b).unwrap());
    }

    #[test]
    fn test_foreign_bytes_rejected() {
        assert!(matches!(decode(b""), Err(Error::Corruption(_))));
        assert!(matches!(decode(b"not a value"), Err(Error::Corruption(_))));
    }
}
