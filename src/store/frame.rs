//! On-disk framing of chunk bytes

use bytes::Bytes;

/// How a frame's payload is encoded
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Codec {
    /// Stored verbatim
    Raw,
    /// zstd-compressed
    Zstd,
}

impl Codec {
    pub fn as_byte(&self) -> u8 {
        match self {
            Codec::Raw => 0,
            Codec::Zstd => 1,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Codec::Raw),
            1 => Some(Codec::Zstd),
            _ => None,
        }
    }

    /// Codec for a configured compression level (0 disables compression)
    pub fn for_level(level: i32) -> Self {
        if level == 0 {
            Codec::Raw
        } else {
            Codec::Zstd
        }
    }
}

/// Encode chunk bytes as `[codec byte][payload]`
pub(crate) fn encode(data: &[u8], level: i32) -> crate::Result<Vec<u8>> {
    let codec = Codec::for_level(level);
    let mut output = Vec::with_capacity(data.len() + 1);
    output.push(codec.as_byte());
    match codec {
        Codec::Raw => output.extend_from_slice(data),
        Codec::Zstd => output.extend(zstd::encode_all(data, level)?),
    }
    Ok(output)
}

/// Decode a frame back into chunk bytes
pub(crate) fn decode(frame: &[u8]) -> crate::Result<Bytes> {
    let (&tag, payload) = frame
        .split_first()
        .ok_or_else(|| crate::Error::Corruption("Empty chunk frame".into()))?;

    let codec = Codec::from_byte(tag)
        .ok_or_else(|| crate::Error::Corruption(format!("Invalid frame codec: {}", tag)))?;

    match codec {
        Codec::Raw => Ok(Bytes::copy_from_slice(payload)),
        Codec::Zstd => Ok(Bytes::from(zstd::decode_all(payload)?)),
    }
}
