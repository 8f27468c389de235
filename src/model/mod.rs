//! Core data model types for chunkmerge

mod chunk;
mod hash;

pub use chunk::Chunk;
pub use hash::{ContentHasher, ContentRef};
