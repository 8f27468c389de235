//! # chunkmerge
//!
//! A content-addressed store for immutable structured values, with a
//! three-way merge that reconciles divergent versions of a value graph.
//!
//! ## Core Concepts
//!
//! - **Chunks**: immutable byte blobs stored under the BLAKE3 hash of their
//!   content; writing the same bytes twice stores them once
//! - **Root**: the single mutable ref of a store, moved only by
//!   compare-and-swap
//! - **Values**: maps, structs, sets, lists, scalars, and refs to values in
//!   other chunks
//! - **Merge**: combines two descendants of a common ancestor, or reports a
//!   [`Conflict`] saying exactly which subtree collided
//!
//! ## Example
//!
//! ```ignore
//! use chunkmerge::{ContentRef, Database, MemoryStore, Value};
//! use std::sync::Arc;
//!
//! let db = Database::new(Arc::new(MemoryStore::new()));
//! let base = db.commit(ContentRef::ZERO, &Value::map([("a1", "one")]))?.root();
//! db.commit(base, &Value::map([("a1", "one"), ("a2", "two")]))?;
//! ```

pub mod config;
pub mod merge;
pub mod model;
pub mod store;
pub mod value;

mod database;
mod error;

pub use config::StoreConfig;
pub use database::{CommitOutcome, Database};
pub use error::{Error, Result};
pub use merge::{merge, Conflict, ConflictKind, ConflictReport, MergeEngine, PathSegment, Side};
pub use model::{Chunk, ContentHasher, ContentRef};
pub use store::{ChunkStore, ChunkWriter, FileStore, MemoryStore};
pub use value::{Keyed, KeyedKind, Scalar, Value, ValueKind, ValueStore};

/// Store file format version
pub const VERSION: u32 = 1;

/// Magic bytes for file identification
pub const MAGIC: &[u8; 8] = b"CHUNKMRG";
