//! Three-way merge of value graphs
//!
//! Given a common ancestor and two descendants ("ours" and "theirs"), the
//! merge takes every change that only one side made, accepts identical
//! changes from both, and recurses into maps, structs, sets, and references
//! that both sides changed. Anything left over is a [`Conflict`].
//!
//! ```ignore
//! use chunkmerge::{merge, MemoryStore, Value};
//!
//! let store = MemoryStore::new();
//! let ancestor = Value::map([("a1", "one")]);
//! let ours = Value::map([("a1", "one"), ("a3", "x")]);
//! let theirs = Value::map([("a1", "one"), ("a4", "y")]);
//! let merged = merge(Some(&ancestor), Some(&ours), Some(&theirs), &store)?;
//! ```

mod conflict;
mod diff;
mod three_way;

pub use conflict::{Conflict, ConflictKind, ConflictReport, PathSegment, Side};
pub use diff::{diff_keyed, diff_sets, Diff, DiffEntry, SetChanges, SetDiff};
pub use three_way::{merge, MergeEngine};
