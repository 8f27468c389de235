//! High-level Database API
//!
//! A [`Database`] is a chunk store whose root names one value. Writers
//! commit against the root they started from; if someone else moved the root
//! in the meantime, the commit merges the two histories and tries again.

use crate::config::StoreConfig;
use crate::merge::MergeEngine;
use crate::model::ContentRef;
use crate::store::ChunkStore;
use crate::value::{Value, ValueStore};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// What a successful commit did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The root moved straight from `base` to the new value
    FastForward(ContentRef),
    /// Another writer moved the root first; the new root is a merge
    Merged(ContentRef),
}

impl CommitOutcome {
    /// The root after the commit
    pub fn root(&self) -> ContentRef {
        match self {
            CommitOutcome::FastForward(r) | CommitOutcome::Merged(r) => *r,
        }
    }

    pub fn is_merge(&self) -> bool {
        matches!(self, CommitOutcome::Merged(_))
    }
}

/// The main database interface
pub struct Database {
    store: Arc<dyn ChunkStore>,
    config: StoreConfig,
}

impl Database {
    pub fn new(store: Arc<dyn ChunkStore>) -> Self {
        Self::with_config(store, StoreConfig::default())
    }

    pub fn with_config(store: Arc<dyn ChunkStore>, config: StoreConfig) -> Self {
        Database { store, config }
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// The current root ref (`ContentRef::ZERO` before the first commit)
    pub fn head_ref(&self) -> ContentRef {
        self.store.root()
    }

    /// The current root value, `None` before the first commit
    pub fn head(&self) -> Result<Option<Value>> {
        self.value_at(self.head_ref())
    }

    /// Store a value and return its ref without touching the root
    pub fn write_value(&self, value: &Value) -> Result<ContentRef> {
        ValueStore::new(self.store.as_ref()).write_value(value)
    }

    /// Load a stored value. `Ok(None)` if the chunk is unknown.
    pub fn read_value(&self, content_ref: &ContentRef) -> Result<Option<Value>> {
        ValueStore::new(self.store.as_ref()).read_value(content_ref)
    }

    /// Make `value` the new root, given the root it was derived from
    ///
    /// If the root is still `base` it is swapped directly. Otherwise `value`
    /// is merged with the current root using `base` as the common ancestor,
    /// and the merge result is swapped in. Lost races re-read the root and
    /// merge again, up to `max_commit_retries` times.
    pub fn commit(&self, base: ContentRef, value: &Value) -> Result<CommitOutcome> {
        let values = ValueStore::new(self.store.as_ref());
        let engine = MergeEngine::new(self.store.as_ref());

        let ours_ref = values.write_value(value)?;
        let ancestor = self.value_in(&values, base)?;

        for attempt in 0..=self.config.max_commit_retries {
            let current = self.store.root();

            if current == base || current == ours_ref {
                if self.store.update_root(ours_ref, current)? {
                    info!(root = %ours_ref.short(), attempt, "committed");
                    return Ok(CommitOutcome::FastForward(ours_ref));
                }
                continue;
            }

            let theirs = self.value_in(&values, current)?;
            let merged = engine.merge(ancestor.as_ref(), Some(value), theirs.as_ref())?;
            let merged_ref = match merged {
                Some(merged) => values.write_value(&merged)?,
                None => ContentRef::ZERO,
            };

            if self.store.update_root(merged_ref, current)? {
                info!(root = %merged_ref.short(), theirs = %current.short(), attempt, "committed merge");
                return Ok(CommitOutcome::Merged(merged_ref));
            }
            debug!(attempt, "root moved during merge, retrying");
        }

        Err(Error::RetriesExhausted {
            attempts: self.config.max_commit_retries + 1,
        })
    }

    /// Merge three stored values without committing
    pub fn merge_refs(
        &self,
        ancestor: ContentRef,
        ours: ContentRef,
        theirs: ContentRef,
    ) -> Result<Option<Value>> {
        let values = ValueStore::new(self.store.as_ref());
        let ancestor = self.value_in(&values, ancestor)?;
        let ours = self.value_in(&values, ours)?;
        let theirs = self.value_in(&values, theirs)?;
        MergeEngine::new(self.store.as_ref()).merge(ancestor.as_ref(), ours.as_ref(), theirs.as_ref())
    }

    fn value_at(&self, content_ref: ContentRef) -> Result<Option<Value>> {
        self.value_in(&ValueStore::new(self.store.as_ref()), content_ref)
    }

    /// The zero ref reads as "no value"; any other ref must resolve
    fn value_in(&self, values: &ValueStore<'_>, content_ref: ContentRef) -> Result<Option<Value>> {
        if content_ref.is_zero() {
            return Ok(None);
        }
        values.load(&content_ref).map(Some)
    }
}
