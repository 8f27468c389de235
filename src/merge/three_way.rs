//! Three-way structural merge of value graphs

use super::conflict::{Conflict, PathSegment, Side};
use super::diff::{diff_keyed, diff_sets, SetChanges};
use crate::model::ContentRef;
use crate::store::ChunkStore;
use crate::value::{Keyed, Value, ValueStore};
use crate::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Merge two descendants of a common ancestor
///
/// Any of the three inputs may be absent. Returns the merged value (absent
/// only when the merge selects an absent side), or `Error::Conflict` naming
/// the first subtree that could not be reconciled. Targets of diverging
/// references are loaded from `store`, and merged targets are written back.
pub fn merge(
    ancestor: Option<&Value>,
    ours: Option<&Value>,
    theirs: Option<&Value>,
    store: &dyn ChunkStore,
) -> Result<Option<Value>> {
    MergeEngine::new(store).merge(ancestor, ours, theirs)
}

/// Merge state for one top-level merge: a value view of the store
///
/// The engine keeps no state between merges beyond a decode cache of
/// immutable chunks.
pub struct MergeEngine<'a> {
    values: ValueStore<'a>,
}

impl<'a> MergeEngine<'a> {
    pub fn new(store: &'a dyn ChunkStore) -> Self {
        MergeEngine {
            values: ValueStore::new(store),
        }
    }

    /// See [`merge`]
    pub fn merge(
        &self,
        ancestor: Option<&Value>,
        ours: Option<&Value>,
        theirs: Option<&Value>,
    ) -> Result<Option<Value>> {
        if ours == theirs {
            return Ok(ours.cloned());
        }
        if ours == ancestor {
            return Ok(theirs.cloned());
        }
        if theirs == ancestor {
            return Ok(ours.cloned());
        }

        let (ours_value, theirs_value) = match (ours, theirs) {
            (Some(o), Some(t)) => (o, t),
            (None, _) => return Err(Conflict::absent(Side::Ours, ancestor, ours, theirs).into()),
            (_, None) => {
                return Err(Conflict::absent(Side::Theirs, ancestor, ours, theirs).into())
            }
        };

        let kind = ours_value.kind();
        let ancestor_mismatch = ancestor.is_some_and(|a| a.kind() != kind);
        if theirs_value.kind() != kind || ancestor_mismatch {
            return Err(Conflict::type_mismatch(ancestor, ours_value, theirs_value).into());
        }

        // Both sides created the same kind of container: merge against an
        // empty one so that each side's members count as additions
        let stand_in;
        let ancestor = match ancestor {
            Some(a) => Some(a),
            None => {
                stand_in = ours_value.empty_like();
                stand_in.as_ref()
            }
        };

        match (ancestor, ours_value, theirs_value) {
            (Some(Value::Keyed(a)), Value::Keyed(o), Value::Keyed(t)) => {
                self.merge_keyed(a, o, t).map(Some)
            }
            (Some(Value::Set(a)), Value::Set(o), Value::Set(t)) => {
                self.merge_sets(a, o, t).map(Some)
            }
            (_, Value::Ref(o), Value::Ref(t)) => {
                let a = ancestor.and_then(Value::as_content_ref);
                self.merge_refs(a, *o, *t).map(Some)
            }
            (_, Value::Scalar(_), _) | (_, Value::List(_), _) => {
                Err(Conflict::divergent(ancestor, ours_value, theirs_value).into())
            }
            _ => Err(Conflict::type_mismatch(ancestor, ours_value, theirs_value).into()),
        }
    }

    fn merge_keyed(&self, ancestor: &Keyed, ours: &Keyed, theirs: &Keyed) -> Result<Value> {
        let ours_diff = diff_keyed(ancestor, ours);
        let theirs_diff = diff_keyed(ancestor, theirs);
        debug!(
            kind = ?ancestor.kind(),
            ours_changes = ours_diff.len(),
            theirs_changes = theirs_diff.len(),
            "merging keyed container"
        );

        let ours_changes = ours_diff.by_key();
        let theirs_changes = theirs_diff.by_key();
        let changed: BTreeSet<&Value> = ours_changes
            .keys()
            .chain(theirs_changes.keys())
            .copied()
            .collect();

        let mut merged: BTreeMap<Value, Value> = ancestor.entries().clone();
        for key in changed {
            let resolved = match (ours_changes.get(key), theirs_changes.get(key)) {
                (Some(o), None) => o.cloned(),
                (None, Some(t)) => t.cloned(),
                (Some(o), Some(t)) => nested(self.merge_key(ancestor.get(key), *o, *t), || {
                    PathSegment::Key(key.to_string())
                })?,
                (None, None) => continue,
            };
            match resolved {
                Some(value) => merged.insert(key.clone(), value),
                None => merged.remove(key),
            };
        }

        Ok(Value::Keyed(Keyed::new(ancestor.kind().clone(), merged)))
    }

    /// Both sides touched the same key
    fn merge_key(
        &self,
        ancestor: Option<&Value>,
        ours: Option<&Value>,
        theirs: Option<&Value>,
    ) -> Result<Option<Value>> {
        if ours == theirs {
            return Ok(ours.cloned());
        }
        match (ancestor, ours, theirs) {
            (Some(a), None, Some(t)) => Err(Conflict::removed_vs_modified(Side::Ours, a, t).into()),
            (Some(a), Some(o), None) => {
                Err(Conflict::removed_vs_modified(Side::Theirs, a, o).into())
            }
            _ => self.merge(ancestor, ours, theirs),
        }
    }

    /// Scalar elements are identified by value, so their additions and
    /// removals always combine. Container elements edited in place (see
    /// [`SetChanges`]) follow the keyed-entry rules: an edit against a removal
    /// conflicts, and two different edits of one element merge recursively.
    fn merge_sets(
        &self,
        ancestor: &BTreeSet<Value>,
        ours: &BTreeSet<Value>,
        theirs: &BTreeSet<Value>,
    ) -> Result<Value> {
        let ours_changes = SetChanges::from(diff_sets(ancestor, ours));
        let theirs_changes = SetChanges::from(diff_sets(ancestor, theirs));
        debug!(
            added = ours_changes.added.len() + theirs_changes.added.len(),
            removed = ours_changes.removed.len() + theirs_changes.removed.len(),
            edited = ours_changes.edited.len() + theirs_changes.edited.len(),
            "merging set"
        );

        let mut merged = ancestor.clone();
        for changes in [&ours_changes, &theirs_changes] {
            for element in &changes.removed {
                merged.remove(element);
            }
            merged.extend(changes.added.iter().cloned());
        }

        let edited: BTreeSet<&Value> = ours_changes
            .edited
            .keys()
            .chain(theirs_changes.edited.keys())
            .collect();
        for old in edited {
            let resolved = nested(
                self.merge_key(
                    Some(old),
                    element_after(old, &ours_changes),
                    element_after(old, &theirs_changes),
                ),
                || PathSegment::Element(old.to_string()),
            )?;
            merged.remove(old);
            merged.extend(resolved);
        }

        Ok(Value::Set(Arc::new(merged)))
    }

    /// Refs already differ here; merge their targets and store the result
    fn merge_refs(
        &self,
        ancestor: Option<ContentRef>,
        ours: ContentRef,
        theirs: ContentRef,
    ) -> Result<Value> {
        trace!(ours = %ours.short(), theirs = %theirs.short(), "dereferencing for merge");

        let ancestor_target = ancestor.map(|r| self.values.load(&r)).transpose()?;
        let ours_target = self.values.load(&ours)?;
        let theirs_target = self.values.load(&theirs)?;

        let merged = nested(
            self.merge(
                ancestor_target.as_ref(),
                Some(&ours_target),
                Some(&theirs_target),
            ),
            || PathSegment::Deref,
        )?;

        match merged {
            Some(target) => Ok(Value::Ref(self.values.write_value(&target)?)),
            // Both targets were present, so the merge cannot drop them
            None => Err(Error::Corruption(
                "merge of two present references produced no value".into(),
            )),
        }
    }
}

/// What one side turned an ancestor set element into
fn element_after<'v>(old: &'v Value, changes: &'v SetChanges) -> Option<&'v Value> {
    if let Some(new) = changes.edited.get(old) {
        Some(new)
    } else if changes.removed.contains(old) {
        None
    } else {
        Some(old)
    }
}

/// Tag a conflict raised below `segment` with that step
fn nested<T>(result: Result<T>, segment: impl FnOnce() -> PathSegment) -> Result<T> {
    result.map_err(|e| match e {
        Error::Conflict(conflict) => {
            debug!(path = %conflict.path_string(), "conflict propagated");
            Error::from((*conflict).within(segment()))
        }
        other => other,
    })
}
