//! One-sided diffs of a container against its ancestor

use crate::value::{Keyed, Value, ValueKind};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A change to one key of a keyed container
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffEntry {
    /// Key was added
    Added { key: Value, new: Value },
    /// Key was removed
    Removed { key: Value, old: Value },
    /// Key was modified
    Modified { key: Value, old: Value, new: Value },
}

impl DiffEntry {
    pub fn key(&self) -> &Value {
        match self {
            DiffEntry::Added { key, .. } => key,
            DiffEntry::Removed { key, .. } => key,
            DiffEntry::Modified { key, .. } => key,
        }
    }

    /// The value after the change; `None` for a removal
    pub fn new_value(&self) -> Option<&Value> {
        match self {
            DiffEntry::Added { new, .. } | DiffEntry::Modified { new, .. } => Some(new),
            DiffEntry::Removed { .. } => None,
        }
    }
}

/// A diff between two versions of a keyed container, sorted by key
#[derive(Clone, Debug, Default)]
pub struct Diff {
    pub entries: Vec<DiffEntry>,
}

impl Diff {
    pub fn new(entries: Vec<DiffEntry>) -> Self {
        Diff { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn added_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, DiffEntry::Added { .. }))
            .count()
    }

    pub fn removed_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, DiffEntry::Removed { .. }))
            .count()
    }

    pub fn modified_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e, DiffEntry::Modified { .. }))
            .count()
    }

    /// Changed keys mapped to their new value (`None` = removed)
    pub fn by_key(&self) -> BTreeMap<&Value, Option<&Value>> {
        self.entries
            .iter()
            .map(|e| (e.key(), e.new_value()))
            .collect()
    }
}

/// Compute the key-level changes that turn `old` into `new`
pub fn diff_keyed(old: &Keyed, new: &Keyed) -> Diff {
    if Arc::ptr_eq(old.entries_arc(), new.entries_arc()) {
        return Diff::default();
    }

    let mut entries = Vec::new();

    for (key, old_value) in old.iter() {
        match new.get(key) {
            None => entries.push(DiffEntry::Removed {
                key: key.clone(),
                old: old_value.clone(),
            }),
            Some(new_value) if new_value != old_value => entries.push(DiffEntry::Modified {
                key: key.clone(),
                old: old_value.clone(),
                new: new_value.clone(),
            }),
            _ => {} // Unchanged
        }
    }

    for (key, new_value) in new.iter() {
        if !old.contains_key(key) {
            entries.push(DiffEntry::Added {
                key: key.clone(),
                new: new_value.clone(),
            });
        }
    }

    // Sort entries for determinism
    entries.sort_by(|a, b| a.key().cmp(b.key()));

    Diff::new(entries)
}

/// Elements added and removed between two versions of a set
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetDiff {
    pub added: BTreeSet<Value>,
    pub removed: BTreeSet<Value>,
}

impl SetDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

pub fn diff_sets(old: &BTreeSet<Value>, new: &BTreeSet<Value>) -> SetDiff {
    SetDiff {
        added: new.difference(old).cloned().collect(),
        removed: old.difference(new).cloned().collect(),
    }
}

/// A set diff with in-place edits of container elements picked out
///
/// Scalars are identified by value, so they are only ever added or removed.
/// A container element counts as edited when the side removed exactly one
/// element of that kind and added exactly one; the two are paired.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SetChanges {
    pub added: BTreeSet<Value>,
    pub removed: BTreeSet<Value>,
    /// Ancestor element to the element that replaced it
    pub edited: BTreeMap<Value, Value>,
}

impl From<SetDiff> for SetChanges {
    fn from(diff: SetDiff) -> Self {
        let SetDiff {
            mut added,
            mut removed,
        } = diff;

        let pairs: Vec<(Value, Value)> = removed
            .iter()
            .filter(|old| old.kind().is_container())
            .filter_map(|old| {
                let kind = old.kind();
                let only_removed = sole_of_kind(&removed, &kind)?;
                let only_added = sole_of_kind(&added, &kind)?;
                (only_removed == old).then(|| (old.clone(), only_added.clone()))
            })
            .collect();

        let mut edited = BTreeMap::new();
        for (old, new) in pairs {
            removed.remove(&old);
            added.remove(&new);
            edited.insert(old, new);
        }

        SetChanges {
            added,
            removed,
            edited,
        }
    }
}

fn sole_of_kind<'a>(set: &'a BTreeSet<Value>, kind: &ValueKind) -> Option<&'a Value> {
    let mut matching = set.iter().filter(|v| v.kind() == *kind);
    match (matching.next(), matching.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}
