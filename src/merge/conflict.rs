//! Merge conflicts and their diagnostic reports

use crate::value::{Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the two descendants being merged
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Ours,
    Theirs,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Ours => Side::Theirs,
            Side::Theirs => Side::Ours,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Ours => f.write_str("ours"),
            Side::Theirs => f.write_str("theirs"),
        }
    }
}

/// Why a merge could not be reconciled
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConflictKind {
    /// One side has no value while the other changed it
    AbsentValue { absent: Side },
    /// The sides (or a side and the ancestor) are different kinds of value
    TypeMismatch {
        ours: ValueKind,
        theirs: ValueKind,
        ancestor: Option<ValueKind>,
    },
    /// Both sides created different values with no common ancestor
    AddedDifferently,
    /// Both sides changed a value that cannot merge member-by-member
    ModifiedDifferently,
    /// One side removed a key the other side modified
    RemovedVsModified { removed_by: Side },
}

/// One step from a container into one of its members
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathSegment {
    /// Entry of a map or struct, by encoded key
    Key(String),
    /// Element of a set, by its encoded ancestor value
    Element(String),
    /// Target of a reference
    Deref,
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "[{}]", key),
            PathSegment::Element(element) => write!(f, "{{{}}}", element),
            PathSegment::Deref => f.write_str("@"),
        }
    }
}

/// A subtree that could not be merged
///
/// Carries its classification, the path from the merge root down to the
/// colliding values, and encoded snapshots of those values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    kind: ConflictKind,
    path: Vec<PathSegment>,
    ancestor: Option<String>,
    ours: Option<String>,
    theirs: Option<String>,
}

impl Conflict {
    fn new(
        kind: ConflictKind,
        ancestor: Option<&Value>,
        ours: Option<&Value>,
        theirs: Option<&Value>,
    ) -> Self {
        Conflict {
            kind,
            path: Vec::new(),
            ancestor: ancestor.map(Value::to_string),
            ours: ours.map(Value::to_string),
            theirs: theirs.map(Value::to_string),
        }
    }

    pub(crate) fn absent(
        absent: Side,
        ancestor: Option<&Value>,
        ours: Option<&Value>,
        theirs: Option<&Value>,
    ) -> Self {
        Self::new(ConflictKind::AbsentValue { absent }, ancestor, ours, theirs)
    }

    pub(crate) fn type_mismatch(ancestor: Option<&Value>, ours: &Value, theirs: &Value) -> Self {
        let kind = ConflictKind::TypeMismatch {
            ours: ours.kind(),
            theirs: theirs.kind(),
            ancestor: ancestor.map(Value::kind),
        };
        Self::new(kind, ancestor, Some(ours), Some(theirs))
    }

    /// Both sides diverged on a value that has no member-wise merge
    pub(crate) fn divergent(ancestor: Option<&Value>, ours: &Value, theirs: &Value) -> Self {
        let kind = if ancestor.is_some() {
            ConflictKind::ModifiedDifferently
        } else {
            ConflictKind::AddedDifferently
        };
        Self::new(kind, ancestor, Some(ours), Some(theirs))
    }

    pub(crate) fn removed_vs_modified(
        removed_by: Side,
        ancestor: &Value,
        modified: &Value,
    ) -> Self {
        let (ours, theirs) = match removed_by {
            Side::Ours => (None, Some(modified)),
            Side::Theirs => (Some(modified), None),
        };
        Self::new(
            ConflictKind::RemovedVsModified { removed_by },
            Some(ancestor),
            ours,
            theirs,
        )
    }

    /// Prefix the path with the step that led into this conflict
    pub fn within(mut self, segment: PathSegment) -> Self {
        self.path.insert(0, segment);
        self
    }

    pub fn kind(&self) -> &ConflictKind {
        &self.kind
    }

    /// Path from the merge root to the conflicting values
    pub fn path(&self) -> &[PathSegment] {
        &self.path
    }

    /// The innermost key or set element on the path, if any
    pub fn key(&self) -> Option<&str> {
        self.path.iter().rev().find_map(|segment| match segment {
            PathSegment::Key(key) | PathSegment::Element(key) => Some(key.as_str()),
            PathSegment::Deref => None,
        })
    }

    /// Encoded ancestor value, if there was one
    pub fn ancestor(&self) -> Option<&str> {
        self.ancestor.as_deref()
    }

    pub fn ours(&self) -> Option<&str> {
        self.ours.as_deref()
    }

    pub fn theirs(&self) -> Option<&str> {
        self.theirs.as_deref()
    }

    /// Rendered path, `<root>` for a conflict at the top
    pub fn path_string(&self) -> String {
        if self.path.is_empty() {
            "<root>".to_string()
        } else {
            self.path.iter().map(ToString::to_string).collect()
        }
    }

    /// One-line description of what collided
    pub fn message(&self) -> String {
        let absent = "absent value";
        match &self.kind {
            ConflictKind::AbsentValue { absent: Side::Ours } => format!(
                "cannot merge {} with {}",
                absent,
                self.theirs().unwrap_or(absent)
            ),
            ConflictKind::AbsentValue { absent: Side::Theirs } => format!(
                "cannot merge {} with {}",
                self.ours().unwrap_or(absent),
                absent
            ),
            ConflictKind::TypeMismatch { ours, theirs, .. } => {
                format!("cannot merge {} with {}", ours, theirs)
            }
            ConflictKind::AddedDifferently => "both sides added different values".to_string(),
            ConflictKind::ModifiedDifferently => {
                "both sides modified the value differently".to_string()
            }
            ConflictKind::RemovedVsModified { removed_by } => {
                let key = self.key().unwrap_or("<root>");
                format!(
                    "removed {} ({}) vs modded {} ({})",
                    key,
                    removed_by,
                    key,
                    removed_by.other()
                )
            }
        }
    }

    /// Serializable snapshot for tools and logs
    pub fn report(&self) -> ConflictReport {
        ConflictReport {
            kind: self.kind.clone(),
            path: self.path_string(),
            key: self.key().map(str::to_string),
            message: self.message(),
            ancestor: self.ancestor.clone(),
            ours: self.ours.clone(),
            theirs: self.theirs.clone(),
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.message(), self.path_string())?;
        let snapshots = [
            ("ancestor", &self.ancestor),
            ("ours", &self.ours),
            ("theirs", &self.theirs),
        ];
        for (label, snapshot) in snapshots {
            if let Some(encoded) = snapshot {
                write!(f, "; {}: {}", label, encoded)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for Conflict {}

/// A conflict flattened into plain fields, stable across releases
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub kind: ConflictKind,
    pub path: String,
    pub key: Option<String>,
    pub message: String,
    pub ancestor: Option<String>,
    pub ours: Option<String>,
    pub theirs: Option<String>,
}

impl ConflictReport {
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
