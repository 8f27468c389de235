//! Immutable structured values
//!
//! A [`Value`] is a closed set of node kinds: scalars, keyed containers (maps
//! and structs share one representation), sets, lists, and references to
//! values stored in other chunks. Containers keep their children behind
//! `Arc`, so versions that share structure are cheap to clone and compare.
//!
//! Equality is structural. A `Ref` compares by content ref, which is itself
//! structural equality of the referenced chunk.

mod codec;
mod store;

pub use codec::{decode, encode, encode_into};
pub use store::ValueStore;

use crate::model::ContentRef;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Leaf values
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    String(String),
    Bytes(Vec<u8>),
}

/// What flavour of keyed container a [`Keyed`] is
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyedKind {
    /// Arbitrary value keys
    Map,
    /// Named record; keys are field names
    Struct(String),
}

/// A key → value mapping, either a map or a struct
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Keyed {
    kind: KeyedKind,
    entries: Arc<BTreeMap<Value, Value>>,
}

impl Keyed {
    pub fn new(kind: KeyedKind, entries: BTreeMap<Value, Value>) -> Self {
        Keyed {
            kind,
            entries: Arc::new(entries),
        }
    }

    pub fn empty(kind: KeyedKind) -> Self {
        Self::new(kind, BTreeMap::new())
    }

    pub fn kind(&self) -> &KeyedKind {
        &self.kind
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Struct field lookup by name
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.entries.get(&Value::from(name))
    }

    pub fn contains_key(&self, key: &Value) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Value> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &BTreeMap<Value, Value> {
        &self.entries
    }

    pub(crate) fn entries_arc(&self) -> &Arc<BTreeMap<Value, Value>> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy with one entry set
    pub fn with(&self, key: impl Into<Value>, value: impl Into<Value>) -> Self {
        let mut entries = (*self.entries).clone();
        entries.insert(key.into(), value.into());
        Self::new(self.kind.clone(), entries)
    }

    /// Copy with one entry removed
    pub fn without(&self, key: &Value) -> Self {
        let mut entries = (*self.entries).clone();
        entries.remove(key);
        Self::new(self.kind.clone(), entries)
    }
}

/// The kind of a value, as far as merge compatibility is concerned
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Int,
    String,
    Bytes,
    Map,
    Struct(String),
    Set,
    List,
    Ref,
}

impl ValueKind {
    /// Whether values of this kind hold or point at other values
    ///
    /// Set elements of these kinds can be edited in place rather than only
    /// added or removed.
    pub fn is_container(&self) -> bool {
        !matches!(
            self,
            ValueKind::Bool | ValueKind::Int | ValueKind::String | ValueKind::Bytes
        )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Bool => f.write_str("Bool"),
            ValueKind::Int => f.write_str("Int"),
            ValueKind::String => f.write_str("String"),
            ValueKind::Bytes => f.write_str("Bytes"),
            ValueKind::Map => f.write_str("Map"),
            ValueKind::Struct(name) => write!(f, "struct {}", name),
            ValueKind::Set => f.write_str("Set"),
            ValueKind::List => f.write_str("List"),
            ValueKind::Ref => f.write_str("Ref"),
        }
    }
}

/// A node in an immutable value graph
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Value {
    Scalar(Scalar),
    Keyed(Keyed),
    Set(Arc<BTreeSet<Value>>),
    List(Arc<Vec<Value>>),
    /// A value stored in another chunk, loaded on demand
    Ref(ContentRef),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::Scalar(Scalar::String(s.into()))
    }

    pub fn int(i: i64) -> Self {
        Value::Scalar(Scalar::Int(i))
    }

    pub fn bool(b: bool) -> Self {
        Value::Scalar(Scalar::Bool(b))
    }

    pub fn bytes(b: impl Into<Vec<u8>>) -> Self {
        Value::Scalar(Scalar::Bytes(b.into()))
    }

    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
    {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Value::Keyed(Keyed::new(KeyedKind::Map, entries))
    }

    pub fn structure<V: Into<Value>>(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = (&'static str, V)>,
    ) -> Self {
        let entries = fields
            .into_iter()
            .map(|(k, v)| (Value::from(k), v.into()))
            .collect();
        Value::Keyed(Keyed::new(KeyedKind::Struct(name.into()), entries))
    }

    pub fn set<V: Into<Value>>(elements: impl IntoIterator<Item = V>) -> Self {
        Value::Set(Arc::new(elements.into_iter().map(Into::into).collect()))
    }

    pub fn list<V: Into<Value>>(elements: impl IntoIterator<Item = V>) -> Self {
        Value::List(Arc::new(elements.into_iter().map(Into::into).collect()))
    }

    pub fn reference(target: ContentRef) -> Self {
        Value::Ref(target)
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Scalar(Scalar::Bool(_)) => ValueKind::Bool,
            Value::Scalar(Scalar::Int(_)) => ValueKind::Int,
            Value::Scalar(Scalar::String(_)) => ValueKind::String,
            Value::Scalar(Scalar::Bytes(_)) => ValueKind::Bytes,
            Value::Keyed(keyed) => match keyed.kind() {
                KeyedKind::Map => ValueKind::Map,
                KeyedKind::Struct(name) => ValueKind::Struct(name.clone()),
            },
            Value::Set(_) => ValueKind::Set,
            Value::List(_) => ValueKind::List,
            Value::Ref(_) => ValueKind::Ref,
        }
    }

    pub fn as_keyed(&self) -> Option<&Keyed> {
        match self {
            Value::Keyed(keyed) => Some(keyed),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&BTreeSet<Value>> {
        match self {
            Value::Set(set) => Some(set),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_content_ref(&self) -> Option<ContentRef> {
        match self {
            Value::Ref(target) => Some(*target),
            _ => None,
        }
    }

    /// The empty container of the same kind, used as a stand-in ancestor
    /// when two sides create the same container independently
    pub fn empty_like(&self) -> Option<Value> {
        match self {
            Value::Keyed(keyed) => Some(Value::Keyed(Keyed::empty(keyed.kind().clone()))),
            Value::Set(_) => Some(Value::Set(Arc::new(BTreeSet::new()))),
            Value::Scalar(_) | Value::List(_) | Value::Ref(_) => None,
        }
    }
}

impl From<Scalar> for Value {
    fn from(s: Scalar) -> Self {
        Value::Scalar(s)
    }
}

impl From<Keyed> for Value {
    fn from(k: Keyed) -> Self {
        Value::Keyed(k)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::string(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::int(i as i64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::bool(b)
    }
}

impl From<ContentRef> for Value {
    fn from(r: ContentRef) -> Self {
        Value::Ref(r)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::String(s) => write!(f, "{:?}", s),
            Scalar::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
        }
    }
}

/// Deterministic textual encoding, used in conflict reports
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(s) => write!(f, "{}", s),
            Value::Keyed(keyed) => {
                match keyed.kind() {
                    KeyedKind::Map => f.write_str("Map {")?,
                    KeyedKind::Struct(name) => write!(f, "{} {{", name)?,
                }
                for (i, (k, v)) in keyed.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match (keyed.kind(), k) {
                        (KeyedKind::Struct(_), Value::Scalar(Scalar::String(name))) => {
                            write!(f, "{}: {}", name, v)?
                        }
                        _ => write!(f, "{}: {}", k, v)?,
                    }
                }
                f.write_str("}")
            }
            Value::Set(set) => {
                f.write_str("Set {")?;
                write_joined(f, set.iter())?;
                f.write_str("}")
            }
            Value::List(list) => {
                f.write_str("[")?;
                write_joined(f, list.iter())?;
                f.write_str("]")
            }
            Value::Ref(target) => write!(f, "#{}", target.short()),
        }
    }
}

fn write_joined<'a>(
    f: &mut fmt::Formatter<'_>,
    values: impl Iterator<Item = &'a Value>,
) -> fmt::Result {
    for (i, v) in values.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", v)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_equality() {
        let a = Value::map([("k", Value::map([("a", 0)]))]);
        let b = Value::map([("k", Value::map([("a", 0)]))]);
        let c = Value::map([("k", Value::map([("a", 1)]))]);

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(Value::from("x").kind(), ValueKind::String);
        assert_eq!(Value::int(1).kind(), ValueKind::Int);
        assert_eq!(Value::map([("a", 1)]).kind(), ValueKind::Map);
        assert_eq!(
            Value::structure("Person", [("name", "x")]).kind(),
            ValueKind::Struct("Person".into())
        );
        assert_eq!(Value::set([1, 2]).kind(), ValueKind::Set);
        assert_eq!(Value::list([1]).kind(), ValueKind::List);
        assert!(ValueKind::List.is_container());
        assert!(ValueKind::Ref.is_container());
        assert!(!ValueKind::Bytes.is_container());
    }

    #[test]
    fn test_map_and_struct_differ() {
        let map = Value::map([("name", "x")]);
        let record = Value::structure("Person", [("name", "x")]);
        assert_ne!(map, record);
        assert_ne!(map.kind(), record.kind());
    }

    #[test]
    fn test_keyed_access() {
        let record = Value::structure("Person", [("name", "ada"), ("lang", "en")]);
        let keyed = record.as_keyed().unwrap();

        assert_eq!(keyed.field("name"), Some(&Value::from("ada")));
        assert_eq!(keyed.len(), 2);

        let edited = keyed.with("name", "grace").without(&Value::from("lang"));
        assert_eq!(edited.field("name"), Some(&Value::from("grace")));
        assert!(edited.field("lang").is_none());
        // Original is untouched
        assert_eq!(keyed.len(), 2);
    }

    #[test]
    fn test_empty_like() {
        let record = Value::structure("Person", [("name", "ada")]);
        assert_eq!(
            record.empty_like(),
            Some(Value::Keyed(Keyed::empty(KeyedKind::Struct("Person".into()))))
        );
        assert_eq!(Value::set([1]).empty_like(), Some(Value::set(Vec::<Value>::new())));
        assert_eq!(Value::int(3).empty_like(), None);
    }

    #[test]
    fn test_display_encoding() {
        let v = Value::map([("a1", Value::from("one")), ("a2", Value::set([1, 2]))]);
        assert_eq!(v.to_string(), r#"Map {"a1": "one", "a2": Set {1, 2}}"#);

        let record = Value::structure("Person", [("name", Value::list(["x"]))]);
        assert_eq!(record.to_string(), r#"Person {name: ["x"]}"#);

        assert_eq!(Value::bytes(vec![0xab]).to_string(), "0xab");
        assert_eq!(Value::bool(true).to_string(), "true");
        assert!(Value::reference(ContentRef::of(b"x")).to_string().starts_with('#'));
    }
}
