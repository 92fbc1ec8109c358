/// Multi-valued attributes attached to catalog items
///
/// Tags come from collection loaders (sidecar JSON, directory names, file
/// extensions, ...) and are only ever read by the filter engine.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A single tag value
///
/// Whole numbers are always `Int`, so `4` and `4.0` are different values.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(TagFloat),
    Text(String),
}

/// `f64` tag value with a total order (`f64::total_cmp`), equal only when
/// bit-identical
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(transparent)]
pub struct TagFloat(pub f64);

impl TagFloat {
    pub fn get(self) -> f64 {
        self.0
    }
}

impl PartialEq for TagFloat {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for TagFloat {}

impl PartialOrd for TagFloat {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TagFloat {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for TagFloat {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

impl fmt::Display for TagFloat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(TagFloat(value))
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Int(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(v) => f.write_str(v),
        }
    }
}

/// One value or a list of them
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum TagValue {
    One(Scalar),
    Many(Vec<Scalar>),
}

impl TagValue {
    pub fn values(&self) -> &[Scalar] {
        match self {
            TagValue::One(value) => std::slice::from_ref(value),
            TagValue::Many(values) => values,
        }
    }
}

impl From<Scalar> for TagValue {
    fn from(value: Scalar) -> Self {
        TagValue::One(value)
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::One(value.into())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::One(value.into())
    }
}

impl From<i64> for TagValue {
    fn from(value: i64) -> Self {
        TagValue::One(value.into())
    }
}

impl From<f64> for TagValue {
    fn from(value: f64) -> Self {
        TagValue::One(value.into())
    }
}

impl From<bool> for TagValue {
    fn from(value: bool) -> Self {
        TagValue::One(value.into())
    }
}

impl From<Vec<Scalar>> for TagValue {
    fn from(values: Vec<Scalar>) -> Self {
        TagValue::Many(values)
    }
}

/// Tag map of one item, keyed by tag name
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct TagSet(BTreeMap<String, TagValue>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<TagValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<TagValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Add `value` to `key`, turning a single value into a list if needed
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<Scalar>) {
        let key = key.into();
        let value = value.into();
        let merged = match self.0.remove(&key) {
            Some(TagValue::One(existing)) => TagValue::Many(vec![existing, value]),
            Some(TagValue::Many(mut values)) => {
                values.push(value);
                TagValue::Many(values)
            }
            None => TagValue::One(value),
        };
        self.0.insert(key, merged);
    }

    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Values for `key`, empty when absent
    pub fn values(&self, key: &str) -> &[Scalar] {
        self.0.get(key).map(TagValue::values).unwrap_or(&[])
    }

    /// Merge `other` into `self`; keys in `other` win
    pub fn extend(&mut self, other: TagSet) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &TagValue)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<TagValue>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
