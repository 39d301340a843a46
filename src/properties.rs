//! Typed property values and the read-only property bag backing every
//! plugin record.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;

/// A flat key/value view of plugin metadata, as produced by desktop files,
/// embedded library metadata and index entries.
pub type FlatProperties = BTreeMap<String, PropertyValue>;

static ABSENT: PropertyValue = PropertyValue::Absent;

/// A single property value.
///
/// The set of variants is closed so the constraint evaluator can match on
/// every case. `Absent` is what a lookup of a missing key yields; it is never
/// stored inside a [`PropertyBag`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
    String(String),
    StringList(Vec<String>),
    Absent,
}

impl PropertyValue {
    /// Short name of the variant, used in type mismatch diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Number(_) => "number",
            PropertyValue::String(_) => "string",
            PropertyValue::StringList(_) => "string list",
            PropertyValue::Absent => "absent",
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, PropertyValue::Absent)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            PropertyValue::StringList(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Converts a JSON value verbatim.
    ///
    /// `null` yields `None`. Arrays become string lists (non-string elements
    /// are stored as their JSON text) and objects are kept as compact JSON.
    pub fn from_json(value: &Value) -> Option<Self> {
        let converted = match value {
            Value::Null => return None,
            Value::Bool(b) => PropertyValue::Bool(*b),
            Value::Number(n) => PropertyValue::Number(n.as_f64()?),
            Value::String(s) => PropertyValue::String(s.clone()),
            Value::Array(items) => PropertyValue::StringList(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            Value::Object(_) => PropertyValue::String(value.to_string()),
        };
        Some(converted)
    }

    pub fn to_json(&self) -> Value {
        match self {
            PropertyValue::Bool(b) => Value::Bool(*b),
            PropertyValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            PropertyValue::String(s) => Value::String(s.clone()),
            PropertyValue::StringList(list) => {
                Value::Array(list.iter().cloned().map(Value::String).collect())
            }
            PropertyValue::Absent => Value::Null,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        PropertyValue::Bool(b)
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        PropertyValue::Number(n)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(list: Vec<String>) -> Self {
        PropertyValue::StringList(list)
    }
}

/// Read access to properties by key, as needed by the constraint evaluator.
///
/// Implementors return [`PropertyValue::Absent`] for missing keys.
pub trait PropertyLookup {
    fn lookup(&self, key: &str) -> Cow<'_, PropertyValue>;
}

/// Immutable, case-sensitive key/value store.
///
/// Enumeration is sorted by key so output is stable regardless of the order
/// the source metadata listed its keys in.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct PropertyBag {
    entries: BTreeMap<String, PropertyValue>,
}

impl PropertyBag {
    pub fn new(properties: FlatProperties) -> Self {
        let entries = properties
            .into_iter()
            .filter(|(_, value)| !value.is_absent())
            .collect();
        Self { entries }
    }

    /// Returns the value stored under `key`, or `Absent`.
    pub fn get(&self, key: &str) -> &PropertyValue {
        self.entries.get(key).unwrap_or(&ABSENT)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copies the bag back into a mutable flat map.
    pub fn to_flat(&self) -> FlatProperties {
        self.entries.clone()
    }
}

impl<K: Into<String>, V: Into<PropertyValue>> FromIterator<(K, V)> for PropertyBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl PropertyLookup for PropertyBag {
    fn lookup(&self, key: &str) -> Cow<'_, PropertyValue> {
        Cow::Borrowed(self.get(key))
    }
}

impl PropertyLookup for FlatProperties {
    fn lookup(&self, key: &str) -> Cow<'_, PropertyValue> {
        Cow::Borrowed(self.get(key).unwrap_or(&ABSENT))
    }
}
