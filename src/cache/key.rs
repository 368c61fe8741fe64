//! Request fingerprinting for cache keys
//!
//! A `RequestSignature` collects the effective parameters of one API call and
//! digests them into a stable hex key. Names are iterated in sorted order, so
//! two signatures built from the same (name, value) pairs hash identically
//! regardless of insertion order.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Number, Value};
use sha2::{Digest, Sha256};

/// A parameter value in its canonical, hashable form.
///
/// The set of kinds is closed: anything outside it must be rendered through
/// `Raw`, the lossy string fallback. Two different values with the same `Raw`
/// rendering produce the same key.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Seq(Vec<ParamValue>),
    Object(BTreeMap<String, ParamValue>),
    /// Lossy fallback rendering for values outside the closed set
    Raw(String),
}

impl ParamValue {
    /// Encodes the value as a JSON primitive: dates become ISO-8601 strings,
    /// sequences ordered arrays, objects recursive field maps.
    ///
    /// Returns `None` for residue JSON cannot carry (non-finite floats); the
    /// caller then falls back to the debug rendering of the whole signature.
    fn encode(&self) -> Option<Value> {
        match self {
            ParamValue::Null => Some(Value::Null),
            ParamValue::Bool(b) => Some(Value::Bool(*b)),
            ParamValue::Int(i) => Some(Value::Number((*i).into())),
            ParamValue::Float(f) => Number::from_f64(*f).map(Value::Number),
            ParamValue::Str(s) | ParamValue::Raw(s) => Some(Value::String(s.clone())),
            ParamValue::Date(d) => Some(Value::String(d.format("%Y-%m-%d").to_string())),
            ParamValue::DateTime(t) => Some(Value::String(t.to_rfc3339())),
            ParamValue::Seq(items) => items
                .iter()
                .map(ParamValue::encode)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
            ParamValue::Object(fields) => fields
                .iter()
                .map(|(name, value)| value.encode().map(|v| (name.clone(), v)))
                .collect::<Option<Map<String, Value>>>()
                .map(Value::Object),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v.into())
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::Int(v.into())
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl From<NaiveDate> for ParamValue {
    fn from(v: NaiveDate) -> Self {
        ParamValue::Date(v)
    }
}

impl From<DateTime<Utc>> for ParamValue {
    fn from(v: DateTime<Utc>) -> Self {
        ParamValue::DateTime(v)
    }
}

impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ParamValue::Null)
    }
}

impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(v: Vec<T>) -> Self {
        ParamValue::Seq(v.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, ParamValue>> for ParamValue {
    fn from(v: BTreeMap<String, ParamValue>) -> Self {
        ParamValue::Object(v)
    }
}

/// The named parameter set of one logical API call.
///
/// Insertion order is irrelevant: entries are kept sorted by name, and the
/// fingerprint is computed over the sorted pairs. An explicit `Null` entry and
/// an absent name hash differently; cache-aware endpoints always set their
/// optional parameters (as `Null` when unset) so equivalent calls agree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestSignature {
    entries: BTreeMap<String, ParamValue>,
}

impl RequestSignature {
    /// Creates an empty signature
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a named parameter, replacing any previous value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.entries.insert(name.into(), value.into());
    }

    /// Builder form of [`set`](Self::set)
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Number of named parameters
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the signature holds no parameters
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Digests the signature into a fixed-length hex cache key.
    ///
    /// The canonical form is a JSON array of `[name, value]` pairs in sorted
    /// name order. If any value cannot be carried as JSON, the debug rendering
    /// of the sorted pairs is hashed instead; availability wins over key
    /// stability on that path.
    pub fn fingerprint(&self) -> String {
        let canonical: Option<Vec<Value>> = self
            .entries
            .iter()
            .map(|(name, value)| {
                value
                    .encode()
                    .map(|v| Value::Array(vec![Value::String(name.clone()), v]))
            })
            .collect();

        let serialized = match canonical
            .map(Value::Array)
            .as_ref()
            .and_then(|v| serde_json::to_string(v).ok())
        {
            Some(json) => json,
            None => format!("{:?}", self.entries),
        };

        let mut hasher = Sha256::new();
        hasher.update(serialized.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
