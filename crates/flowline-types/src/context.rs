//! Execution context value model.
//!
//! `ContextValue` is the tagged union every step reads and writes. It is
//! serialized untagged so workflow inputs, literal step inputs and run results
//! stay plain JSON/YAML on the wire. `ExecutionContext` is the key/value state
//! threaded through a single run.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ordered string-keyed map of context values.
pub type ContextMap = BTreeMap<String, ContextValue>;

// ---------------------------------------------------------------------------
// ContextValue
// ---------------------------------------------------------------------------

/// A dynamically typed value stored in an execution context.
///
/// Strings are never reinterpreted. `String` precedes `Timestamp`, so untagged
/// deserialization never yields a `Timestamp`; those only come from
/// `From<DateTime<Utc>>` or a handler that builds one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    List(Vec<ContextValue>),
    Map(ContextMap),
}

impl ContextValue {
    /// Convert a JSON value coming from a handler or an external caller.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => ContextValue::Null,
            Value::Bool(b) => ContextValue::Bool(b),
            Value::Number(n) => ContextValue::Number(n.as_f64().unwrap_or_default()),
            Value::String(s) => ContextValue::String(s),
            Value::Array(items) => {
                ContextValue::List(items.into_iter().map(ContextValue::from_json).collect())
            }
            Value::Object(fields) => ContextValue::Map(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, ContextValue::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert to JSON for handlers that speak JSON.
    ///
    /// Integral numbers inside the safe integer range are emitted as JSON
    /// integers; non-finite numbers become `null`.
    pub fn to_json(&self) -> Value {
        match self {
            ContextValue::Null => Value::Null,
            ContextValue::Bool(b) => Value::Bool(*b),
            ContextValue::Number(n) => number_to_json(*n),
            ContextValue::Timestamp(ts) => Value::String(ts.to_rfc3339()),
            ContextValue::String(s) => Value::String(s.clone()),
            ContextValue::List(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
            ContextValue::Map(map) => map_to_json(map),
        }
    }

    /// JavaScript-like truthiness.
    pub fn is_truthy(&self) -> bool {
        match self {
            ContextValue::Null => false,
            ContextValue::Bool(b) => *b,
            ContextValue::Number(n) => *n != 0.0 && !n.is_nan(),
            ContextValue::String(s) => !s.is_empty(),
            ContextValue::Timestamp(_) | ContextValue::List(_) | ContextValue::Map(_) => true,
        }
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ContextValue::Null => "null",
            ContextValue::Bool(_) => "boolean",
            ContextValue::Number(_) => "number",
            ContextValue::Timestamp(_) => "timestamp",
            ContextValue::String(_) => "string",
            ContextValue::List(_) => "list",
            ContextValue::Map(_) => "map",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ContextValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ContextValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ContextValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&ContextMap> {
        match self {
            ContextValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[ContextValue]> {
        match self {
            ContextValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ContextValue::Null)
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextValue::String(s) => f.write_str(s),
            ContextValue::Timestamp(ts) => f.write_str(&ts.to_rfc3339()),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

fn number_to_json(n: f64) -> Value {
    const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Convert a context map into a JSON object.
pub fn map_to_json(map: &ContextMap) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Convert a JSON object into a context map. Non-object values yield `None`.
pub fn map_from_json(value: Value) -> Option<ContextMap> {
    match ContextValue::from_json(value) {
        ContextValue::Map(map) => Some(map),
        _ => None,
    }
}

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        ContextValue::String(s.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        ContextValue::String(s)
    }
}

impl From<f64> for ContextValue {
    fn from(n: f64) -> Self {
        ContextValue::Number(n)
    }
}

impl From<i64> for ContextValue {
    fn from(n: i64) -> Self {
        ContextValue::Number(n as f64)
    }
}

impl From<bool> for ContextValue {
    fn from(b: bool) -> Self {
        ContextValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for ContextValue {
    fn from(ts: DateTime<Utc>) -> Self {
        ContextValue::Timestamp(ts)
    }
}

impl From<Vec<ContextValue>> for ContextValue {
    fn from(items: Vec<ContextValue>) -> Self {
        ContextValue::List(items)
    }
}

impl From<ContextMap> for ContextValue {
    fn from(map: ContextMap) -> Self {
        ContextValue::Map(map)
    }
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

/// Key/value state threaded through one workflow run.
///
/// Starts as the caller-supplied input. Steps may read any key; keys are only
/// added through output bindings and aggregate writes (`output_var`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    values: ContextMap,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Set a key, returning the previous value if any.
    pub fn insert(&mut self, key: impl Into<String>, value: ContextValue) -> Option<ContextValue> {
        self.values.insert(key.into(), value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ContextValue)> {
        self.values.iter()
    }

    pub fn as_map(&self) -> &ContextMap {
        &self.values
    }

    pub fn into_map(self) -> ContextMap {
        self.values
    }

    /// Snapshot the whole context as a single map value.
    pub fn to_value(&self) -> ContextValue {
        ContextValue::Map(self.values.clone())
    }

    pub fn to_json(&self) -> Value {
        map_to_json(&self.values)
    }
}

impl From<ContextMap> for ExecutionContext {
    fn from(values: ContextMap) -> Self {
        Self { values }
    }
}

impl FromIterator<(String, ContextValue)> for ExecutionContext {
    fn from_iter<I: IntoIterator<Item = (String, ContextValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
