//! Runtime value types.

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};
use std::fmt;

use crate::id::ObjectId;
use crate::kind::StorageKind;

/// A resolved value of one member.
///
/// Relation values are expanded one level only: the referenced object's id
/// and its label at the time the owning record was regenerated.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub enum Value {
    /// No value.
    Null,
    /// UTF-8 text.
    Text(String),
    /// 64-bit signed integer.
    Integer(i64),
    /// Decimal number.
    Decimal(f64),
    /// Boolean flag.
    Boolean(bool),
    /// Timestamp as microseconds since Unix epoch.
    DateTime(i64),
    /// One-level reference to another object.
    Relation(RelationRef),
}

/// A reference to another object with its display label.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct RelationRef {
    /// Referenced object.
    pub id: ObjectId,
    /// Label of the referenced object, if it has one.
    pub label: Option<String>,
}

impl RelationRef {
    /// Create a new relation reference.
    pub fn new(id: ObjectId, label: Option<String>) -> Self {
        Self { id, label }
    }

    /// Reference without a resolved label.
    pub fn unresolved(id: ObjectId) -> Self {
        Self { id, label: None }
    }
}

impl Value {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The storage kind this value belongs to, `None` for null.
    pub fn kind(&self) -> Option<StorageKind> {
        match self {
            Value::Null => None,
            Value::Text(_) => Some(StorageKind::Text),
            Value::Integer(_) => Some(StorageKind::Integer),
            Value::Decimal(_) => Some(StorageKind::Decimal),
            Value::Boolean(_) => Some(StorageKind::Boolean),
            Value::DateTime(_) => Some(StorageKind::DateTime),
            Value::Relation(_) => Some(StorageKind::Relation),
        }
    }

    /// Try to get as text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as f64, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Decimal(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as timestamp.
    pub fn as_datetime(&self) -> Option<i64> {
        match self {
            Value::DateTime(t) => Some(*t),
            _ => None,
        }
    }

    /// Try to get as a relation reference.
    pub fn as_relation(&self) -> Option<&RelationRef> {
        match self {
            Value::Relation(r) => Some(r),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::DateTime(t) => write!(f, "@{}", t),
            Value::Relation(r) => write!(f, "#{}", r.id),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Decimal(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<RelationRef> for Value {
    fn from(v: RelationRef) -> Self {
        Value::Relation(v)
    }
}

/// Untyped input from a caller's flat property map.
///
/// Coercion into a member's storage kind happens in the engine; this type only
/// carries what the caller sent.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// Explicit null.
    Null,
    /// Text (the common case for form and query-string input).
    Text(String),
    /// Integer number.
    Integer(i64),
    /// Floating point number.
    Decimal(f64),
    /// Boolean flag.
    Boolean(bool),
    /// A structured value no storage kind accepts, kept as its JSON rendering.
    Unsupported(String),
}

impl RawValue {
    /// Check if this is an explicit null or an empty string.
    pub fn is_blank(&self) -> bool {
        match self {
            RawValue::Null => true,
            RawValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Render for error messages.
    pub fn literal(&self) -> String {
        match self {
            RawValue::Null => "null".to_string(),
            RawValue::Text(s) => s.clone(),
            RawValue::Integer(i) => i.to_string(),
            RawValue::Decimal(d) => d.to_string(),
            RawValue::Boolean(b) => b.to_string(),
            RawValue::Unsupported(s) => s.clone(),
        }
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Text(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        RawValue::Text(v)
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Integer(v)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Decimal(v)
    }
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        RawValue::Boolean(v)
    }
}

impl From<serde_json::Value> for RawValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => RawValue::Null,
            serde_json::Value::Bool(b) => RawValue::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => RawValue::Integer(i),
                None => RawValue::Decimal(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => RawValue::Text(s),
            other => RawValue::Unsupported(other.to_string()),
        }
    }
}
