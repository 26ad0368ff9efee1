//! Coercion of untyped caller input into storage kinds.
//!
//! One function per [`StorageKind`]. Every function is pure and reports
//! failure through [`CoercionError`]; `RawValue::Null` and the empty string
//! coerce to [`Value::Null`] for every kind.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use thiserror::Error;

use tessera_proto::{ObjectId, RawValue, RelationRef, StorageKind, Value};

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Input that does not fit a storage kind.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("cannot read '{literal}' as {expected}: {reason}")]
pub struct CoercionError {
    pub expected: StorageKind,
    pub literal: String,
    pub reason: String,
}

impl CoercionError {
    pub fn new(expected: StorageKind, literal: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            expected,
            literal: literal.into(),
            reason: reason.into(),
        }
    }

    fn of(expected: StorageKind, raw: &RawValue, reason: impl Into<String>) -> Self {
        Self::new(expected, raw.literal(), reason)
    }
}

/// Coerce `raw` into `kind`.
pub fn coerce(kind: StorageKind, raw: &RawValue) -> Result<Value, CoercionError> {
    if let RawValue::Unsupported(_) = raw {
        return Err(CoercionError::of(kind, raw, "unsupported input shape"));
    }

    match kind {
        StorageKind::Text => to_text(raw),
        StorageKind::Integer => to_integer(raw),
        StorageKind::Decimal => to_decimal(raw),
        StorageKind::Boolean => to_boolean(raw),
        StorageKind::DateTime => to_datetime(raw),
        StorageKind::Relation => to_relation(raw),
    }
}

/// Any scalar rendered as text.
pub fn to_text(raw: &RawValue) -> Result<Value, CoercionError> {
    Ok(match raw {
        RawValue::Null => Value::Null,
        RawValue::Text(s) if s.is_empty() => Value::Null,
        RawValue::Text(s) => Value::Text(s.clone()),
        RawValue::Integer(i) => Value::Text(i.to_string()),
        RawValue::Decimal(d) => Value::Text(d.to_string()),
        RawValue::Boolean(b) => Value::Text(b.to_string()),
        RawValue::Unsupported(_) => {
            return Err(CoercionError::of(StorageKind::Text, raw, "unsupported input shape"))
        }
    })
}

pub fn to_integer(raw: &RawValue) -> Result<Value, CoercionError> {
    if raw.is_blank() {
        return Ok(Value::Null);
    }
    match raw {
        RawValue::Integer(i) => Ok(Value::Integer(*i)),
        RawValue::Decimal(d) if d.fract() == 0.0 && d.abs() < i64::MAX as f64 => {
            Ok(Value::Integer(*d as i64))
        }
        RawValue::Text(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| CoercionError::of(StorageKind::Integer, raw, "not an integer")),
        _ => Err(CoercionError::of(StorageKind::Integer, raw, "not an integer")),
    }
}

pub fn to_decimal(raw: &RawValue) -> Result<Value, CoercionError> {
    if raw.is_blank() {
        return Ok(Value::Null);
    }
    let parsed = match raw {
        RawValue::Integer(i) => Some(*i as f64),
        RawValue::Decimal(d) => Some(*d),
        RawValue::Text(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(d) if d.is_finite() => Ok(Value::Decimal(d)),
        Some(_) => Err(CoercionError::of(
            StorageKind::Decimal,
            raw,
            "not a finite number",
        )),
        None => Err(CoercionError::of(StorageKind::Decimal, raw, "not a number")),
    }
}

pub fn to_boolean(raw: &RawValue) -> Result<Value, CoercionError> {
    if raw.is_blank() {
        return Ok(Value::Null);
    }
    let parsed = match raw {
        RawValue::Boolean(b) => Some(*b),
        RawValue::Integer(0) => Some(false),
        RawValue::Integer(1) => Some(true),
        RawValue::Text(s) => match s.trim() {
            t if t.eq_ignore_ascii_case("true") || t == "1" => Some(true),
            t if t.eq_ignore_ascii_case("false") || t == "0" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed.map(Value::Boolean).ok_or_else(|| {
        CoercionError::of(StorageKind::Boolean, raw, "expected true, false, 1 or 0")
    })
}

/// Date-times are stored as microseconds since the Unix epoch, UTC.
pub fn to_datetime(raw: &RawValue) -> Result<Value, CoercionError> {
    if raw.is_blank() {
        return Ok(Value::Null);
    }
    let RawValue::Text(s) = raw else {
        return Err(CoercionError::of(
            StorageKind::DateTime,
            raw,
            "date-times must be given as text",
        ));
    };

    parse_datetime(s.trim()).map(Value::DateTime).ok_or_else(|| {
        CoercionError::of(
            StorageKind::DateTime,
            raw,
            "expected RFC 3339, 'YYYY-MM-DD HH:MM:SS' or 'YYYY-MM-DD'",
        )
    })
}

fn parse_datetime(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc).timestamp_micros());
    }
    for format in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(naive.and_utc().timestamp_micros());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().timestamp_micros())
}

/// Render stored microseconds as RFC 3339.
pub fn format_datetime(micros: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_micros(micros)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// A relation is an object id; its label is resolved at commit.
pub fn to_relation(raw: &RawValue) -> Result<Value, CoercionError> {
    if raw.is_blank() {
        return Ok(Value::Null);
    }
    let id = match raw {
        RawValue::Integer(i) => u64::try_from(*i).ok(),
        RawValue::Text(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    id.map(|id| Value::Relation(RelationRef::unresolved(ObjectId(id))))
        .ok_or_else(|| {
            CoercionError::of(
                StorageKind::Relation,
                raw,
                "expected a non-negative object id",
            )
        })
}
