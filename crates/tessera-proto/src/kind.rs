//! Storage kinds.

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};
use std::fmt;

use crate::query::ComparisonOp;

/// The primitive representation a member's values coerce to and from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Archive,
    Serialize,
    Deserialize,
    SerdeSerialize,
    SerdeDeserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// UTF-8 text.
    Text,
    /// 64-bit signed integer.
    Integer,
    /// Decimal number.
    Decimal,
    /// Boolean flag.
    Boolean,
    /// Timestamp (microseconds since Unix epoch, UTC).
    DateTime,
    /// Reference to another object.
    Relation,
}

impl StorageKind {
    /// Lowercase name used in messages and configuration.
    pub fn name(&self) -> &'static str {
        match self {
            StorageKind::Text => "text",
            StorageKind::Integer => "integer",
            StorageKind::Decimal => "decimal",
            StorageKind::Boolean => "boolean",
            StorageKind::DateTime => "datetime",
            StorageKind::Relation => "relation",
        }
    }

    /// Check if this kind is numeric.
    pub fn is_numeric(&self) -> bool {
        matches!(self, StorageKind::Integer | StorageKind::Decimal)
    }

    /// Check if values of this kind have a meaningful ordering.
    pub fn is_ordered(&self) -> bool {
        !matches!(self, StorageKind::Boolean | StorageKind::Relation)
    }

    /// Whether a comparison operator may be applied to this kind.
    pub fn supports(&self, op: ComparisonOp) -> bool {
        match op {
            ComparisonOp::Eq | ComparisonOp::Ne | ComparisonOp::In => true,
            ComparisonOp::Contains => matches!(self, StorageKind::Text),
            ComparisonOp::Gt | ComparisonOp::Ge | ComparisonOp::Lt | ComparisonOp::Le => {
                self.is_ordered()
            }
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
