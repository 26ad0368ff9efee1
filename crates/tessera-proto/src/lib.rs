//! Tessera shared data model.
//!
//! This crate defines the types exchanged between the tessera engine and its
//! persistence gateway: identifiers, runtime values, stored objects and their
//! per-culture flattened records, and the compiled query IR.
//!
//! # Modules
//!
//! - [`id`] - Strongly typed identifiers for schema and instance rows
//! - [`kind`] - Storage kinds that govern coercion and operator legality
//! - [`value`] - Resolved values and untyped caller input
//! - [`record`] - Stored objects and localized records
//! - [`query`] - Compiled query specification (filter, sort, page)
//! - [`error`] - Encoding error types
//!
//! # Serialization
//!
//! Stored types derive `rkyv::Archive`, `rkyv::Serialize`, and
//! `rkyv::Deserialize` and expose `to_bytes`/`from_bytes` helpers. The query
//! IR is recursive and only derives serde.

pub mod error;
pub mod id;
pub mod kind;
pub mod query;
pub mod record;
pub mod value;

pub use error::Error;

// Re-export commonly used types at crate root
pub use id::{ClassId, CultureId, DataTypeId, MemberId, ObjectId};
pub use kind::StorageKind;
pub use query::{
    ComparisonOp, FilterExpr, Filtering, Paging, Params, SortDirection, Sorting,
};
pub use record::{LocalizedRecord, LocalizedText, Property, PropertyValue, StoredObject};
pub use value::{RawValue, RelationRef, Value};
