//! Schema catalog for tessera.
//!
//! The catalog is a read-only view of classes, members, data types and
//! cultures, built once from a [`SchemaBundle`] and validated on construction.

mod catalog;
mod schema;
mod types;

pub use catalog::Catalog;
pub use schema::SchemaBundle;
pub use types::{Culture, DataType, Member, SchemaClass};
