//! Tessera core - schema catalog, query compilation, object reading and
//! transactional writes for runtime-defined content types.
//!
//! # Components
//!
//! - [`catalog`] - read-only class, member, data type and culture lookup
//! - [`query`] - raw filter/sort/paging input to validated [`Params`](proto::Params)
//! - [`reader`] - localized records to ordered [`ObjectView`]s
//! - [`writer`] - staged, validated, atomic create and edit
//! - [`gateway`] - the persistence boundary and its sled implementation
//! - [`service`] - list/get/create/edit/delete over the above
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tessera_core::catalog::{Catalog, Culture, DataType, Member, SchemaBundle, SchemaClass};
//! use tessera_core::{ContentService, EngineConfig, ListRequest, StorageConfig};
//! use tessera_core::proto::StorageKind;
//!
//! let bundle = SchemaBundle::new()
//!     .with_data_type(DataType::new(1, "string", StorageKind::Text))
//!     .with_data_type(DataType::new(2, "money", StorageKind::Decimal))
//!     .with_class(SchemaClass::new(1, "product"))
//!     .with_member(Member::new(1, 1, "name", 1).required())
//!     .with_member(Member::new(2, 1, "price", 2).at_position(1))
//!     .with_culture(Culture::neutral(1, "en"));
//! let catalog = Arc::new(Catalog::new(bundle).unwrap());
//! let config = EngineConfig::default().with_storage(StorageConfig::temporary());
//! let service = ContentService::open(catalog, &config).unwrap();
//!
//! service.create("product", [("name", "Widget"), ("price", "9.99")]).unwrap();
//! let page = service.list("product", &ListRequest::new().filter("price lt 10")).unwrap();
//! assert_eq!(page.total, 1);
//! ```

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod catalog;
pub mod coerce;
pub mod config;
pub mod error;
pub mod gateway;
pub mod query;
pub mod reader;
pub mod service;
pub mod writer;

pub use catalog::{Catalog, SchemaBundle};
pub use coerce::CoercionError;
pub use config::{EngineConfig, StorageConfig};
pub use error::{Error, QueryError, QueryErrorKind};
pub use gateway::{CultureValues, ObjectWrite, PersistenceGateway, RecordRefresh, SledGateway};
pub use query::{QueryCompiler, RawQuery};
pub use reader::{ObjectReader, ObjectView};
pub use service::{ContentService, ListRequest, ListResponse};
pub use writer::{ChangeEvent, ChangeKind, ObjectWriter};

/// Re-export protocol types.
pub use tessera_proto as proto;
