//! Persistence gateway.
//!
//! The engine never touches storage directly: it hands compiled [`Params`]
//! and whole-object writes to a [`PersistenceGateway`]. [`SledGateway`] is
//! the bundled implementation.

mod filter;
mod store;

pub use self::filter::RecordFilter;
pub use self::store::SledGateway;

use tessera_proto::{
    ClassId, CultureId, LocalizedRecord, ObjectId, Params, Property, StoredObject, Value,
};

use crate::error::Error;

/// One culture's flattened values for an object being written.
#[derive(Debug, Clone, PartialEq)]
pub struct CultureValues {
    pub culture_id: CultureId,
    /// Values keyed by member code, in declaration order.
    pub values: Vec<(String, Value)>,
}

/// Regenerated records of another object that points at the one being
/// written or deleted, so its relation labels follow the target.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordRefresh {
    pub object_id: ObjectId,
    pub class_id: ClassId,
    pub records: Vec<CultureValues>,
}

impl RecordRefresh {
    pub fn to_records(&self) -> Vec<LocalizedRecord> {
        self.records
            .iter()
            .map(|r| LocalizedRecord {
                culture_id: r.culture_id,
                object_id: self.object_id,
                class_id: self.class_id,
                values: r.values.clone(),
            })
            .collect()
    }
}

/// A committed write: the object's full property set and every
/// regenerated localized record.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectWrite {
    /// `None` for a create; the gateway assigns the id.
    pub object_id: Option<ObjectId>,
    pub class_id: ClassId,
    pub properties: Vec<Property>,
    pub records: Vec<CultureValues>,
    /// Records of referencing objects, written in the same transaction.
    pub refreshed: Vec<RecordRefresh>,
}

impl ObjectWrite {
    /// The stored object and records this write produces under `id`.
    pub fn materialize(&self, id: ObjectId) -> (StoredObject, Vec<LocalizedRecord>) {
        let object = StoredObject {
            id,
            class_id: self.class_id,
            properties: self.properties.clone(),
        };
        let records = self
            .records
            .iter()
            .map(|r| LocalizedRecord {
                culture_id: r.culture_id,
                object_id: id,
                class_id: self.class_id,
                values: r.values.clone(),
            })
            .collect();
        (object, records)
    }
}

/// Storage and query execution consumed by the engine.
///
/// `fetch_localized` and `count` must honor filtering, sorting and paging as
/// compiled; `count` ignores paging. `persist_object` and `delete_object` are
/// atomic, including the refreshed records of referencing objects they carry.
pub trait PersistenceGateway: Send + Sync {
    /// Records of `class_id` in `culture_id` matching `params`.
    fn fetch_localized(
        &self,
        culture_id: CultureId,
        class_id: ClassId,
        params: &Params,
    ) -> Result<Vec<LocalizedRecord>, Error>;

    /// Number of records matching `params`, ignoring paging.
    fn count(&self, culture_id: CultureId, class_id: ClassId, params: &Params)
        -> Result<u64, Error>;

    fn get_object(&self, id: ObjectId) -> Result<Option<StoredObject>, Error>;

    fn get_localized_record(
        &self,
        culture_id: CultureId,
        object_id: ObjectId,
    ) -> Result<Option<LocalizedRecord>, Error>;

    /// Objects whose relation members point at `target`.
    fn referrers(&self, target: ObjectId) -> Result<Vec<ObjectId>, Error>;

    /// Create or update an object and its records. Returns the object id.
    fn persist_object(&self, write: &ObjectWrite) -> Result<ObjectId, Error>;

    /// Delete an object and all of its records, rewriting `refreshed`.
    fn delete_object(&self, object: &StoredObject, refreshed: &[RecordRefresh])
        -> Result<(), Error>;
}

impl<G: PersistenceGateway + ?Sized> PersistenceGateway for std::sync::Arc<G> {
    fn fetch_localized(
        &self,
        culture_id: CultureId,
        class_id: ClassId,
        params: &Params,
    ) -> Result<Vec<LocalizedRecord>, Error> {
        (**self).fetch_localized(culture_id, class_id, params)
    }

    fn count(&self, culture_id: CultureId, class_id: ClassId, params: &Params) -> Result<u64, Error> {
        (**self).count(culture_id, class_id, params)
    }

    fn get_object(&self, id: ObjectId) -> Result<Option<StoredObject>, Error> {
        (**self).get_object(id)
    }

    fn get_localized_record(
        &self,
        culture_id: CultureId,
        object_id: ObjectId,
    ) -> Result<Option<LocalizedRecord>, Error> {
        (**self).get_localized_record(culture_id, object_id)
    }

    fn referrers(&self, target: ObjectId) -> Result<Vec<ObjectId>, Error> {
        (**self).referrers(target)
    }

    fn persist_object(&self, write: &ObjectWrite) -> Result<ObjectId, Error> {
        (**self).persist_object(write)
    }

    fn delete_object(&self, object: &StoredObject, refreshed: &[RecordRefresh]) -> Result<(), Error> {
        (**self).delete_object(object, refreshed)
    }
}
