//! Sled-backed persistence gateway.

#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Db, Transactional, Tree};
use tracing::{debug, info};

use tessera_proto::{ClassId, CultureId, LocalizedRecord, ObjectId, Params, StoredObject};

use super::filter::RecordFilter;
use super::{ObjectWrite, PersistenceGateway, RecordRefresh};
use crate::config::StorageConfig;
use crate::error::Error;

/// Tree name for stored objects (object id -> object).
const OBJECTS_TREE: &str = "objects";

/// Tree name for localized records (object id + culture id -> record).
const RECORDS_TREE: &str = "records";

/// Tree name for the class index (class id + object id -> empty).
const CLASS_INDEX_TREE: &str = "index:class";

/// Tree name for the reverse relation index (target id + source id -> empty).
const RELATION_INDEX_TREE: &str = "index:relation";

const EMPTY: &[u8] = &[];

/// Persistence gateway over sled trees.
///
/// Queries scan the class index and evaluate filters in memory over the
/// requested culture's records.
pub struct SledGateway {
    db: Db,
    objects: Tree,
    records: Tree,
    class_index: Tree,
    relation_index: Tree,
    /// Abort the next persist after the object write, inside the transaction.
    #[cfg(test)]
    fail_mid_commit: AtomicBool,
}

impl SledGateway {
    /// Open or create a gateway with the given configuration.
    pub fn open(config: &StorageConfig) -> Result<Self, Error> {
        let db = config.to_sled_config().open()?;
        Self::with_db(db)
    }

    /// Wrap an already open sled database.
    pub fn with_db(db: Db) -> Result<Self, Error> {
        let objects = db.open_tree(OBJECTS_TREE)?;
        let records = db.open_tree(RECORDS_TREE)?;
        let class_index = db.open_tree(CLASS_INDEX_TREE)?;
        let relation_index = db.open_tree(RELATION_INDEX_TREE)?;

        Ok(Self {
            db,
            objects,
            records,
            class_index,
            relation_index,
            #[cfg(test)]
            fail_mid_commit: AtomicBool::new(false),
        })
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }

    /// Number of stored objects across all classes.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn record_key(object_id: ObjectId, culture_id: CultureId) -> [u8; 16] {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&object_id.to_bytes());
        key[8..].copy_from_slice(&culture_id.to_bytes());
        key
    }

    fn index_key(class_id: ClassId, object_id: ObjectId) -> [u8; 16] {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&class_id.to_bytes());
        key[8..].copy_from_slice(&object_id.to_bytes());
        key
    }

    fn relation_key(target: ObjectId, source: ObjectId) -> [u8; 16] {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&target.to_bytes());
        key[8..].copy_from_slice(&source.to_bytes());
        key
    }

    /// Encoded records of each refreshed object, keyed by record key.
    fn encode_refreshed(
        refreshed: &[RecordRefresh],
    ) -> Result<Vec<(ObjectId, Vec<([u8; 16], Vec<u8>)>)>, Error> {
        refreshed
            .iter()
            .map(|refresh| -> Result<_, Error> {
                let entries = refresh
                    .to_records()
                    .iter()
                    .map(|r| -> Result<_, Error> {
                        Ok((Self::record_key(r.object_id, r.culture_id), r.to_bytes()?))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((refresh.object_id, entries))
            })
            .collect()
    }

    /// Filtered and sorted records of a class, before paging.
    fn select(
        &self,
        culture_id: CultureId,
        class_id: ClassId,
        params: &Params,
    ) -> Result<Vec<LocalizedRecord>, Error> {
        let mut out = Vec::new();
        for entry in self.class_index.scan_prefix(class_id.to_bytes()) {
            let (key, _) = entry?;
            let object_id = ObjectId::from_bytes(&key[8..])?;
            let Some(record) = self.get_localized_record(culture_id, object_id)? else {
                continue;
            };
            let keep = params
                .filtering
                .as_ref()
                .map_or(true, |f| RecordFilter::matches(&f.expression, &record));
            if keep {
                out.push(record);
            }
        }

        RecordFilter::sort(&mut out, params.sorting.as_ref());
        Ok(out)
    }

    #[cfg(test)]
    fn inject_mid_commit_failure(&self) {
        self.fail_mid_commit.store(true, Ordering::SeqCst);
    }

    #[cfg(test)]
    fn should_fail(&self) -> bool {
        self.fail_mid_commit.swap(false, Ordering::SeqCst)
    }

    #[cfg(not(test))]
    fn should_fail(&self) -> bool {
        false
    }
}

impl PersistenceGateway for SledGateway {
    fn fetch_localized(
        &self,
        culture_id: CultureId,
        class_id: ClassId,
        params: &Params,
    ) -> Result<Vec<LocalizedRecord>, Error> {
        let records = self.select(culture_id, class_id, params)?;
        let page = match params.paging {
            Some(paging) => records
                .into_iter()
                .skip(usize::try_from(paging.skip).unwrap_or(usize::MAX))
                .take(usize::try_from(paging.take).unwrap_or(usize::MAX))
                .collect(),
            None => records,
        };

        debug!(
            culture_id = %culture_id,
            class_id = %class_id,
            returned = page.len(),
            "fetched localized records"
        );
        Ok(page)
    }

    fn count(&self, culture_id: CultureId, class_id: ClassId, params: &Params) -> Result<u64, Error> {
        let unpaged = Params {
            sorting: None,
            ..params.without_paging()
        };
        Ok(self.select(culture_id, class_id, &unpaged)?.len() as u64)
    }

    fn get_object(&self, id: ObjectId) -> Result<Option<StoredObject>, Error> {
        match self.objects.get(id.to_bytes())? {
            Some(bytes) => Ok(Some(StoredObject::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_localized_record(
        &self,
        culture_id: CultureId,
        object_id: ObjectId,
    ) -> Result<Option<LocalizedRecord>, Error> {
        match self.records.get(Self::record_key(object_id, culture_id))? {
            Some(bytes) => Ok(Some(LocalizedRecord::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn persist_object(&self, write: &ObjectWrite) -> Result<ObjectId, Error> {
        let id = match write.object_id {
            Some(id) => id,
            None => ObjectId(self.db.generate_id()? + 1),
        };
        let (object, records) = write.materialize(id);
        let targets = object.relation_targets();

        // Encode outside the transaction; the closure may be retried.
        let object_bytes = object.to_bytes()?;
        let record_entries = records
            .iter()
            .map(|r| -> Result<_, Error> {
                Ok((Self::record_key(id, r.culture_id), r.to_bytes()?))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let refreshed = Self::encode_refreshed(&write.refreshed)?;
        let index_key = Self::index_key(write.class_id, id);
        let is_update = write.object_id.is_some();
        let inject_failure = self.should_fail();

        let result: Result<(), TransactionError<Error>> = (
            &self.objects,
            &self.records,
            &self.class_index,
            &self.relation_index,
        )
            .transaction(|(objects_tx, records_tx, index_tx, relation_tx)| {
                let previous = objects_tx.insert(&id.to_bytes()[..], object_bytes.as_slice())?;
                let previous_targets = match &previous {
                    Some(bytes) => StoredObject::from_bytes(bytes)
                        .map_err(|e| ConflictableTransactionError::Abort(Error::from(e)))?
                        .relation_targets(),
                    None if is_update => {
                        return Err(ConflictableTransactionError::Abort(Error::not_found(
                            "object", id,
                        )));
                    }
                    None => Vec::new(),
                };

                if inject_failure {
                    return Err(ConflictableTransactionError::Abort(Error::Transaction(
                        "injected failure after object write".into(),
                    )));
                }

                for (key, bytes) in &record_entries {
                    records_tx.insert(&key[..], bytes.as_slice())?;
                }
                index_tx.insert(&index_key[..], EMPTY)?;

                for target in previous_targets.iter().filter(|t| !targets.contains(t)) {
                    relation_tx.remove(&Self::relation_key(*target, id)[..])?;
                }
                for target in &targets {
                    relation_tx.insert(&Self::relation_key(*target, id)[..], EMPTY)?;
                }

                for (source, entries) in &refreshed {
                    // skip referrers deleted since the writer looked them up
                    if *source == id || objects_tx.get(source.to_bytes())?.is_none() {
                        continue;
                    }
                    for (key, bytes) in entries {
                        records_tx.insert(&key[..], bytes.as_slice())?;
                    }
                }
                Ok(())
            });

        match result {
            Ok(()) => {}
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(Error::Storage(e)),
        }

        info!(
            object_id = %id,
            class_id = %write.class_id,
            records = records.len(),
            refreshed = refreshed.len(),
            update = is_update,
            "persisted object"
        );
        Ok(id)
    }

    fn referrers(&self, target: ObjectId) -> Result<Vec<ObjectId>, Error> {
        self.relation_index
            .scan_prefix(target.to_bytes())
            .keys()
            .map(|key| -> Result<ObjectId, Error> { Ok(ObjectId::from_bytes(&key?[8..])?) })
            .collect()
    }

    fn delete_object(&self, object: &StoredObject, refreshed: &[RecordRefresh]) -> Result<(), Error> {
        let record_keys = self
            .records
            .scan_prefix(object.id.to_bytes())
            .keys()
            .collect::<Result<Vec<_>, _>>()?;
        let inbound_keys = self
            .relation_index
            .scan_prefix(object.id.to_bytes())
            .keys()
            .collect::<Result<Vec<_>, _>>()?;
        let outbound_keys: Vec<[u8; 16]> = object
            .relation_targets()
            .into_iter()
            .map(|target| Self::relation_key(target, object.id))
            .collect();
        let refreshed_entries = Self::encode_refreshed(refreshed)?;
        let index_key = Self::index_key(object.class_id, object.id);

        let result: Result<(), TransactionError<Error>> = (
            &self.objects,
            &self.records,
            &self.class_index,
            &self.relation_index,
        )
            .transaction(|(objects_tx, records_tx, index_tx, relation_tx)| {
                if objects_tx.remove(&object.id.to_bytes()[..])?.is_none() {
                    return Err(ConflictableTransactionError::Abort(Error::not_found(
                        "object", object.id,
                    )));
                }
                for key in &record_keys {
                    records_tx.remove(key.clone())?;
                }
                index_tx.remove(&index_key[..])?;

                for key in &inbound_keys {
                    relation_tx.remove(key.clone())?;
                }
                for key in &outbound_keys {
                    relation_tx.remove(&key[..])?;
                }

                for (source, entries) in &refreshed_entries {
                    if *source == object.id || objects_tx.get(source.to_bytes())?.is_none() {
                        continue;
                    }
                    for (key, bytes) in entries {
                        records_tx.insert(&key[..], bytes.as_slice())?;
                    }
                }
                Ok(())
            });

        match result {
            Ok(()) => {}
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(Error::Storage(e)),
        }

        info!(
            object_id = %object.id,
            class_id = %object.class_id,
            records = record_keys.len(),
            refreshed = refreshed_entries.len(),
            "deleted object"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::CultureValues;
    use tessera_proto::{
        ComparisonOp, FilterExpr, Filtering, MemberId, Paging, Property, PropertyValue,
        RelationRef, SortDirection, Sorting, StorageKind, Value,
    };

    const PRODUCT: ClassId = ClassId(2);
    const EN: CultureId = CultureId(1);
    const DE: CultureId = CultureId(2);

    fn gateway() -> SledGateway {
        SledGateway::open(&StorageConfig::temporary()).unwrap()
    }

    fn write(object_id: Option<ObjectId>, name: &str, price: f64) -> ObjectWrite {
        let values = vec![
            ("name".to_string(), Value::from(name)),
            ("price".to_string(), Value::Decimal(price)),
        ];
        ObjectWrite {
            object_id,
            class_id: PRODUCT,
            properties: vec![
                Property {
                    member_id: MemberId(1),
                    value: PropertyValue::Plain(Value::from(name)),
                },
                Property {
                    member_id: MemberId(2),
                    value: PropertyValue::Plain(Value::Decimal(price)),
                },
            ],
            records: vec![
                CultureValues {
                    culture_id: EN,
                    values: values.clone(),
                },
                CultureValues {
                    culture_id: DE,
                    values,
                },
            ],
            refreshed: Vec::new(),
        }
    }

    fn linked(object_id: Option<ObjectId>, target: ObjectId) -> ObjectWrite {
        let mut write = write(object_id, "Linked", 1.0);
        write.properties.push(Property {
            member_id: MemberId(3),
            value: PropertyValue::Plain(Value::Relation(RelationRef::unresolved(target))),
        });
        write
    }

    fn renamed(object_id: ObjectId, name: &str) -> RecordRefresh {
        RecordRefresh {
            object_id,
            class_id: PRODUCT,
            records: vec![CultureValues {
                culture_id: EN,
                values: vec![("name".to_string(), Value::from(name))],
            }],
        }
    }

    fn price_filter(op: ComparisonOp, bound: f64) -> Params {
        Params::new().with_filtering(Filtering::new(FilterExpr::compare("price", op, bound)))
    }

    #[test]
    fn test_persist_and_read_back() {
        let gw = gateway();
        let id = gw.persist_object(&write(None, "Widget", 9.99)).unwrap();

        let object = gw.get_object(id).unwrap().unwrap();
        assert_eq!(object.class_id, PRODUCT);
        assert_eq!(object.properties.len(), 2);

        let record = gw.get_localized_record(DE, id).unwrap().unwrap();
        assert_eq!(record.object_id, id);
        assert_eq!(record.get("name"), Some(&Value::from("Widget")));
        assert!(gw.get_localized_record(CultureId(9), id).unwrap().is_none());
    }

    #[test]
    fn test_ids_are_distinct() {
        let gw = gateway();
        let a = gw.persist_object(&write(None, "A", 1.0)).unwrap();
        let b = gw.persist_object(&write(None, "B", 2.0)).unwrap();
        assert_ne!(a, b);
        assert_eq!(gw.object_count(), 2);
    }

    #[test]
    fn test_update_keeps_id() {
        let gw = gateway();
        let id = gw.persist_object(&write(None, "Widget", 9.99)).unwrap();
        let again = gw.persist_object(&write(Some(id), "Widget", 12.5)).unwrap();
        assert_eq!(id, again);

        let record = gw.get_localized_record(EN, id).unwrap().unwrap();
        assert_eq!(record.get("price"), Some(&Value::Decimal(12.5)));
        assert_eq!(gw.object_count(), 1);
    }

    #[test]
    fn test_update_of_missing_object_fails() {
        let gw = gateway();
        let err = gw
            .persist_object(&write(Some(ObjectId(77)), "Ghost", 1.0))
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "object", .. }));
        assert!(gw.get_object(ObjectId(77)).unwrap().is_none());
    }

    #[test]
    fn test_fetch_filter_sort_page() {
        let gw = gateway();
        let cheap = gw.persist_object(&write(None, "Cheap", 1.0)).unwrap();
        let mid = gw.persist_object(&write(None, "Mid", 9.99)).unwrap();
        let dear = gw.persist_object(&write(None, "Dear", 20.0)).unwrap();

        let below = gw
            .fetch_localized(EN, PRODUCT, &price_filter(ComparisonOp::Lt, 10.0))
            .unwrap();
        let ids: Vec<ObjectId> = below.iter().map(|r| r.object_id).collect();
        assert_eq!(ids, vec![cheap, mid]);

        let params = Params::new()
            .with_sorting(Sorting {
                member_id: MemberId(2),
                member_code: "price".into(),
                storage_kind: StorageKind::Decimal,
                direction: SortDirection::Desc,
            })
            .with_paging(Paging::new(1, 1));
        let page = gw.fetch_localized(EN, PRODUCT, &params).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].object_id, mid);
        assert_eq!(gw.count(EN, PRODUCT, &params).unwrap(), 3);

        let above = gw
            .fetch_localized(EN, PRODUCT, &price_filter(ComparisonOp::Gt, 10.0))
            .unwrap();
        assert_eq!(above.len(), 1);
        assert_eq!(above[0].object_id, dear);
        assert!(gw
            .fetch_localized(EN, ClassId(99), &Params::new())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_mid_commit_failure_rolls_back() {
        let gw = gateway();
        let id = gw.persist_object(&write(None, "Widget", 9.99)).unwrap();
        let before_object = gw.get_object(id).unwrap();
        let before_record = gw.get_localized_record(EN, id).unwrap();

        gw.inject_mid_commit_failure();
        let err = gw
            .persist_object(&write(Some(id), "Changed", 1.0))
            .unwrap_err();
        assert!(matches!(err, Error::Transaction(_)));
        assert_eq!(gw.get_object(id).unwrap(), before_object);
        assert_eq!(gw.get_localized_record(EN, id).unwrap(), before_record);

        gw.inject_mid_commit_failure();
        assert!(gw.persist_object(&write(None, "New", 3.0)).is_err());
        assert_eq!(gw.object_count(), 1);
        assert_eq!(gw.count(EN, PRODUCT, &Params::new()).unwrap(), 1);
    }

    #[test]
    fn test_delete_removes_everything() {
        let gw = gateway();
        let id = gw.persist_object(&write(None, "Widget", 9.99)).unwrap();
        let object = gw.get_object(id).unwrap().unwrap();

        gw.delete_object(&object, &[]).unwrap();
        assert!(gw.get_object(id).unwrap().is_none());
        assert!(gw.get_localized_record(EN, id).unwrap().is_none());
        assert!(gw.get_localized_record(DE, id).unwrap().is_none());
        assert_eq!(gw.count(EN, PRODUCT, &Params::new()).unwrap(), 0);

        let err = gw.delete_object(&object, &[]).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_relation_index_follows_writes() {
        let gw = gateway();
        let a = gw.persist_object(&write(None, "A", 1.0)).unwrap();
        let b = gw.persist_object(&write(None, "B", 2.0)).unwrap();
        let source = gw.persist_object(&linked(None, a)).unwrap();
        assert_eq!(gw.referrers(a).unwrap(), vec![source]);
        assert!(gw.referrers(b).unwrap().is_empty());

        gw.persist_object(&linked(Some(source), b)).unwrap();
        assert!(gw.referrers(a).unwrap().is_empty());
        assert_eq!(gw.referrers(b).unwrap(), vec![source]);

        let object = gw.get_object(source).unwrap().unwrap();
        gw.delete_object(&object, &[]).unwrap();
        assert!(gw.referrers(b).unwrap().is_empty());
    }

    #[test]
    fn test_refreshed_records_commit_with_the_write() {
        let gw = gateway();
        let target = gw.persist_object(&write(None, "Target", 1.0)).unwrap();
        let source = gw.persist_object(&linked(None, target)).unwrap();
        let gone = gw.persist_object(&write(None, "Gone", 1.0)).unwrap();
        let gone_object = gw.get_object(gone).unwrap().unwrap();
        gw.delete_object(&gone_object, &[]).unwrap();

        let mut update = write(Some(target), "Target", 2.0);
        update.refreshed = vec![renamed(source, "Refreshed"), renamed(gone, "Revived")];
        gw.persist_object(&update).unwrap();
        let record = gw.get_localized_record(EN, source).unwrap().unwrap();
        assert_eq!(record.get("name"), Some(&Value::from("Refreshed")));
        // deleted referrers stay deleted
        assert!(gw.get_localized_record(EN, gone).unwrap().is_none());

        gw.inject_mid_commit_failure();
        let mut failing = write(Some(target), "Target", 3.0);
        failing.refreshed = vec![renamed(source, "Lost")];
        assert!(gw.persist_object(&failing).is_err());
        let record = gw.get_localized_record(EN, source).unwrap().unwrap();
        assert_eq!(record.get("name"), Some(&Value::from("Refreshed")));

        let target_object = gw.get_object(target).unwrap().unwrap();
        gw.delete_object(&target_object, &[renamed(source, "Orphaned")])
            .unwrap();
        let record = gw.get_localized_record(EN, source).unwrap().unwrap();
        assert_eq!(record.get("name"), Some(&Value::from("Orphaned")));
        assert!(gw.referrers(target).unwrap().is_empty());
    }

    #[test]
    fn test_reopen_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig::new(dir.path());
        let id = {
            let gw = SledGateway::open(&config).unwrap();
            let id = gw.persist_object(&write(None, "Widget", 9.99)).unwrap();
            gw.flush().unwrap();
            id
        };

        let gw = SledGateway::open(&config).unwrap();
        let record = gw.get_localized_record(EN, id).unwrap().unwrap();
        assert_eq!(record.get("name"), Some(&Value::from("Widget")));
    }
}
