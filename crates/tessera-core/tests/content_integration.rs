//! Integration tests for the content engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use tessera_core::catalog::{Catalog, Culture, DataType, Member, SchemaBundle, SchemaClass};
use tessera_core::proto::{
    ClassId, CultureId, LocalizedRecord, ObjectId, Params, RawValue, StorageKind, StoredObject,
    Value,
};
use tessera_core::{
    ContentService, Error, ListRequest, ObjectReader, ObjectWrite, ObjectWriter,
    PersistenceGateway, QueryCompiler, QueryErrorKind, RawQuery, RecordRefresh, SledGateway,
    StorageConfig,
};

const EN: CultureId = CultureId(1);
const DE: CultureId = CultureId(2);

fn shop_schema() -> Catalog {
    let bundle = SchemaBundle::new()
        .with_data_type(DataType::new(1, "string", StorageKind::Text))
        .with_data_type(DataType::new(2, "money", StorageKind::Decimal))
        .with_data_type(DataType::new(3, "int", StorageKind::Integer))
        .with_data_type(DataType::new(4, "flag", StorageKind::Boolean))
        .with_data_type(DataType::new(5, "date", StorageKind::DateTime))
        .with_data_type(DataType::new(6, "link", StorageKind::Relation))
        .with_class(SchemaClass::new(1, "vendor").with_label_member("title"))
        .with_class(SchemaClass::new(2, "product"))
        .with_class(SchemaClass::new(3, "person"))
        .with_member(Member::new(1, 1, "title", 1).required().localizable())
        .with_member(Member::new(10, 2, "name", 1).required().at_position(1))
        .with_member(Member::new(11, 2, "price", 2).at_position(2))
        .with_member(Member::new(12, 2, "blurb", 1).localizable().at_position(3))
        .with_member(Member::new(13, 2, "active", 4).at_position(4))
        .with_member(Member::new(14, 2, "released", 5).at_position(5))
        .with_member(Member::new(15, 2, "vendor", 6).relation_to(1).at_position(6))
        .with_member(Member::new(20, 3, "age", 3))
        .with_member(Member::new(21, 3, "a", 3))
        .with_member(Member::new(22, 3, "b", 3))
        .with_member(Member::new(23, 3, "c", 3))
        .with_culture(Culture::neutral(1, "en"))
        .with_culture(Culture::new(2, "de"));
    Catalog::new(bundle).unwrap()
}

struct TestContext {
    catalog: Catalog,
    gateway: SledGateway,
    _storage_dir: tempfile::TempDir,
}

impl TestContext {
    fn new() -> Self {
        let storage_dir = tempfile::tempdir().unwrap();
        let gateway = SledGateway::open(&StorageConfig::new(storage_dir.path())).unwrap();

        Self {
            catalog: shop_schema(),
            gateway,
            _storage_dir: storage_dir,
        }
    }

    fn writer(&self) -> ObjectWriter<'_> {
        ObjectWriter::new(&self.catalog, &self.gateway, EN)
    }

    fn fetch_ids(&self, class: &str, filter: &str) -> Vec<ObjectId> {
        let class_id = self.catalog.resolve_class(class).unwrap().id;
        let params = QueryCompiler::new(&self.catalog)
            .compile(class_id, &RawQuery::new().filter(filter))
            .unwrap();
        self.gateway
            .fetch_localized(EN, class_id, &params)
            .unwrap()
            .into_iter()
            .map(|r| r.object_id)
            .collect()
    }

    fn snapshot(&self, id: ObjectId) -> (Vec<u8>, Vec<Vec<u8>>) {
        let object = self.gateway.get_object(id).unwrap().unwrap();
        let records = [EN, DE]
            .iter()
            .map(|c| {
                self.gateway
                    .get_localized_record(*c, id)
                    .unwrap()
                    .unwrap()
                    .to_bytes()
                    .unwrap()
            })
            .collect();
        (object.to_bytes().unwrap(), records)
    }
}

/// Gateway wrapper whose persist fails after the writer has staged and
/// validated everything.
struct FailingGateway {
    inner: SledGateway,
    fail_persist: AtomicBool,
}

impl PersistenceGateway for FailingGateway {
    fn fetch_localized(
        &self,
        culture_id: CultureId,
        class_id: ClassId,
        params: &Params,
    ) -> Result<Vec<LocalizedRecord>, Error> {
        self.inner.fetch_localized(culture_id, class_id, params)
    }

    fn count(&self, culture_id: CultureId, class_id: ClassId, params: &Params) -> Result<u64, Error> {
        self.inner.count(culture_id, class_id, params)
    }

    fn get_object(&self, id: ObjectId) -> Result<Option<StoredObject>, Error> {
        self.inner.get_object(id)
    }

    fn get_localized_record(
        &self,
        culture_id: CultureId,
        object_id: ObjectId,
    ) -> Result<Option<LocalizedRecord>, Error> {
        self.inner.get_localized_record(culture_id, object_id)
    }

    fn referrers(&self, target: ObjectId) -> Result<Vec<ObjectId>, Error> {
        self.inner.referrers(target)
    }

    fn persist_object(&self, write: &ObjectWrite) -> Result<ObjectId, Error> {
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(Error::Transaction("simulated persistence failure".into()));
        }
        self.inner.persist_object(write)
    }

    fn delete_object(&self, object: &StoredObject, refreshed: &[RecordRefresh]) -> Result<(), Error> {
        self.inner.delete_object(object, refreshed)
    }
}

#[test]
fn test_end_to_end_price_filter() {
    let ctx = TestContext::new();
    let mut writer = ctx.writer();

    writer.begin_create("product").unwrap();
    writer.set_property_value("name", "Widget").unwrap();
    writer.set_property_value("price", "9.99").unwrap();
    let id = writer.commit().unwrap();

    assert!(ctx.fetch_ids("product", "price lt 10").contains(&id));
    assert!(!ctx.fetch_ids("product", "price gt 10").contains(&id));
}

#[test]
fn test_invalid_value_then_retry() {
    let ctx = TestContext::new();
    let mut writer = ctx.writer();

    writer.begin_create("product").unwrap();
    writer.set_property_value("name", "Widget").unwrap();
    let err = writer.set_property_value("price", "abc").unwrap_err();
    assert!(matches!(err, Error::InvalidValue { ref member, .. } if member == "price"));
    assert!(err.is_client_error());

    writer.set_property_value("price", "9.99").unwrap();
    let id = writer.commit().unwrap();

    let record = ctx.gateway.get_localized_record(EN, id).unwrap().unwrap();
    assert_eq!(record.get("price"), Some(&Value::Decimal(9.99)));
}

#[test]
fn test_empty_edit_leaves_object_and_records_unchanged() {
    let ctx = TestContext::new();
    let mut writer = ctx.writer();

    writer.begin_create("vendor").unwrap();
    writer.set_property_value("title", "Acme").unwrap();
    let vendor = writer.commit().unwrap();

    writer.begin_create("product").unwrap();
    writer.set_property_value("name", "Widget").unwrap();
    writer.set_property_value("blurb", "Small and useful").unwrap();
    writer.set_property_value("vendor", vendor.0 as i64).unwrap();
    let id = writer.commit().unwrap();

    for (class, object) in [("vendor", vendor), ("product", id)] {
        let before = ctx.snapshot(object);
        writer.begin_edit(class, object).unwrap();
        assert_eq!(writer.commit().unwrap(), object);
        assert_eq!(ctx.snapshot(object), before);
    }
}

#[test]
fn test_failed_persist_leaves_no_trace() {
    let catalog = shop_schema();
    let gateway = FailingGateway {
        inner: SledGateway::open(&StorageConfig::temporary()).unwrap(),
        fail_persist: AtomicBool::new(false),
    };
    let mut writer = ObjectWriter::new(&catalog, &gateway, EN);

    writer.begin_create("product").unwrap();
    writer.set_property_value("name", "Widget").unwrap();
    writer.set_property_value("price", "9.99").unwrap();
    let id = writer.commit().unwrap();
    let before = gateway.get_localized_record(EN, id).unwrap();

    gateway.fail_persist.store(true, Ordering::SeqCst);

    writer.begin_edit("product", id).unwrap();
    writer.set_property_value("price", "1.00").unwrap();
    writer.set_property_value("name", "Changed").unwrap();
    assert!(matches!(writer.commit(), Err(Error::Transaction(_))));
    assert!(writer.is_staging());
    assert_eq!(writer.committed_id(), None);
    assert_eq!(gateway.get_localized_record(EN, id).unwrap(), before);

    writer.begin_create("product").unwrap();
    writer.set_property_value("name", "Ghost").unwrap();
    assert!(writer.commit().is_err());
    let params = Params::new();
    assert_eq!(gateway.count(EN, ClassId(2), &params).unwrap(), 1);
    assert_eq!(gateway.count(DE, ClassId(2), &params).unwrap(), 1);

    // the open transaction commits once persistence recovers
    gateway.fail_persist.store(false, Ordering::SeqCst);
    writer.commit().unwrap();
    assert_eq!(gateway.count(EN, ClassId(2), &params).unwrap(), 2);
}

#[test]
fn test_round_trip_through_reader() {
    let ctx = TestContext::new();
    let mut writer = ctx.writer();

    writer.begin_create("vendor").unwrap();
    writer.set_property_value("title", "Acme").unwrap();
    let vendor = writer.commit().unwrap();

    writer.begin_create("product").unwrap();
    writer.set_property_value("name", "Widget").unwrap();
    writer.set_property_value("price", 9.99).unwrap();
    writer.set_property_value("blurb", "Small").unwrap();
    writer.set_property_value("active", "true").unwrap();
    writer.set_property_value("released", "2024-01-31").unwrap();
    writer.set_property_value("vendor", vendor.0 as i64).unwrap();
    let id = writer.commit().unwrap();

    let record = ctx.gateway.get_localized_record(EN, id).unwrap().unwrap();
    let view = ObjectReader::new(&ctx.catalog).construct_object(&record).unwrap();

    assert_eq!(view.object_id, id);
    assert_eq!(
        view.codes().collect::<Vec<_>>(),
        vec!["name", "price", "blurb", "active", "released", "vendor"]
    );
    assert_eq!(view.get("name"), Some(&Value::from("Widget")));
    assert_eq!(view.get("price"), Some(&Value::Decimal(9.99)));
    assert_eq!(view.get("blurb"), Some(&Value::from("Small")));
    assert_eq!(view.get("active"), Some(&Value::Boolean(true)));
    assert_eq!(
        view.get("released"),
        Some(&Value::DateTime(1_706_659_200_000_000))
    );
    let vendor_ref = view.get("vendor").and_then(Value::as_relation).unwrap();
    assert_eq!(vendor_ref.id, vendor);
    assert_eq!(vendor_ref.label.as_deref(), Some("Acme"));
}

#[test]
fn test_filter_precedence() {
    let catalog = shop_schema();
    let params = QueryCompiler::new(&catalog)
        .compile(ClassId(3), &RawQuery::new().filter("a eq 1 and b eq 2 or c eq 3"))
        .unwrap();
    assert_eq!(
        params.filtering.unwrap().expression.to_string(),
        "((a eq 1) and (b eq 2)) or (c eq 3)"
    );
}

#[test]
fn test_compile_rejects_bad_input() {
    let catalog = shop_schema();
    let compiler = QueryCompiler::new(&catalog);
    let kind = |raw: RawQuery<'_>| match compiler.compile(ClassId(3), &raw) {
        Err(Error::InvalidQuery(e)) => e.kind,
        other => panic!("expected InvalidQuery, got {:?}", other),
    };

    assert_eq!(kind(RawQuery::new().filter("age gt abc")), QueryErrorKind::InvalidLiteral);
    assert_eq!(kind(RawQuery::new().skip(-1)), QueryErrorKind::NegativePaging);
    assert_eq!(kind(RawQuery::new().take(-1)), QueryErrorKind::NegativePaging);
    assert_eq!(kind(RawQuery::new().filter("(age eq 1")), QueryErrorKind::Syntax);
    assert_eq!(kind(RawQuery::new().filter("age like 1")), QueryErrorKind::Syntax);
}

#[test]
fn test_sorting_and_paging_through_service() {
    let storage_dir = tempfile::tempdir().unwrap();
    let gateway = SledGateway::open(&StorageConfig::new(storage_dir.path())).unwrap();
    let service = ContentService::new(Arc::new(shop_schema()), gateway, None).unwrap();

    for (name, price) in [("B", "5"), ("A", "1.5"), ("D", "20"), ("C", "")] {
        service
            .create("product", [("name", name), ("price", price)])
            .unwrap();
    }

    let request = ListRequest::new().sort("price", "asc").page(1, 2);
    let page = service.list("product", &request).unwrap();
    let names: Vec<&Value> = page.items.iter().filter_map(|v| v.get("name")).collect();
    assert_eq!(names, vec![&Value::from("A"), &Value::from("B")]);
    assert_eq!(page.total, 4);

    let request = ListRequest::new().filter("price eq null");
    let page = service.list("product", &request).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].get("name"), Some(&Value::from("C")));

    let json = serde_json::to_value(&page).unwrap();
    assert_eq!(json["total"], 1);
    assert_eq!(json["filteringQuery"], "price eq null");
    assert_eq!(json["items"][0]["price"], serde_json::Value::Null);
}

#[test]
fn test_relation_label_follows_target() {
    let gateway = SledGateway::open(&StorageConfig::temporary()).unwrap();
    let service = ContentService::new(Arc::new(shop_schema()), gateway, None).unwrap();

    let vendor = service.create("vendor", [("title", "Acme")]).unwrap().object.id;
    let product = service
        .create(
            "product",
            [
                ("name", RawValue::from("Widget")),
                ("vendor", RawValue::from(vendor.0 as i64)),
            ],
        )
        .unwrap()
        .object
        .id;

    service.edit("vendor", vendor, [("title", "Globex")]).unwrap();
    let json = serde_json::to_value(service.get("product", product).unwrap()).unwrap();
    assert_eq!(json["vendor"], serde_json::json!({"id": vendor.0, "label": "Globex"}));

    let listed = service.list("product", &ListRequest::new()).unwrap();
    let json = serde_json::to_value(&listed.items[0]).unwrap();
    assert_eq!(json["vendor"]["label"], "Globex");

    service.delete("vendor", vendor).unwrap();
    let json = serde_json::to_value(service.get_in("de", "product", product).unwrap()).unwrap();
    assert_eq!(json["vendor"], serde_json::json!({"id": vendor.0, "label": null}));
}

#[test]
fn test_raw_json_properties() {
    let gateway = SledGateway::open(&StorageConfig::temporary()).unwrap();
    let service = ContentService::new(Arc::new(shop_schema()), gateway, None).unwrap();

    let body: serde_json::Value =
        serde_json::from_str(r#"{"name": "Lamp", "price": 12, "active": false}"#).unwrap();
    let props: Vec<(String, RawValue)> = body
        .as_object()
        .unwrap()
        .iter()
        .map(|(k, v)| (k.clone(), RawValue::from(v.clone())))
        .collect();
    let event = service.create("product", props).unwrap();

    let view = service.get("product", event.object.id).unwrap();
    assert_eq!(view.get("price"), Some(&Value::Decimal(12.0)));
    assert_eq!(view.get("active"), Some(&Value::Boolean(false)));

    let err = service
        .create("product", [("name", RawValue::from(serde_json::json!({"x": 1})))])
        .unwrap_err();
    assert!(matches!(err, Error::InvalidValue { .. }));
}

#[test]
fn test_concurrent_readers_share_catalog() {
    let catalog = Arc::new(shop_schema());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let catalog = Arc::clone(&catalog);
            thread::spawn(move || {
                let filter = format!("age ge {} and age lt {}", i, i + 10);
                QueryCompiler::new(&catalog)
                    .compile(ClassId(3), &RawQuery::new().filter(&filter))
                    .map(|p| p.filtering.is_some())
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap().unwrap());
    }
}
