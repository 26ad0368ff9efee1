//! Caller-facing content operations.
//!
//! [`ContentService`] wires the catalog, query compiler, reader and writer
//! to a persistence gateway. Transport and routing are left to the caller;
//! errors expose [`Error::status_code`] for mapping onto HTTP.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use tessera_proto::{CultureId, ObjectId, RawValue};

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::error::Error;
use crate::gateway::{PersistenceGateway, SledGateway};
use crate::query::{QueryCompiler, RawQuery};
use crate::reader::{ObjectReader, ObjectView};
use crate::writer::{ChangeEvent, ObjectWriter};

/// List query parameters as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListRequest {
    pub filtering_query: Option<String>,
    pub sorting_member_code: Option<String>,
    pub sorting_direction: Option<String>,
    pub paging_skip: Option<i64>,
    pub paging_take: Option<i64>,
}

impl ListRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, query: impl Into<String>) -> Self {
        self.filtering_query = Some(query.into());
        self
    }

    pub fn sort(mut self, member: impl Into<String>, direction: impl Into<String>) -> Self {
        self.sorting_member_code = Some(member.into());
        self.sorting_direction = Some(direction.into());
        self
    }

    pub fn page(mut self, skip: i64, take: i64) -> Self {
        self.paging_skip = Some(skip);
        self.paging_take = Some(take);
        self
    }

    fn as_raw_query(&self) -> RawQuery<'_> {
        RawQuery {
            filter: self.filtering_query.as_deref(),
            sort_member: self.sorting_member_code.as_deref(),
            sort_direction: self.sorting_direction.as_deref(),
            skip: self.paging_skip,
            take: self.paging_take,
        }
    }
}

/// A page of objects plus the request echoed back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    pub filtering_query: Option<String>,
    pub sorting_member_code: Option<String>,
    pub sorting_direction: Option<String>,
    pub paging_skip: Option<i64>,
    pub paging_take: Option<i64>,
    /// Matches across all pages.
    pub total: u64,
    pub items: Vec<ObjectView>,
}

/// Query, read and mutate content instances.
pub struct ContentService<G> {
    catalog: Arc<Catalog>,
    gateway: G,
    default_culture: CultureId,
}

impl ContentService<SledGateway> {
    /// Open a sled-backed service from configuration.
    pub fn open(catalog: Arc<Catalog>, config: &EngineConfig) -> Result<Self, Error> {
        let gateway = SledGateway::open(&config.storage)?;
        Self::new(catalog, gateway, config.default_culture.as_deref())
    }
}

impl<G: PersistenceGateway> ContentService<G> {
    /// Create a service. `default_culture` of `None` selects the neutral
    /// culture.
    pub fn new(
        catalog: Arc<Catalog>,
        gateway: G,
        default_culture: Option<&str>,
    ) -> Result<Self, Error> {
        let default_culture = match default_culture {
            Some(code) => catalog
                .resolve_culture(code)
                .map_err(|_| Error::Config(format!("unknown default culture '{}'", code)))?
                .id,
            None => catalog.neutral_culture().id,
        };

        Ok(Self {
            catalog,
            gateway,
            default_culture,
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Culture used for reads and writes unless overridden.
    pub fn default_culture(&self) -> CultureId {
        self.default_culture
    }

    /// A writer bound to the default culture.
    pub fn writer(&self) -> ObjectWriter<'_> {
        ObjectWriter::new(&self.catalog, &self.gateway, self.default_culture)
    }

    /// A writer bound to `culture_code`.
    pub fn writer_in(&self, culture_code: &str) -> Result<ObjectWriter<'_>, Error> {
        let culture = self.catalog.resolve_culture(culture_code)?.id;
        Ok(ObjectWriter::new(&self.catalog, &self.gateway, culture))
    }

    /// List instances of a class in the default culture.
    pub fn list(&self, class_code: &str, request: &ListRequest) -> Result<ListResponse, Error> {
        self.list_for(self.default_culture, class_code, request)
    }

    /// List instances of a class in `culture_code`.
    pub fn list_in(
        &self,
        culture_code: &str,
        class_code: &str,
        request: &ListRequest,
    ) -> Result<ListResponse, Error> {
        let culture = self.catalog.resolve_culture(culture_code)?.id;
        self.list_for(culture, class_code, request)
    }

    fn list_for(
        &self,
        culture_id: CultureId,
        class_code: &str,
        request: &ListRequest,
    ) -> Result<ListResponse, Error> {
        let class = self.catalog.resolve_class(class_code)?;
        let params = QueryCompiler::new(&self.catalog).compile(class.id, &request.as_raw_query())?;

        let records = self.gateway.fetch_localized(culture_id, class.id, &params)?;
        let total = self.gateway.count(culture_id, class.id, &params)?;
        let items = ObjectReader::new(&self.catalog).construct_all(&records)?;

        debug!(class = class_code, total, returned = items.len(), "listed objects");

        Ok(ListResponse {
            filtering_query: request.filtering_query.clone(),
            sorting_member_code: request.sorting_member_code.clone(),
            sorting_direction: request.sorting_direction.clone(),
            paging_skip: request.paging_skip,
            paging_take: request.paging_take,
            total,
            items,
        })
    }

    /// Read one instance in the default culture.
    pub fn get(&self, class_code: &str, object_id: ObjectId) -> Result<ObjectView, Error> {
        self.get_for(self.default_culture, class_code, object_id)
    }

    /// Read one instance in `culture_code`.
    pub fn get_in(
        &self,
        culture_code: &str,
        class_code: &str,
        object_id: ObjectId,
    ) -> Result<ObjectView, Error> {
        let culture = self.catalog.resolve_culture(culture_code)?.id;
        self.get_for(culture, class_code, object_id)
    }

    fn get_for(
        &self,
        culture_id: CultureId,
        class_code: &str,
        object_id: ObjectId,
    ) -> Result<ObjectView, Error> {
        let class = self.catalog.resolve_class(class_code)?;
        let object = self
            .gateway
            .get_object(object_id)?
            .ok_or_else(|| Error::not_found("object", object_id))?;
        if object.class_id != class.id {
            return Err(Error::ClassMismatch {
                object_id,
                expected: class.code.clone(),
                actual: object.class_id,
            });
        }

        let record = self
            .gateway
            .get_localized_record(culture_id, object_id)?
            .ok_or_else(|| Error::not_found("record", object_id))?;
        ObjectReader::new(&self.catalog).construct_object(&record)
    }

    /// Create an instance from a flat property map.
    pub fn create<I, K, V>(&self, class_code: &str, properties: I) -> Result<ChangeEvent, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<RawValue>,
    {
        let mut writer = self.writer();
        writer.begin_create(class_code)?;
        Self::stage_and_commit(&mut writer, properties)
    }

    /// Edit an instance from a flat property map. Members not given keep
    /// their values.
    pub fn edit<I, K, V>(
        &self,
        class_code: &str,
        object_id: ObjectId,
        properties: I,
    ) -> Result<ChangeEvent, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<RawValue>,
    {
        let mut writer = self.writer();
        writer.begin_edit(class_code, object_id)?;
        Self::stage_and_commit(&mut writer, properties)
    }

    /// Delete an instance.
    pub fn delete(&self, class_code: &str, object_id: ObjectId) -> Result<ChangeEvent, Error> {
        let mut writer = self.writer();
        writer.delete(class_code, object_id)?;
        writer
            .take_event()
            .ok_or_else(|| Error::InvalidState("delete produced no event".into()))
    }

    fn stage_and_commit<I, K, V>(
        writer: &mut ObjectWriter<'_>,
        properties: I,
    ) -> Result<ChangeEvent, Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<RawValue>,
    {
        for (code, value) in properties {
            writer.set_property_value(code.as_ref(), value)?;
        }
        writer.commit()?;
        writer
            .take_event()
            .ok_or_else(|| Error::InvalidState("commit produced no event".into()))
    }
}
