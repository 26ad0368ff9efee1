//! Projection of localized records into generic, ordered object views.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use tessera_proto::{ClassId, CultureId, LocalizedRecord, ObjectId, RelationRef, Value};

use crate::catalog::Catalog;
use crate::coerce::format_datetime;
use crate::error::Error;

/// A generic instance: member values in catalog declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectView {
    pub object_id: ObjectId,
    pub class_id: ClassId,
    pub culture_id: CultureId,
    pub properties: Vec<(String, Value)>,
}

impl ObjectView {
    /// Value of a member by code.
    pub fn get(&self, code: &str) -> Option<&Value> {
        self.properties
            .iter()
            .find(|(name, _)| name == code)
            .map(|(_, v)| v)
    }

    /// Member codes in output order.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|(code, _)| code.as_str())
    }
}

/// Serialises as a JSON object: `id` first, then members in order.
impl Serialize for ObjectView {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.properties.len() + 1))?;
        map.serialize_entry("id", &self.object_id)?;
        for (code, value) in &self.properties {
            map.serialize_entry(code, &OutputValue(value))?;
        }
        map.end()
    }
}

/// Output rendering of a value: scalars as JSON scalars, date-times as
/// RFC 3339, relations as `{id, label}`.
struct OutputValue<'a>(&'a Value);

impl Serialize for OutputValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Null => serializer.serialize_none(),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Decimal(d) => serializer.serialize_f64(*d),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::DateTime(micros) => match format_datetime(*micros) {
                Some(text) => serializer.serialize_str(&text),
                None => serializer.serialize_i64(*micros),
            },
            Value::Relation(RelationRef { id, label }) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("id", id)?;
                map.serialize_entry("label", label)?;
                map.end()
            }
        }
    }
}

/// Builds [`ObjectView`]s from localized records.
pub struct ObjectReader<'a> {
    catalog: &'a Catalog,
}

impl<'a> ObjectReader<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self { catalog }
    }

    /// Project a record onto its class's members.
    ///
    /// Members missing from the record read as null; record keys that do not
    /// resolve under the class are dropped. Relations stay one level deep and
    /// carry the label the writer last refreshed.
    pub fn construct_object(&self, record: &LocalizedRecord) -> Result<ObjectView, Error> {
        let class = self.catalog.class(record.class_id)?;
        let properties = self
            .catalog
            .members(class.id)
            .into_iter()
            .map(|member| {
                let value = record.get(&member.code).cloned().unwrap_or(Value::Null);
                (member.code.clone(), value)
            })
            .collect();

        Ok(ObjectView {
            object_id: record.object_id,
            class_id: class.id,
            culture_id: record.culture_id,
            properties,
        })
    }

    /// Project many records, preserving their order.
    pub fn construct_all(&self, records: &[LocalizedRecord]) -> Result<Vec<ObjectView>, Error> {
        records.iter().map(|r| self.construct_object(r)).collect()
    }
}
