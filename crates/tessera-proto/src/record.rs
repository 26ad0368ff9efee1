//! Stored objects and their localized records.

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::error::Error;
use crate::id::{ClassId, CultureId, MemberId, ObjectId};
use crate::value::Value;

/// Locale-independent identity and authored state of one instance.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct StoredObject {
    /// Object identifier.
    pub id: ObjectId,
    /// Class the object is an instance of.
    pub class_id: ClassId,
    /// Persisted member values, keyed by member id.
    pub properties: Vec<Property>,
}

/// A persisted value of one member.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct Property {
    /// The member this value belongs to.
    pub member_id: MemberId,
    /// The value.
    pub value: PropertyValue,
}

/// A member value, either culture-independent or per culture.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub enum PropertyValue {
    /// Same value in every culture.
    Plain(Value),
    /// Text localized per culture.
    Localized(Vec<LocalizedText>),
}

/// Text for one culture.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct LocalizedText {
    /// Culture of the text.
    pub culture_id: CultureId,
    /// The text.
    pub text: String,
}

impl StoredObject {
    /// Create an object with no properties.
    pub fn new(id: ObjectId, class_id: ClassId) -> Self {
        Self {
            id,
            class_id,
            properties: Vec::new(),
        }
    }

    /// Get the persisted value of a member.
    pub fn property(&self, member_id: MemberId) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|p| p.member_id == member_id)
            .map(|p| &p.value)
    }

    /// Insert or replace the value of a member.
    pub fn set_property(&mut self, member_id: MemberId, value: PropertyValue) {
        match self.properties.iter_mut().find(|p| p.member_id == member_id) {
            Some(existing) => existing.value = value,
            None => self.properties.push(Property { member_id, value }),
        }
    }

    /// Distinct objects this object points to through relation members.
    pub fn relation_targets(&self) -> Vec<ObjectId> {
        let mut targets: Vec<ObjectId> = self
            .properties
            .iter()
            .filter_map(|p| match &p.value {
                PropertyValue::Plain(Value::Relation(r)) => Some(r.id),
                _ => None,
            })
            .collect();
        targets.sort();
        targets.dedup();
        targets
    }

    /// Serialize the object to bytes using rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize an object from bytes using rkyv.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

impl PropertyValue {
    /// Resolve the value for a culture, falling back to the neutral culture.
    pub fn resolve(&self, culture_id: CultureId, neutral_id: CultureId) -> Value {
        match self {
            PropertyValue::Plain(value) => value.clone(),
            PropertyValue::Localized(texts) => texts
                .iter()
                .find(|t| t.culture_id == culture_id)
                .or_else(|| texts.iter().find(|t| t.culture_id == neutral_id))
                .map(|t| Value::Text(t.text.clone()))
                .unwrap_or(Value::Null),
        }
    }

    /// Set the text for one culture, keeping the others.
    pub fn with_localized_text(self, culture_id: CultureId, text: Option<String>) -> Self {
        let mut texts = match self {
            PropertyValue::Localized(texts) => texts,
            PropertyValue::Plain(_) => Vec::new(),
        };
        texts.retain(|t| t.culture_id != culture_id);
        if let Some(text) = text {
            texts.push(LocalizedText { culture_id, text });
            texts.sort_by_key(|t| t.culture_id);
        }
        PropertyValue::Localized(texts)
    }
}

/// Denormalized, per-culture flattening of one object, used for querying.
///
/// Values are kept in member declaration order.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct LocalizedRecord {
    /// Culture of this projection.
    pub culture_id: CultureId,
    /// Owning object.
    pub object_id: ObjectId,
    /// Class of the owning object.
    pub class_id: ClassId,
    /// Resolved values keyed by member code.
    pub values: Vec<(String, Value)>,
}

impl LocalizedRecord {
    /// Create an empty record.
    pub fn new(culture_id: CultureId, object_id: ObjectId, class_id: ClassId) -> Self {
        Self {
            culture_id,
            object_id,
            class_id,
            values: Vec::new(),
        }
    }

    /// Append a value.
    pub fn with_value(mut self, code: impl Into<String>, value: Value) -> Self {
        self.values.push((code.into(), value));
        self
    }

    /// Get a value by member code.
    pub fn get(&self, code: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name == code)
            .map(|(_, v)| v)
    }

    /// Serialize the record to bytes using rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a record from bytes using rkyv.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::RelationRef;

    #[test]
    fn test_record_roundtrip() {
        let record = LocalizedRecord::new(CultureId(1), ObjectId(10), ClassId(2))
            .with_value("name", Value::from("Widget"))
            .with_value("price", Value::Decimal(9.99))
            .with_value(
                "vendor",
                Value::Relation(RelationRef::new(ObjectId(3), Some("Acme".into()))),
            );

        let bytes = record.to_bytes().unwrap();
        let decoded = LocalizedRecord::from_bytes(&bytes).unwrap();
        assert_eq!(record, decoded);
        assert_eq!(decoded.get("price"), Some(&Value::Decimal(9.99)));
        assert_eq!(decoded.get("missing"), None);
    }

    #[test]
    fn test_set_property_overwrites() {
        let mut object = StoredObject::new(ObjectId(1), ClassId(1));
        object.set_property(MemberId(5), PropertyValue::Plain(Value::Integer(1)));
        object.set_property(MemberId(5), PropertyValue::Plain(Value::Integer(2)));

        assert_eq!(object.properties.len(), 1);
        assert_eq!(
            object.property(MemberId(5)),
            Some(&PropertyValue::Plain(Value::Integer(2)))
        );
    }

    #[test]
    fn test_relation_targets_are_distinct() {
        let link = |id| PropertyValue::Plain(Value::Relation(RelationRef::unresolved(ObjectId(id))));
        let mut object = StoredObject::new(ObjectId(1), ClassId(1));
        object.set_property(MemberId(1), link(7));
        object.set_property(MemberId(2), PropertyValue::Plain(Value::Integer(7)));
        object.set_property(MemberId(3), link(3));
        object.set_property(MemberId(4), link(7));
        object.set_property(MemberId(5), PropertyValue::Plain(Value::Null));

        assert_eq!(object.relation_targets(), vec![ObjectId(3), ObjectId(7)]);
        assert!(StoredObject::new(ObjectId(2), ClassId(1)).relation_targets().is_empty());
    }

    #[test]
    fn test_localized_fallback_to_neutral() {
        let value = PropertyValue::Plain(Value::Null)
            .with_localized_text(CultureId(1), Some("Hello".into()))
            .with_localized_text(CultureId(2), Some("Hallo".into()));

        assert_eq!(value.resolve(CultureId(2), CultureId(1)), Value::from("Hallo"));
        assert_eq!(value.resolve(CultureId(3), CultureId(1)), Value::from("Hello"));

        let cleared = value.with_localized_text(CultureId(1), None);
        assert_eq!(cleared.resolve(CultureId(3), CultureId(1)), Value::Null);
    }
}
