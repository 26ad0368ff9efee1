//! Schema bundle - serialisable description of the whole schema.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{Culture, DataType, Member, SchemaClass};
use crate::error::Error;

/// Everything the catalog is built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaBundle {
    #[serde(default)]
    pub data_types: Vec<DataType>,
    #[serde(default)]
    pub classes: Vec<SchemaClass>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub cultures: Vec<Culture>,
}

impl SchemaBundle {
    /// Create an empty schema bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a data type to the schema.
    pub fn with_data_type(mut self, data_type: DataType) -> Self {
        self.data_types.push(data_type);
        self
    }

    /// Add a class to the schema.
    pub fn with_class(mut self, class: SchemaClass) -> Self {
        self.classes.push(class);
        self
    }

    /// Add a member to the schema.
    pub fn with_member(mut self, member: Member) -> Self {
        self.members.push(member);
        self
    }

    /// Add a culture to the schema.
    pub fn with_culture(mut self, culture: Culture) -> Self {
        self.cultures.push(culture);
        self
    }

    /// Parse a bundle from JSON.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Load a bundle from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&text)
    }

    /// Serialize the bundle to pretty JSON.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_proto::StorageKind;

    #[test]
    fn test_bundle_json_roundtrip() {
        let bundle = SchemaBundle::new()
            .with_data_type(DataType::new(1, "string", StorageKind::Text))
            .with_class(SchemaClass::new(1, "page").with_label_member("title"))
            .with_member(Member::new(1, 1, "title", 1).required().localizable())
            .with_culture(Culture::neutral(1, "en"));

        let json = bundle.to_json().unwrap();
        assert_eq!(SchemaBundle::from_json(&json).unwrap(), bundle);
    }

    #[test]
    fn test_optional_fields_default() {
        let json = r#"{
            "data_types": [{"id": 1, "code": "string", "storage_kind": "text"}],
            "classes": [{"id": 1, "code": "page"}],
            "members": [{"id": 1, "class_id": 1, "code": "title", "data_type_id": 1}],
            "cultures": [{"id": 1, "code": "en", "is_neutral": true}]
        }"#;
        let bundle = SchemaBundle::from_json(json).unwrap();
        assert_eq!(bundle.classes[0].parent_id, None);
        assert!(!bundle.members[0].required);
        assert_eq!(bundle.members[0].position, 0);
    }
}
