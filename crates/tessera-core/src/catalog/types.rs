//! Schema definitions.

use serde::{Deserialize, Serialize};
use tessera_proto::{ClassId, CultureId, DataTypeId, MemberId, StorageKind};

/// A primitive representation members coerce to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataType {
    pub id: DataTypeId,
    /// Human-readable name, e.g. `money`.
    pub code: String,
    pub storage_kind: StorageKind,
}

impl DataType {
    pub fn new(id: u64, code: impl Into<String>, storage_kind: StorageKind) -> Self {
        Self {
            id: DataTypeId(id),
            code: code.into(),
            storage_kind,
        }
    }
}

/// A content type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaClass {
    pub id: ClassId,
    pub code: String,
    /// Parent class; members are inherited from every ancestor.
    #[serde(default)]
    pub parent_id: Option<ClassId>,
    /// Member whose value labels references to instances of this class.
    #[serde(default)]
    pub label_member: Option<String>,
}

impl SchemaClass {
    pub fn new(id: u64, code: impl Into<String>) -> Self {
        Self {
            id: ClassId(id),
            code: code.into(),
            parent_id: None,
            label_member: None,
        }
    }

    /// Derive from a parent class.
    pub fn with_parent(mut self, parent: u64) -> Self {
        self.parent_id = Some(ClassId(parent));
        self
    }

    /// Set the labelling member.
    pub fn with_label_member(mut self, code: impl Into<String>) -> Self {
        self.label_member = Some(code.into());
        self
    }
}

/// A typed property slot declared on a class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub class_id: ClassId,
    pub code: String,
    pub data_type_id: DataTypeId,
    #[serde(default)]
    pub required: bool,
    /// Text values are stored per culture. Ignored for other kinds.
    #[serde(default)]
    pub localizable: bool,
    /// Declaration position within the class.
    #[serde(default)]
    pub position: u32,
    /// Target class for relation members.
    #[serde(default)]
    pub relation_class_id: Option<ClassId>,
}

impl Member {
    pub fn new(id: u64, class_id: u64, code: impl Into<String>, data_type_id: u64) -> Self {
        Self {
            id: MemberId(id),
            class_id: ClassId(class_id),
            code: code.into(),
            data_type_id: DataTypeId(data_type_id),
            required: false,
            localizable: false,
            position: 0,
            relation_class_id: None,
        }
    }

    /// Mark as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark as localizable.
    pub fn localizable(mut self) -> Self {
        self.localizable = true;
        self
    }

    /// Set the declaration position.
    pub fn at_position(mut self, position: u32) -> Self {
        self.position = position;
        self
    }

    /// Point a relation member at its target class.
    pub fn relation_to(mut self, class_id: u64) -> Self {
        self.relation_class_id = Some(ClassId(class_id));
        self
    }
}

/// A culture selecting a localized projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Culture {
    pub id: CultureId,
    pub code: String,
    #[serde(default)]
    pub is_neutral: bool,
}

impl Culture {
    pub fn new(id: u64, code: impl Into<String>) -> Self {
        Self {
            id: CultureId(id),
            code: code.into(),
            is_neutral: false,
        }
    }

    /// The culture localized text falls back to.
    pub fn neutral(id: u64, code: impl Into<String>) -> Self {
        Self {
            is_neutral: true,
            ..Self::new(id, code)
        }
    }
}
