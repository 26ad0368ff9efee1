//! Immutable catalog built from a schema bundle.

use std::collections::{HashMap, HashSet};

use tessera_proto::{ClassId, CultureId, DataTypeId, MemberId, StorageKind};

use super::{Culture, DataType, Member, SchemaBundle, SchemaClass};
use crate::error::Error;

/// Object views serialise the object id under this key.
const RESERVED_MEMBER_CODE: &str = "id";

/// Read-only lookup of class, member, data type and culture metadata.
///
/// All lookups are pure; the catalog is `Send + Sync` and can be shared
/// behind an `Arc` by any number of readers.
#[derive(Debug, Clone)]
pub struct Catalog {
    data_types: HashMap<DataTypeId, DataType>,
    classes: HashMap<ClassId, SchemaClass>,
    class_codes: HashMap<String, ClassId>,
    members: HashMap<MemberId, Member>,
    /// Own and inherited members per class, root ancestor first.
    resolved: HashMap<ClassId, Vec<MemberId>>,
    /// Resolvable member codes per class.
    member_codes: HashMap<ClassId, HashMap<String, MemberId>>,
    cultures: Vec<Culture>,
    neutral: usize,
}

impl Catalog {
    /// Build and validate a catalog.
    pub fn new(bundle: SchemaBundle) -> Result<Self, Error> {
        let mut data_types = HashMap::new();
        for data_type in bundle.data_types {
            let id = data_type.id;
            if data_types.insert(id, data_type).is_some() {
                return Err(invalid(format!("duplicate data type id {}", id)));
            }
        }

        let mut classes = HashMap::new();
        let mut class_codes = HashMap::new();
        for class in bundle.classes {
            if class_codes.insert(class.code.clone(), class.id).is_some() {
                return Err(invalid(format!("duplicate class code '{}'", class.code)));
            }
            let id = class.id;
            if classes.insert(id, class).is_some() {
                return Err(invalid(format!("duplicate class id {}", id)));
            }
        }

        for class in classes.values() {
            if let Some(parent) = class.parent_id {
                if !classes.contains_key(&parent) {
                    return Err(invalid(format!(
                        "class '{}' derives from unknown class {}",
                        class.code, parent
                    )));
                }
            }
            check_acyclic(&classes, class)?;
        }

        let mut members = HashMap::new();
        let mut own: HashMap<ClassId, Vec<MemberId>> = HashMap::new();
        for member in bundle.members {
            let Some(class) = classes.get(&member.class_id) else {
                return Err(invalid(format!(
                    "member '{}' declared on unknown class {}",
                    member.code, member.class_id
                )));
            };
            if member.code == RESERVED_MEMBER_CODE {
                return Err(invalid(format!(
                    "member code '{}' on class '{}' is reserved for the object id",
                    member.code, class.code
                )));
            }
            if !tessera_lang::is_identifier(&member.code) {
                return Err(invalid(format!(
                    "member code '{}' on class '{}' cannot be named in a filter",
                    member.code, class.code
                )));
            }
            let Some(data_type) = data_types.get(&member.data_type_id) else {
                return Err(invalid(format!(
                    "member '{}.{}' has unknown data type {}",
                    class.code, member.code, member.data_type_id
                )));
            };
            if data_type.storage_kind == StorageKind::Relation {
                match member.relation_class_id {
                    Some(target) if classes.contains_key(&target) => {}
                    Some(target) => {
                        return Err(invalid(format!(
                            "relation '{}.{}' targets unknown class {}",
                            class.code, member.code, target
                        )))
                    }
                    None => {
                        return Err(invalid(format!(
                            "relation '{}.{}' has no target class",
                            class.code, member.code
                        )))
                    }
                }
            }

            own.entry(member.class_id).or_default().push(member.id);
            let id = member.id;
            if members.insert(id, member).is_some() {
                return Err(invalid(format!("duplicate member id {}", id)));
            }
        }

        for ids in own.values_mut() {
            ids.sort_by_key(|id| (members[id].position, *id));
        }

        let mut resolved = HashMap::new();
        let mut member_codes = HashMap::new();
        for class in classes.values() {
            let mut ids = Vec::new();
            let mut codes = HashMap::new();
            for ancestor in lineage(&classes, class.id) {
                for id in own.get(&ancestor).into_iter().flatten() {
                    let code = members[id].code.clone();
                    if codes.insert(code, *id).is_some() {
                        return Err(invalid(format!(
                            "member code '{}' is declared twice for class '{}'",
                            members[id].code, class.code
                        )));
                    }
                    ids.push(*id);
                }
            }
            if let Some(label) = &class.label_member {
                if !codes.contains_key(label) {
                    return Err(invalid(format!(
                        "label member '{}' does not resolve under class '{}'",
                        label, class.code
                    )));
                }
            }
            resolved.insert(class.id, ids);
            member_codes.insert(class.id, codes);
        }

        let mut seen_ids = HashSet::new();
        let mut seen_codes = HashSet::new();
        for culture in &bundle.cultures {
            if !seen_ids.insert(culture.id) || !seen_codes.insert(culture.code.as_str()) {
                return Err(invalid(format!("duplicate culture '{}'", culture.code)));
            }
        }
        let neutrals: Vec<usize> = bundle
            .cultures
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_neutral)
            .map(|(i, _)| i)
            .collect();
        let [neutral] = neutrals.as_slice() else {
            return Err(invalid(format!(
                "expected exactly one neutral culture, found {}",
                neutrals.len()
            )));
        };

        Ok(Self {
            data_types,
            classes,
            class_codes,
            members,
            resolved,
            member_codes,
            neutral: *neutral,
            cultures: bundle.cultures,
        })
    }

    /// Resolve a class by code.
    pub fn resolve_class(&self, code: &str) -> Result<&SchemaClass, Error> {
        self.class_codes
            .get(code)
            .and_then(|id| self.classes.get(id))
            .ok_or_else(|| Error::not_found("class", code))
    }

    /// Get a class by id.
    pub fn class(&self, id: ClassId) -> Result<&SchemaClass, Error> {
        self.classes
            .get(&id)
            .ok_or_else(|| Error::not_found("class", id))
    }

    /// Resolve a member code under a class.
    pub fn resolve_member(
        &self,
        class_id: ClassId,
        code: &str,
        include_inherited: bool,
    ) -> Result<&Member, Error> {
        let not_found = || Error::not_found("member", code);
        let id = self
            .member_codes
            .get(&class_id)
            .and_then(|codes| codes.get(code))
            .ok_or_else(not_found)?;
        let member = &self.members[id];
        if !include_inherited && member.class_id != class_id {
            return Err(not_found());
        }
        Ok(member)
    }

    /// Get a member by id.
    pub fn member(&self, id: MemberId) -> Result<&Member, Error> {
        self.members
            .get(&id)
            .ok_or_else(|| Error::not_found("member", id))
    }

    /// Get a data type by id.
    pub fn resolve_data_type(&self, id: DataTypeId) -> Result<&DataType, Error> {
        self.data_types
            .get(&id)
            .ok_or_else(|| Error::not_found("data type", id))
    }

    /// Storage kind of a member.
    pub fn storage_kind(&self, member: &Member) -> Result<StorageKind, Error> {
        self.resolve_data_type(member.data_type_id)
            .map(|dt| dt.storage_kind)
    }

    /// Own and inherited members of a class, in declaration order.
    ///
    /// Root ancestor members come first; within a class members are ordered
    /// by position.
    pub fn members(&self, class_id: ClassId) -> Vec<&Member> {
        self.resolved
            .get(&class_id)
            .map(|ids| ids.iter().map(|id| &self.members[id]).collect())
            .unwrap_or_default()
    }

    /// Whether `class_id` is `ancestor` or derives from it.
    pub fn is_subclass_of(&self, class_id: ClassId, ancestor: ClassId) -> bool {
        lineage(&self.classes, class_id).contains(&ancestor)
    }

    /// Member whose value labels references to this class.
    ///
    /// Falls back to the first text member in declaration order.
    pub fn label_member(&self, class_id: ClassId) -> Option<&Member> {
        let class = self.classes.get(&class_id)?;
        if let Some(code) = &class.label_member {
            return self.resolve_member(class_id, code, true).ok();
        }
        self.members(class_id)
            .into_iter()
            .find(|m| matches!(self.storage_kind(m), Ok(StorageKind::Text)))
    }

    /// Resolve a culture by code.
    pub fn resolve_culture(&self, code: &str) -> Result<&Culture, Error> {
        self.cultures
            .iter()
            .find(|c| c.code == code)
            .ok_or_else(|| Error::not_found("culture", code))
    }

    /// Get a culture by id.
    pub fn culture(&self, id: CultureId) -> Result<&Culture, Error> {
        self.cultures
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| Error::not_found("culture", id))
    }

    /// The culture localized text falls back to.
    pub fn neutral_culture(&self) -> &Culture {
        &self.cultures[self.neutral]
    }

    /// All cultures, in bundle order.
    pub fn cultures(&self) -> &[Culture] {
        &self.cultures
    }

    /// Number of classes.
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }
}

fn invalid(message: String) -> Error {
    Error::InvalidSchema(message)
}

fn check_acyclic(classes: &HashMap<ClassId, SchemaClass>, class: &SchemaClass) -> Result<(), Error> {
    let mut seen = HashSet::from([class.id]);
    let mut current = class.parent_id;
    while let Some(id) = current {
        if !seen.insert(id) {
            return Err(invalid(format!(
                "class '{}' is part of an inheritance cycle",
                class.code
            )));
        }
        current = classes.get(&id).and_then(|c| c.parent_id);
    }
    Ok(())
}

/// Ancestors of a class, root first, ending with the class itself.
fn lineage(classes: &HashMap<ClassId, SchemaClass>, class_id: ClassId) -> Vec<ClassId> {
    let mut chain = Vec::new();
    let mut current = Some(class_id);
    while let Some(id) = current {
        if chain.contains(&id) {
            break;
        }
        chain.push(id);
        current = classes.get(&id).and_then(|c| c.parent_id);
    }
    chain.reverse();
    chain
}
