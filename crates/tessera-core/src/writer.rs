//! Transactional staging of object creates and edits.
//!
//! ```text
//! Idle --begin_create/begin_edit--> Staging --commit--> Committed
//!   ^                                  |  ^
//!   +------------ abandon -------------+  +-- set_property_value
//! ```
//!
//! Calling `begin_*` from any state discards staged values and starts over.
//! Nothing reaches the gateway before `commit`.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use tessera_proto::{
    ClassId, CultureId, MemberId, ObjectId, PropertyValue, RawValue, RelationRef, StorageKind,
    StoredObject, Value,
};

use crate::catalog::{Catalog, Member};
use crate::coerce;
use crate::error::Error;
use crate::gateway::{CultureValues, ObjectWrite, PersistenceGateway, RecordRefresh};

/// What a committed change did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Edited,
    Deleted,
}

/// Post-commit handoff for an external notifier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub object: StoredObject,
}

#[derive(Debug)]
struct Staging {
    class_id: ClassId,
    class_code: String,
    /// The persisted object for an edit.
    existing: Option<StoredObject>,
    values: BTreeMap<MemberId, Value>,
}

/// An object whose new state has not reached the gateway yet.
#[derive(Debug, Clone, Copy)]
enum Pending<'r> {
    Written {
        id: ObjectId,
        class_id: ClassId,
        records: &'r [CultureValues],
    },
    Deleted(ObjectId),
}

#[derive(Debug)]
enum WriterState {
    Idle,
    Staging(Staging),
    Committed(ObjectId),
}

/// Single-owner staging area for one create or edit at a time.
///
/// Not meant for concurrent use; callers serialize calls on an instance.
pub struct ObjectWriter<'a> {
    catalog: &'a Catalog,
    gateway: &'a dyn PersistenceGateway,
    culture_id: CultureId,
    state: WriterState,
    event: Option<ChangeEvent>,
}

impl<'a> ObjectWriter<'a> {
    /// Create a writer that records localizable text in `culture_id`.
    pub fn new(
        catalog: &'a Catalog,
        gateway: &'a dyn PersistenceGateway,
        culture_id: CultureId,
    ) -> Self {
        Self {
            catalog,
            gateway,
            culture_id,
            state: WriterState::Idle,
            event: None,
        }
    }

    /// Culture localizable text is written in.
    pub fn culture_id(&self) -> CultureId {
        self.culture_id
    }

    /// Whether a transaction is open.
    pub fn is_staging(&self) -> bool {
        matches!(self.state, WriterState::Staging(_))
    }

    /// Id returned by the last successful commit, until the next `begin_*`.
    pub fn committed_id(&self) -> Option<ObjectId> {
        match self.state {
            WriterState::Committed(id) => Some(id),
            _ => None,
        }
    }

    /// Open a transaction creating a new instance of `class_code`.
    pub fn begin_create(&mut self, class_code: &str) -> Result<(), Error> {
        self.state = WriterState::Idle;
        let class = self.catalog.resolve_class(class_code)?;
        self.state = WriterState::Staging(Staging {
            class_id: class.id,
            class_code: class.code.clone(),
            existing: None,
            values: BTreeMap::new(),
        });
        Ok(())
    }

    /// Open a transaction editing an existing object.
    pub fn begin_edit(&mut self, class_code: &str, object_id: ObjectId) -> Result<(), Error> {
        self.state = WriterState::Idle;
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

        self.state = WriterState::Staging(Staging {
            class_id: class.id,
            class_code: class.code.clone(),
            existing: Some(object),
            values: BTreeMap::new(),
        });
        Ok(())
    }

    /// Stage a value. Re-setting a member overwrites it.
    ///
    /// A failure leaves the transaction open and unchanged.
    pub fn set_property_value(
        &mut self,
        member_code: &str,
        raw: impl Into<RawValue>,
    ) -> Result<(), Error> {
        let raw = raw.into();
        let WriterState::Staging(staging) = &self.state else {
            return Err(Error::InvalidState(
                "set_property_value called without an open transaction".into(),
            ));
        };

        let member = self
            .catalog
            .resolve_member(staging.class_id, member_code, true)
            .map_err(|_| Error::InvalidMember {
                class: staging.class_code.clone(),
                member: member_code.to_string(),
            })?;
        let kind = self.catalog.storage_kind(member)?;

        let value = coerce::coerce(kind, &raw).map_err(|e| {
            debug!(
                member = member_code,
                expected = %e.expected,
                literal = %e.literal,
                reason = %e.reason,
                "rejected staged value"
            );
            Error::invalid_value(member_code, e)
        })?;

        if let Value::Relation(target) = &value {
            self.check_relation_target(member, target, &raw)?;
        }

        let member_id = member.id;
        if let WriterState::Staging(staging) = &mut self.state {
            staging.values.insert(member_id, value);
        }
        Ok(())
    }

    /// Validate and persist the transaction atomically.
    ///
    /// Returns the new id for a create, the existing id for an edit. On
    /// failure the transaction stays open.
    pub fn commit(&mut self) -> Result<ObjectId, Error> {
        let WriterState::Staging(staging) = &self.state else {
            return Err(Error::InvalidState(
                "commit called without an open transaction".into(),
            ));
        };

        let event = self.persist(staging)?;
        let id = event.object.id;
        self.state = WriterState::Committed(id);
        self.event = Some(event);
        Ok(id)
    }

    /// Drop the open transaction, if any. Nothing is persisted.
    pub fn abandon(&mut self) {
        self.state = WriterState::Idle;
    }

    /// Delete an object of `class_code`.
    pub fn delete(&mut self, class_code: &str, object_id: ObjectId) -> Result<(), Error> {
        if self.is_staging() {
            return Err(Error::InvalidState(
                "delete called while a transaction is open".into(),
            ));
        }

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

        let refreshed = self.refresh_referrers(object.id, Pending::Deleted(object.id))?;
        self.gateway.delete_object(&object, &refreshed)?;
        info!(
            object_id = %object_id,
            class = %class.code,
            refreshed = refreshed.len(),
            "deleted object"
        );
        self.state = WriterState::Idle;
        self.event = Some(ChangeEvent {
            kind: ChangeKind::Deleted,
            object,
        });
        Ok(())
    }

    /// Take the event produced by the last commit or delete.
    pub fn take_event(&mut self) -> Option<ChangeEvent> {
        self.event.take()
    }

    fn check_relation_target(
        &self,
        member: &Member,
        target: &RelationRef,
        raw: &RawValue,
    ) -> Result<(), Error> {
        let reject = |reason: String| Error::InvalidValue {
            member: member.code.clone(),
            expected: StorageKind::Relation,
            literal: raw.literal(),
            reason,
        };

        let object = self
            .gateway
            .get_object(target.id)?
            .ok_or_else(|| reject(format!("object {} does not exist", target.id)))?;

        if let Some(target_class) = member.relation_class_id {
            if !self.catalog.is_subclass_of(object.class_id, target_class) {
                let expected = self
                    .catalog
                    .class(target_class)
                    .map(|c| c.code.clone())
                    .unwrap_or_else(|_| target_class.to_string());
                return Err(reject(format!(
                    "object {} is not an instance of '{}'",
                    target.id, expected
                )));
            }
        }
        Ok(())
    }

    fn persist(&self, staging: &Staging) -> Result<ChangeEvent, Error> {
        let missing = self.missing_required(staging);
        if !missing.is_empty() {
            return Err(Error::ValidationFailed { members: missing });
        }

        if let Some(existing) = &staging.existing {
            if staging.values.is_empty() {
                debug!(object_id = %existing.id, "edit with nothing staged; no write");
                return Ok(ChangeEvent {
                    kind: ChangeKind::Edited,
                    object: existing.clone(),
                });
            }
        }

        let mut object = staging
            .existing
            .clone()
            .unwrap_or_else(|| StoredObject::new(ObjectId(0), staging.class_id));

        for (member_id, value) in &staging.values {
            let member = self.catalog.member(*member_id)?;
            let property = if self.is_localized(member)? {
                object
                    .property(member.id)
                    .cloned()
                    .unwrap_or(PropertyValue::Localized(Vec::new()))
                    .with_localized_text(self.culture_id, value.as_text().map(str::to_string))
            } else {
                PropertyValue::Plain(value.clone())
            };
            object.set_property(member.id, property);
        }

        let mut records = self.regenerate_records(&object, None)?;
        let mut refreshed = Vec::new();
        if let Some(existing) = &staging.existing {
            // a self reference is labelled from this commit's own records
            if object.relation_targets().contains(&existing.id) {
                let pending = Pending::Written {
                    id: existing.id,
                    class_id: staging.class_id,
                    records: &records,
                };
                records = self.regenerate_records(&object, Some(pending))?;
            }
            let relabelled = self
                .catalog
                .label_member(staging.class_id)
                .is_some_and(|label| staging.values.contains_key(&label.id));
            if relabelled {
                let pending = Pending::Written {
                    id: existing.id,
                    class_id: staging.class_id,
                    records: &records,
                };
                refreshed = self.refresh_referrers(existing.id, pending)?;
            }
        }

        let write = ObjectWrite {
            object_id: staging.existing.as_ref().map(|o| o.id),
            class_id: staging.class_id,
            records,
            properties: object.properties,
            refreshed,
        };
        let id = self.gateway.persist_object(&write)?;
        let (object, _) = write.materialize(id);

        let kind = if staging.existing.is_some() {
            ChangeKind::Edited
        } else {
            ChangeKind::Created
        };
        info!(
            object_id = %id,
            class = %staging.class_code,
            kind = ?kind,
            staged = staging.values.len(),
            refreshed = write.refreshed.len(),
            "committed object"
        );
        Ok(ChangeEvent { kind, object })
    }

    /// Required members without a non-null value after this commit.
    fn missing_required(&self, staging: &Staging) -> Vec<String> {
        self.catalog
            .members(staging.class_id)
            .into_iter()
            .filter(|m| m.required)
            .filter(|m| match staging.values.get(&m.id) {
                Some(value) => value.is_null(),
                None => staging.existing.is_none(),
            })
            .map(|m| m.code.clone())
            .collect()
    }

    fn is_localized(&self, member: &Member) -> Result<bool, Error> {
        Ok(member.localizable && self.catalog.storage_kind(member)? == StorageKind::Text)
    }

    /// Regenerated records of every other object pointing at `target`.
    fn refresh_referrers(
        &self,
        target: ObjectId,
        pending: Pending<'_>,
    ) -> Result<Vec<RecordRefresh>, Error> {
        let mut refreshed = Vec::new();
        for source in self.gateway.referrers(target)? {
            if source == target {
                continue;
            }
            let Some(object) = self.gateway.get_object(source)? else {
                continue;
            };
            refreshed.push(RecordRefresh {
                object_id: source,
                class_id: object.class_id,
                records: self.regenerate_records(&object, Some(pending))?,
            });
        }
        debug!(target = %target, referrers = refreshed.len(), "refreshing relation labels");
        Ok(refreshed)
    }

    /// One flattened record per catalog culture.
    fn regenerate_records(
        &self,
        object: &StoredObject,
        pending: Option<Pending<'_>>,
    ) -> Result<Vec<CultureValues>, Error> {
        let neutral = self.catalog.neutral_culture().id;
        let members = self.catalog.members(object.class_id);

        self.catalog
            .cultures()
            .iter()
            .map(|culture| -> Result<CultureValues, Error> {
                let values = members
                    .iter()
                    .map(|member| -> Result<(String, Value), Error> {
                        let value = match object.property(member.id) {
                            Some(property) => property.resolve(culture.id, neutral),
                            None => Value::Null,
                        };
                        let value = match value {
                            Value::Relation(r) => {
                                Value::Relation(self.label_relation(culture.id, r.id, pending)?)
                            }
                            other => other,
                        };
                        Ok((member.code.clone(), value))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(CultureValues {
                    culture_id: culture.id,
                    values,
                })
            })
            .collect()
    }

    /// Reference with the target's label in `culture_id`.
    ///
    /// A pending target is labelled from its unsaved state.
    fn label_relation(
        &self,
        culture_id: CultureId,
        target: ObjectId,
        pending: Option<Pending<'_>>,
    ) -> Result<RelationRef, Error> {
        match pending {
            Some(Pending::Written {
                id,
                class_id,
                records,
            }) if id == target => {
                let label = records
                    .iter()
                    .find(|r| r.culture_id == culture_id)
                    .and_then(|r| self.label_text(class_id, &r.values));
                return Ok(RelationRef::new(target, label));
            }
            Some(Pending::Deleted(id)) if id == target => {
                return Ok(RelationRef::unresolved(target));
            }
            _ => {}
        }

        let Some(record) = self.gateway.get_localized_record(culture_id, target)? else {
            warn!(
                target = %target,
                culture_id = %culture_id,
                "relation target has no record; storing it unlabelled"
            );
            return Ok(RelationRef::unresolved(target));
        };
        Ok(RelationRef::new(
            target,
            self.label_text(record.class_id, &record.values),
        ))
    }

    fn label_text(&self, class_id: ClassId, values: &[(String, Value)]) -> Option<String> {
        let member = self.catalog.label_member(class_id)?;
        values
            .iter()
            .find(|(code, _)| *code == member.code)
            .and_then(|(_, value)| value.as_text())
            .map(str::to_string)
    }
}
