use std::fmt;

use crate::core::Value;
use crate::mapping::{AggregatePath, Record, RelationalPersistentEntity};

/// Identifies an entity-carrying action within one aggregate change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(usize);

impl ActionId {
    pub fn new(value: usize) -> Self {
        Self(value)
    }

    pub fn value(&self) -> usize {
        self.0
    }

    pub(crate) fn offset(self, by: usize) -> Self {
        Self(self.0 + by)
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where the id of an inserted row comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdValueSource {
    /// The database generates it; the id property is null or zero.
    Generated,
    /// The record carries it.
    Provided,
    /// The entity has no id property.
    None,
}

impl IdValueSource {
    pub fn for_record(entity: &RelationalPersistentEntity, record: &Record) -> Self {
        let Some(id) = entity.id_property() else {
            return Self::None;
        };
        match record.value(id.name()) {
            Value::Null => Self::Generated,
            Value::Integer(0) if !id.is_nullable() => Self::Generated,
            _ => Self::Provided,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertRoot {
    pub id: ActionId,
    pub entity_type: String,
    pub entity: Record,
    pub id_value_source: IdValueSource,
}

/// Insert of a non-root entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub id: ActionId,
    pub entity: Record,
    pub path: AggregatePath,
    /// The action writing the row this one references.
    pub depending_on: ActionId,
    /// List indexes and map keys from this path up to the nearest ancestor
    /// with an id, outermost first.
    pub qualifiers: Vec<(AggregatePath, Value)>,
    pub id_value_source: IdValueSource,
}

impl Insert {
    /// The qualifier of this element within its own collection.
    pub fn qualifier(&self) -> Option<&Value> {
        self.qualifiers
            .iter()
            .find(|(path, _)| *path == self.path)
            .map(|(_, value)| value)
    }

    pub fn entity_type(&self) -> &str {
        self.path
            .leaf_entity()
            .map(|e| e.type_name())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRoot {
    pub id: ActionId,
    pub entity_type: String,
    pub entity: Record,
    pub previous_version: Option<Value>,
}

/// Update of a non-root entity with an id of its own.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub id: ActionId,
    pub entity: Record,
    pub path: AggregatePath,
}

/// Deletes the rows behind `path` that belong to one root.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub root_id: Value,
    pub path: AggregatePath,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRoot {
    pub entity_type: String,
    pub id: Value,
    pub previous_version: Option<Value>,
}

/// Deletes every row behind `path`, whatever root it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteAll {
    pub path: AggregatePath,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteAllRoot {
    pub entity_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcquireLockRoot {
    pub entity_type: String,
    pub id: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcquireLockAllRoot {
    pub entity_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchInsertRoot {
    pub entity_type: String,
    pub id_value_source: IdValueSource,
    pub actions: Vec<InsertRoot>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchInsert {
    pub path: AggregatePath,
    pub id_value_source: IdValueSource,
    pub actions: Vec<Insert>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchDelete {
    pub path: AggregatePath,
    pub root_ids: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchDeleteRoot {
    pub entity_type: String,
    pub ids: Vec<Value>,
}

/// A single step of an aggregate change.
#[derive(Debug, Clone, PartialEq)]
pub enum DbAction {
    InsertRoot(InsertRoot),
    Insert(Insert),
    UpdateRoot(UpdateRoot),
    Update(Update),
    Delete(Delete),
    DeleteAll(DeleteAll),
    DeleteRoot(DeleteRoot),
    DeleteAllRoot(DeleteAllRoot),
    AcquireLockRoot(AcquireLockRoot),
    AcquireLockAllRoot(AcquireLockAllRoot),
    BatchInsertRoot(BatchInsertRoot),
    BatchInsert(BatchInsert),
    BatchDelete(BatchDelete),
    BatchDeleteRoot(BatchDeleteRoot),
}

impl DbAction {
    /// Id of an action writing a single entity.
    pub fn action_id(&self) -> Option<ActionId> {
        match self {
            Self::InsertRoot(a) => Some(a.id),
            Self::Insert(a) => Some(a.id),
            Self::UpdateRoot(a) => Some(a.id),
            Self::Update(a) => Some(a.id),
            _ => None,
        }
    }

    pub fn entity(&self) -> Option<&Record> {
        match self {
            Self::InsertRoot(a) => Some(&a.entity),
            Self::Insert(a) => Some(&a.entity),
            Self::UpdateRoot(a) => Some(&a.entity),
            Self::Update(a) => Some(&a.entity),
            _ => None,
        }
    }

    pub fn is_root_action(&self) -> bool {
        matches!(self, Self::InsertRoot(_) | Self::UpdateRoot(_))
    }

    /// Renumbers every action id so that ids from several changes stay unique.
    pub(crate) fn shift_ids(&mut self, by: usize) {
        match self {
            Self::InsertRoot(a) => a.id = a.id.offset(by),
            Self::Insert(a) => {
                a.id = a.id.offset(by);
                a.depending_on = a.depending_on.offset(by);
            }
            Self::UpdateRoot(a) => a.id = a.id.offset(by),
            Self::Update(a) => a.id = a.id.offset(by),
            Self::BatchInsertRoot(batch) => {
                for a in &mut batch.actions {
                    a.id = a.id.offset(by);
                }
            }
            Self::BatchInsert(batch) => {
                for a in &mut batch.actions {
                    a.id = a.id.offset(by);
                    a.depending_on = a.depending_on.offset(by);
                }
            }
            Self::Delete(_)
            | Self::DeleteAll(_)
            | Self::DeleteRoot(_)
            | Self::DeleteAllRoot(_)
            | Self::AcquireLockRoot(_)
            | Self::AcquireLockAllRoot(_)
            | Self::BatchDelete(_)
            | Self::BatchDeleteRoot(_) => {}
        }
    }
}

fn qualifier_suffix(qualifiers: &[(AggregatePath, Value)]) -> String {
    qualifiers
        .iter()
        .map(|(_, value)| format!("[{}]", value))
        .collect()
}

impl fmt::Display for DbAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsertRoot(a) => write!(f, "InsertRoot({} {})", a.entity_type, a.id),
            Self::Insert(a) => write!(
                f,
                "Insert({}{} {} depending on {})",
                a.path,
                qualifier_suffix(&a.qualifiers),
                a.id,
                a.depending_on
            ),
            Self::UpdateRoot(a) => write!(f, "UpdateRoot({} {})", a.entity_type, a.id),
            Self::Update(a) => write!(f, "Update({} {})", a.path, a.id),
            Self::Delete(a) => write!(f, "Delete({} of root {})", a.path, a.root_id),
            Self::DeleteAll(a) => write!(f, "DeleteAll({})", a.path),
            Self::DeleteRoot(a) => write!(f, "DeleteRoot({} {})", a.entity_type, a.id),
            Self::DeleteAllRoot(a) => write!(f, "DeleteAllRoot({})", a.entity_type),
            Self::AcquireLockRoot(a) => write!(f, "AcquireLockRoot({} {})", a.entity_type, a.id),
            Self::AcquireLockAllRoot(a) => write!(f, "AcquireLockAllRoot({})", a.entity_type),
            Self::BatchInsertRoot(a) => {
                write!(f, "BatchInsertRoot({} x{})", a.entity_type, a.actions.len())
            }
            Self::BatchInsert(a) => write!(f, "BatchInsert({} x{})", a.path, a.actions.len()),
            Self::BatchDelete(a) => write!(f, "BatchDelete({} x{})", a.path, a.root_ids.len()),
            Self::BatchDeleteRoot(a) => {
                write!(f, "BatchDeleteRoot({} x{})", a.entity_type, a.ids.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::mapping::{EntityDescriptor, PropertyDescriptor, RelationalMappingContext, TypeInfo};

    fn context() -> RelationalMappingContext {
        RelationalMappingContext::builder()
            .descriptor(
                EntityDescriptor::new("Counter").property(
                    PropertyDescriptor::new("id", TypeInfo::simple(DataType::Integer)).id(),
                ),
            )
            .descriptor(
                EntityDescriptor::new("Tag").property(PropertyDescriptor::new(
                    "label",
                    TypeInfo::simple(DataType::Text),
                )),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_id_value_source() {
        let context = context();
        let counter = context.required_entity("Counter").unwrap();
        let tag = context.required_entity("Tag").unwrap();

        let zero = Record::new("Counter").with("id", Value::Integer(0));
        let seven = Record::new("Counter").with("id", Value::Integer(7));
        assert_eq!(IdValueSource::for_record(counter, &zero), IdValueSource::Generated);
        assert_eq!(IdValueSource::for_record(counter, &seven), IdValueSource::Provided);
        assert_eq!(
            IdValueSource::for_record(counter, &Record::new("Counter")),
            IdValueSource::Generated
        );
        assert_eq!(
            IdValueSource::for_record(tag, &Record::new("Tag")),
            IdValueSource::None
        );
    }

    #[test]
    fn test_shift_ids_moves_dependencies() {
        let context = context();
        let mut action = DbAction::Insert(Insert {
            id: ActionId::new(1),
            entity: Record::new("Tag"),
            path: context.root_path("Counter").unwrap(),
            depending_on: ActionId::new(0),
            qualifiers: Vec::new(),
            id_value_source: IdValueSource::None,
        });
        action.shift_ids(10);
        match action {
            DbAction::Insert(insert) => {
                assert_eq!(insert.id, ActionId::new(11));
                assert_eq!(insert.depending_on, ActionId::new(10));
            }
            other => panic!("unexpected {other}"),
        }
    }
}
