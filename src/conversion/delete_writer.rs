use crate::core::{Result, Value};
use crate::mapping::{AggregatePath, RelationalMappingContext};

use super::action::{
    AcquireLockAllRoot, AcquireLockRoot, DbAction, Delete, DeleteAll, DeleteAllRoot, DeleteRoot,
};
use super::change::{AggregateChange, RootAggregateChange};

/// Plans the deletion of aggregates: children first, deepest paths first,
/// the root last.
pub struct RelationalEntityDeleteWriter {
    context: RelationalMappingContext,
}

impl RelationalEntityDeleteWriter {
    pub fn new(context: RelationalMappingContext) -> Self {
        Self { context }
    }

    fn child_paths(&self, entity_type: &str) -> Result<Vec<AggregatePath>> {
        let mut paths = self.context.root_path(entity_type)?.entity_paths();
        paths.reverse();
        Ok(paths)
    }

    /// Deletes the aggregate with root `id`.
    pub fn write(&self, id: &Value, change: &mut RootAggregateChange) -> Result<()> {
        let entity_type = change.entity_type().to_string();
        let paths = self.child_paths(&entity_type)?;

        if !paths.is_empty() {
            change.add_action(DbAction::AcquireLockRoot(AcquireLockRoot {
                entity_type: entity_type.clone(),
                id: id.clone(),
            }));
        }
        for path in paths {
            change.add_action(DbAction::Delete(Delete {
                root_id: id.clone(),
                path,
            }));
        }
        let previous_version = change.previous_version().cloned();
        change.add_action(DbAction::DeleteRoot(DeleteRoot {
            entity_type,
            id: id.clone(),
            previous_version,
        }));
        Ok(())
    }

    /// Deletes every aggregate of the change's type.
    pub fn write_all(&self, change: &mut RootAggregateChange) -> Result<()> {
        let entity_type = change.entity_type().to_string();
        let paths = self.child_paths(&entity_type)?;

        if !paths.is_empty() {
            change.add_action(DbAction::AcquireLockAllRoot(AcquireLockAllRoot {
                entity_type: entity_type.clone(),
            }));
        }
        for path in paths {
            change.add_action(DbAction::DeleteAll(DeleteAll { path }));
        }
        change.add_action(DbAction::DeleteAllRoot(DeleteAllRoot { entity_type }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::mapping::{EntityDescriptor, PropertyDescriptor, TypeInfo};

    fn line() -> EntityDescriptor {
        EntityDescriptor::new("Line")
            .property(PropertyDescriptor::new("text", TypeInfo::simple(DataType::Text)))
    }

    fn invoice() -> EntityDescriptor {
        EntityDescriptor::new("Invoice")
            .property(PropertyDescriptor::new("id", TypeInfo::simple(DataType::Integer)).id())
            .property(PropertyDescriptor::new("lines", TypeInfo::set(TypeInfo::entity(line))))
    }

    fn note() -> EntityDescriptor {
        EntityDescriptor::new("Note")
            .property(PropertyDescriptor::new("id", TypeInfo::simple(DataType::Integer)).id())
    }

    fn writer() -> RelationalEntityDeleteWriter {
        RelationalEntityDeleteWriter::new(
            RelationalMappingContext::builder()
                .descriptor(invoice())
                .descriptor(note())
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_delete_locks_root_when_children_exist() -> Result<()> {
        let mut change = RootAggregateChange::delete("Invoice", Some(Value::Integer(3)));
        writer().write(&Value::Integer(9), &mut change)?;

        let actions = change.actions();
        assert_eq!(actions.len(), 3);
        assert!(matches!(actions[0], DbAction::AcquireLockRoot(_)));
        assert!(matches!(&actions[1], DbAction::Delete(d) if d.path.dot_path() == "lines"));
        assert!(matches!(
            &actions[2],
            DbAction::DeleteRoot(DeleteRoot { previous_version: Some(Value::Integer(3)), .. })
        ));
        Ok(())
    }

    #[test]
    fn test_childless_delete_skips_lock() -> Result<()> {
        let mut change = RootAggregateChange::delete("Note", None);
        writer().write(&Value::Integer(1), &mut change)?;
        assert_eq!(change.actions().len(), 1);

        let mut change = RootAggregateChange::delete("Invoice", None);
        writer().write_all(&mut change)?;
        let actions = change.actions();
        assert!(matches!(actions[0], DbAction::AcquireLockAllRoot(_)));
        assert!(matches!(actions[1], DbAction::DeleteAll(_)));
        assert!(matches!(actions[2], DbAction::DeleteAllRoot(_)));
        Ok(())
    }
}
