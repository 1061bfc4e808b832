use std::collections::BTreeMap;

use crate::core::{DbError, Result, Value};
use crate::mapping::{AggregatePath, Record};

use super::action::{
    ActionId, BatchDelete, BatchDeleteRoot, BatchInsert, BatchInsertRoot,
    DbAction, DeleteRoot, IdValueSource, Insert, InsertRoot,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Save,
    Delete,
}

/// An ordered list of actions persisting or deleting aggregates of one type.
pub trait AggregateChange: Send + Sync {
    fn kind(&self) -> ChangeKind;

    fn entity_type(&self) -> &str;

    /// Actions in execution order.
    fn actions(&self) -> Vec<DbAction>;
}

/// The change for a single aggregate root.
#[derive(Debug, Clone)]
pub struct RootAggregateChange {
    kind: ChangeKind,
    entity_type: String,
    previous_version: Option<Value>,
    actions: Vec<DbAction>,
    next_id: usize,
}

impl RootAggregateChange {
    pub fn save(entity_type: impl Into<String>, previous_version: Option<Value>) -> Self {
        Self::new(ChangeKind::Save, entity_type.into(), previous_version)
    }

    pub fn delete(entity_type: impl Into<String>, previous_version: Option<Value>) -> Self {
        Self::new(ChangeKind::Delete, entity_type.into(), previous_version)
    }

    fn new(kind: ChangeKind, entity_type: String, previous_version: Option<Value>) -> Self {
        Self {
            kind,
            entity_type,
            previous_version,
            actions: Vec::new(),
            next_id: 0,
        }
    }

    pub fn next_action_id(&mut self) -> ActionId {
        let id = ActionId::new(self.next_id);
        self.next_id += 1;
        id
    }

    pub fn add_action(&mut self, action: DbAction) {
        self.actions.push(action);
    }

    pub fn previous_version(&self) -> Option<&Value> {
        self.previous_version.as_ref()
    }

    pub fn action_list(&self) -> &[DbAction] {
        &self.actions
    }

    /// The root record carried by the root action of a save.
    pub fn root(&self) -> Option<&Record> {
        self.actions
            .iter()
            .find(|a| a.is_root_action())
            .and_then(DbAction::entity)
    }

    /// Replaces the root record, typically with one returned by a callback.
    pub fn set_root(&mut self, record: Record) -> Result<()> {
        for action in &mut self.actions {
            match action {
                DbAction::InsertRoot(a) => {
                    a.entity = record;
                    return Ok(());
                }
                DbAction::UpdateRoot(a) => {
                    a.entity = record;
                    return Ok(());
                }
                _ => {}
            }
        }
        Err(DbError::IllegalState(format!(
            "The change for '{}' has no root action",
            self.entity_type
        )))
    }

    fn id_count(&self) -> usize {
        self.next_id
    }
}

impl AggregateChange for RootAggregateChange {
    fn kind(&self) -> ChangeKind {
        self.kind
    }

    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn actions(&self) -> Vec<DbAction> {
        self.actions.clone()
    }
}

/// Several root changes of the same type and kind, merged into batch actions.
///
/// Saves run root actions first (consecutive inserts with the same id source
/// batched), then child deletes deepest path first, then child inserts per path
/// shortest first. Deletes run locks, child deletes, versioned root deletes and
/// finally one batch delete of the remaining roots.
#[derive(Debug, Clone)]
pub struct BatchingAggregateChange {
    kind: ChangeKind,
    entity_type: String,
    root_actions: Vec<DbAction>,
    lock_actions: Vec<DbAction>,
    deletes: BTreeMap<PathKey, (AggregatePath, Vec<Value>)>,
    inserts: BTreeMap<(usize, String, u8), (AggregatePath, IdValueSource, Vec<Insert>)>,
    versioned_root_deletes: Vec<DbAction>,
    unversioned_root_deletes: Vec<Value>,
    next_id: usize,
}

/// Orders child paths deepest first, then by dot path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct PathKey(std::cmp::Reverse<usize>, String);

impl PathKey {
    fn of(path: &AggregatePath) -> Self {
        Self(std::cmp::Reverse(path.len()), path.dot_path())
    }
}

fn source_rank(source: IdValueSource) -> u8 {
    match source {
        IdValueSource::Generated => 0,
        IdValueSource::Provided => 1,
        IdValueSource::None => 2,
    }
}

impl BatchingAggregateChange {
    pub fn new(kind: ChangeKind, entity_type: impl Into<String>) -> Self {
        Self {
            kind,
            entity_type: entity_type.into(),
            root_actions: Vec::new(),
            lock_actions: Vec::new(),
            deletes: BTreeMap::new(),
            inserts: BTreeMap::new(),
            versioned_root_deletes: Vec::new(),
            unversioned_root_deletes: Vec::new(),
            next_id: 0,
        }
    }

    pub fn add(&mut self, change: RootAggregateChange) -> Result<()> {
        if change.kind != self.kind || change.entity_type != self.entity_type {
            return Err(DbError::InvalidApiUsage(format!(
                "Cannot batch a {:?} change of '{}' with a {:?} change of '{}'",
                change.kind, change.entity_type, self.kind, self.entity_type
            )));
        }

        let offset = self.next_id;
        self.next_id += change.id_count();

        for mut action in change.actions {
            action.shift_ids(offset);
            match action {
                DbAction::InsertRoot(insert) => self.add_insert_root(insert),
                DbAction::Insert(insert) => {
                    let key = (
                        insert.path.len(),
                        insert.path.dot_path(),
                        source_rank(insert.id_value_source),
                    );
                    self.inserts
                        .entry(key)
                        .or_insert_with(|| {
                            (insert.path.clone(), insert.id_value_source, Vec::new())
                        })
                        .2
                        .push(insert);
                }
                DbAction::Delete(delete) => {
                    self.deletes
                        .entry(PathKey::of(&delete.path))
                        .or_insert_with(|| (delete.path.clone(), Vec::new()))
                        .1
                        .push(delete.root_id);
                }
                DbAction::DeleteRoot(DeleteRoot {
                    id,
                    previous_version: None,
                    ..
                }) => self.unversioned_root_deletes.push(id),
                action @ DbAction::DeleteRoot(_) => self.versioned_root_deletes.push(action),
                action @ DbAction::AcquireLockRoot(_) => self.lock_actions.push(action),
                other => self.root_actions.push(other),
            }
        }
        Ok(())
    }

    fn add_insert_root(&mut self, insert: InsertRoot) {
        if let Some(DbAction::BatchInsertRoot(batch)) = self.root_actions.last_mut() {
            if batch.id_value_source == insert.id_value_source {
                batch.actions.push(insert);
                return;
            }
        }
        self.root_actions.push(DbAction::BatchInsertRoot(BatchInsertRoot {
            entity_type: insert.entity_type.clone(),
            id_value_source: insert.id_value_source,
            actions: vec![insert],
        }));
    }
}

impl AggregateChange for BatchingAggregateChange {
    fn kind(&self) -> ChangeKind {
        self.kind
    }

    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn actions(&self) -> Vec<DbAction> {
        let batch_deletes = self.deletes.values().map(|(path, root_ids)| {
            DbAction::BatchDelete(BatchDelete {
                path: path.clone(),
                root_ids: root_ids.clone(),
            })
        });

        let mut actions = Vec::new();
        match self.kind {
            ChangeKind::Save => {
                actions.extend(self.root_actions.iter().cloned());
                actions.extend(batch_deletes);
                actions.extend(self.inserts.values().map(|(path, source, inserts)| {
                    DbAction::BatchInsert(BatchInsert {
                        path: path.clone(),
                        id_value_source: *source,
                        actions: inserts.clone(),
                    })
                }));
            }
            ChangeKind::Delete => {
                actions.extend(self.lock_actions.iter().cloned());
                actions.extend(batch_deletes);
                actions.extend(self.root_actions.iter().cloned());
                actions.extend(self.versioned_root_deletes.iter().cloned());
                if !self.unversioned_root_deletes.is_empty() {
                    actions.push(DbAction::BatchDeleteRoot(BatchDeleteRoot {
                        entity_type: self.entity_type.clone(),
                        ids: self.unversioned_root_deletes.clone(),
                    }));
                }
            }
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::delete_writer::RelationalEntityDeleteWriter;
    use crate::conversion::writer::{EntityWriter, RelationalEntityWriter};
    use crate::core::DataType;
    use crate::mapping::{
        EntityDescriptor, PropertyDescriptor, PropertyValue, RelationalMappingContext, TypeInfo,
    };

    fn line() -> EntityDescriptor {
        EntityDescriptor::new("Line")
            .property(PropertyDescriptor::new("text", TypeInfo::simple(DataType::Text)))
    }

    fn invoice() -> EntityDescriptor {
        EntityDescriptor::new("Invoice")
            .property(PropertyDescriptor::new("id", TypeInfo::simple(DataType::Integer).nullable()).id())
            .property(PropertyDescriptor::new("lines", TypeInfo::list(TypeInfo::entity(line))))
    }

    fn context() -> RelationalMappingContext {
        RelationalMappingContext::builder().descriptor(invoice()).build().unwrap()
    }

    fn invoice_record(id: Option<i64>, lines: usize) -> Record {
        Record::new("Invoice").with("id", Value::from(id)).with(
            "lines",
            PropertyValue::List((0..lines).map(|_| Record::new("Line")).collect()),
        )
    }

    fn planned(record: &Record) -> RootAggregateChange {
        let mut change = RootAggregateChange::save("Invoice", None);
        RelationalEntityWriter::new(context()).write(record, &mut change).unwrap();
        change
    }

    #[test]
    fn test_batching_merges_inserts_and_keeps_ids_unique() -> Result<()> {
        let mut batch = BatchingAggregateChange::new(ChangeKind::Save, "Invoice");
        batch.add(planned(&invoice_record(None, 1)))?;
        batch.add(planned(&invoice_record(None, 2)))?;

        let actions = batch.actions();
        assert_eq!(actions.len(), 2);
        let DbAction::BatchInsertRoot(roots) = &actions[0] else {
            panic!("expected a batch of roots, got {}", actions[0]);
        };
        let DbAction::BatchInsert(lines) = &actions[1] else {
            panic!("expected a batch of lines, got {}", actions[1]);
        };
        assert_eq!(roots.actions.len(), 2);
        assert_eq!(lines.actions.len(), 3);
        assert_eq!(lines.actions[0].depending_on, roots.actions[0].id);
        assert_eq!(lines.actions[1].depending_on, roots.actions[1].id);
        assert_ne!(roots.actions[0].id, roots.actions[1].id);
        Ok(())
    }

    #[test]
    fn test_batching_orders_update_deletes_before_inserts() -> Result<()> {
        let mut batch = BatchingAggregateChange::new(ChangeKind::Save, "Invoice");
        batch.add(planned(&invoice_record(Some(1), 1)))?;
        batch.add(planned(&invoice_record(Some(2), 1)))?;

        let actions = batch.actions();
        assert!(matches!(actions[0], DbAction::UpdateRoot(_)));
        assert!(matches!(actions[1], DbAction::UpdateRoot(_)));
        assert!(matches!(&actions[2], DbAction::BatchDelete(d) if d.root_ids.len() == 2));
        assert!(matches!(actions[3], DbAction::BatchInsert(_)));
        Ok(())
    }

    #[test]
    fn test_delete_batching_separates_versioned_roots() -> Result<()> {
        let writer = RelationalEntityDeleteWriter::new(context());
        let mut batch = BatchingAggregateChange::new(ChangeKind::Delete, "Invoice");

        let mut first = RootAggregateChange::delete("Invoice", None);
        writer.write(&Value::Integer(1), &mut first)?;
        let mut second = RootAggregateChange::delete("Invoice", Some(Value::Integer(4)));
        writer.write(&Value::Integer(2), &mut second)?;
        batch.add(first)?;
        batch.add(second)?;

        let names: Vec<String> = batch.actions().iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            vec![
                "AcquireLockRoot(Invoice 1)",
                "AcquireLockRoot(Invoice 2)",
                "BatchDelete(Invoice.lines x2)",
                "DeleteRoot(Invoice 2)",
                "BatchDeleteRoot(Invoice x1)",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_mismatched_changes_are_rejected() {
        let mut batch = BatchingAggregateChange::new(ChangeKind::Delete, "Invoice");
        assert!(matches!(
            batch.add(RootAggregateChange::save("Invoice", None)),
            Err(DbError::InvalidApiUsage(_))
        ));
    }
}
