use std::collections::{HashMap, VecDeque};

use crate::conversion::{
    AcquireLockAllRoot, AcquireLockRoot, ActionId, BatchDelete, BatchDeleteRoot, BatchInsert,
    BatchInsertRoot, DbAction, Delete, DeleteAll, DeleteAllRoot, DeleteRoot, IdValueSource,
    Insert, InsertRoot, Update, UpdateRoot,
};
use crate::core::{DbError, Result, Value};
use crate::dialect::LockMode;
use crate::mapping::{AggregatePath, PropertyValue, Record, RelationalMappingContext};

use super::identifier::Identifier;
use super::strategy::DataAccessStrategy;

/// What one entity-writing action left behind.
#[derive(Debug, Clone)]
struct ActionResult {
    action: DbAction,
    generated_id: Option<Value>,
}

/// Interprets the actions of one aggregate change and propagates generated
/// ids back into the aggregate.
pub struct JdbcAggregateChangeExecutionContext<'a> {
    context: &'a RelationalMappingContext,
    strategy: &'a dyn DataAccessStrategy,
    results: Vec<ActionResult>,
    by_id: HashMap<ActionId, usize>,
}

impl<'a> JdbcAggregateChangeExecutionContext<'a> {
    pub fn new(context: &'a RelationalMappingContext, strategy: &'a dyn DataAccessStrategy) -> Self {
        Self {
            context,
            strategy,
            results: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    fn add_result(&mut self, action: DbAction, generated_id: Option<Value>) {
        if let Some(id) = action.action_id() {
            self.by_id.insert(id, self.results.len());
        }
        self.results.push(ActionResult {
            action,
            generated_id,
        });
    }

    fn result(&self, id: ActionId) -> Result<&ActionResult> {
        self.by_id
            .get(&id)
            .map(|&index| &self.results[index])
            .ok_or_else(|| DbError::IllegalState(format!("No result recorded for action {}", id)))
    }

    /// Runs one action. Any failure leaves the remaining actions unexecuted.
    pub async fn execute(&mut self, action: &DbAction) -> Result<()> {
        match action {
            DbAction::InsertRoot(a) => self.execute_insert_root(a).await,
            DbAction::Insert(a) => self.execute_insert(a).await,
            DbAction::UpdateRoot(a) => self.execute_update_root(a).await,
            DbAction::Update(a) => self.execute_update(a).await,
            DbAction::Delete(a) => self.execute_delete(a).await,
            DbAction::DeleteAll(a) => self.execute_delete_all(a).await,
            DbAction::DeleteRoot(a) => self.execute_delete_root(a).await,
            DbAction::DeleteAllRoot(a) => self.execute_delete_all_root(a).await,
            DbAction::AcquireLockRoot(a) => self.execute_acquire_lock(a).await,
            DbAction::AcquireLockAllRoot(a) => self.execute_acquire_lock_all(a).await,
            DbAction::BatchInsertRoot(a) => self.execute_batch_insert_root(a).await,
            DbAction::BatchInsert(a) => self.execute_batch_insert(a).await,
            DbAction::BatchDelete(a) => self.execute_batch_delete(a).await,
            DbAction::BatchDeleteRoot(a) => self.execute_batch_delete_root(a).await,
        }
    }

    async fn execute_insert_root(&mut self, insert: &InsertRoot) -> Result<()> {
        let id = self
            .strategy
            .insert(
                &insert.entity,
                &insert.entity_type,
                &Identifier::empty(),
                insert.id_value_source,
            )
            .await?;
        self.add_result(DbAction::InsertRoot(insert.clone()), id);
        Ok(())
    }

    async fn execute_batch_insert_root(&mut self, batch: &BatchInsertRoot) -> Result<()> {
        let rows: Vec<_> = batch
            .actions
            .iter()
            .map(|a| (a.entity.clone(), Identifier::empty()))
            .collect();
        let ids = self
            .strategy
            .insert_batch(&rows, &batch.entity_type, batch.id_value_source)
            .await?;
        for (insert, id) in batch.actions.iter().zip(ids) {
            self.add_result(DbAction::InsertRoot(insert.clone()), id);
        }
        Ok(())
    }

    async fn execute_insert(&mut self, insert: &Insert) -> Result<()> {
        let identifier = self.parent_keys(insert)?;
        let id = self
            .strategy
            .insert(
                &insert.entity,
                insert.entity_type(),
                &identifier,
                insert.id_value_source,
            )
            .await?;
        self.add_result(DbAction::Insert(insert.clone()), id);
        Ok(())
    }

    async fn execute_batch_insert(&mut self, batch: &BatchInsert) -> Result<()> {
        let entity_type = batch.path.required_leaf_entity()?.type_name().to_string();
        let mut rows = Vec::with_capacity(batch.actions.len());
        for insert in &batch.actions {
            rows.push((insert.entity.clone(), self.parent_keys(insert)?));
        }
        let ids = self
            .strategy
            .insert_batch(&rows, &entity_type, batch.id_value_source)
            .await?;
        for (insert, id) in batch.actions.iter().zip(ids) {
            self.add_result(DbAction::Insert(insert.clone()), id);
        }
        Ok(())
    }

    async fn execute_update_root(&mut self, update: &UpdateRoot) -> Result<()> {
        match &update.previous_version {
            Some(previous) => {
                let updated = self
                    .strategy
                    .update_with_version(&update.entity, &update.entity_type, previous)
                    .await?;
                if !updated {
                    return Err(DbError::OptimisticLockingFailure(format!(
                        "'{}' with version {} was changed or deleted in between",
                        update.entity_type, previous
                    )));
                }
            }
            None => {
                if !self.strategy.update(&update.entity, &update.entity_type).await? {
                    return Err(DbError::IncorrectUpdateSemantics(format!(
                        "Failed to update '{}'; no row matched its id",
                        update.entity_type
                    )));
                }
            }
        }
        self.add_result(DbAction::UpdateRoot(update.clone()), None);
        Ok(())
    }

    async fn execute_update(&mut self, update: &Update) -> Result<()> {
        let entity_type = update.path.required_leaf_entity()?.type_name().to_string();
        if !self.strategy.update(&update.entity, &entity_type).await? {
            return Err(DbError::IncorrectUpdateSemantics(format!(
                "Failed to update '{}' at '{}'; no row matched its id",
                entity_type, update.path
            )));
        }
        self.add_result(DbAction::Update(update.clone()), None);
        Ok(())
    }

    async fn execute_delete(&mut self, delete: &Delete) -> Result<()> {
        self.strategy.delete_by_path(&delete.root_id, &delete.path).await
    }

    async fn execute_delete_all(&mut self, delete: &DeleteAll) -> Result<()> {
        self.strategy.delete_all_by_path(&delete.path).await
    }

    async fn execute_delete_root(&mut self, delete: &DeleteRoot) -> Result<()> {
        match &delete.previous_version {
            Some(previous) => {
                self.strategy
                    .delete_with_version(&delete.id, &delete.entity_type, previous)
                    .await
            }
            None => self.strategy.delete(&delete.id, &delete.entity_type).await,
        }
    }

    async fn execute_delete_all_root(&mut self, delete: &DeleteAllRoot) -> Result<()> {
        self.strategy.delete_all(&delete.entity_type).await
    }

    async fn execute_acquire_lock(&mut self, lock: &AcquireLockRoot) -> Result<()> {
        self.strategy
            .acquire_lock_by_id(&lock.id, LockMode::PessimisticWrite, &lock.entity_type)
            .await
    }

    async fn execute_acquire_lock_all(&mut self, lock: &AcquireLockAllRoot) -> Result<()> {
        self.strategy
            .acquire_lock_all(LockMode::PessimisticWrite, &lock.entity_type)
            .await
    }

    async fn execute_batch_delete(&mut self, delete: &BatchDelete) -> Result<()> {
        self.strategy
            .delete_in_by_path(&delete.root_ids, &delete.path)
            .await
    }

    async fn execute_batch_delete_root(&mut self, delete: &BatchDeleteRoot) -> Result<()> {
        self.strategy
            .delete_by_ids(&delete.ids, &delete.entity_type)
            .await
    }

    /// The back-reference and qualifiers of a child row: follows `depending_on`
    /// up to the action that wrote the id-defining parent.
    fn parent_keys(&self, insert: &Insert) -> Result<Identifier> {
        let id_path = insert.path.id_defining_parent_path()?;
        let mut current = insert.depending_on;

        let parent_id = loop {
            let result = self.result(current)?;
            match &result.action {
                DbAction::Insert(parent) if parent.path != id_path => {
                    current = parent.depending_on;
                }
                DbAction::Insert(parent) => {
                    break self.id_of(result, &parent.entity, &parent.path, parent.id_value_source)?;
                }
                DbAction::Update(parent) if parent.path == id_path => {
                    break self.id_of(result, &parent.entity, &parent.path, IdValueSource::Provided)?;
                }
                DbAction::InsertRoot(root) if id_path.is_root() => {
                    break self.id_of(result, &root.entity, &id_path, root.id_value_source)?;
                }
                DbAction::UpdateRoot(root) if id_path.is_root() => {
                    break self.id_of(result, &root.entity, &id_path, IdValueSource::Provided)?;
                }
                other => {
                    return Err(DbError::IllegalState(format!(
                        "Reached {} while looking for the parent of '{}' at '{}'",
                        other, insert.path, id_path
                    )));
                }
            }
        };

        let mut identifier = Identifier::for_back_reference(&insert.path, parent_id)?;
        for (path, value) in &insert.qualifiers {
            identifier = identifier.with_qualifier(path, value.clone())?;
        }
        Ok(identifier)
    }

    fn id_of(
        &self,
        result: &ActionResult,
        entity: &Record,
        path: &AggregatePath,
        source: IdValueSource,
    ) -> Result<Value> {
        if source == IdValueSource::Generated {
            return result.generated_id.clone().ok_or_else(|| {
                DbError::IllegalState(format!("No id was generated for '{}'", path))
            });
        }
        let id = path
            .required_leaf_entity()?
            .id_property()
            .ok_or_else(|| DbError::IllegalState(format!("'{}' has no id property", path)))?;
        Ok(entity.value(id.name()))
    }

    /// Applies generated ids to the written records, children first, and
    /// returns the updated roots in the order they were written.
    pub fn populate_ids_if_necessary(self) -> Result<Vec<Record>> {
        let mut staged = StagedValues::default();
        let mut roots = Vec::new();

        for result in self.results.iter().rev() {
            let Some(original) = result.action.entity() else {
                continue;
            };
            let updated = self.with_id_and_cascading_values(result, original, &mut staged)?;

            match &result.action {
                DbAction::Insert(insert) => {
                    if updated != *original {
                        staged.stage(insert, updated)?;
                    } else if insert.path.is_collection_like() {
                        staged.gather(insert, updated)?;
                    }
                }
                DbAction::InsertRoot(_) | DbAction::UpdateRoot(_) => roots.push(updated),
                _ => {}
            }
        }

        if roots.is_empty() {
            return Err(DbError::IllegalState(
                "The change did not write any aggregate root".into(),
            ));
        }
        roots.reverse();
        Ok(roots)
    }

    fn with_id_and_cascading_values(
        &self,
        result: &ActionResult,
        original: &Record,
        staged: &mut StagedValues,
    ) -> Result<Record> {
        let (path, source, action_id) = match &result.action {
            DbAction::InsertRoot(a) => (None, a.id_value_source, a.id),
            DbAction::Insert(a) => (Some(&a.path), a.id_value_source, a.id),
            DbAction::UpdateRoot(a) => (None, IdValueSource::Provided, a.id),
            DbAction::Update(a) => (Some(&a.path), IdValueSource::Provided, a.id),
            _ => return Ok(original.clone()),
        };

        let mut record = original.clone();
        if let (IdValueSource::Generated, Some(id)) = (source, &result.generated_id) {
            if let Some(name) = self.id_property_name(&result.action)? {
                record = record.set(name, id.clone());
            }
        }

        for (staged_path, value) in staged.take(action_id) {
            let relative = match path {
                Some(path) => staged_path.relative_to(path)?,
                None => staged_path.names(),
            };
            record = record.set_path(&relative, value)?;
        }
        Ok(record)
    }

    fn id_property_name(&self, action: &DbAction) -> Result<Option<String>> {
        let entity = match action {
            DbAction::InsertRoot(a) => self.context.required_entity(&a.entity_type)?,
            DbAction::Insert(a) => a.path.required_leaf_entity()?,
            _ => return Ok(None),
        };
        Ok(entity.id_property().map(|p| p.name().to_string()))
    }
}

/// Values of one property path collected from the children of a written action.
enum Aggregate {
    Single(Option<Record>),
    List(Vec<Option<Record>>),
    Set(VecDeque<Record>),
    Map(VecDeque<(Value, Record)>),
}

impl Aggregate {
    fn for_path(path: &AggregatePath) -> Self {
        if path.is_map() {
            Self::Map(VecDeque::new())
        } else if path.is_ordered() {
            Self::List(Vec::new())
        } else if path.is_collection_like() {
            Self::Set(VecDeque::new())
        } else {
            Self::Single(None)
        }
    }

    /// Adds one element. Elements arrive in reverse write order.
    fn add(&mut self, qualifier: Option<&Value>, record: Record) -> Result<()> {
        match self {
            Self::Single(value) => *value = Some(record),
            Self::List(values) => {
                let index = qualifier
                    .and_then(Value::as_i64)
                    .and_then(|i| usize::try_from(i).ok())
                    .ok_or_else(|| {
                        DbError::IllegalState("List element without an index".into())
                    })?;
                if values.len() <= index {
                    values.resize(index + 1, None);
                }
                values[index] = Some(record);
            }
            Self::Set(values) => values.push_front(record),
            Self::Map(entries) => {
                let key = qualifier
                    .cloned()
                    .ok_or_else(|| DbError::IllegalState("Map element without a key".into()))?;
                entries.push_front((key, record));
            }
        }
        Ok(())
    }

    fn into_property(self) -> PropertyValue {
        match self {
            Self::Single(value) => value.map(PropertyValue::Entity).unwrap_or_default(),
            Self::List(values) => PropertyValue::List(values.into_iter().flatten().collect()),
            Self::Set(values) => PropertyValue::Set(values.into()),
            Self::Map(entries) => PropertyValue::Map(entries.into()),
        }
    }
}

struct StagedValue {
    staged: bool,
    value: Aggregate,
}

/// Child values waiting to be set on the record of the action they depend on.
#[derive(Default)]
struct StagedValues {
    values: HashMap<ActionId, Vec<(AggregatePath, StagedValue)>>,
}

impl StagedValues {
    fn entry(&mut self, insert: &Insert) -> &mut StagedValue {
        let paths = self.values.entry(insert.depending_on).or_default();
        let index = match paths.iter().position(|(path, _)| *path == insert.path) {
            Some(index) => index,
            None => {
                paths.push((
                    insert.path.clone(),
                    StagedValue {
                        staged: false,
                        value: Aggregate::for_path(&insert.path),
                    },
                ));
                paths.len() - 1
            }
        };
        &mut paths[index].1
    }

    /// Records a changed child; its parent will be rebuilt.
    fn stage(&mut self, insert: &Insert, record: Record) -> Result<()> {
        let entry = self.entry(insert);
        entry.staged = true;
        entry.value.add(insert.qualifier(), record)
    }

    /// Records an unchanged collection element so a rebuilt collection stays complete.
    fn gather(&mut self, insert: &Insert, record: Record) -> Result<()> {
        self.entry(insert).value.add(insert.qualifier(), record)
    }

    fn take(&mut self, action: ActionId) -> Vec<(AggregatePath, PropertyValue)> {
        self.values
            .remove(&action)
            .unwrap_or_default()
            .into_iter()
            .filter(|(_, value)| value.staged)
            .map(|(path, value)| (path, value.value.into_property()))
            .collect()
    }
}
