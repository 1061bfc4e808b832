use std::sync::Arc;

use crate::conversion::{
    is_new, BatchingAggregateChange, ChangeKind, EntityWriter,
    RelationalEntityDeleteWriter, RelationalEntityInsertWriter, RelationalEntityUpdateWriter,
    RootAggregateChange,
};
use crate::core::{DbError, Result, Value};
use crate::dialect::Dialect;
use crate::mapping::{Entity, Record, RelationalMappingContext, RelationalPersistentEntity};
use crate::sql::{Pageable, Sort};

use super::event::{EntityCallback, EntityCallbacks, EventPublisher, NoopEventPublisher, RelationalEvent};
use super::create_data_access_strategy;
use super::executor::AggregateChangeExecutor;
use super::operations::JdbcOperations;
use super::strategy::DataAccessStrategy;

/// One page of query results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub number: u64,
    pub size: u64,
    pub total_elements: u64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.size == 0 {
            return 0;
        }
        self.total_elements.div_ceil(self.size)
    }

    pub fn try_map<U>(self, f: impl Fn(T) -> Result<U>) -> Result<Page<U>> {
        Ok(Page {
            content: self.content.into_iter().map(f).collect::<Result<_>>()?,
            number: self.number,
            size: self.size,
            total_elements: self.total_elements,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveMode {
    Auto,
    Insert,
    Update,
}

fn type_name<T: Entity>() -> String {
    T::descriptor().type_name
}

/// Loads and stores whole aggregates.
///
/// Typed methods work on `#[derive(Entity)]` structs; the `*_record` methods
/// take the dynamic records those structs convert to.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use relmap::dialect::PostgresDialect;
/// use relmap::{Entity, InMemoryDatabase, JdbcAggregateTemplate, RelationalMappingContext};
///
/// #[derive(Debug, Clone, PartialEq, Entity)]
/// struct Note {
///     #[column(id)]
///     id: Option<i64>,
///     text: String,
/// }
///
/// # tokio_test::block_on(async {
/// let context = RelationalMappingContext::builder().entity::<Note>().build().unwrap();
/// let database = Arc::new(InMemoryDatabase::new(&context, &PostgresDialect).unwrap());
/// let template = JdbcAggregateTemplate::from_operations(context, &PostgresDialect, database).unwrap();
///
/// let saved = template.save(Note { id: None, text: "hello".into() }).await.unwrap();
/// let loaded = template.find_by_id::<Note>(saved.id.unwrap()).await.unwrap();
/// assert_eq!(loaded, Some(saved));
/// # });
/// ```
pub struct JdbcAggregateTemplate {
    context: RelationalMappingContext,
    strategy: Arc<dyn DataAccessStrategy>,
    executor: AggregateChangeExecutor,
    insert_writer: RelationalEntityInsertWriter,
    update_writer: RelationalEntityUpdateWriter,
    delete_writer: RelationalEntityDeleteWriter,
    publisher: Arc<dyn EventPublisher>,
    callbacks: EntityCallbacks,
}

impl JdbcAggregateTemplate {
    pub fn new(context: RelationalMappingContext, strategy: Arc<dyn DataAccessStrategy>) -> Self {
        Self {
            executor: AggregateChangeExecutor::new(context.clone(), strategy.clone()),
            insert_writer: RelationalEntityInsertWriter::new(context.clone()),
            update_writer: RelationalEntityUpdateWriter::new(context.clone()),
            delete_writer: RelationalEntityDeleteWriter::new(context.clone()),
            context,
            strategy,
            publisher: Arc::new(NoopEventPublisher),
            callbacks: EntityCallbacks::new(),
        }
    }

    /// A template over `operations` using the default strategy.
    pub fn from_operations(
        context: RelationalMappingContext,
        dialect: &'static dyn Dialect,
        operations: Arc<dyn JdbcOperations>,
    ) -> Result<Self> {
        let strategy = create_data_access_strategy(context.clone(), dialect, operations)?;
        Ok(Self::new(context, strategy))
    }

    pub fn with_event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn EntityCallback>) -> Self {
        self.callbacks.register(callback);
        self
    }

    pub fn context(&self) -> &RelationalMappingContext {
        &self.context
    }

    pub fn strategy(&self) -> &Arc<dyn DataAccessStrategy> {
        &self.strategy
    }

    // ========================================================================
    // Typed API
    // ========================================================================

    /// Inserts or updates `entity` depending on whether it is new.
    pub async fn save<T: Entity>(&self, entity: T) -> Result<T> {
        T::from_record(self.save_record(entity.to_record()).await?)
    }

    pub async fn save_all<T: Entity>(&self, entities: Vec<T>) -> Result<Vec<T>> {
        let records = entities.iter().map(Entity::to_record).collect();
        self.save_all_records(records)
            .await?
            .into_iter()
            .map(T::from_record)
            .collect()
    }

    pub async fn insert<T: Entity>(&self, entity: T) -> Result<T> {
        T::from_record(self.insert_record(entity.to_record()).await?)
    }

    pub async fn insert_all<T: Entity>(&self, entities: Vec<T>) -> Result<Vec<T>> {
        let records = entities.iter().map(Entity::to_record).collect();
        self.save_records(records, SaveMode::Insert)
            .await?
            .into_iter()
            .map(T::from_record)
            .collect()
    }

    pub async fn update<T: Entity>(&self, entity: T) -> Result<T> {
        T::from_record(self.update_record(entity.to_record()).await?)
    }

    pub async fn update_all<T: Entity>(&self, entities: Vec<T>) -> Result<Vec<T>> {
        let records = entities.iter().map(Entity::to_record).collect();
        self.save_records(records, SaveMode::Update)
            .await?
            .into_iter()
            .map(T::from_record)
            .collect()
    }

    pub async fn delete<T: Entity>(&self, entity: &T) -> Result<()> {
        self.delete_record(&entity.to_record()).await
    }

    pub async fn delete_by_id<T: Entity>(&self, id: impl Into<Value>) -> Result<()> {
        self.delete_record_by_id(&type_name::<T>(), id.into()).await
    }

    pub async fn delete_all_by_id<T: Entity>(&self, ids: Vec<Value>) -> Result<()> {
        self.delete_all_records_by_id(&type_name::<T>(), ids).await
    }

    pub async fn delete_all<T: Entity>(&self, entities: &[T]) -> Result<()> {
        let records: Vec<_> = entities.iter().map(Entity::to_record).collect();
        self.delete_all_records(&records).await
    }

    /// Deletes every aggregate of type `T`.
    pub async fn delete_all_of<T: Entity>(&self) -> Result<()> {
        self.delete_all_of_type(&type_name::<T>()).await
    }

    pub async fn find_by_id<T: Entity>(&self, id: impl Into<Value>) -> Result<Option<T>> {
        self.find_record_by_id(&type_name::<T>(), id.into())
            .await?
            .map(T::from_record)
            .transpose()
    }

    pub async fn find_all<T: Entity>(&self) -> Result<Vec<T>> {
        self.find_all_records(&type_name::<T>())
            .await?
            .into_iter()
            .map(T::from_record)
            .collect()
    }

    pub async fn find_all_by_id<T: Entity>(&self, ids: Vec<Value>) -> Result<Vec<T>> {
        self.find_all_records_by_id(&type_name::<T>(), &ids)
            .await?
            .into_iter()
            .map(T::from_record)
            .collect()
    }

    pub async fn find_all_sorted<T: Entity>(&self, sort: &Sort) -> Result<Vec<T>> {
        self.find_all_records_sorted(&type_name::<T>(), sort)
            .await?
            .into_iter()
            .map(T::from_record)
            .collect()
    }

    pub async fn find_all_paged<T: Entity>(&self, pageable: &Pageable) -> Result<Page<T>> {
        self.find_all_records_paged(&type_name::<T>(), pageable)
            .await?
            .try_map(T::from_record)
    }

    pub async fn count<T: Entity>(&self) -> Result<u64> {
        self.count_of(&type_name::<T>()).await
    }

    pub async fn exists_by_id<T: Entity>(&self, id: impl Into<Value>) -> Result<bool> {
        self.exists_record_by_id(&type_name::<T>(), id.into()).await
    }

    // ========================================================================
    // Record API
    // ========================================================================

    pub async fn save_record(&self, record: Record) -> Result<Record> {
        self.save_one(record, SaveMode::Auto).await
    }

    pub async fn insert_record(&self, record: Record) -> Result<Record> {
        self.save_one(record, SaveMode::Insert).await
    }

    pub async fn update_record(&self, record: Record) -> Result<Record> {
        self.save_one(record, SaveMode::Update).await
    }

    pub async fn save_all_records(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        self.save_records(records, SaveMode::Auto).await
    }

    pub async fn delete_record(&self, record: &Record) -> Result<()> {
        let entity_type = record.type_name().to_string();
        let entity = self.context.required_entity(&entity_type)?.clone();
        let id = Self::required_id(&entity, record)?;
        let change = self.delete_change(&entity_type, &id, Self::current_version(&entity, record))?;

        let record = self.before_delete(&entity_type, &id, Some(record.clone()))?;
        self.executor.execute_delete(&change).await?;
        self.after_delete(&entity_type, &id, record)
    }

    pub async fn delete_record_by_id(&self, entity_type: &str, id: Value) -> Result<()> {
        let change = self.delete_change(entity_type, &id, None)?;
        self.before_delete(entity_type, &id, None)?;
        self.executor.execute_delete(&change).await?;
        self.after_delete(entity_type, &id, None)
    }

    pub async fn delete_all_records_by_id(&self, entity_type: &str, ids: Vec<Value>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut batch = BatchingAggregateChange::new(ChangeKind::Delete, entity_type);
        for id in &ids {
            batch.add(self.delete_change(entity_type, id, None)?)?;
        }
        for id in &ids {
            self.before_delete(entity_type, id, None)?;
        }
        self.executor.execute_delete(&batch).await?;
        for id in &ids {
            self.after_delete(entity_type, id, None)?;
        }
        Ok(())
    }

    /// Deletes the given aggregates, checking versions where present.
    pub async fn delete_all_records(&self, records: &[Record]) -> Result<()> {
        let Some(first) = records.first() else {
            return Ok(());
        };
        let entity_type = first.type_name().to_string();
        let entity = self.context.required_entity(&entity_type)?.clone();

        let mut batch = BatchingAggregateChange::new(ChangeKind::Delete, &entity_type);
        let mut pending = Vec::with_capacity(records.len());
        for record in records {
            let id = Self::required_id(&entity, record)?;
            let version = Self::current_version(&entity, record);
            batch.add(self.delete_change(record.type_name(), &id, version)?)?;
            pending.push((id, record.clone()));
        }

        let mut deleted = Vec::with_capacity(pending.len());
        for (id, record) in pending {
            let record = self.before_delete(&entity_type, &id, Some(record))?;
            deleted.push((id, record));
        }
        self.executor.execute_delete(&batch).await?;
        for (id, record) in deleted {
            self.after_delete(&entity_type, &id, record)?;
        }
        Ok(())
    }

    pub async fn delete_all_of_type(&self, entity_type: &str) -> Result<()> {
        let mut change = RootAggregateChange::delete(entity_type, None);
        self.delete_writer.write_all(&mut change)?;
        self.executor.execute_delete(&change).await
    }

    pub async fn find_record_by_id(&self, entity_type: &str, id: Value) -> Result<Option<Record>> {
        match self.strategy.find_by_id(&id, entity_type).await? {
            Some(record) => self.after_convert(entity_type, record).map(Some),
            None => Ok(None),
        }
    }

    pub async fn find_all_records(&self, entity_type: &str) -> Result<Vec<Record>> {
        let records = self.strategy.find_all(entity_type).await?;
        self.after_convert_all(entity_type, records)
    }

    pub async fn find_all_records_by_id(
        &self,
        entity_type: &str,
        ids: &[Value],
    ) -> Result<Vec<Record>> {
        let records = self.strategy.find_all_by_id(ids, entity_type).await?;
        self.after_convert_all(entity_type, records)
    }

    pub async fn find_all_records_sorted(
        &self,
        entity_type: &str,
        sort: &Sort,
    ) -> Result<Vec<Record>> {
        let records = self.strategy.find_all_sorted(entity_type, sort).await?;
        self.after_convert_all(entity_type, records)
    }

    pub async fn find_all_records_paged(
        &self,
        entity_type: &str,
        pageable: &Pageable,
    ) -> Result<Page<Record>> {
        let records = self.strategy.find_all_paged(entity_type, pageable).await?;
        let content = self.after_convert_all(entity_type, records)?;
        let total_elements = self.strategy.count(entity_type).await?;
        Ok(Page {
            content,
            number: pageable.page(),
            size: pageable.size(),
            total_elements,
        })
    }

    pub async fn count_of(&self, entity_type: &str) -> Result<u64> {
        self.strategy.count(entity_type).await
    }

    pub async fn exists_record_by_id(&self, entity_type: &str, id: Value) -> Result<bool> {
        self.strategy.exists_by_id(&id, entity_type).await
    }

    // ========================================================================
    // Save and delete plumbing
    // ========================================================================

    async fn save_one(&self, record: Record, mode: SaveMode) -> Result<Record> {
        let entity_type = record.type_name().to_string();
        let change = self.prepare_save(record, mode)?;
        let saved = self.executor.execute_save(&change).await?;
        let root = saved.into_iter().next().ok_or_else(|| {
            DbError::IllegalState(format!("Saving '{}' returned no root", entity_type))
        })?;
        self.after_save(&entity_type, root)
    }

    async fn save_records(&self, records: Vec<Record>, mode: SaveMode) -> Result<Vec<Record>> {
        let Some(first) = records.first() else {
            return Ok(Vec::new());
        };
        let entity_type = first.type_name().to_string();

        let mut batch = BatchingAggregateChange::new(ChangeKind::Save, &entity_type);
        for record in records {
            batch.add(self.prepare_save(record, mode)?)?;
        }
        self.executor
            .execute_save(&batch)
            .await?
            .into_iter()
            .map(|root| self.after_save(&entity_type, root))
            .collect()
    }

    /// Runs the before-convert phase, stamps the version, plans the change and
    /// runs the before-save phase.
    fn prepare_save(&self, record: Record, mode: SaveMode) -> Result<RootAggregateChange> {
        let entity_type = record.type_name().to_string();
        let entity = self.context.required_entity(&entity_type)?.clone();

        self.publisher.publish(&RelationalEvent::BeforeConvert {
            entity_type: entity_type.clone(),
            entity: record.clone(),
        });
        let record = self.callbacks.before_convert(&entity_type, record)?;

        let insert = match mode {
            SaveMode::Insert => true,
            SaveMode::Update => false,
            SaveMode::Auto => is_new(&entity, &record),
        };
        let (record, previous_version) = Self::stamp_version(&entity, record, insert)?;

        let mut change = RootAggregateChange::save(&entity_type, previous_version);
        if insert {
            self.insert_writer.write(&record, &mut change)?;
        } else {
            self.update_writer.write(&record, &mut change)?;
        }

        self.publisher.publish(&RelationalEvent::BeforeSave {
            entity_type: entity_type.clone(),
            entity: record.clone(),
            actions: change.action_list().len(),
        });
        let record = self.callbacks.before_save(&entity_type, record, &change)?;
        change.set_root(record)?;
        Ok(change)
    }

    /// Sets the version for the write: 1 on insert, the next number on update.
    /// Returns the version the stored row must still have.
    fn stamp_version(
        entity: &RelationalPersistentEntity,
        record: Record,
        insert: bool,
    ) -> Result<(Record, Option<Value>)> {
        let Some(version) = entity.version_property() else {
            return Ok((record, None));
        };
        let current = record.value(version.name());
        if insert {
            return Ok((record.set(version.name(), Value::Integer(1)), None));
        }
        match current {
            Value::Null => Ok((record.set(version.name(), Value::Integer(1)), None)),
            Value::Integer(previous) => Ok((
                record.set(version.name(), Value::Integer(previous + 1)),
                Some(Value::Integer(previous)),
            )),
            other => Err(DbError::TypeMismatch(format!(
                "Version of '{}' must be an integer, got {}",
                entity.type_name(),
                other.type_name()
            ))),
        }
    }

    fn delete_change(
        &self,
        entity_type: &str,
        id: &Value,
        previous_version: Option<Value>,
    ) -> Result<RootAggregateChange> {
        self.context.required_entity(entity_type)?;
        let mut change = RootAggregateChange::delete(entity_type, previous_version);
        self.delete_writer.write(id, &mut change)?;
        Ok(change)
    }

    fn required_id(entity: &RelationalPersistentEntity, record: &Record) -> Result<Value> {
        let id = entity.id_property().ok_or_else(|| {
            DbError::Mapping(format!("Entity '{}' has no id property", entity.type_name()))
        })?;
        match record.value(id.name()) {
            Value::Null => Err(DbError::InvalidApiUsage(format!(
                "Cannot delete '{}' without an id",
                entity.type_name()
            ))),
            value => Ok(value),
        }
    }

    fn current_version(entity: &RelationalPersistentEntity, record: &Record) -> Option<Value> {
        entity
            .version_property()
            .map(|v| record.value(v.name()))
            .filter(|v| !v.is_null())
    }

    fn after_save(&self, entity_type: &str, record: Record) -> Result<Record> {
        self.publisher.publish(&RelationalEvent::AfterSave {
            entity_type: entity_type.to_string(),
            entity: record.clone(),
        });
        self.callbacks.after_save(entity_type, record)
    }

    fn before_delete(
        &self,
        entity_type: &str,
        id: &Value,
        record: Option<Record>,
    ) -> Result<Option<Record>> {
        self.publisher.publish(&RelationalEvent::BeforeDelete {
            entity_type: entity_type.to_string(),
            id: id.clone(),
            entity: record.clone(),
        });
        self.callbacks.before_delete(entity_type, id, record)
    }

    fn after_delete(&self, entity_type: &str, id: &Value, record: Option<Record>) -> Result<()> {
        self.publisher.publish(&RelationalEvent::AfterDelete {
            entity_type: entity_type.to_string(),
            id: id.clone(),
            entity: record.clone(),
        });
        self.callbacks.after_delete(entity_type, id, record)?;
        Ok(())
    }

    fn after_convert(&self, entity_type: &str, record: Record) -> Result<Record> {
        self.publisher.publish(&RelationalEvent::AfterConvert {
            entity_type: entity_type.to_string(),
            entity: record.clone(),
        });
        self.callbacks.after_convert(entity_type, record)
    }

    fn after_convert_all(&self, entity_type: &str, records: Vec<Record>) -> Result<Vec<Record>> {
        records
            .into_iter()
            .map(|record| self.after_convert(entity_type, record))
            .collect()
    }
}
