use std::sync::{Arc, Weak};

use async_trait::async_trait;
use log::{debug, warn};

use crate::conversion::IdValueSource;
use crate::core::{DbError, Result, Row, Value};
use crate::dialect::LockMode;
use crate::mapping::{AggregatePath, Record, RelationalMappingContext};
use crate::sql::{
    Pageable, Sort, SqlGenerator, SqlGeneratorSource, SqlStatement, ID_PARAMETER, IDS_PARAMETER,
    ROOT_ID_PARAMETER, VERSION_PARAMETER,
};

use super::converter::JdbcConverter;
use super::identifier::Identifier;
use super::operations::{JdbcOperations, KeyHolder};
use super::parameters::{SqlParameterSource, SqlParametersFactory};
use super::reader::{AggregateReader, ParentKeys};

/// One element loaded for a path, with its list index or map key.
#[derive(Debug, Clone, PartialEq)]
pub struct PathElement {
    pub key: Option<Value>,
    pub record: Record,
}

/// Entity level database access used by the aggregate executor and template.
#[async_trait]
pub trait DataAccessStrategy: Send + Sync {
    /// Inserts one row and returns the id the database generated for it.
    async fn insert(
        &self,
        record: &Record,
        entity_type: &str,
        identifier: &Identifier,
        id_value_source: IdValueSource,
    ) -> Result<Option<Value>>;

    /// Inserts rows sharing one statement shape, returning generated ids in order.
    async fn insert_batch(
        &self,
        rows: &[(Record, Identifier)],
        entity_type: &str,
        id_value_source: IdValueSource,
    ) -> Result<Vec<Option<Value>>>;

    async fn update(&self, record: &Record, entity_type: &str) -> Result<bool>;

    /// Updates a row only while it still carries `previous_version`; `false`
    /// when no row matched.
    async fn update_with_version(
        &self,
        record: &Record,
        entity_type: &str,
        previous_version: &Value,
    ) -> Result<bool>;

    async fn delete(&self, id: &Value, entity_type: &str) -> Result<()>;

    async fn delete_with_version(
        &self,
        id: &Value,
        entity_type: &str,
        previous_version: &Value,
    ) -> Result<()>;

    async fn delete_by_ids(&self, ids: &[Value], entity_type: &str) -> Result<()>;

    /// Deletes the rows behind `path` owned by the root with `root_id`.
    async fn delete_by_path(&self, root_id: &Value, path: &AggregatePath) -> Result<()>;

    async fn delete_in_by_path(&self, root_ids: &[Value], path: &AggregatePath) -> Result<()>;

    async fn delete_all(&self, entity_type: &str) -> Result<()>;

    async fn delete_all_by_path(&self, path: &AggregatePath) -> Result<()>;

    async fn acquire_lock_by_id(&self, id: &Value, mode: LockMode, entity_type: &str)
    -> Result<()>;

    async fn acquire_lock_all(&self, mode: LockMode, entity_type: &str) -> Result<()>;

    async fn count(&self, entity_type: &str) -> Result<u64>;

    async fn exists_by_id(&self, id: &Value, entity_type: &str) -> Result<bool>;

    async fn find_by_id(&self, id: &Value, entity_type: &str) -> Result<Option<Record>>;

    async fn find_all(&self, entity_type: &str) -> Result<Vec<Record>>;

    async fn find_all_by_id(&self, ids: &[Value], entity_type: &str) -> Result<Vec<Record>>;

    /// Elements stored at `path` for the parent rows `identifier` names.
    async fn find_all_by_path(
        &self,
        identifier: &Identifier,
        path: &AggregatePath,
    ) -> Result<Vec<PathElement>>;

    async fn find_all_sorted(&self, entity_type: &str, sort: &Sort) -> Result<Vec<Record>>;

    async fn find_all_paged(&self, entity_type: &str, pageable: &Pageable) -> Result<Vec<Record>>;
}

/// Executes generated SQL through [`JdbcOperations`].
pub struct DefaultDataAccessStrategy {
    context: RelationalMappingContext,
    generators: Arc<SqlGeneratorSource>,
    operations: Arc<dyn JdbcOperations>,
    converter: JdbcConverter,
    relation_resolver: Option<Weak<dyn DataAccessStrategy>>,
}

impl DefaultDataAccessStrategy {
    pub fn new(
        context: RelationalMappingContext,
        generators: Arc<SqlGeneratorSource>,
        operations: Arc<dyn JdbcOperations>,
    ) -> Self {
        let converter = JdbcConverter::new(generators.dialect());
        Self {
            context,
            generators,
            operations,
            converter,
            relation_resolver: None,
        }
    }

    /// Loads relations through `resolver` instead of this strategy.
    pub fn with_relation_resolver(mut self, resolver: Weak<dyn DataAccessStrategy>) -> Self {
        self.relation_resolver = Some(resolver);
        self
    }

    pub fn context(&self) -> &RelationalMappingContext {
        &self.context
    }

    fn generator(&self, entity_type: &str) -> Result<Arc<SqlGenerator>> {
        self.generators.get(entity_type)
    }

    fn root_generator(&self, path: &AggregatePath) -> Result<Arc<SqlGenerator>> {
        self.generator(path.root_entity().type_name())
    }

    fn parameters(&self) -> SqlParametersFactory<'_> {
        SqlParametersFactory::new(&self.converter)
    }

    fn resolver(&self) -> Result<Option<Arc<dyn DataAccessStrategy>>> {
        match &self.relation_resolver {
            None => Ok(None),
            Some(weak) => weak.upgrade().map(Some).ok_or_else(|| {
                DbError::IllegalState("The relation resolver is no longer available".into())
            }),
        }
    }

    async fn query(&self, statement: &SqlStatement, params: &SqlParameterSource) -> Result<Vec<Row>> {
        debug!("Executing SQL query [{}]", statement);
        self.operations.query(statement, params).await
    }

    async fn execute(&self, statement: &SqlStatement, params: &SqlParameterSource) -> Result<u64> {
        debug!("Executing SQL update [{}]", statement);
        self.operations.update(statement, params).await
    }

    async fn query_for_value(
        &self,
        statement: &SqlStatement,
        params: &SqlParameterSource,
    ) -> Result<Value> {
        debug!("Executing SQL query [{}]", statement);
        self.operations.query_for_value(statement, params).await
    }

    async fn read_roots(&self, generator: &SqlGenerator, rows: Vec<Row>) -> Result<Vec<Record>> {
        let resolver = self.resolver()?;
        let resolver: &dyn DataAccessStrategy = match &resolver {
            Some(resolver) => resolver.as_ref(),
            None => self,
        };
        let reader = AggregateReader::new(self.converter, resolver);
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(reader.read_root(generator.root_path(), row).await?);
        }
        Ok(records)
    }

    async fn query_roots(
        &self,
        generator: &SqlGenerator,
        statement: &SqlStatement,
        params: &SqlParameterSource,
    ) -> Result<Vec<Record>> {
        let rows = self.query(statement, params).await?;
        self.read_roots(generator, rows).await
    }

    fn read_id(&self, generator: &SqlGenerator, value: Value) -> Result<Value> {
        match generator.entity().id_property().and_then(|p| p.data_type()) {
            Some(data_type) => self.converter.read_value(value, data_type),
            None => Ok(value),
        }
    }

    fn key_columns(&self, generator: &SqlGenerator) -> Option<Vec<String>> {
        if !self.generators.dialect().id_generation().driver_requires_key_column_names() {
            return None;
        }
        generator
            .entity()
            .id_column()
            .map(|column| vec![column.reference().to_string()])
    }

    fn generated_id(
        &self,
        generator: &SqlGenerator,
        holder: &KeyHolder,
    ) -> Result<Value> {
        let entity = generator.entity();
        let column = entity.id_column().ok_or_else(|| {
            DbError::Mapping(format!("Entity '{}' has no id column", entity.type_name()))
        })?;
        let key = holder.key(column.reference()).cloned().ok_or_else(|| {
            DbError::IllegalState(format!(
                "No generated key returned for '{}'",
                entity.type_name()
            ))
        })?;
        self.read_id(generator, key)
    }

    fn uses_sequence(generator: &SqlGenerator) -> bool {
        generator
            .entity()
            .id_property()
            .and_then(|p| p.sequence())
            .is_some()
    }

    /// Fetches the next sequence value and stores it on the record.
    async fn assign_sequence_value(
        &self,
        generator: &SqlGenerator,
        record: &Record,
    ) -> Result<(Record, Value)> {
        let statement = generator.next_sequence_value()?;
        let raw = self.query_for_value(&statement, &SqlParameterSource::new()).await?;
        let id = self.read_id(generator, raw)?;
        let name = generator
            .entity()
            .id_property()
            .map(|p| p.name().to_string())
            .unwrap_or_default();
        Ok((record.clone().set(name, id.clone()), id))
    }
}

#[async_trait]
impl DataAccessStrategy for DefaultDataAccessStrategy {
    async fn insert(
        &self,
        record: &Record,
        entity_type: &str,
        identifier: &Identifier,
        id_value_source: IdValueSource,
    ) -> Result<Option<Value>> {
        let generator = self.generator(entity_type)?;

        if id_value_source == IdValueSource::Generated && Self::uses_sequence(&generator) {
            let (record, id) = self.assign_sequence_value(&generator, record).await?;
            self.insert(&record, entity_type, identifier, IdValueSource::Provided)
                .await?;
            return Ok(Some(id));
        }

        let (params, additional) = self.parameters().for_insert(
            generator.root_path(),
            record,
            identifier,
            id_value_source,
        )?;
        let statement = generator.insert(&additional)?;

        if id_value_source != IdValueSource::Generated {
            self.execute(&statement, &params).await?;
            return Ok(None);
        }

        debug!("Executing SQL insert with generated keys [{}]", statement);
        let key_columns = self.key_columns(&generator);
        let holder = self
            .operations
            .update_returning_keys(&statement, &params, key_columns.as_deref())
            .await?;
        self.generated_id(&generator, &holder).map(Some)
    }

    async fn insert_batch(
        &self,
        rows: &[(Record, Identifier)],
        entity_type: &str,
        id_value_source: IdValueSource,
    ) -> Result<Vec<Option<Value>>> {
        let generator = self.generator(entity_type)?;
        let generated = id_value_source == IdValueSource::Generated;
        let batchable = self
            .generators
            .dialect()
            .id_generation()
            .supported_for_batch_operations();

        if generated && (!batchable || Self::uses_sequence(&generator)) {
            let mut ids = Vec::with_capacity(rows.len());
            for (record, identifier) in rows {
                ids.push(self.insert(record, entity_type, identifier, id_value_source).await?);
            }
            return Ok(ids);
        }

        let mut batch = Vec::with_capacity(rows.len());
        let mut additional = Vec::new();
        for (record, identifier) in rows {
            let (params, columns) = self.parameters().for_insert(
                generator.root_path(),
                record,
                identifier,
                id_value_source,
            )?;
            additional = columns;
            batch.push(params);
        }
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let statement = generator.insert(&additional)?;
        debug!("Executing SQL batch insert of {} rows [{}]", batch.len(), statement);

        if !generated {
            self.operations.batch_update(&statement, &batch).await?;
            return Ok(vec![None; rows.len()]);
        }

        let key_columns = self.key_columns(&generator);
        let holders = self
            .operations
            .batch_update_returning_keys(&statement, &batch, key_columns.as_deref())
            .await?;
        if holders.len() != rows.len() {
            return Err(DbError::IncorrectResultSize {
                expected: rows.len(),
                actual: holders.len(),
            });
        }
        holders
            .iter()
            .map(|holder| self.generated_id(&generator, holder).map(Some))
            .collect()
    }

    async fn update(&self, record: &Record, entity_type: &str) -> Result<bool> {
        let generator = self.generator(entity_type)?;
        let params = self.parameters().for_update(generator.root_path(), record)?;
        Ok(self.execute(&generator.update()?, &params).await? > 0)
    }

    async fn update_with_version(
        &self,
        record: &Record,
        entity_type: &str,
        previous_version: &Value,
    ) -> Result<bool> {
        let generator = self.generator(entity_type)?;
        let mut params = self.parameters().for_update(generator.root_path(), record)?;
        params.add(
            VERSION_PARAMETER,
            self.converter.write_value(previous_version.clone())?,
        );
        Ok(self.execute(&generator.update_with_version()?, &params).await? > 0)
    }

    async fn delete(&self, id: &Value, entity_type: &str) -> Result<()> {
        let generator = self.generator(entity_type)?;
        let params = self.parameters().for_id(ID_PARAMETER, id)?;
        self.execute(&generator.delete_by_id()?, &params).await?;
        Ok(())
    }

    async fn delete_with_version(
        &self,
        id: &Value,
        entity_type: &str,
        previous_version: &Value,
    ) -> Result<()> {
        let generator = self.generator(entity_type)?;
        let mut params = self.parameters().for_id(ID_PARAMETER, id)?;
        params.add(
            VERSION_PARAMETER,
            self.converter.write_value(previous_version.clone())?,
        );
        let deleted = self
            .execute(&generator.delete_by_id_and_version()?, &params)
            .await?;
        if deleted == 0 {
            return Err(DbError::OptimisticLockingFailure(format!(
                "Failed to delete versioned '{}' with id {} and version {}",
                entity_type, id, previous_version
            )));
        }
        Ok(())
    }

    async fn delete_by_ids(&self, ids: &[Value], entity_type: &str) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let generator = self.generator(entity_type)?;
        let params = self.parameters().for_ids(IDS_PARAMETER, ids)?;
        self.execute(&generator.delete_by_list()?, &params).await?;
        Ok(())
    }

    async fn delete_by_path(&self, root_id: &Value, path: &AggregatePath) -> Result<()> {
        let generator = self.root_generator(path)?;
        let params = self.parameters().for_id(ROOT_ID_PARAMETER, root_id)?;
        self.execute(&generator.delete_by_path(path)?, &params).await?;
        Ok(())
    }

    async fn delete_in_by_path(&self, root_ids: &[Value], path: &AggregatePath) -> Result<()> {
        if root_ids.is_empty() {
            return Ok(());
        }
        let generator = self.root_generator(path)?;
        let params = self.parameters().for_ids(IDS_PARAMETER, root_ids)?;
        self.execute(&generator.delete_in_by_path(path)?, &params).await?;
        Ok(())
    }

    async fn delete_all(&self, entity_type: &str) -> Result<()> {
        let generator = self.generator(entity_type)?;
        self.execute(&generator.delete_all(None)?, &SqlParameterSource::new())
            .await?;
        Ok(())
    }

    async fn delete_all_by_path(&self, path: &AggregatePath) -> Result<()> {
        let generator = self.root_generator(path)?;
        self.execute(&generator.delete_all(Some(path))?, &SqlParameterSource::new())
            .await?;
        Ok(())
    }

    async fn acquire_lock_by_id(
        &self,
        id: &Value,
        mode: LockMode,
        entity_type: &str,
    ) -> Result<()> {
        let generator = self.generator(entity_type)?;
        let params = self.parameters().for_id(ID_PARAMETER, id)?;
        self.query(&generator.acquire_lock_by_id(mode)?, &params).await?;
        Ok(())
    }

    async fn acquire_lock_all(&self, mode: LockMode, entity_type: &str) -> Result<()> {
        let generator = self.generator(entity_type)?;
        self.query(&generator.acquire_lock_all(mode)?, &SqlParameterSource::new())
            .await?;
        Ok(())
    }

    async fn count(&self, entity_type: &str) -> Result<u64> {
        let generator = self.generator(entity_type)?;
        let value = self
            .query_for_value(&generator.count()?, &SqlParameterSource::new())
            .await?;
        count_value(&value)
    }

    async fn exists_by_id(&self, id: &Value, entity_type: &str) -> Result<bool> {
        let generator = self.generator(entity_type)?;
        let params = self.parameters().for_id(ID_PARAMETER, id)?;
        let value = self.query_for_value(&generator.exists()?, &params).await?;
        Ok(count_value(&value)? > 0)
    }

    async fn find_by_id(&self, id: &Value, entity_type: &str) -> Result<Option<Record>> {
        let generator = self.generator(entity_type)?;
        let params = self.parameters().for_id(ID_PARAMETER, id)?;
        let mut records = self
            .query_roots(&generator, &generator.find_one()?, &params)
            .await?;
        match records.len() {
            0 => Ok(None),
            1 => Ok(records.pop()),
            actual => Err(DbError::IncorrectResultSize {
                expected: 1,
                actual,
            }),
        }
    }

    async fn find_all(&self, entity_type: &str) -> Result<Vec<Record>> {
        let generator = self.generator(entity_type)?;
        self.query_roots(&generator, &generator.find_all()?, &SqlParameterSource::new())
            .await
    }

    async fn find_all_by_id(&self, ids: &[Value], entity_type: &str) -> Result<Vec<Record>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let generator = self.generator(entity_type)?;
        let params = self.parameters().for_ids(IDS_PARAMETER, ids)?;
        self.query_roots(&generator, &generator.find_all_in_list()?, &params)
            .await
    }

    async fn find_all_by_path(
        &self,
        identifier: &Identifier,
        path: &AggregatePath,
    ) -> Result<Vec<PathElement>> {
        let entity = path.required_leaf_entity()?;
        let generator = self.generator(entity.type_name())?;
        let info = path.table_info()?;
        let key_column = info.qualifier_column.map(|column| column.name);

        let statement = generator.find_all_by_property(
            &identifier.columns(),
            key_column.as_ref(),
            path.is_ordered(),
        )?;
        let params = self.parameters().for_identifier(identifier)?;
        let rows = self.query(&statement, &params).await?;

        let resolver = self.resolver()?;
        let resolver: &dyn DataAccessStrategy = match &resolver {
            Some(resolver) => resolver.as_ref(),
            None => self,
        };
        let reader = AggregateReader::new(self.converter, resolver);
        let parent_keys = ParentKeys::from_identifier(path, identifier)?;

        let mut elements = Vec::with_capacity(rows.len());
        for row in &rows {
            let key = match (&key_column, &info.qualifier_type) {
                (Some(column), Some(key_type)) => {
                    let raw = row.get(column.reference()).cloned().unwrap_or(Value::Null);
                    Some(self.converter.read_value(raw, key_type)?)
                }
                _ => None,
            };
            let keys = match &key {
                Some(key) => parent_keys.clone().with_qualifier(path.clone(), key.clone()),
                None => parent_keys.clone(),
            };
            let record = reader.read_element(path, row, &keys).await?;
            elements.push(PathElement { key, record });
        }
        Ok(elements)
    }

    async fn find_all_sorted(&self, entity_type: &str, sort: &Sort) -> Result<Vec<Record>> {
        let generator = self.generator(entity_type)?;
        self.query_roots(
            &generator,
            &generator.find_all_sorted(sort)?,
            &SqlParameterSource::new(),
        )
        .await
    }

    async fn find_all_paged(&self, entity_type: &str, pageable: &Pageable) -> Result<Vec<Record>> {
        let generator = self.generator(entity_type)?;
        self.query_roots(
            &generator,
            &generator.find_all_paged(pageable)?,
            &SqlParameterSource::new(),
        )
        .await
    }
}

fn count_value(value: &Value) -> Result<u64> {
    match value.as_i64() {
        Some(count) if count >= 0 => Ok(count as u64),
        _ => {
            warn!("Count query returned {}, expected a number", value);
            Err(DbError::TypeMismatch(format!(
                "Expected a row count, got {}",
                value.type_name()
            )))
        }
    }
}
