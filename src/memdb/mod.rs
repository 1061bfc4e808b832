//! An in-memory database that executes generated statements directly.
//!
//! Statements are evaluated from their structured model, never parsed from
//! SQL text, so any dialect can be paired with it. Tables, identity columns
//! and foreign keys come from the mapping context. Foreign keys are enforced
//! with restrict semantics, which makes the delete order of aggregate changes
//! observable.

pub mod catalog;
mod dml;
mod query;
pub mod sort;
pub mod table;

use std::collections::HashMap;

use async_trait::async_trait;
use log::debug;
use tokio::sync::RwLock;

use crate::core::{DbError, Result, Row, Value};
use crate::dialect::Dialect;
use crate::jdbc::{JdbcOperations, KeyHolder, SqlParameterSource};
use crate::mapping::{RelationalMappingContext, SqlIdentifier};
use crate::sql::{SqlStatement, Statement};

pub use catalog::{Catalog, ForeignKey, TableSchema};
pub use table::Table;

use catalog::key_of;
use query::Evaluator;

pub(crate) struct Storage {
    catalog: Catalog,
    tables: HashMap<String, Table>,
    sequences: HashMap<String, i64>,
}

impl Storage {
    fn new(catalog: Catalog) -> Self {
        let tables = catalog
            .tables()
            .map(|schema| (schema.name.to_ascii_lowercase(), Table::new(schema.clone())))
            .collect();
        Self {
            catalog,
            tables,
            sequences: HashMap::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn table(&self, name: &SqlIdentifier) -> Result<&Table> {
        self.table_by_key(&key_of(name))
    }

    pub fn table_by_key(&self, name: &str) -> Result<&Table> {
        self.tables
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| DbError::ExecutionError(format!("Table '{}' does not exist", name)))
    }

    pub fn table_mut(&mut self, name: &SqlIdentifier) -> Result<&mut Table> {
        self.tables
            .get_mut(&key_of(name))
            .ok_or_else(|| DbError::ExecutionError(format!("Table '{}' does not exist", name)))
    }

    fn next_value(&mut self, sequence: &SqlIdentifier) -> Value {
        let current = self.sequences.entry(key_of(sequence)).or_insert(0);
        *current += 1;
        Value::Integer(*current)
    }
}

pub struct InMemoryDatabase {
    dialect: &'static dyn Dialect,
    storage: RwLock<Storage>,
}

impl InMemoryDatabase {
    pub fn new(context: &RelationalMappingContext, dialect: &'static dyn Dialect) -> Result<Self> {
        let catalog = Catalog::from_context(context, dialect)?;
        debug!(
            "memdb: created {} tables for the {} dialect",
            catalog.tables().count(),
            dialect.name()
        );
        Ok(Self {
            dialect,
            storage: RwLock::new(Storage::new(catalog)),
        })
    }

    pub fn dialect(&self) -> &'static dyn Dialect {
        self.dialect
    }

    pub async fn table_names(&self) -> Vec<String> {
        let storage = self.storage.read().await;
        let mut names: Vec<String> = storage.tables.values().map(|t| t.name().to_string()).collect();
        names.sort();
        names
    }

    pub async fn row_count(&self, table: &str) -> Result<usize> {
        Ok(self.storage.read().await.table_by_key(table)?.len())
    }

    /// Every row of `table`, keyed by column name.
    pub async fn rows(&self, table: &str) -> Result<Vec<Row>> {
        let storage = self.storage.read().await;
        let table = storage.table_by_key(table)?;
        let columns = &table.schema().columns;
        Ok(table
            .rows()
            .map(|(_, values)| {
                columns
                    .iter()
                    .zip(values)
                    .map(|(column, value)| (column.name.clone(), value.clone()))
                    .collect()
            })
            .collect())
    }

    async fn execute(
        &self,
        statement: &SqlStatement,
        params: &SqlParameterSource,
        key_columns: Option<&[String]>,
    ) -> Result<KeyHolder> {
        debug!("memdb: {}", statement.sql);
        let mut storage = self.storage.write().await;
        let rows_affected = match statement.model.as_ref() {
            Statement::Insert(insert) => {
                return dml::insert(&mut storage, insert, params, self.dialect, key_columns);
            }
            Statement::Update(update) => dml::update(&mut storage, update, params)?,
            Statement::Delete(delete) => dml::delete(&mut storage, delete, params)?,
            Statement::Select(_) | Statement::NextSequenceValue(_) => {
                return Err(DbError::InvalidApiUsage(format!(
                    "Not a modifying statement: {}",
                    statement.sql
                )));
            }
        };
        Ok(KeyHolder {
            rows_affected,
            keys: None,
        })
    }
}

#[async_trait]
impl JdbcOperations for InMemoryDatabase {
    async fn query(&self, statement: &SqlStatement, params: &SqlParameterSource) -> Result<Vec<Row>> {
        debug!("memdb: {}", statement.sql);
        match statement.model.as_ref() {
            Statement::Select(select) => {
                let storage = self.storage.read().await;
                Evaluator::new(&storage, params).select(select)
            }
            Statement::NextSequenceValue(sequence) => {
                let value = self.storage.write().await.next_value(sequence);
                Ok(vec![Row::new().with("nextval", value)])
            }
            _ => Err(DbError::InvalidApiUsage(format!(
                "Not a query: {}",
                statement.sql
            ))),
        }
    }

    async fn update(&self, statement: &SqlStatement, params: &SqlParameterSource) -> Result<u64> {
        Ok(self.execute(statement, params, None).await?.rows_affected)
    }

    async fn update_returning_keys(
        &self,
        statement: &SqlStatement,
        params: &SqlParameterSource,
        key_columns: Option<&[String]>,
    ) -> Result<KeyHolder> {
        self.execute(statement, params, key_columns).await
    }
}
