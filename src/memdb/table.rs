use std::collections::BTreeMap;

use uuid::Uuid;

use crate::core::{DataType, DbError, Result, Value};
use crate::dialect::Dialect;

use super::catalog::TableSchema;

pub type RowId = usize;

/// Rows of one table, stored positionally in schema column order.
#[derive(Debug, Clone)]
pub struct Table {
    schema: TableSchema,
    rows: BTreeMap<RowId, Vec<Value>>,
    next_row_id: RowId,
    next_identity: i64,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            next_row_id: 0,
            next_identity: 1,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = (RowId, &[Value])> {
        self.rows.iter().map(|(id, values)| (*id, values.as_slice()))
    }

    pub fn row(&self, id: RowId) -> Option<&[Value]> {
        self.rows.get(&id).map(Vec::as_slice)
    }

    pub fn required_column(&self, name: &str) -> Result<usize> {
        self.schema.column_index(name).ok_or_else(|| {
            DbError::ExecutionError(format!(
                "Column '{}' does not exist in table '{}'",
                name,
                self.schema.name
            ))
        })
    }

    pub fn contains_value(&self, column: usize, value: &Value) -> bool {
        !value.is_null() && self.rows.values().any(|row| row[column] == *value)
    }

    /// Builds a full row from named values, generating identity values that
    /// were not supplied. Returns the row and the generated keys.
    pub fn prepare_insert(
        &mut self,
        values: Vec<(usize, Value)>,
        dialect: &dyn Dialect,
    ) -> Result<(Vec<Value>, Vec<(String, Value)>)> {
        let mut row = vec![Value::Null; self.schema.columns.len()];
        for (index, value) in values {
            row[index] = value;
        }

        let mut generated = Vec::new();
        let identities: Vec<(usize, DataType)> = self
            .schema
            .identity_columns()
            .map(|(index, column)| (index, column.data_type.clone()))
            .collect();
        for (index, data_type) in identities {
            if row[index].is_null() {
                row[index] = self.next_identity_value(&data_type, dialect)?;
                generated.push((self.schema.columns[index].name.clone(), row[index].clone()));
            }
        }

        self.validate(&row)?;
        Ok((row, generated))
    }

    fn next_identity_value(&mut self, data_type: &DataType, dialect: &dyn Dialect) -> Result<Value> {
        match data_type {
            DataType::Integer => {
                let value = self.next_identity;
                self.next_identity += 1;
                Ok(Value::Integer(value))
            }
            DataType::Uuid | DataType::Text => dialect.write_value(Value::Uuid(Uuid::new_v4())),
            other => Err(DbError::UnsupportedOperation(format!(
                "Cannot generate values of type {} in table '{}'",
                other, self.schema.name
            ))),
        }
    }

    pub fn validate(&self, row: &[Value]) -> Result<()> {
        for (column, value) in self.schema.columns.iter().zip(row) {
            column.validate(value)?;
        }
        Ok(())
    }

    pub fn insert(&mut self, row: Vec<Value>) -> RowId {
        // Explicit ids must not collide with later generated ones.
        for (index, column) in self.schema.columns.iter().enumerate() {
            if column.identity {
                if let Value::Integer(provided) = row[index] {
                    self.next_identity = self.next_identity.max(provided + 1);
                }
            }
        }
        let id = self.next_row_id;
        self.next_row_id += 1;
        self.rows.insert(id, row);
        id
    }

    pub fn replace(&mut self, id: RowId, row: Vec<Value>) -> Result<()> {
        self.validate(&row)?;
        match self.rows.get_mut(&id) {
            Some(existing) => {
                *existing = row;
                Ok(())
            }
            None => Err(DbError::ExecutionError(format!(
                "Row {} vanished from table '{}'",
                id, self.schema.name
            ))),
        }
    }

    pub fn delete(&mut self, ids: &[RowId]) -> usize {
        ids.iter().filter(|id| self.rows.remove(id).is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Column;
    use crate::dialect::{PostgresDialect, SqliteDialect};

    fn schema(id_type: DataType) -> TableSchema {
        TableSchema {
            name: "orders".into(),
            columns: vec![
                Column::new("id", id_type).not_null().identity(),
                Column::new("name", DataType::Text),
            ],
            foreign_keys: Vec::new(),
        }
    }

    #[test]
    fn test_identity_values_skip_provided_ids() -> Result<()> {
        let mut table = Table::new(schema(DataType::Integer));
        let (row, generated) = table.prepare_insert(vec![(0, Value::Integer(5))], &PostgresDialect)?;
        assert!(generated.is_empty());
        table.insert(row);

        let (row, generated) = table.prepare_insert(vec![(1, Value::from("a"))], &PostgresDialect)?;
        assert_eq!(generated, vec![("id".to_string(), Value::Integer(6))]);
        table.insert(row);
        assert_eq!(table.len(), 2);
        Ok(())
    }

    #[test]
    fn test_uuid_identity_is_written_through_dialect() -> Result<()> {
        let mut table = Table::new(schema(DataType::Text));
        let (_, generated) = table.prepare_insert(Vec::new(), &SqliteDialect)?;
        assert!(matches!(generated[0].1, Value::Text(_)));
        Ok(())
    }

    #[test]
    fn test_type_checks() {
        let mut table = Table::new(schema(DataType::Integer));
        let result = table.prepare_insert(vec![(1, Value::Integer(1))], &PostgresDialect);
        assert!(matches!(result, Err(DbError::TypeMismatch(_))));
    }
}
