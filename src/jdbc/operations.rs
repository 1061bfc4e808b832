use async_trait::async_trait;

use crate::core::{DbError, Result, Row, Value};
use crate::sql::SqlStatement;

use super::parameters::SqlParameterSource;

/// Outcome of a statement that may return generated keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyHolder {
    pub rows_affected: u64,
    pub keys: Option<Row>,
}

impl KeyHolder {
    /// The generated value for `column`, or the only value when the driver
    /// returned a single key.
    pub fn key(&self, column: &str) -> Option<&Value> {
        let keys = self.keys.as_ref()?;
        keys.get(column)
            .or_else(|| if keys.len() == 1 { keys.single_value().ok() } else { None })
    }
}

/// Execution of parameterized statements against a database.
#[async_trait]
pub trait JdbcOperations: Send + Sync {
    async fn query(&self, statement: &SqlStatement, params: &SqlParameterSource) -> Result<Vec<Row>>;

    /// Executes a modifying statement and returns the affected row count.
    async fn update(&self, statement: &SqlStatement, params: &SqlParameterSource) -> Result<u64>;

    /// Executes an insert and returns the generated keys. `key_columns` names the
    /// columns to return for drivers that need them spelled out.
    async fn update_returning_keys(
        &self,
        statement: &SqlStatement,
        params: &SqlParameterSource,
        key_columns: Option<&[String]>,
    ) -> Result<KeyHolder>;

    async fn batch_update(
        &self,
        statement: &SqlStatement,
        params: &[SqlParameterSource],
    ) -> Result<Vec<u64>> {
        let mut counts = Vec::with_capacity(params.len());
        for source in params {
            counts.push(self.update(statement, source).await?);
        }
        Ok(counts)
    }

    async fn batch_update_returning_keys(
        &self,
        statement: &SqlStatement,
        params: &[SqlParameterSource],
        key_columns: Option<&[String]>,
    ) -> Result<Vec<KeyHolder>> {
        let mut holders = Vec::with_capacity(params.len());
        for source in params {
            holders.push(self.update_returning_keys(statement, source, key_columns).await?);
        }
        Ok(holders)
    }

    /// Runs a query expected to return exactly one row with one column.
    async fn query_for_value(
        &self,
        statement: &SqlStatement,
        params: &SqlParameterSource,
    ) -> Result<Value> {
        let rows = self.query(statement, params).await?;
        match rows.as_slice() {
            [row] => row.single_value().cloned(),
            other => Err(DbError::IncorrectResultSize {
                expected: 1,
                actual: other.len(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_lookup() {
        let single = KeyHolder {
            rows_affected: 1,
            keys: Some(Row::new().with("GENERATED_KEY", 5i64)),
        };
        assert_eq!(single.key("id"), Some(&Value::Integer(5)));

        let full = KeyHolder {
            rows_affected: 1,
            keys: Some(Row::new().with("ID", 7i64).with("name", "x")),
        };
        assert_eq!(full.key("id"), Some(&Value::Integer(7)));
        assert_eq!(KeyHolder::default().key("id"), None);
    }
}
