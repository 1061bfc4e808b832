use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{DbError, Result, Value};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Float,
    Text,
    Boolean,
    Timestamp,
    Uuid,
    Array(Box<DataType>),
}

impl DataType {
    pub fn is_compatible(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Integer, Value::Integer(_)) => true,
            (Self::Float, Value::Float(_)) => true,
            (Self::Float, Value::Integer(_)) => true,
            (Self::Text, Value::Text(_)) => true,
            (Self::Boolean, Value::Boolean(_)) => true,
            (Self::Timestamp, Value::Timestamp(_)) => true,
            (Self::Uuid, Value::Uuid(_)) => true,
            (Self::Array(element), Value::Array(values)) => {
                values.iter().all(|v| element.is_compatible(v))
            }
            _ => false,
        }
    }

    /// Types the in-memory store can generate values for.
    pub fn supports_identity(&self) -> bool {
        matches!(self, Self::Integer | Self::Uuid)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Text => write!(f, "TEXT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Timestamp => write!(f, "TIMESTAMP"),
            Self::Uuid => write!(f, "UUID"),
            Self::Array(element) => write!(f, "{}[]", element),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub identity: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            identity: false,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        if matches!(value, Value::Null) {
            if !self.nullable {
                return Err(DbError::ConstraintViolation(format!(
                    "Column '{}' cannot be NULL",
                    self.name
                )));
            }
            return Ok(());
        }

        if !self.data_type.is_compatible(value) {
            return Err(DbError::TypeMismatch(format!(
                "Column '{}' expects type {}, got {}",
                self.name,
                self.data_type,
                value.type_name()
            )));
        }

        Ok(())
    }
}

/// A result row keyed by column label (alias when the query aliased it).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, label: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(label, value);
        self
    }

    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(label.into(), value.into());
    }

    /// Looks up a label exactly first, then ignoring ASCII case.
    pub fn get(&self, label: &str) -> Option<&Value> {
        self.values.get(label).or_else(|| {
            self.values
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(label))
                .map(|(_, value)| value)
        })
    }

    pub fn contains(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// The single value of a one-column row, as returned by scalar queries.
    pub fn single_value(&self) -> Result<&Value> {
        if self.values.len() != 1 {
            return Err(DbError::IncorrectResultSize {
                expected: 1,
                actual: self.values.len(),
            });
        }
        self.values
            .values()
            .next()
            .ok_or(DbError::IncorrectResultSize {
                expected: 1,
                actual: 0,
            })
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_validation() {
        let column = Column::new("name", DataType::Text).not_null();
        assert!(column.validate(&Value::Text("a".into())).is_ok());
        assert!(matches!(
            column.validate(&Value::Null),
            Err(DbError::ConstraintViolation(_))
        ));
        assert!(matches!(
            column.validate(&Value::Integer(1)),
            Err(DbError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_row_lookup_ignores_case() {
        let row = Row::new().with("ORDER_ID", 7i64);
        assert_eq!(row.get("order_id"), Some(&Value::Integer(7)));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_array_compatibility() {
        let tags = DataType::Array(Box::new(DataType::Text));
        assert!(tags.is_compatible(&Value::Array(vec![Value::Text("x".into())])));
        assert!(!tags.is_compatible(&Value::Array(vec![Value::Integer(1)])));
    }
}
