use uuid::Uuid;

use crate::core::{DataType, DbError, Result, Value};
use crate::dialect::Dialect;
use crate::mapping::{AggregatePath, Record, SqlIdentifier};

/// A column of an entity's own table with the value a record holds for it.
#[derive(Debug, Clone)]
pub struct ColumnValue {
    pub path: AggregatePath,
    pub name: SqlIdentifier,
    pub value: Value,
}

/// Converts values between records and the database through the dialect.
#[derive(Clone, Copy)]
pub struct JdbcConverter {
    dialect: &'static dyn Dialect,
}

impl JdbcConverter {
    pub fn new(dialect: &'static dyn Dialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &'static dyn Dialect {
        self.dialect
    }

    pub fn write_value(&self, value: Value) -> Result<Value> {
        self.dialect.write_value(value)
    }

    /// Converts a value read from a row into the property's type.
    pub fn read_value(&self, value: Value, target: &DataType) -> Result<Value> {
        let value = self.dialect.read_value(value, target)?;
        let value = match (target, value) {
            (DataType::Float, Value::Integer(i)) => Value::Float(i as f64),
            (DataType::Integer, Value::Float(f)) if f.fract() == 0.0 => Value::Integer(f as i64),
            (DataType::Uuid, Value::Text(s)) => Uuid::parse_str(&s)
                .map(Value::Uuid)
                .map_err(|e| DbError::TypeMismatch(format!("Invalid uuid '{}': {}", s, e)))?,
            (_, value) => value,
        };
        if !target.is_compatible(&value) {
            return Err(DbError::TypeMismatch(format!(
                "Cannot read {} as {}",
                value.type_name(),
                target
            )));
        }
        Ok(value)
    }

    /// Values of every column stored in the table of `root`, embedded columns
    /// included, ready to be bound.
    pub fn column_values(&self, root: &AggregatePath, record: &Record) -> Result<Vec<ColumnValue>> {
        let mut columns = Vec::new();
        for path in root.descendants() {
            if path.is_entity() || path.table_owning_path() != *root {
                continue;
            }
            let names = path.relative_to(root)?;
            let value = record.get_path(&names).as_value();
            let value = self.write_value(value)?;
            columns.push(ColumnValue {
                name: path.column_info()?.name,
                path,
                value,
            });
        }
        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqliteDialect};
    use crate::mapping::{EntityDescriptor, PropertyDescriptor, RelationalMappingContext, TypeInfo};

    #[test]
    fn test_read_value_coerces_numbers() -> Result<()> {
        let converter = JdbcConverter::new(&PostgresDialect);
        assert_eq!(
            converter.read_value(Value::Integer(2), &DataType::Float)?,
            Value::Float(2.0)
        );
        assert!(converter.read_value(Value::Text("x".into()), &DataType::Integer).is_err());
        Ok(())
    }

    #[test]
    fn test_sqlite_booleans_round_trip_as_integers() -> Result<()> {
        let converter = JdbcConverter::new(&SqliteDialect);
        assert_eq!(converter.write_value(Value::Boolean(true))?, Value::Integer(1));
        assert_eq!(
            converter.read_value(Value::Integer(0), &DataType::Boolean)?,
            Value::Boolean(false)
        );
        Ok(())
    }

    fn money() -> EntityDescriptor {
        EntityDescriptor::new("Money")
            .property(PropertyDescriptor::new("amount", TypeInfo::simple(DataType::Integer)))
    }

    #[test]
    fn test_column_values_read_through_embedded() -> Result<()> {
        let context = RelationalMappingContext::builder()
            .descriptor(
                EntityDescriptor::new("Payment")
                    .property(PropertyDescriptor::new("id", TypeInfo::simple(DataType::Integer)).id())
                    .property(PropertyDescriptor::new("total", TypeInfo::entity(money)).embedded("total_")),
            )
            .build()?;
        let root = context.root_path("Payment")?;
        let record = Record::new("Payment")
            .with("id", Value::Integer(1))
            .with("total", Record::new("Money").with("amount", Value::Integer(250)));

        let columns = JdbcConverter::new(&PostgresDialect).column_values(&root, &record)?;
        let names: Vec<_> = columns.iter().map(|c| c.name.reference().to_string()).collect();
        assert_eq!(names, vec!["id", "total_amount"]);
        assert_eq!(columns[1].value, Value::Integer(250));
        Ok(())
    }
}
