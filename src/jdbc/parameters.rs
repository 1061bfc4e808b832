use std::collections::BTreeMap;

use crate::conversion::IdValueSource;
use crate::core::{DbError, Result, Value};
use crate::mapping::{AggregatePath, Record, SqlIdentifier};
use crate::sql::model::sanitize_bind_name;

use super::converter::JdbcConverter;
use super::identifier::Identifier;

/// Named parameter values bound to a statement's `:name` markers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlParameterSource {
    values: BTreeMap<String, Value>,
}

impl SqlParameterSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.add(name, value);
        self
    }

    /// Adds a value under the bind name derived from `name`.
    pub fn add(&mut self, name: &str, value: impl Into<Value>) {
        self.values.insert(sanitize_bind_name(name), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// The value bound to `name`, failing when nothing was bound.
    pub fn required(&self, name: &str) -> Result<&Value> {
        self.get(name).ok_or_else(|| {
            DbError::InvalidApiUsage(format!("No value supplied for parameter ':{}'", name))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Builds parameter sources for the statements of one entity table.
pub struct SqlParametersFactory<'a> {
    converter: &'a JdbcConverter,
}

impl<'a> SqlParametersFactory<'a> {
    pub fn new(converter: &'a JdbcConverter) -> Self {
        Self { converter }
    }

    /// Parameters of an insert, together with the columns the generated statement
    /// has to add on top of the entity's own ones.
    pub fn for_insert(
        &self,
        root: &AggregatePath,
        record: &Record,
        identifier: &Identifier,
        id_value_source: IdValueSource,
    ) -> Result<(SqlParameterSource, Vec<SqlIdentifier>)> {
        let mut params = SqlParameterSource::new();
        for column in self.converter.column_values(root, record)? {
            let property = column.path.required_leaf_property()?;
            if property.is_read_only() || (property.is_id() && column.path.len() == 1) {
                continue;
            }
            params.add(column.name.reference(), column.value);
        }

        let mut additional = Vec::new();
        for part in identifier.parts() {
            params.add(part.name.reference(), self.converter.write_value(part.value.clone())?);
            additional.push(part.name.clone());
        }

        if id_value_source == IdValueSource::Provided {
            let entity = root.required_leaf_entity()?;
            if let (Some(id), Some(column)) = (entity.id_property(), entity.id_column()) {
                let value = self.converter.write_value(record.value(id.name()))?;
                params.add(column.reference(), value);
                additional.push(column.clone());
            }
        }
        Ok((params, additional))
    }

    /// Parameters of an update: every writable column plus the id.
    pub fn for_update(&self, root: &AggregatePath, record: &Record) -> Result<SqlParameterSource> {
        let mut params = SqlParameterSource::new();
        for column in self.converter.column_values(root, record)? {
            if column.path.required_leaf_property()?.is_read_only() {
                continue;
            }
            params.add(column.name.reference(), column.value);
        }

        let entity = root.required_leaf_entity()?;
        if let (Some(id), Some(column)) = (entity.id_property(), entity.id_column()) {
            let value = self.converter.write_value(record.value(id.name()))?;
            params.add(column.reference(), value);
        }
        Ok(params)
    }

    pub fn for_id(&self, name: &str, id: &Value) -> Result<SqlParameterSource> {
        let mut params = SqlParameterSource::new();
        params.add(name, self.converter.write_value(id.clone())?);
        Ok(params)
    }

    pub fn for_ids(&self, name: &str, ids: &[Value]) -> Result<SqlParameterSource> {
        let values = ids
            .iter()
            .map(|id| self.converter.write_value(id.clone()))
            .collect::<Result<Vec<_>>>()?;
        let mut params = SqlParameterSource::new();
        params.add(name, Value::Array(values));
        Ok(params)
    }

    pub fn for_identifier(&self, identifier: &Identifier) -> Result<SqlParameterSource> {
        let mut params = SqlParameterSource::new();
        for part in identifier.parts() {
            params.add(part.name.reference(), self.converter.write_value(part.value.clone())?);
        }
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_sanitized() {
        let params = SqlParameterSource::new()
            .with("order-key", 1i64)
            .with("name", "a");
        assert_eq!(params.get("orderkey"), Some(&Value::Integer(1)));
        assert!(params.required("missing").is_err());
        assert_eq!(params.len(), 2);
    }
}
