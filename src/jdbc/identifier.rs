use std::fmt;

use crate::core::{DataType, DbError, Result, Value};
use crate::mapping::{AggregatePath, SqlIdentifier};

#[derive(Debug, Clone, PartialEq)]
pub struct IdentifierPart {
    pub name: SqlIdentifier,
    pub value: Value,
    pub target_type: Option<DataType>,
}

/// The column values that tie a child row to its parent: the back-reference
/// followed by list indexes and map keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identifier {
    parts: Vec<IdentifierPart>,
}

impl Identifier {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of(name: SqlIdentifier, value: Value, target_type: Option<DataType>) -> Self {
        Self::empty().with_part(name, value, target_type)
    }

    /// Starts an identifier for a row at `path` whose parent has id `id`.
    pub fn for_back_reference(path: &AggregatePath, id: Value) -> Result<Self> {
        let info = path.table_info()?;
        let reverse = info.reverse_column.ok_or_else(|| {
            DbError::IllegalState(format!("Path '{}' has no back-reference column", path))
        })?;
        let target_type = path
            .id_defining_parent_path()?
            .leaf_entity()
            .and_then(|e| e.id_property())
            .and_then(|p| p.data_type().cloned());
        Ok(Self::of(reverse.name, id, target_type))
    }

    /// Adds the qualifier column of `path`.
    pub fn with_qualifier(self, path: &AggregatePath, value: Value) -> Result<Self> {
        let info = path.table_info()?;
        let qualifier = info.qualifier_column.ok_or_else(|| {
            DbError::IllegalState(format!("Path '{}' has no qualifier column", path))
        })?;
        Ok(self.with_part(qualifier.name, value, info.qualifier_type))
    }

    /// Adds or replaces the part named `name`.
    pub fn with_part(mut self, name: SqlIdentifier, value: Value, target_type: Option<DataType>) -> Self {
        let part = IdentifierPart {
            name,
            value,
            target_type,
        };
        match self.parts.iter_mut().find(|p| p.name.matches(&part.name)) {
            Some(existing) => *existing = part,
            None => self.parts.push(part),
        }
        self
    }

    pub fn parts(&self) -> &[IdentifierPart] {
        &self.parts
    }

    pub fn columns(&self) -> Vec<SqlIdentifier> {
        self.parts.iter().map(|p| p.name.clone()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.parts
            .iter()
            .find(|p| p.name.reference().eq_ignore_ascii_case(name))
            .map(|p| &p.value)
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .parts
            .iter()
            .map(|p| format!("{}={}", p.name, p.value))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts_replace_by_name() {
        let identifier = Identifier::of(SqlIdentifier::unquoted("order"), Value::Integer(1), None)
            .with_part(SqlIdentifier::unquoted("order_key"), Value::Integer(0), None)
            .with_part(SqlIdentifier::unquoted("ORDER"), Value::Integer(2), None);

        assert_eq!(identifier.parts().len(), 2);
        assert_eq!(identifier.get("order"), Some(&Value::Integer(2)));
        assert_eq!(identifier.to_string(), "{ORDER=2, order_key=0}");
    }
}
