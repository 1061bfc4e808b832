use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::{DbError, Result, Value};

/// The value held by one property of a [`Record`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum PropertyValue {
    #[default]
    Null,
    Simple(Value),
    Entity(Record),
    List(Vec<Record>),
    Set(Vec<Record>),
    Map(Vec<(Value, Record)>),
}

impl PropertyValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null | Self::Simple(Value::Null))
    }

    /// The simple value, with absent and entity values reading as `Null`.
    pub fn as_value(&self) -> Value {
        match self {
            Self::Simple(value) => value.clone(),
            _ => Value::Null,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Entity(record) => Some(record),
            _ => None,
        }
    }

    pub fn into_record(self) -> Result<Record> {
        match self {
            Self::Entity(record) => Ok(record),
            other => Err(DbError::TypeMismatch(format!(
                "Expected an entity value, got {:?}",
                other
            ))),
        }
    }

    /// The elements of a collection or map value, paired with their qualifier:
    /// the list index, the map key, or nothing for sets and single entities.
    pub fn elements(&self) -> Vec<(Option<Value>, &Record)> {
        match self {
            Self::Null | Self::Simple(_) => Vec::new(),
            Self::Entity(record) => vec![(None, record)],
            Self::List(records) => records
                .iter()
                .enumerate()
                .map(|(idx, record)| (Some(Value::Integer(idx as i64)), record))
                .collect(),
            Self::Set(records) => records.iter().map(|record| (None, record)).collect(),
            Self::Map(entries) => entries
                .iter()
                .map(|(key, record)| (Some(key.clone()), record))
                .collect(),
        }
    }
}

impl From<Value> for PropertyValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            other => Self::Simple(other),
        }
    }
}

impl From<Record> for PropertyValue {
    fn from(record: Record) -> Self {
        Self::Entity(record)
    }
}

/// Dynamic value of one entity instance: its type name and named property values.
///
/// Records have value semantics. Setting a property consumes the record and
/// returns the updated owner.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Record {
    type_name: String,
    properties: BTreeMap<String, PropertyValue>,
}

impl Record {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn with(self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.set(name, value)
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> &PropertyValue {
        const NULL: &PropertyValue = &PropertyValue::Null;
        self.properties.get(name).unwrap_or(NULL)
    }

    pub fn value(&self, name: &str) -> Value {
        self.get(name).as_value()
    }

    pub fn take(&mut self, name: &str) -> PropertyValue {
        self.properties.remove(name).unwrap_or_default()
    }

    pub fn properties(&self) -> impl Iterator<Item = (&String, &PropertyValue)> {
        self.properties.iter()
    }

    /// Reads a value along a chain of property names, descending through
    /// single entity values.
    pub fn get_path(&self, path: &[&str]) -> &PropertyValue {
        const NULL: &PropertyValue = &PropertyValue::Null;
        match path {
            [] => NULL,
            [leaf] => self.get(leaf),
            [head, rest @ ..] => match self.get(head) {
                PropertyValue::Entity(child) => child.get_path(rest),
                _ => NULL,
            },
        }
    }

    /// Sets a value along a chain of property names, rebuilding every owner on
    /// the way. Missing intermediate entities are created empty.
    pub fn set_path(self, path: &[&str], value: PropertyValue) -> Result<Self> {
        match path {
            [] => Err(DbError::IllegalState(
                "Cannot set a value for an empty property path".into(),
            )),
            [leaf] => Ok(self.set(*leaf, value)),
            [head, rest @ ..] => {
                let mut owner = self;
                let child = match owner.take(head) {
                    PropertyValue::Entity(child) => child,
                    PropertyValue::Null => Record::new(""),
                    other => {
                        return Err(DbError::IllegalState(format!(
                            "Property '{}' of '{}' is not a single entity: {:?}",
                            head, owner.type_name, other
                        )));
                    }
                };
                let child = child.set_path(rest, value)?;
                Ok(owner.set(*head, PropertyValue::Entity(child)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_returns_new_owner() {
        let original = Record::new("Order").with("name", Value::from("first"));
        let changed = original.clone().set("name", Value::from("second"));
        assert_eq!(original.value("name"), Value::from("first"));
        assert_eq!(changed.value("name"), Value::from("second"));
    }

    #[test]
    fn test_nested_path_access() -> Result<()> {
        let address = Record::new("Address").with("city", Value::from("Riga"));
        let order = Record::new("Order").with("address", address);

        assert_eq!(
            order.get_path(&["address", "city"]).as_value(),
            Value::from("Riga")
        );

        let order = order.set_path(&["address", "zip"], Value::from("1010").into())?;
        assert_eq!(
            order.get_path(&["address", "zip"]).as_value(),
            Value::from("1010")
        );
        assert_eq!(
            order.get_path(&["address", "city"]).as_value(),
            Value::from("Riga")
        );
        Ok(())
    }

    #[test]
    fn test_elements_carry_qualifiers() {
        let items = PropertyValue::List(vec![Record::new("Item"), Record::new("Item")]);
        let qualifiers: Vec<_> = items.elements().into_iter().map(|(q, _)| q).collect();
        assert_eq!(
            qualifiers,
            vec![Some(Value::Integer(0)), Some(Value::Integer(1))]
        );
        assert!(PropertyValue::Null.elements().is_empty());
    }
}
