use std::cmp::Ordering;

use async_recursion::async_recursion;

use crate::core::{DbError, Result, Row, Value};
use crate::mapping::{AggregatePath, CollectionKind, PropertyKind, PropertyValue, Record};
use crate::sql::is_selected_with_root;

use super::converter::JdbcConverter;
use super::identifier::Identifier;
use super::strategy::{DataAccessStrategy, PathElement};

/// The values identifying the rows of an entity's children: the id of the
/// nearest ancestor with an id, and the qualifiers collected below it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParentKeys {
    base: Option<Value>,
    qualifiers: Vec<(AggregatePath, Value)>,
}

impl ParentKeys {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn for_id(id: Value) -> Self {
        Self {
            base: Some(id),
            qualifiers: Vec::new(),
        }
    }

    pub fn with_qualifier(mut self, path: AggregatePath, value: Value) -> Self {
        self.qualifiers.push((path, value));
        self
    }

    /// Recovers the keys an identifier for `path` was built from.
    pub fn from_identifier(path: &AggregatePath, identifier: &Identifier) -> Result<Self> {
        let base = identifier.parts().first().map(|part| part.value.clone());
        let id_parent = path.id_defining_parent_path()?;

        let mut qualifiers = Vec::new();
        let mut ancestor = path.parent();
        while let Some(candidate) = ancestor {
            if candidate.len() <= id_parent.len() {
                break;
            }
            if candidate.is_qualified() {
                if let Some(column) = candidate.table_info()?.qualifier_column {
                    if let Some(value) = identifier.get(column.name.reference()) {
                        qualifiers.push((candidate.clone(), value.clone()));
                    }
                }
            }
            ancestor = candidate.parent();
        }
        qualifiers.reverse();
        Ok(Self { base, qualifiers })
    }

    /// The identifier selecting the rows stored at `path`.
    pub fn identifier(&self, path: &AggregatePath) -> Result<Identifier> {
        let base = self.base.clone().ok_or_else(|| {
            DbError::IllegalState(format!("Cannot load '{}' without a parent id", path))
        })?;
        let mut identifier = Identifier::for_back_reference(path, base)?;
        for (qualified, value) in &self.qualifiers {
            identifier = identifier.with_qualifier(qualified, value.clone())?;
        }
        Ok(identifier)
    }
}

/// Builds records from result rows, loading relations that were not part of
/// the row through a [`DataAccessStrategy`].
pub struct AggregateReader<'a> {
    converter: JdbcConverter,
    resolver: &'a dyn DataAccessStrategy,
}

impl<'a> AggregateReader<'a> {
    pub fn new(converter: JdbcConverter, resolver: &'a dyn DataAccessStrategy) -> Self {
        Self {
            converter,
            resolver,
        }
    }

    pub async fn read_root(&self, root: &AggregatePath, row: &Row) -> Result<Record> {
        self.read_entity(root, root, row, &ParentKeys::none()).await
    }

    /// Reads an element stored at `path`, selected through its own entity's table.
    pub async fn read_element(
        &self,
        path: &AggregatePath,
        row: &Row,
        keys: &ParentKeys,
    ) -> Result<Record> {
        let local = AggregatePath::root(path.required_leaf_entity()?.clone());
        self.read_entity(path, &local, row, keys).await
    }

    /// `full` addresses the value within its aggregate, `local` within the
    /// statement the row came from.
    #[async_recursion]
    async fn read_entity(
        &self,
        full: &AggregatePath,
        local: &AggregatePath,
        row: &Row,
        inherited: &ParentKeys,
    ) -> Result<Record> {
        let entity = local.required_leaf_entity()?.clone();
        let mut record = Record::new(entity.type_name());

        let own_id = match entity.id_property() {
            Some(id) => self.read_simple(&local.child(id.name())?, row)?,
            None => Value::Null,
        };
        let child_keys = if own_id.is_null() {
            inherited.clone()
        } else {
            ParentKeys::for_id(own_id)
        };

        for property in entity.properties() {
            let local_child = local.child(property.name())?;
            let full_child = full.child(property.name())?;

            let value = match property.kind() {
                PropertyKind::Simple { .. } => {
                    PropertyValue::from(self.read_simple(&local_child, row)?)
                }
                PropertyKind::Embedded { .. } => {
                    let nested = self
                        .read_entity(&full_child, &local_child, row, &child_keys)
                        .await?;
                    if property.is_nullable() && nested.properties().all(|(_, v)| is_empty(v)) {
                        PropertyValue::Null
                    } else {
                        PropertyValue::Entity(nested)
                    }
                }
                PropertyKind::Entity { .. } if is_selected_with_root(&local_child) => {
                    if self.is_present(&local_child, row)? {
                        PropertyValue::Entity(
                            self.read_entity(&full_child, &local_child, row, &child_keys)
                                .await?,
                        )
                    } else {
                        PropertyValue::Null
                    }
                }
                PropertyKind::Entity { .. } => {
                    let mut elements = self.load(&full_child, &child_keys).await?;
                    match elements.len() {
                        0 => PropertyValue::Null,
                        1 => PropertyValue::Entity(elements.remove(0).record),
                        actual => {
                            return Err(DbError::IncorrectResultSize {
                                expected: 1,
                                actual,
                            });
                        }
                    }
                }
                PropertyKind::Collection { kind, .. } => {
                    let mut elements = self.load(&full_child, &child_keys).await?;
                    match kind {
                        CollectionKind::List => {
                            elements.sort_by(|a, b| {
                                a.key.partial_cmp(&b.key).unwrap_or(Ordering::Equal)
                            });
                            PropertyValue::List(elements.into_iter().map(|e| e.record).collect())
                        }
                        CollectionKind::Set => {
                            PropertyValue::Set(elements.into_iter().map(|e| e.record).collect())
                        }
                    }
                }
                PropertyKind::Map { .. } => {
                    let elements = self.load(&full_child, &child_keys).await?;
                    let entries = elements
                        .into_iter()
                        .map(|element| match element.key {
                            Some(key) if !key.is_null() => Ok((key, element.record)),
                            _ => Err(DbError::IllegalState(format!(
                                "Map element of '{}' has no key",
                                full_child
                            ))),
                        })
                        .collect::<Result<Vec<_>>>()?;
                    PropertyValue::Map(entries)
                }
            };
            record = record.set(property.name(), value);
        }
        Ok(record)
    }

    fn read_simple(&self, path: &AggregatePath, row: &Row) -> Result<Value> {
        let property = path.required_leaf_property()?;
        let Some(data_type) = property.data_type() else {
            return Ok(Value::Null);
        };
        let label = path.column_info()?.alias;
        let raw = row.get(label.reference()).cloned().unwrap_or(Value::Null);
        self.converter.read_value(raw, data_type)
    }

    /// Whether a joined one-to-one child is present in `row`.
    fn is_present(&self, path: &AggregatePath, row: &Row) -> Result<bool> {
        let entity = path.required_leaf_entity()?;
        let label = match entity.id_property() {
            Some(id) => path.child(id.name())?.column_info()?.alias,
            None => match path.table_info()?.reverse_column {
                Some(reverse) => reverse.alias,
                None => return Ok(false),
            },
        };
        Ok(row.get(label.reference()).is_some_and(|v| !v.is_null()))
    }

    async fn load(&self, path: &AggregatePath, keys: &ParentKeys) -> Result<Vec<PathElement>> {
        let identifier = keys.identifier(path)?;
        self.resolver.find_all_by_path(&identifier, path).await
    }
}

fn is_empty(value: &PropertyValue) -> bool {
    match value {
        PropertyValue::Null | PropertyValue::Simple(Value::Null) => true,
        PropertyValue::List(records) | PropertyValue::Set(records) => records.is_empty(),
        PropertyValue::Map(entries) => entries.is_empty(),
        PropertyValue::Entity(record) => record.properties().all(|(_, v)| is_empty(v)),
        PropertyValue::Simple(_) => false,
    }
}
