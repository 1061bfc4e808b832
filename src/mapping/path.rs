use std::collections::VecDeque;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::entity::{RelationalPersistentEntity, RelationalPersistentProperty};
use super::naming::SqlIdentifier;
use crate::core::{DataType, DbError, Result};

#[derive(Clone)]
struct PathSegment {
    owner: Arc<RelationalPersistentEntity>,
    index: usize,
}

impl PathSegment {
    fn property(&self) -> &RelationalPersistentProperty {
        &self.owner.properties()[self.index]
    }
}

/// A route from an aggregate root through a chain of properties.
///
/// The root path has no segments. Paths are cheap to clone: segments share the
/// entity metadata through `Arc`.
#[derive(Clone)]
pub struct AggregatePath {
    root: Arc<RelationalPersistentEntity>,
    segments: Vec<PathSegment>,
}

/// Table level facts for the table owning a path.
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub qualified_table_name: SqlIdentifier,
    pub table_alias: Option<SqlIdentifier>,
    pub reverse_column: Option<ColumnInfo>,
    pub qualifier_column: Option<ColumnInfo>,
    pub qualifier_type: Option<DataType>,
    pub id_column: Option<SqlIdentifier>,
    /// The id column of a root table, the back-reference of every other table.
    pub effective_id_column: Option<SqlIdentifier>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: SqlIdentifier,
    pub alias: SqlIdentifier,
}

impl AggregatePath {
    pub fn root(entity: Arc<RelationalPersistentEntity>) -> Self {
        Self {
            root: entity,
            segments: Vec::new(),
        }
    }

    pub fn root_entity(&self) -> &Arc<RelationalPersistentEntity> {
        &self.root
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of properties on the path; zero for the root.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn child(&self, property_name: &str) -> Result<Self> {
        let owner = self.required_leaf_entity()?.clone();
        let index = owner.property_index(property_name).ok_or_else(|| {
            DbError::Mapping(format!(
                "No property '{}' on '{}'",
                property_name,
                owner.type_name()
            ))
        })?;
        Ok(self.extend(owner, index))
    }

    fn extend(&self, owner: Arc<RelationalPersistentEntity>, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment { owner, index });
        Self {
            root: self.root.clone(),
            segments,
        }
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            root: self.root.clone(),
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn leaf_property(&self) -> Option<&RelationalPersistentProperty> {
        self.segments.last().map(PathSegment::property)
    }

    pub fn required_leaf_property(&self) -> Result<&RelationalPersistentProperty> {
        self.leaf_property().ok_or_else(|| {
            DbError::IllegalState(format!(
                "The root path of '{}' has no leaf property",
                self.root.type_name()
            ))
        })
    }

    /// The entity at the end of the path: the root entity for the root path,
    /// the property's target otherwise.
    pub fn leaf_entity(&self) -> Option<&Arc<RelationalPersistentEntity>> {
        match self.leaf_property() {
            None => Some(&self.root),
            Some(property) => property.target(),
        }
    }

    pub fn required_leaf_entity(&self) -> Result<&Arc<RelationalPersistentEntity>> {
        self.leaf_entity().ok_or_else(|| {
            DbError::Mapping(format!("Path '{}' does not lead to an entity", self))
        })
    }

    pub fn names(&self) -> Vec<&str> {
        self.segments.iter().map(|s| s.property().name()).collect()
    }

    pub fn dot_path(&self) -> String {
        self.names().join(".")
    }

    pub fn is_entity(&self) -> bool {
        self.leaf_property().is_none_or(RelationalPersistentProperty::is_entity)
    }

    pub fn is_embedded(&self) -> bool {
        self.leaf_property().is_some_and(RelationalPersistentProperty::is_embedded)
    }

    /// True when any property on the path is a collection or map.
    pub fn is_multi_valued(&self) -> bool {
        self.segments.iter().any(|s| s.property().is_collection_like())
    }

    pub fn is_collection_like(&self) -> bool {
        self.leaf_property().is_some_and(RelationalPersistentProperty::is_collection_like)
    }

    pub fn is_qualified(&self) -> bool {
        self.leaf_property().is_some_and(RelationalPersistentProperty::is_qualified)
    }

    pub fn is_ordered(&self) -> bool {
        self.leaf_property().is_some_and(RelationalPersistentProperty::is_ordered)
    }

    pub fn is_map(&self) -> bool {
        self.leaf_property().is_some_and(RelationalPersistentProperty::is_map)
    }

    pub fn has_id_property(&self) -> bool {
        self.leaf_entity().is_some_and(|e| e.has_id_property())
    }

    pub fn starts_with(&self, other: &AggregatePath) -> bool {
        self.root == other.root
            && self.segments.len() >= other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| a.index == b.index && a.owner == b.owner)
    }

    /// Property names leading from `ancestor` to this path.
    pub fn relative_to(&self, ancestor: &AggregatePath) -> Result<Vec<&str>> {
        if !self.starts_with(ancestor) {
            return Err(DbError::IllegalState(format!(
                "'{}' is not an ancestor of '{}'",
                ancestor, self
            )));
        }
        Ok(self.segments[ancestor.len()..]
            .iter()
            .map(|s| s.property().name())
            .collect())
    }

    /// The nearest strict ancestor that is the root or whose entity has an id.
    pub fn id_defining_parent_path(&self) -> Result<Self> {
        let mut parent = self.parent().ok_or_else(|| {
            DbError::IllegalState("The root path has no id defining parent".into())
        })?;
        while !parent.is_root() && !parent.has_id_property() {
            parent = match parent.parent() {
                Some(p) => p,
                None => break,
            };
        }
        Ok(parent)
    }

    /// The nearest ancestor-or-self entity path that is not embedded.
    pub fn table_owning_path(&self) -> Self {
        let mut path = self.clone();
        while !(path.is_entity() && !path.is_embedded()) {
            match path.parent() {
                Some(parent) => path = parent,
                None => break,
            }
        }
        path
    }

    fn table_alias(&self) -> Option<String> {
        if self.is_root() {
            None
        } else {
            Some(self.names().join("_"))
        }
    }

    pub fn table_info(&self) -> Result<TableInfo> {
        let owner = self.table_owning_path();
        let entity = owner.required_leaf_entity()?;

        let table_alias = owner
            .table_alias()
            .map(|alias| entity.table_name().transform(|_| alias.clone()));
        let prefixed = |column: &SqlIdentifier| match &table_alias {
            Some(alias) => column.transform(|name| format!("{}_{}", alias.reference(), name)),
            None => column.clone(),
        };

        let reverse_column = if owner.is_root() {
            None
        } else {
            let property = owner.required_leaf_property()?;
            let name = match property.reverse_column_override() {
                Some(name) => name.clone(),
                None => {
                    let parent = owner.id_defining_parent_path()?;
                    let parent_table = parent.required_leaf_entity()?.table_name().clone();
                    property.column_name().transform(|_| parent_table.reference().to_string())
                }
            };
            Some(ColumnInfo {
                alias: prefixed(&name),
                name,
            })
        };

        let (qualifier_column, qualifier_type) = match owner.leaf_property() {
            Some(property) if property.is_qualified() => (
                Some(ColumnInfo {
                    name: property.key_column().clone(),
                    alias: prefixed(property.key_column()),
                }),
                Some(property.qualifier_type()),
            ),
            _ => (None, None),
        };

        let id_column = entity.id_column().cloned();
        let effective_id_column = if owner.is_root() {
            id_column.clone()
        } else {
            reverse_column.as_ref().map(|c| c.name.clone())
        };

        Ok(TableInfo {
            qualified_table_name: entity.qualified_table_name().clone(),
            table_alias,
            reverse_column,
            qualifier_column,
            qualifier_type,
            id_column,
            effective_id_column,
        })
    }

    /// Column name and alias of a simple property, with embedded prefixes applied.
    pub fn column_info(&self) -> Result<ColumnInfo> {
        let property = self.required_leaf_property()?;
        let mut name = property.column_name().clone();
        let mut path = self.parent();
        while let Some(parent) = path {
            match parent.leaf_property().and_then(|p| p.embedded_prefix()) {
                Some(prefix) => {
                    name = name.transform(|n| format!("{}{}", prefix, n));
                    path = parent.parent();
                }
                None => break,
            }
        }

        let alias = match self.table_owning_path().table_alias() {
            Some(table_alias) => name.transform(|n| format!("{}_{}", table_alias, n)),
            None => name.clone(),
        };
        Ok(ColumnInfo { name, alias })
    }

    /// Every property path below this one, shortest first. Traversal descends
    /// through embedded, entity, collection and map properties.
    pub fn descendants(&self) -> Vec<AggregatePath> {
        let mut result = Vec::new();
        let mut queue = VecDeque::from([self.clone()]);
        while let Some(path) = queue.pop_front() {
            let Some(entity) = path.leaf_entity().cloned() else {
                continue;
            };
            for index in 0..entity.properties().len() {
                let child = path.extend(entity.clone(), index);
                if child.is_entity() {
                    queue.push_back(child.clone());
                }
                result.push(child);
            }
        }
        result
    }

    /// Descendant paths that own a table of their own, shortest first.
    pub fn entity_paths(&self) -> Vec<AggregatePath> {
        self.descendants()
            .into_iter()
            .filter(|p| p.is_entity() && !p.is_embedded())
            .collect()
    }
}

impl PartialEq for AggregatePath {
    fn eq(&self, other: &Self) -> bool {
        self.root == other.root
            && self.segments.len() == other.segments.len()
            && self.starts_with(other)
    }
}

impl Eq for AggregatePath {}

impl Hash for AggregatePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.root.type_name().hash(state);
        for segment in &self.segments {
            segment.owner.type_name().hash(state);
            segment.index.hash(state);
        }
    }
}

impl fmt::Display for AggregatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "{}", self.root.type_name())
        } else {
            write!(f, "{}.{}", self.root.type_name(), self.dot_path())
        }
    }
}

impl fmt::Debug for AggregatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AggregatePath({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::context::RelationalMappingContext;
    use crate::mapping::descriptor::{EntityDescriptor, PropertyDescriptor, TypeInfo};

    fn tag() -> EntityDescriptor {
        EntityDescriptor::new("Tag")
            .property(PropertyDescriptor::new("label", TypeInfo::simple(DataType::Text)))
    }

    fn address() -> EntityDescriptor {
        EntityDescriptor::new("Address")
            .property(PropertyDescriptor::new("street", TypeInfo::simple(DataType::Text)))
    }

    fn item() -> EntityDescriptor {
        EntityDescriptor::new("Item")
            .property(PropertyDescriptor::new("name", TypeInfo::simple(DataType::Text)))
            .property(PropertyDescriptor::new("tags", TypeInfo::set(TypeInfo::entity(tag))))
    }

    fn order() -> EntityDescriptor {
        EntityDescriptor::new("Order")
            .property(PropertyDescriptor::new("id", TypeInfo::simple(DataType::Integer).nullable()).id())
            .property(PropertyDescriptor::new("shipping", TypeInfo::entity(address)).embedded("ship_"))
            .property(PropertyDescriptor::new("items", TypeInfo::list(TypeInfo::entity(item))))
    }

    fn context() -> RelationalMappingContext {
        RelationalMappingContext::builder()
            .descriptor(order())
            .build()
            .unwrap()
    }

    #[test]
    fn test_entity_paths_are_breadth_first() -> Result<()> {
        let root = context().root_path("Order")?;
        let paths: Vec<_> = root.entity_paths().iter().map(|p| p.dot_path()).collect();
        assert_eq!(paths, vec!["items", "items.tags"]);
        Ok(())
    }

    #[test]
    fn test_embedded_columns_are_prefixed() -> Result<()> {
        let street = context().aggregate_path("Order", "shipping.street")?;
        let info = street.column_info()?;
        assert_eq!(info.name.reference(), "ship_street");
        assert_eq!(info.alias.reference(), "ship_street");
        assert_eq!(street.table_owning_path().dot_path(), "");
        Ok(())
    }

    #[test]
    fn test_id_less_parent_is_skipped() -> Result<()> {
        let tags = context().aggregate_path("Order", "items.tags")?;
        assert!(tags.id_defining_parent_path()?.is_root());
        assert!(tags.is_multi_valued());

        let info = tags.table_info()?;
        assert_eq!(info.qualified_table_name.reference(), "tag");
        assert_eq!(info.table_alias.unwrap().reference(), "items_tags");
        assert_eq!(info.reverse_column.unwrap().name.reference(), "order");
        assert!(info.qualifier_column.is_none());
        Ok(())
    }

    #[test]
    fn test_list_table_info() -> Result<()> {
        let items = context().aggregate_path("Order", "items")?;
        let info = items.table_info()?;
        let qualifier = info.qualifier_column.unwrap();
        assert_eq!(qualifier.name.reference(), "order_key");
        assert_eq!(qualifier.alias.reference(), "items_order_key");
        assert_eq!(info.qualifier_type, Some(DataType::Integer));
        assert_eq!(info.effective_id_column.unwrap().reference(), "order");

        let name = items.child("name")?.column_info()?;
        assert_eq!(name.alias.reference(), "items_name");
        Ok(())
    }
}
