use std::fmt;
use std::sync::Arc;

use super::descriptor::CollectionKind;
use super::naming::SqlIdentifier;
use crate::core::DataType;

/// What a persistent property holds, with entity targets already resolved.
#[derive(Clone)]
pub enum PropertyKind {
    Simple {
        data_type: DataType,
    },
    Entity {
        target: Arc<RelationalPersistentEntity>,
    },
    Embedded {
        target: Arc<RelationalPersistentEntity>,
        prefix: String,
    },
    Collection {
        kind: CollectionKind,
        target: Arc<RelationalPersistentEntity>,
    },
    Map {
        key_type: DataType,
        target: Arc<RelationalPersistentEntity>,
    },
}

impl fmt::Debug for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple { data_type } => write!(f, "Simple({})", data_type),
            Self::Entity { target } => write!(f, "Entity({})", target.type_name()),
            Self::Embedded { target, prefix } => {
                write!(f, "Embedded({}, prefix={:?})", target.type_name(), prefix)
            }
            Self::Collection { kind, target } => {
                write!(f, "{:?}({})", kind, target.type_name())
            }
            Self::Map { key_type, target } => {
                write!(f, "Map({} -> {})", key_type, target.type_name())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelationalPersistentProperty {
    pub(crate) name: String,
    pub(crate) column_name: SqlIdentifier,
    pub(crate) kind: PropertyKind,
    pub(crate) nullable: bool,
    pub(crate) id: bool,
    pub(crate) version: bool,
    pub(crate) read_only: bool,
    pub(crate) insert_only: bool,
    pub(crate) reverse_column: Option<SqlIdentifier>,
    pub(crate) key_column: SqlIdentifier,
    pub(crate) sequence: Option<SqlIdentifier>,
}

impl RelationalPersistentProperty {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_name(&self) -> &SqlIdentifier {
        &self.column_name
    }

    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn is_id(&self) -> bool {
        self.id
    }

    pub fn is_version(&self) -> bool {
        self.version
    }

    /// Read-only columns are never written.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Insert-only columns are excluded from updates.
    pub fn is_insert_only(&self) -> bool {
        self.insert_only
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self.kind, PropertyKind::Embedded { .. })
    }

    /// True for every property whose value is an entity or holds entities,
    /// embedded ones included.
    pub fn is_entity(&self) -> bool {
        !matches!(self.kind, PropertyKind::Simple { .. })
    }

    pub fn is_collection_like(&self) -> bool {
        matches!(
            self.kind,
            PropertyKind::Collection { .. } | PropertyKind::Map { .. }
        )
    }

    /// Lists and maps need a qualifier column to identify their elements.
    pub fn is_qualified(&self) -> bool {
        self.is_ordered() || self.is_map()
    }

    pub fn is_ordered(&self) -> bool {
        matches!(
            self.kind,
            PropertyKind::Collection {
                kind: CollectionKind::List,
                ..
            }
        )
    }

    pub fn is_map(&self) -> bool {
        matches!(self.kind, PropertyKind::Map { .. })
    }

    pub fn data_type(&self) -> Option<&DataType> {
        match &self.kind {
            PropertyKind::Simple { data_type } => Some(data_type),
            _ => None,
        }
    }

    pub fn target(&self) -> Option<&Arc<RelationalPersistentEntity>> {
        match &self.kind {
            PropertyKind::Simple { .. } => None,
            PropertyKind::Entity { target }
            | PropertyKind::Embedded { target, .. }
            | PropertyKind::Collection { target, .. }
            | PropertyKind::Map { target, .. } => Some(target),
        }
    }

    pub fn embedded_prefix(&self) -> Option<&str> {
        match &self.kind {
            PropertyKind::Embedded { prefix, .. } => Some(prefix),
            _ => None,
        }
    }

    /// Data type of the qualifier column: the map key type, or an integer index.
    pub fn qualifier_type(&self) -> DataType {
        match &self.kind {
            PropertyKind::Map { key_type, .. } => key_type.clone(),
            _ => DataType::Integer,
        }
    }

    /// An explicitly configured back-reference column, if any.
    pub fn reverse_column_override(&self) -> Option<&SqlIdentifier> {
        self.reverse_column.as_ref()
    }

    pub fn key_column(&self) -> &SqlIdentifier {
        &self.key_column
    }

    pub fn sequence(&self) -> Option<&SqlIdentifier> {
        self.sequence.as_ref()
    }
}

#[derive(Debug, Clone)]
pub struct RelationalPersistentEntity {
    pub(crate) type_name: String,
    pub(crate) table_name: SqlIdentifier,
    pub(crate) qualified_table_name: SqlIdentifier,
    pub(crate) properties: Vec<RelationalPersistentProperty>,
}

impl RelationalPersistentEntity {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn table_name(&self) -> &SqlIdentifier {
        &self.table_name
    }

    /// The table name including the configured schema.
    pub fn qualified_table_name(&self) -> &SqlIdentifier {
        &self.qualified_table_name
    }

    pub fn properties(&self) -> &[RelationalPersistentProperty] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&RelationalPersistentProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    pub fn id_property(&self) -> Option<&RelationalPersistentProperty> {
        self.properties.iter().find(|p| p.id)
    }

    pub fn has_id_property(&self) -> bool {
        self.id_property().is_some()
    }

    pub fn version_property(&self) -> Option<&RelationalPersistentProperty> {
        self.properties.iter().find(|p| p.version)
    }

    pub fn has_version_property(&self) -> bool {
        self.version_property().is_some()
    }

    pub fn id_column(&self) -> Option<&SqlIdentifier> {
        self.id_property().map(|p| &p.column_name)
    }
}

impl PartialEq for RelationalPersistentEntity {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
    }
}

impl Eq for RelationalPersistentEntity {}
