use std::collections::HashMap;
use std::sync::Arc;

use super::descriptor::{Entity, EntityDescriptor, PropertyDescriptor, TypeInfo};
use super::entity::{PropertyKind, RelationalPersistentEntity, RelationalPersistentProperty};
use super::naming::{DefaultNamingStrategy, NamingStrategy, SqlIdentifier};
use super::path::AggregatePath;
use crate::core::{DataType, DbError, Result};

/// Resolved metadata for every registered entity type.
///
/// Built once through [`MappingContextBuilder`] and immutable afterwards; clones
/// share the same registry.
#[derive(Clone)]
pub struct RelationalMappingContext {
    entities: Arc<HashMap<String, Arc<RelationalPersistentEntity>>>,
    registration_order: Arc<Vec<String>>,
    force_quote: bool,
    schema: Option<String>,
}

impl RelationalMappingContext {
    pub fn builder() -> MappingContextBuilder {
        MappingContextBuilder::new()
    }

    pub fn entity(&self, type_name: &str) -> Option<&Arc<RelationalPersistentEntity>> {
        self.entities.get(type_name)
    }

    pub fn required_entity(&self, type_name: &str) -> Result<&Arc<RelationalPersistentEntity>> {
        self.entity(type_name).ok_or_else(|| {
            DbError::Mapping(format!("No persistent entity registered for '{}'", type_name))
        })
    }

    /// Entities in dependency order: every entity comes after the entities it
    /// references.
    pub fn entities(&self) -> impl Iterator<Item = &Arc<RelationalPersistentEntity>> {
        self.registration_order
            .iter()
            .filter_map(|name| self.entities.get(name))
    }

    pub fn root_path(&self, type_name: &str) -> Result<AggregatePath> {
        Ok(AggregatePath::root(self.required_entity(type_name)?.clone()))
    }

    /// Resolves a dot separated property path such as `items.tags`.
    pub fn aggregate_path(&self, type_name: &str, dot_path: &str) -> Result<AggregatePath> {
        let mut path = self.root_path(type_name)?;
        for segment in dot_path.split('.').filter(|s| !s.is_empty()) {
            path = path.child(segment)?;
        }
        Ok(path)
    }

    pub fn is_force_quote(&self) -> bool {
        self.force_quote
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }
}

pub struct MappingContextBuilder {
    descriptors: Vec<EntityDescriptor>,
    naming: Box<dyn NamingStrategy>,
    force_quote: bool,
    schema: Option<String>,
}

impl Default for MappingContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingContextBuilder {
    pub fn new() -> Self {
        Self {
            descriptors: Vec::new(),
            naming: Box::new(DefaultNamingStrategy),
            force_quote: true,
            schema: None,
        }
    }

    /// Registers an entity type and, transitively, every type it references.
    pub fn entity<T: Entity>(mut self) -> Self {
        self.descriptors.push(T::descriptor());
        self
    }

    pub fn descriptor(mut self, descriptor: EntityDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn naming_strategy(mut self, naming: impl NamingStrategy + 'static) -> Self {
        self.naming = Box::new(naming);
        self
    }

    pub fn force_quote(mut self, force_quote: bool) -> Self {
        self.force_quote = force_quote;
        self
    }

    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn build(self) -> Result<RelationalMappingContext> {
        let mut registry = Registry {
            naming: self.naming.as_ref(),
            force_quote: self.force_quote,
            schema: self.schema.as_deref(),
            entities: HashMap::new(),
            order: Vec::new(),
            in_progress: Vec::new(),
        };

        for descriptor in &self.descriptors {
            registry.register(descriptor)?;
        }

        Ok(RelationalMappingContext {
            entities: Arc::new(registry.entities),
            registration_order: Arc::new(registry.order),
            force_quote: self.force_quote,
            schema: self.schema,
        })
    }
}

struct Registry<'a> {
    naming: &'a dyn NamingStrategy,
    force_quote: bool,
    schema: Option<&'a str>,
    entities: HashMap<String, Arc<RelationalPersistentEntity>>,
    order: Vec<String>,
    in_progress: Vec<String>,
}

impl Registry<'_> {
    fn register(&mut self, descriptor: &EntityDescriptor) -> Result<Arc<RelationalPersistentEntity>> {
        if let Some(existing) = self.entities.get(&descriptor.type_name) {
            return Ok(existing.clone());
        }
        if self.in_progress.contains(&descriptor.type_name) {
            return Err(DbError::Mapping(format!(
                "Cyclic aggregate reference through '{}' ({})",
                descriptor.type_name,
                self.in_progress.join(" -> ")
            )));
        }
        self.in_progress.push(descriptor.type_name.clone());

        let table_name = match &descriptor.table {
            Some(table) => self.explicit(table),
            None => SqlIdentifier::derived(
                self.naming.table_name(&descriptor.type_name),
                self.force_quote,
            ),
        };

        let mut properties = Vec::with_capacity(descriptor.properties.len());
        for property in &descriptor.properties {
            properties.push(self.property(&table_name, property)?);
        }
        validate(&descriptor.type_name, &properties)?;

        let qualified_table_name = match self.schema {
            Some(schema) => table_name.in_schema(schema),
            None => table_name.clone(),
        };

        let entity = Arc::new(RelationalPersistentEntity {
            type_name: descriptor.type_name.clone(),
            table_name,
            qualified_table_name,
            properties,
        });

        self.in_progress.pop();
        self.order.push(descriptor.type_name.clone());
        self.entities
            .insert(descriptor.type_name.clone(), entity.clone());
        Ok(entity)
    }

    fn explicit(&self, name: &str) -> SqlIdentifier {
        if self.force_quote {
            SqlIdentifier::quoted(name)
        } else {
            SqlIdentifier::unquoted(name)
        }
    }

    fn property(
        &mut self,
        owner_table: &SqlIdentifier,
        descriptor: &PropertyDescriptor,
    ) -> Result<RelationalPersistentProperty> {
        let kind = self.kind(descriptor)?;

        let column_name = match &descriptor.column {
            Some(column) => self.explicit(column),
            None => SqlIdentifier::derived(
                self.naming.column_name(&descriptor.name),
                self.force_quote,
            ),
        };
        let key_column = match &descriptor.key_column {
            Some(column) => self.explicit(column),
            None => SqlIdentifier::derived(
                self.naming.key_column(owner_table.reference()),
                self.force_quote,
            ),
        };

        Ok(RelationalPersistentProperty {
            name: descriptor.name.clone(),
            column_name,
            kind,
            nullable: descriptor.type_info.is_nullable(),
            id: descriptor.id,
            version: descriptor.version,
            read_only: descriptor.read_only,
            insert_only: descriptor.insert_only,
            reverse_column: descriptor.id_column.as_deref().map(|c| self.explicit(c)),
            key_column,
            sequence: descriptor.sequence.as_deref().map(|s| self.explicit(s)),
        })
    }

    fn kind(&mut self, descriptor: &PropertyDescriptor) -> Result<PropertyKind> {
        let kind = match &descriptor.type_info {
            TypeInfo::Simple { data_type, .. } => PropertyKind::Simple {
                data_type: data_type.clone(),
            },
            TypeInfo::Entity { descriptor: target, .. } => {
                let target = self.register(&target())?;
                match &descriptor.embedded_prefix {
                    Some(prefix) => PropertyKind::Embedded {
                        target,
                        prefix: prefix.clone(),
                    },
                    None => PropertyKind::Entity { target },
                }
            }
            TypeInfo::Collection { kind, element } => PropertyKind::Collection {
                kind: *kind,
                target: self.element_target(&descriptor.name, element)?,
            },
            TypeInfo::Map { key, element } => PropertyKind::Map {
                key_type: key.clone(),
                target: self.element_target(&descriptor.name, element)?,
            },
        };

        if descriptor.embedded_prefix.is_some() && !matches!(kind, PropertyKind::Embedded { .. }) {
            return Err(DbError::Mapping(format!(
                "Property '{}' is marked embedded but is not a single entity",
                descriptor.name
            )));
        }
        Ok(kind)
    }

    fn element_target(
        &mut self,
        property: &str,
        element: &TypeInfo,
    ) -> Result<Arc<RelationalPersistentEntity>> {
        match element {
            TypeInfo::Entity { descriptor, .. } => self.register(&descriptor()),
            other => Err(DbError::Mapping(format!(
                "Collection property '{}' must hold entities, found {:?}",
                property, other
            ))),
        }
    }
}

fn validate(type_name: &str, properties: &[RelationalPersistentProperty]) -> Result<()> {
    let ids: Vec<_> = properties.iter().filter(|p| p.id).collect();
    if ids.len() > 1 {
        return Err(DbError::Mapping(format!(
            "Entity '{}' declares more than one id property",
            type_name
        )));
    }
    if let Some(id) = ids.first() {
        if id.data_type().is_none() {
            return Err(DbError::Mapping(format!(
                "Id property '{}.{}' must be a simple value",
                type_name, id.name
            )));
        }
    }

    let versions: Vec<_> = properties.iter().filter(|p| p.version).collect();
    if versions.len() > 1 {
        return Err(DbError::Mapping(format!(
            "Entity '{}' declares more than one version property",
            type_name
        )));
    }
    if let Some(version) = versions.first() {
        if version.data_type() != Some(&DataType::Integer) {
            return Err(DbError::Mapping(format!(
                "Version property '{}.{}' must be an integer",
                type_name, version.name
            )));
        }
    }

    Ok(())
}
