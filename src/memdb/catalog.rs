//! Table definitions derived from the mapping context.

use std::collections::BTreeMap;

use crate::core::{Column, DataType, Result};
use crate::dialect::{Dialect, ValueConverter};
use crate::mapping::{AggregatePath, RelationalMappingContext, SqlIdentifier};

/// Lookup key of a table or column: the unqualified name, lower cased.
pub fn key_of(identifier: &SqlIdentifier) -> String {
    identifier.reference().to_ascii_lowercase()
}

/// The type a column holds once the dialect's value converters have run.
pub fn physical_type(dialect: &dyn Dialect, data_type: &DataType) -> DataType {
    dialect
        .converters()
        .iter()
        .fold(data_type.clone(), |current, converter| match (converter, &current) {
            (ValueConverter::BooleanToInteger, DataType::Boolean) => DataType::Integer,
            (ValueConverter::TimestampToText, DataType::Timestamp) => DataType::Text,
            (ValueConverter::UuidToText, DataType::Uuid) => DataType::Text,
            _ => current,
        })
}

/// Back-reference from a child table to the id column of its parent table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub column: String,
    pub parent_table: String,
    pub parent_column: String,
}

#[derive(Debug, Clone)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<Column>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn identity_columns(&self) -> impl Iterator<Item = (usize, &Column)> {
        self.columns.iter().enumerate().filter(|(_, c)| c.identity)
    }

    /// Adds `column`, or widens an existing one of the same name: a column
    /// required by one mapping becomes nullable when another allows NULL.
    fn add_column(&mut self, column: Column) {
        match self.column_index(&column.name) {
            Some(index) => {
                let existing = &mut self.columns[index];
                existing.nullable |= column.nullable;
                existing.identity |= column.identity;
            }
            None => self.columns.push(column),
        }
    }

    fn add_foreign_key(&mut self, foreign_key: ForeignKey) {
        if !self.foreign_keys.contains(&foreign_key) {
            self.foreign_keys.push(foreign_key);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    tables: BTreeMap<String, TableSchema>,
}

impl Catalog {
    /// One table per table-owning path of every registered entity.
    ///
    /// An entity reachable along several paths gets the union of the columns
    /// each path needs.
    pub fn from_context(context: &RelationalMappingContext, dialect: &dyn Dialect) -> Result<Self> {
        let mut catalog = Self::default();
        for entity in context.entities() {
            let root = context.root_path(entity.type_name())?;
            catalog.add_path(&root, dialect)?;
            for path in root.entity_paths() {
                catalog.add_path(&path, dialect)?;
            }
        }
        Ok(catalog)
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(&name.to_ascii_lowercase())
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    /// Foreign keys of other tables that point at `table`.
    pub fn referencing(&self, table: &str) -> Vec<(&TableSchema, &ForeignKey)> {
        self.tables
            .values()
            .flat_map(|schema| schema.foreign_keys.iter().map(move |fk| (schema, fk)))
            .filter(|(_, fk)| fk.parent_table.eq_ignore_ascii_case(table))
            .collect()
    }

    fn add_path(&mut self, owner: &AggregatePath, dialect: &dyn Dialect) -> Result<()> {
        let info = owner.table_info()?;
        let key = key_of(&info.qualified_table_name);
        let mut schema = self
            .tables
            .remove(&key)
            .unwrap_or_else(|| TableSchema::new(info.qualified_table_name.reference()));

        for path in owner.descendants() {
            if path.is_entity() || path.table_owning_path() != *owner {
                continue;
            }
            let property = path.required_leaf_property()?;
            let Some(data_type) = property.data_type() else {
                continue;
            };
            let data_type = physical_type(dialect, data_type);
            let mut column = Column::new(key_of(&path.column_info()?.name), data_type.clone());
            if property.is_id() && path.len() == owner.len() + 1 {
                column = column.not_null();
                if property.data_type().is_some_and(DataType::supports_identity) {
                    column = column.identity();
                }
            }
            schema.add_column(column);
        }

        if let Some(reverse) = &info.reverse_column {
            let parent = owner.id_defining_parent_path()?;
            let parent_id = parent
                .leaf_entity()
                .and_then(|e| e.id_property())
                .and_then(|p| p.data_type())
                .map(|t| physical_type(dialect, t))
                .unwrap_or(DataType::Integer);
            schema.add_column(Column::new(key_of(&reverse.name), parent_id));

            let parent_info = parent.table_info()?;
            if let Some(parent_column) = parent_info.id_column {
                schema.add_foreign_key(ForeignKey {
                    column: key_of(&reverse.name),
                    parent_table: key_of(&parent_info.qualified_table_name),
                    parent_column: key_of(&parent_column),
                });
            }

            // Qualifiers of the own collection and of every id-less collection
            // between this table and the id-defining parent.
            let mut current = Some(owner.clone());
            while let Some(path) = current {
                if path.len() <= parent.len() {
                    break;
                }
                let path_info = path.table_info()?;
                if let (Some(qualifier), Some(qualifier_type)) =
                    (path_info.qualifier_column, path_info.qualifier_type)
                {
                    schema.add_column(Column::new(
                        key_of(&qualifier.name),
                        physical_type(dialect, &qualifier_type),
                    ));
                }
                current = path.parent();
            }
        }

        self.tables.insert(key, schema);
        Ok(())
    }
}
