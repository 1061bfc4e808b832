//! Compile-time entity metadata.
//!
//! `#[derive(Entity)]` emits an [`EntityDescriptor`] per struct together with the
//! conversions between the struct and its dynamic [`Record`]. Descriptors can also
//! be assembled by hand for record-only models.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;

use chrono::{DateTime, NaiveDateTime, Utc};
use uuid::Uuid;

use super::record::{PropertyValue, Record};
use crate::core::{DataType, DbError, Result, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    List,
    Set,
}

/// Shape of a property type as seen by the mapping.
#[derive(Debug, Clone)]
pub enum TypeInfo {
    Simple {
        data_type: DataType,
        nullable: bool,
    },
    Entity {
        descriptor: fn() -> EntityDescriptor,
        nullable: bool,
    },
    Collection {
        kind: CollectionKind,
        element: Box<TypeInfo>,
    },
    Map {
        key: DataType,
        element: Box<TypeInfo>,
    },
}

impl TypeInfo {
    pub fn simple(data_type: DataType) -> Self {
        Self::Simple {
            data_type,
            nullable: false,
        }
    }

    pub fn entity(descriptor: fn() -> EntityDescriptor) -> Self {
        Self::Entity {
            descriptor,
            nullable: false,
        }
    }

    pub fn list(element: TypeInfo) -> Self {
        Self::Collection {
            kind: CollectionKind::List,
            element: Box::new(element),
        }
    }

    pub fn set(element: TypeInfo) -> Self {
        Self::Collection {
            kind: CollectionKind::Set,
            element: Box::new(element),
        }
    }

    pub fn map(key: DataType, element: TypeInfo) -> Self {
        Self::Map {
            key,
            element: Box::new(element),
        }
    }

    pub fn nullable(self) -> Self {
        match self {
            Self::Simple { data_type, .. } => Self::Simple {
                data_type,
                nullable: true,
            },
            Self::Entity { descriptor, .. } => Self::Entity {
                descriptor,
                nullable: true,
            },
            other => other,
        }
    }

    pub fn is_nullable(&self) -> bool {
        match self {
            Self::Simple { nullable, .. } | Self::Entity { nullable, .. } => *nullable,
            Self::Collection { .. } | Self::Map { .. } => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    pub name: String,
    pub type_info: TypeInfo,
    pub column: Option<String>,
    pub id: bool,
    pub version: bool,
    pub read_only: bool,
    pub insert_only: bool,
    pub embedded_prefix: Option<String>,
    pub id_column: Option<String>,
    pub key_column: Option<String>,
    pub sequence: Option<String>,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<String>, type_info: TypeInfo) -> Self {
        Self {
            name: name.into(),
            type_info,
            column: None,
            id: false,
            version: false,
            read_only: false,
            insert_only: false,
            embedded_prefix: None,
            id_column: None,
            key_column: None,
            sequence: None,
        }
    }

    pub fn id(mut self) -> Self {
        self.id = true;
        self
    }

    pub fn version(mut self) -> Self {
        self.version = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn insert_only(mut self) -> Self {
        self.insert_only = true;
        self
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    /// Stores the nested entity's columns in the owner's table under `prefix`.
    pub fn embedded(mut self, prefix: impl Into<String>) -> Self {
        self.embedded_prefix = Some(prefix.into());
        self
    }

    pub fn id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = Some(column.into());
        self
    }

    pub fn key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = Some(column.into());
        self
    }

    pub fn sequence(mut self, sequence: impl Into<String>) -> Self {
        self.sequence = Some(sequence.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct EntityDescriptor {
    pub type_name: String,
    pub table: Option<String>,
    pub properties: Vec<PropertyDescriptor>,
}

impl EntityDescriptor {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            table: None,
            properties: Vec::new(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }
}

/// A type persisted as an aggregate member.
pub trait Entity: Sized + Send + Sync + 'static {
    fn descriptor() -> EntityDescriptor;

    fn to_record(&self) -> Record;

    fn from_record(record: Record) -> Result<Self>;
}

/// A type that can be stored in a property of an entity.
pub trait Persistent: Sized {
    fn type_info() -> TypeInfo;

    fn to_property(&self) -> PropertyValue;

    fn from_property(value: PropertyValue) -> Result<Self>;
}

fn mismatch<T>(expected: &str, found: &PropertyValue) -> Result<T> {
    Err(DbError::TypeMismatch(format!(
        "Expected {}, got {:?}",
        expected, found
    )))
}

macro_rules! persistent_simple {
    ($ty:ty, $data_type:expr, $variant:ident => $read:expr) => {
        impl Persistent for $ty {
            fn type_info() -> TypeInfo {
                TypeInfo::simple($data_type)
            }

            fn to_property(&self) -> PropertyValue {
                PropertyValue::Simple(Value::from(self.clone()))
            }

            fn from_property(value: PropertyValue) -> Result<Self> {
                match value {
                    PropertyValue::Simple(Value::$variant(inner)) => {
                        let read: fn(_) -> Result<Self> = $read;
                        read(inner)
                    }
                    other => mismatch(stringify!($ty), &other),
                }
            }
        }
    };
}

persistent_simple!(i64, DataType::Integer, Integer => Ok);
persistent_simple!(i32, DataType::Integer, Integer => |v: i64| {
    i32::try_from(v).map_err(|_| DbError::TypeMismatch(format!("{} does not fit into i32", v)))
});
persistent_simple!(String, DataType::Text, Text => Ok);
persistent_simple!(bool, DataType::Boolean, Boolean => Ok);
persistent_simple!(NaiveDateTime, DataType::Timestamp, Timestamp => Ok);
persistent_simple!(Uuid, DataType::Uuid, Uuid => Ok);

impl Persistent for f64 {
    fn type_info() -> TypeInfo {
        TypeInfo::simple(DataType::Float)
    }

    fn to_property(&self) -> PropertyValue {
        PropertyValue::Simple(Value::Float(*self))
    }

    fn from_property(value: PropertyValue) -> Result<Self> {
        match value {
            PropertyValue::Simple(Value::Float(f)) => Ok(f),
            PropertyValue::Simple(Value::Integer(i)) => Ok(i as f64),
            other => mismatch("f64", &other),
        }
    }
}

impl Persistent for DateTime<Utc> {
    fn type_info() -> TypeInfo {
        TypeInfo::simple(DataType::Timestamp)
    }

    fn to_property(&self) -> PropertyValue {
        PropertyValue::Simple(Value::Timestamp(self.naive_utc()))
    }

    fn from_property(value: PropertyValue) -> Result<Self> {
        match value {
            PropertyValue::Simple(Value::Timestamp(ts)) => Ok(ts.and_utc()),
            other => mismatch("DateTime<Utc>", &other),
        }
    }
}

impl<T: Persistent> Persistent for Option<T> {
    fn type_info() -> TypeInfo {
        T::type_info().nullable()
    }

    fn to_property(&self) -> PropertyValue {
        match self {
            Some(value) => value.to_property(),
            None => PropertyValue::Null,
        }
    }

    fn from_property(value: PropertyValue) -> Result<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_property(value).map(Some)
    }
}

fn element_value<T: Persistent>(element: &T) -> Result<Value> {
    match element.to_property() {
        PropertyValue::Simple(value) => Ok(value),
        PropertyValue::Null => Ok(Value::Null),
        other => mismatch("simple array element", &other),
    }
}

fn element_record<T: Persistent>(element: &T) -> Option<Record> {
    match element.to_property() {
        PropertyValue::Entity(record) => Some(record),
        _ => None,
    }
}

fn is_simple<T: Persistent>() -> bool {
    matches!(T::type_info(), TypeInfo::Simple { .. })
}

/// Reads the elements of a collection property, accepting both simple arrays
/// and entity lists or sets.
fn read_elements<T: Persistent>(value: PropertyValue) -> Result<Vec<T>> {
    match value {
        PropertyValue::Null => Ok(Vec::new()),
        PropertyValue::Simple(Value::Array(values)) => values
            .into_iter()
            .map(|v| T::from_property(PropertyValue::from(v)))
            .collect(),
        PropertyValue::List(records) | PropertyValue::Set(records) => records
            .into_iter()
            .map(|r| T::from_property(PropertyValue::Entity(r)))
            .collect(),
        other => mismatch("collection", &other),
    }
}

fn collection_type_info<T: Persistent>(kind: CollectionKind) -> TypeInfo {
    match T::type_info() {
        TypeInfo::Simple { data_type, .. } => TypeInfo::Simple {
            data_type: DataType::Array(Box::new(data_type)),
            nullable: true,
        },
        element => TypeInfo::Collection {
            kind,
            element: Box::new(element),
        },
    }
}

fn collection_property<'a, T: Persistent + 'a>(
    kind: CollectionKind,
    elements: impl Iterator<Item = &'a T>,
) -> PropertyValue {
    if is_simple::<T>() {
        let values = elements.filter_map(|e| element_value(e).ok()).collect();
        return PropertyValue::Simple(Value::Array(values));
    }
    let records = elements.filter_map(element_record).collect();
    match kind {
        CollectionKind::List => PropertyValue::List(records),
        CollectionKind::Set => PropertyValue::Set(records),
    }
}

impl<T: Persistent> Persistent for Vec<T> {
    fn type_info() -> TypeInfo {
        collection_type_info::<T>(CollectionKind::List)
    }

    fn to_property(&self) -> PropertyValue {
        collection_property(CollectionKind::List, self.iter())
    }

    fn from_property(value: PropertyValue) -> Result<Self> {
        read_elements(value)
    }
}

impl<T: Persistent + Ord> Persistent for BTreeSet<T> {
    fn type_info() -> TypeInfo {
        collection_type_info::<T>(CollectionKind::Set)
    }

    fn to_property(&self) -> PropertyValue {
        collection_property(CollectionKind::Set, self.iter())
    }

    fn from_property(value: PropertyValue) -> Result<Self> {
        Ok(read_elements(value)?.into_iter().collect())
    }
}

impl<T: Persistent + Hash + Eq> Persistent for HashSet<T> {
    fn type_info() -> TypeInfo {
        collection_type_info::<T>(CollectionKind::Set)
    }

    fn to_property(&self) -> PropertyValue {
        collection_property(CollectionKind::Set, self.iter())
    }

    fn from_property(value: PropertyValue) -> Result<Self> {
        Ok(read_elements(value)?.into_iter().collect())
    }
}

fn map_key_type<K: Persistent>() -> DataType {
    match K::type_info() {
        TypeInfo::Simple { data_type, .. } => data_type,
        _ => DataType::Text,
    }
}

fn map_property<'a, K: Persistent + 'a, V: Persistent + 'a>(
    entries: impl Iterator<Item = (&'a K, &'a V)>,
) -> PropertyValue {
    PropertyValue::Map(
        entries
            .filter_map(|(k, v)| Some((element_value(k).ok()?, element_record(v)?)))
            .collect(),
    )
}

fn read_map_entries<K: Persistent, V: Persistent>(value: PropertyValue) -> Result<Vec<(K, V)>> {
    match value {
        PropertyValue::Null => Ok(Vec::new()),
        PropertyValue::Map(entries) => entries
            .into_iter()
            .map(|(k, v)| {
                Ok((
                    K::from_property(PropertyValue::from(k))?,
                    V::from_property(PropertyValue::Entity(v))?,
                ))
            })
            .collect(),
        other => mismatch("map", &other),
    }
}

impl<K: Persistent + Ord, V: Persistent> Persistent for BTreeMap<K, V> {
    fn type_info() -> TypeInfo {
        TypeInfo::map(map_key_type::<K>(), V::type_info())
    }

    fn to_property(&self) -> PropertyValue {
        map_property(self.iter())
    }

    fn from_property(value: PropertyValue) -> Result<Self> {
        Ok(read_map_entries(value)?.into_iter().collect())
    }
}

impl<K: Persistent + Hash + Eq + Ord, V: Persistent> Persistent for HashMap<K, V> {
    fn type_info() -> TypeInfo {
        TypeInfo::map(map_key_type::<K>(), V::type_info())
    }

    fn to_property(&self) -> PropertyValue {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        map_property(entries.into_iter())
    }

    fn from_property(value: PropertyValue) -> Result<Self> {
        Ok(read_map_entries(value)?.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_vec_maps_to_array() {
        assert!(matches!(
            Vec::<String>::type_info(),
            TypeInfo::Simple {
                data_type: DataType::Array(_),
                ..
            }
        ));
        let tags = vec!["a".to_string(), "b".to_string()];
        let property = tags.to_property();
        assert_eq!(
            property,
            PropertyValue::Simple(Value::Array(vec![Value::from("a"), Value::from("b")]))
        );
        assert_eq!(Vec::<String>::from_property(property).unwrap(), tags);
    }

    #[test]
    fn test_option_reads_null() {
        assert_eq!(Option::<i64>::from_property(PropertyValue::Null).unwrap(), None);
        assert_eq!(
            Option::<i64>::from_property(PropertyValue::Simple(Value::Integer(4))).unwrap(),
            Some(4)
        );
        assert!(Option::<i64>::type_info().is_nullable());
    }

    #[test]
    fn test_i32_overflow_is_rejected() {
        let result = i32::from_property(PropertyValue::Simple(Value::Integer(i64::MAX)));
        assert!(matches!(result, Err(DbError::TypeMismatch(_))));
    }
}
