pub mod context;
pub mod descriptor;
pub mod entity;
pub mod naming;
pub mod path;
pub mod record;

pub use context::{MappingContextBuilder, RelationalMappingContext};
pub use descriptor::{
    CollectionKind, Entity, EntityDescriptor, Persistent, PropertyDescriptor, TypeInfo,
};
pub use entity::{PropertyKind, RelationalPersistentEntity, RelationalPersistentProperty};
pub use naming::{
    DefaultNamingStrategy, IdentifierProcessing, LetterCasing, NamingStrategy, Quoting,
    SqlIdentifier,
};
pub use path::{AggregatePath, ColumnInfo, TableInfo};
pub use record::{PropertyValue, Record};
