// ============================================================================
// relmap Library
// ============================================================================

// Lets derived code refer to `::relmap` from inside this crate as well.
extern crate self as relmap;

pub mod config;
pub mod conversion;
pub mod core;
pub mod dialect;
pub mod jdbc;
pub mod mapping;
pub mod memdb;
pub mod sql;

// Re-export main types for convenience
pub use config::RelationalConfig;
pub use core::{DataType, DbError, Result, Row, Value};
pub use dialect::{Dialect, DialectKind};
pub use jdbc::{
    DataAccessStrategy, EntityCallback, EventPublisher, JdbcAggregateTemplate, JdbcOperations,
    Page, RelationalEvent,
};
pub use mapping::{Entity, Persistent, PropertyValue, Record, RelationalMappingContext};
pub use memdb::InMemoryDatabase;
pub use relmap_derive::Entity;
pub use sql::{Direction, Order, Pageable, Sort};
