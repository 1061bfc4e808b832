//! Execution of aggregate changes and queries against a database.

pub mod converter;
pub mod delegating;
pub mod event;
pub mod execution;
pub mod executor;
pub mod identifier;
pub mod operations;
pub mod parameters;
pub mod reader;
pub mod strategy;
pub mod template;

use std::sync::Arc;

use crate::core::Result;
use crate::dialect::Dialect;
use crate::mapping::RelationalMappingContext;
use crate::sql::SqlGeneratorSource;

pub use converter::{ColumnValue, JdbcConverter};
pub use delegating::DelegatingDataAccessStrategy;
pub use event::{
    CollectingEventPublisher, EntityCallback, EntityCallbacks, EventPublisher,
    NoopEventPublisher, RelationalEvent,
};
pub use execution::JdbcAggregateChangeExecutionContext;
pub use executor::AggregateChangeExecutor;
pub use identifier::{Identifier, IdentifierPart};
pub use operations::{JdbcOperations, KeyHolder};
pub use parameters::{SqlParameterSource, SqlParametersFactory};
pub use reader::{AggregateReader, ParentKeys};
pub use strategy::{DataAccessStrategy, DefaultDataAccessStrategy, PathElement};
pub use template::{JdbcAggregateTemplate, Page};

/// Builds the default strategy behind a delegating one, with relations
/// resolved through the outer strategy.
pub fn create_data_access_strategy(
    context: RelationalMappingContext,
    dialect: &'static dyn Dialect,
    operations: Arc<dyn JdbcOperations>,
) -> Result<Arc<dyn DataAccessStrategy>> {
    let generators = Arc::new(SqlGeneratorSource::new(&context, dialect));
    let outer = Arc::new(DelegatingDataAccessStrategy::new());
    let outer_dyn: Arc<dyn DataAccessStrategy> = outer.clone();
    let inner = DefaultDataAccessStrategy::new(context, generators, operations)
        .with_relation_resolver(Arc::downgrade(&outer_dyn));
    outer.set_delegate(Arc::new(inner))?;
    Ok(outer_dyn)
}
