use std::sync::Arc;

use tracing::{Instrument, Level, event, info_span};

use crate::conversion::{AggregateChange, ChangeKind};
use crate::core::{DbError, Result};
use crate::mapping::{Record, RelationalMappingContext};

use super::execution::JdbcAggregateChangeExecutionContext;
use super::strategy::DataAccessStrategy;

/// Runs aggregate changes action by action, stopping at the first failure.
#[derive(Clone)]
pub struct AggregateChangeExecutor {
    context: RelationalMappingContext,
    strategy: Arc<dyn DataAccessStrategy>,
}

impl AggregateChangeExecutor {
    pub fn new(context: RelationalMappingContext, strategy: Arc<dyn DataAccessStrategy>) -> Self {
        Self { context, strategy }
    }

    /// Executes a save change and returns the roots with generated ids applied.
    pub async fn execute_save(&self, change: &dyn AggregateChange) -> Result<Vec<Record>> {
        if change.kind() != ChangeKind::Save {
            return Err(DbError::InvalidApiUsage(format!(
                "Expected a save change for '{}'",
                change.entity_type()
            )));
        }
        let span = info_span!("relmap.aggregate.save", entity_type = %change.entity_type());
        async {
            let execution = self.run(change).await?;
            execution.populate_ids_if_necessary()
        }
        .instrument(span)
        .await
    }

    pub async fn execute_delete(&self, change: &dyn AggregateChange) -> Result<()> {
        if change.kind() != ChangeKind::Delete {
            return Err(DbError::InvalidApiUsage(format!(
                "Expected a delete change for '{}'",
                change.entity_type()
            )));
        }
        let span = info_span!("relmap.aggregate.delete", entity_type = %change.entity_type());
        async { self.run(change).await.map(|_| ()) }
            .instrument(span)
            .await
    }

    async fn run(
        &self,
        change: &dyn AggregateChange,
    ) -> Result<JdbcAggregateChangeExecutionContext<'_>> {
        let mut execution =
            JdbcAggregateChangeExecutionContext::new(&self.context, self.strategy.as_ref());
        for action in change.actions() {
            event!(Level::DEBUG, action = %action, "executing aggregate action");
            if let Err(err) = execution.execute(&action).await {
                event!(Level::ERROR, action = %action, error = %err, "aggregate action failed");
                return Err(DbError::for_action(&action, err));
            }
        }
        Ok(execution)
    }
}
