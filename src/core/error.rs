use thiserror::Error;

use crate::conversion::DbAction;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Invalid data access API usage: {0}")]
    InvalidApiUsage(String),

    #[error("Incorrect update semantics: {0}")]
    IncorrectUpdateSemantics(String),

    #[error("Optimistic locking failure: {0}")]
    OptimisticLockingFailure(String),

    #[error("Incorrect result size: expected {expected}, actual {actual}")]
    IncorrectResultSize { expected: usize, actual: usize },

    #[error("Failed to execute {action}")]
    ActionExecution {
        action: Box<DbAction>,
        #[source]
        source: Box<DbError>,
    },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

impl DbError {
    /// Wraps a failure raised while interpreting `action`.
    ///
    /// Optimistic locking failures are returned unchanged so callers can match
    /// on them directly and retry with a re-read aggregate.
    pub fn for_action(action: &DbAction, source: DbError) -> Self {
        match source {
            failure @ Self::OptimisticLockingFailure(_) => failure,
            other => Self::ActionExecution {
                action: Box::new(action.clone()),
                source: Box::new(other),
            },
        }
    }

    /// Returns the innermost error, looking through action wrappers.
    pub fn root_cause(&self) -> &DbError {
        match self {
            Self::ActionExecution { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_optimistic_locking_failure(&self) -> bool {
        matches!(self.root_cause(), Self::OptimisticLockingFailure(_))
    }

    pub fn is_incorrect_update_semantics(&self) -> bool {
        matches!(self.root_cause(), Self::IncorrectUpdateSemantics(_))
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::{DbAction, DeleteAllRoot};

    fn sample_action() -> DbAction {
        DbAction::DeleteAllRoot(DeleteAllRoot {
            entity_type: "order".to_string(),
        })
    }

    #[test]
    fn test_wraps_failures_with_action() {
        let wrapped = DbError::for_action(
            &sample_action(),
            DbError::ExecutionError("boom".into()),
        );
        match &wrapped {
            DbError::ActionExecution { action, source } => {
                assert!(matches!(**action, DbAction::DeleteAllRoot(_)));
                assert!(matches!(**source, DbError::ExecutionError(_)));
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(wrapped.root_cause(), DbError::ExecutionError(_)));
    }

    #[test]
    fn test_optimistic_locking_is_not_wrapped() {
        let failure = DbError::for_action(
            &sample_action(),
            DbError::OptimisticLockingFailure("stale".into()),
        );
        assert!(matches!(failure, DbError::OptimisticLockingFailure(_)));
        assert!(failure.is_optimistic_locking_failure());
    }
}
