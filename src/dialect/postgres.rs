use super::{
    ArraySupport, Dialect, IdGeneration, LimitClause, LimitOffsetClause, LockClause, LockMode,
    LockOptions,
};
use crate::mapping::{IdentifierProcessing, LetterCasing, Quoting};

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

struct PostgresLockClause;

impl LockClause for PostgresLockClause {
    fn lock(&self, options: &LockOptions) -> Option<String> {
        let mode = match options.mode {
            LockMode::PessimisticWrite => "FOR UPDATE",
            LockMode::PessimisticRead => "FOR SHARE",
        };
        Some(format!("{} OF {}", mode, options.table))
    }
}

struct PostgresIdGeneration;

impl IdGeneration for PostgresIdGeneration {
    fn driver_requires_key_column_names(&self) -> bool {
        true
    }

    fn sequence_query(&self, sequence: &str) -> Option<String> {
        Some(format!("SELECT nextval('{}')", sequence))
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn limit(&self) -> &'static dyn LimitClause {
        &LimitOffsetClause
    }

    fn lock(&self) -> &'static dyn LockClause {
        &PostgresLockClause
    }

    fn identifier_processing(&self) -> IdentifierProcessing {
        IdentifierProcessing::new(Quoting::ANSI, LetterCasing::LowerCase)
    }

    fn array_support(&self) -> ArraySupport {
        ArraySupport::Supported
    }

    fn id_generation(&self) -> &'static dyn IdGeneration {
        &PostgresIdGeneration
    }
}
