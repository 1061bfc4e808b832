use super::{
    DefaultIdGeneration, Dialect, IdGeneration, LimitClause, LockClause, LockOptions,
    ValueConverter,
};
use crate::mapping::{IdentifierProcessing, LetterCasing, Quoting};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

struct SqliteLimitClause;

impl LimitClause for SqliteLimitClause {
    fn limit(&self, limit: u64) -> String {
        format!("LIMIT {}", limit)
    }

    fn offset(&self, offset: u64) -> String {
        format!("LIMIT -1 OFFSET {}", offset)
    }

    fn limit_offset(&self, limit: u64, offset: u64) -> String {
        format!("LIMIT {} OFFSET {}", limit, offset)
    }
}

/// SQLite locks the whole database file; there is no row lock syntax.
struct NoLockClause;

impl LockClause for NoLockClause {
    fn lock(&self, _options: &LockOptions) -> Option<String> {
        None
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "SQLite"
    }

    fn limit(&self) -> &'static dyn LimitClause {
        &SqliteLimitClause
    }

    fn lock(&self) -> &'static dyn LockClause {
        &NoLockClause
    }

    fn identifier_processing(&self) -> IdentifierProcessing {
        IdentifierProcessing::new(Quoting::ANSI, LetterCasing::AsIs)
    }

    fn id_generation(&self) -> &'static dyn IdGeneration {
        &DefaultIdGeneration
    }

    fn converters(&self) -> &'static [ValueConverter] {
        &[
            ValueConverter::BooleanToInteger,
            ValueConverter::TimestampToText,
            ValueConverter::UuidToText,
        ]
    }

    fn default_insert_part(&self) -> &'static str {
        " DEFAULT VALUES"
    }
}
