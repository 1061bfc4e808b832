use super::{
    DefaultIdGeneration, Dialect, IdGeneration, LimitClause, LockClause, LockMode, LockOptions,
    NextValueForIdGeneration, OrderByNullPrecedence,
};
use crate::mapping::{IdentifierProcessing, LetterCasing, Quoting};

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

/// MySQL and MariaDB share MySQL's rendering and add sequences.
#[derive(Debug, Clone, Copy, Default)]
pub struct MariaDbDialect;

struct MySqlLimitClause;

impl LimitClause for MySqlLimitClause {
    fn limit(&self, limit: u64) -> String {
        format!("LIMIT {}", limit)
    }

    // MySQL has no OFFSET without LIMIT; the documented workaround is the max row count.
    fn offset(&self, offset: u64) -> String {
        format!("LIMIT {}, 18446744073709551615", offset)
    }

    fn limit_offset(&self, limit: u64, offset: u64) -> String {
        format!("LIMIT {}, {}", offset, limit)
    }
}

struct MySqlLockClause;

impl LockClause for MySqlLockClause {
    fn lock(&self, options: &LockOptions) -> Option<String> {
        Some(
            match options.mode {
                LockMode::PessimisticWrite => "FOR UPDATE",
                LockMode::PessimisticRead => "LOCK IN SHARE MODE",
            }
            .to_string(),
        )
    }
}

const MYSQL_IDENTIFIERS: IdentifierProcessing =
    IdentifierProcessing::new(Quoting::BACKTICK, LetterCasing::LowerCase);

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "MySQL"
    }

    fn limit(&self) -> &'static dyn LimitClause {
        &MySqlLimitClause
    }

    fn lock(&self) -> &'static dyn LockClause {
        &MySqlLockClause
    }

    fn identifier_processing(&self) -> IdentifierProcessing {
        MYSQL_IDENTIFIERS
    }

    fn id_generation(&self) -> &'static dyn IdGeneration {
        &DefaultIdGeneration
    }

    fn order_by_null_precedence(&self) -> OrderByNullPrecedence {
        OrderByNullPrecedence::None
    }

    fn default_insert_part(&self) -> &'static str {
        " VALUES ()"
    }
}

impl Dialect for MariaDbDialect {
    fn name(&self) -> &'static str {
        "MariaDB"
    }

    fn limit(&self) -> &'static dyn LimitClause {
        MySqlDialect.limit()
    }

    fn lock(&self) -> &'static dyn LockClause {
        MySqlDialect.lock()
    }

    fn identifier_processing(&self) -> IdentifierProcessing {
        MYSQL_IDENTIFIERS
    }

    fn id_generation(&self) -> &'static dyn IdGeneration {
        &NextValueForIdGeneration
    }

    fn order_by_null_precedence(&self) -> OrderByNullPrecedence {
        OrderByNullPrecedence::None
    }

    fn default_insert_part(&self) -> &'static str {
        MySqlDialect.default_insert_part()
    }
}
