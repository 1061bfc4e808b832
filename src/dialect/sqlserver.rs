use super::{
    Dialect, IdGeneration, LimitClause, LockClause, LockMode, LockOptions, OrderByNullPrecedence,
    Position,
};
use crate::mapping::{IdentifierProcessing, LetterCasing, Quoting};

#[derive(Debug, Clone, Copy, Default)]
pub struct SqlServerDialect;

struct SqlServerLimitClause;

impl LimitClause for SqlServerLimitClause {
    fn limit(&self, limit: u64) -> String {
        format!("OFFSET 0 ROWS FETCH NEXT {} ROWS ONLY", limit)
    }

    fn offset(&self, offset: u64) -> String {
        format!("OFFSET {} ROWS", offset)
    }

    fn limit_offset(&self, limit: u64, offset: u64) -> String {
        format!("OFFSET {} ROWS FETCH NEXT {} ROWS ONLY", offset, limit)
    }
}

struct SqlServerLockClause;

impl LockClause for SqlServerLockClause {
    fn lock(&self, options: &LockOptions) -> Option<String> {
        Some(
            match options.mode {
                LockMode::PessimisticWrite => "WITH (UPDLOCK, ROWLOCK)",
                LockMode::PessimisticRead => "WITH (HOLDLOCK, ROWLOCK)",
            }
            .to_string(),
        )
    }

    fn position(&self) -> Position {
        Position::AfterFromTable
    }
}

struct SqlServerIdGeneration;

impl IdGeneration for SqlServerIdGeneration {
    fn supported_for_batch_operations(&self) -> bool {
        false
    }

    fn sequence_query(&self, sequence: &str) -> Option<String> {
        Some(format!("SELECT NEXT VALUE FOR {}", sequence))
    }
}

impl Dialect for SqlServerDialect {
    fn name(&self) -> &'static str {
        "Microsoft SQL Server"
    }

    fn limit(&self) -> &'static dyn LimitClause {
        &SqlServerLimitClause
    }

    fn lock(&self) -> &'static dyn LockClause {
        &SqlServerLockClause
    }

    fn identifier_processing(&self) -> IdentifierProcessing {
        IdentifierProcessing::new(Quoting::ANSI, LetterCasing::AsIs)
    }

    fn id_generation(&self) -> &'static dyn IdGeneration {
        &SqlServerIdGeneration
    }

    fn order_by_null_precedence(&self) -> OrderByNullPrecedence {
        OrderByNullPrecedence::None
    }

    fn default_insert_part(&self) -> &'static str {
        " DEFAULT VALUES"
    }

    fn paging_requires_order_by(&self) -> bool {
        true
    }
}
