use super::{
    DefaultIdGeneration, Dialect, FetchFirstClause, ForUpdateClause, IdGeneration, LimitClause,
    LockClause,
};

/// SQL standard rendering, used when no specific database is known.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnsiDialect;

impl Dialect for AnsiDialect {
    fn name(&self) -> &'static str {
        "ANSI"
    }

    fn limit(&self) -> &'static dyn LimitClause {
        &FetchFirstClause
    }

    fn lock(&self) -> &'static dyn LockClause {
        &ForUpdateClause
    }

    fn id_generation(&self) -> &'static dyn IdGeneration {
        &DefaultIdGeneration
    }
}
