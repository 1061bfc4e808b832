use super::{
    ArraySupport, Dialect, ForUpdateClause, IdGeneration, LimitClause, LimitOffsetClause,
    LockClause, NextValueForIdGeneration,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct H2Dialect;

#[derive(Debug, Clone, Copy, Default)]
pub struct HsqlDbDialect;

impl Dialect for H2Dialect {
    fn name(&self) -> &'static str {
        "H2"
    }

    fn limit(&self) -> &'static dyn LimitClause {
        &LimitOffsetClause
    }

    fn lock(&self) -> &'static dyn LockClause {
        &ForUpdateClause
    }

    fn array_support(&self) -> ArraySupport {
        ArraySupport::Supported
    }

    fn id_generation(&self) -> &'static dyn IdGeneration {
        &NextValueForIdGeneration
    }
}

struct HsqlDbLimitClause;

impl LimitClause for HsqlDbLimitClause {
    fn limit(&self, limit: u64) -> String {
        format!("LIMIT {}", limit)
    }

    fn offset(&self, offset: u64) -> String {
        format!("OFFSET {}", offset)
    }

    fn limit_offset(&self, limit: u64, offset: u64) -> String {
        format!("OFFSET {} LIMIT {}", offset, limit)
    }
}

struct HsqlDbIdGeneration;

impl IdGeneration for HsqlDbIdGeneration {
    fn sequence_query(&self, sequence: &str) -> Option<String> {
        Some(format!("CALL NEXT VALUE FOR {}", sequence))
    }
}

impl Dialect for HsqlDbDialect {
    fn name(&self) -> &'static str {
        "HSQL Database Engine"
    }

    fn limit(&self) -> &'static dyn LimitClause {
        &HsqlDbLimitClause
    }

    fn lock(&self) -> &'static dyn LockClause {
        &ForUpdateClause
    }

    fn array_support(&self) -> ArraySupport {
        ArraySupport::Supported
    }

    fn id_generation(&self) -> &'static dyn IdGeneration {
        &HsqlDbIdGeneration
    }
}
