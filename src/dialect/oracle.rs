use super::{
    Dialect, FetchFirstClause, ForUpdateClause, IdGeneration, LimitClause, LockClause,
    ValueConverter,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

struct OracleIdGeneration;

impl IdGeneration for OracleIdGeneration {
    fn driver_requires_key_column_names(&self) -> bool {
        true
    }

    fn sequence_query(&self, sequence: &str) -> Option<String> {
        Some(format!("SELECT {}.nextval FROM DUAL", sequence))
    }
}

impl Dialect for OracleDialect {
    fn name(&self) -> &'static str {
        "Oracle"
    }

    fn limit(&self) -> &'static dyn LimitClause {
        &FetchFirstClause
    }

    fn lock(&self) -> &'static dyn LockClause {
        &ForUpdateClause
    }

    fn id_generation(&self) -> &'static dyn IdGeneration {
        &OracleIdGeneration
    }

    fn converters(&self) -> &'static [ValueConverter] {
        &[ValueConverter::BooleanToInteger]
    }
}
