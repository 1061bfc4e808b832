use super::{
    Dialect, FetchFirstClause, IdGeneration, LimitClause, LockClause, LockMode, LockOptions,
};

#[derive(Debug, Clone, Copy, Default)]
pub struct Db2Dialect;

struct Db2LockClause;

impl LockClause for Db2LockClause {
    fn lock(&self, options: &LockOptions) -> Option<String> {
        Some(
            match options.mode {
                LockMode::PessimisticWrite => "FOR UPDATE WITH RS",
                LockMode::PessimisticRead => "FOR READ ONLY WITH RS",
            }
            .to_string(),
        )
    }
}

struct Db2IdGeneration;

impl IdGeneration for Db2IdGeneration {
    fn sequence_query(&self, sequence: &str) -> Option<String> {
        Some(format!("VALUES NEXT VALUE FOR {}", sequence))
    }
}

impl Dialect for Db2Dialect {
    fn name(&self) -> &'static str {
        "DB2"
    }

    fn limit(&self) -> &'static dyn LimitClause {
        &FetchFirstClause
    }

    fn lock(&self) -> &'static dyn LockClause {
        &Db2LockClause
    }

    fn id_generation(&self) -> &'static dyn IdGeneration {
        &Db2IdGeneration
    }
}
