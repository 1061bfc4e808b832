//! Per-database rendering policies.
//!
//! Every dialect is a stateless unit struct with a `'static` instance; the
//! provided methods on [`Dialect`] compose limit and lock fragments according to
//! the positions the dialect declares for them.

mod ansi;
mod db2;
mod h2;
mod mysql;
mod oracle;
mod postgres;
mod resolver;
mod sqlite;
mod sqlserver;

pub use ansi::AnsiDialect;
pub use db2::Db2Dialect;
pub use h2::{H2Dialect, HsqlDbDialect};
pub use mysql::{MariaDbDialect, MySqlDialect};
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use resolver::DialectKind;
pub use sqlite::SqliteDialect;
pub use sqlserver::SqlServerDialect;

use chrono::NaiveDateTime;
use uuid::Uuid;

use crate::core::{DataType, DbError, Result, Value};
use crate::mapping::IdentifierProcessing;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    PessimisticRead,
    PessimisticWrite,
}

/// Where a clause goes in a SELECT statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    AfterFromTable,
    AfterOrderBy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockOptions {
    pub mode: LockMode,
    /// Rendered name of the locked table.
    pub table: String,
}

pub trait LimitClause: Send + Sync {
    fn limit(&self, limit: u64) -> String;

    fn offset(&self, offset: u64) -> String;

    fn limit_offset(&self, limit: u64, offset: u64) -> String;

    fn position(&self) -> Position {
        Position::AfterOrderBy
    }
}

pub trait LockClause: Send + Sync {
    /// The lock fragment, or `None` when the database has no lock syntax.
    fn lock(&self, options: &LockOptions) -> Option<String>;

    fn position(&self) -> Position {
        Position::AfterOrderBy
    }
}

pub trait IdGeneration: Send + Sync {
    /// Whether generated keys must be requested by explicit column name.
    fn driver_requires_key_column_names(&self) -> bool {
        false
    }

    fn supported_for_batch_operations(&self) -> bool {
        true
    }

    /// Query returning the next value of `sequence`, if sequences are supported.
    fn sequence_query(&self, _sequence: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArraySupport {
    Supported,
    Unsupported,
}

impl ArraySupport {
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Supported)
    }
}

/// How NULL ordering is spelled in ORDER BY items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderByNullPrecedence {
    SqlStandard,
    None,
}

impl OrderByNullPrecedence {
    pub fn render(&self, nulls: NullHandling) -> &'static str {
        match (self, nulls) {
            (Self::None, _) | (_, NullHandling::Native) => "",
            (Self::SqlStandard, NullHandling::NullsFirst) => " NULLS FIRST",
            (Self::SqlStandard, NullHandling::NullsLast) => " NULLS LAST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NullHandling {
    #[default]
    Native,
    NullsFirst,
    NullsLast,
}

/// Value conversions a dialect applies between driver and entity values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueConverter {
    BooleanToInteger,
    TimestampToText,
    UuidToText,
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

impl ValueConverter {
    pub fn write(&self, value: Value) -> Value {
        match (self, value) {
            (Self::BooleanToInteger, Value::Boolean(b)) => Value::Integer(i64::from(b)),
            (Self::TimestampToText, Value::Timestamp(ts)) => {
                Value::Text(ts.format(TIMESTAMP_FORMAT).to_string())
            }
            (Self::UuidToText, Value::Uuid(u)) => Value::Text(u.to_string()),
            (_, other) => other,
        }
    }

    pub fn read(&self, value: Value, target: &DataType) -> Result<Value> {
        match (self, value, target) {
            (Self::BooleanToInteger, Value::Integer(i), DataType::Boolean) => {
                Ok(Value::Boolean(i != 0))
            }
            (Self::TimestampToText, Value::Text(s), DataType::Timestamp) => {
                NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT)
                    .map(Value::Timestamp)
                    .map_err(|e| DbError::TypeMismatch(format!("Invalid timestamp '{}': {}", s, e)))
            }
            (Self::UuidToText, Value::Text(s), DataType::Uuid) => Uuid::parse_str(&s)
                .map(Value::Uuid)
                .map_err(|e| DbError::TypeMismatch(format!("Invalid uuid '{}': {}", s, e))),
            (_, other, _) => Ok(other),
        }
    }
}

pub trait Dialect: Send + Sync {
    fn name(&self) -> &'static str;

    fn limit(&self) -> &'static dyn LimitClause;

    fn lock(&self) -> &'static dyn LockClause;

    fn identifier_processing(&self) -> IdentifierProcessing {
        IdentifierProcessing::ANSI
    }

    fn array_support(&self) -> ArraySupport {
        ArraySupport::Unsupported
    }

    fn id_generation(&self) -> &'static dyn IdGeneration;

    fn converters(&self) -> &'static [ValueConverter] {
        &[]
    }

    fn order_by_null_precedence(&self) -> OrderByNullPrecedence {
        OrderByNullPrecedence::SqlStandard
    }

    /// Text following `INSERT INTO <table>` when no column is written.
    fn default_insert_part(&self) -> &'static str {
        " VALUES (DEFAULT)"
    }

    /// Whether paging requires an ORDER BY, which is then synthesised.
    fn paging_requires_order_by(&self) -> bool {
        false
    }

    fn render_after_from_table(&self, lock: Option<&LockOptions>) -> String {
        let mut sql = String::new();
        if let Some(options) = lock {
            if self.lock().position() == Position::AfterFromTable {
                if let Some(clause) = self.lock().lock(options) {
                    sql.push(' ');
                    sql.push_str(&clause);
                }
            }
        }
        sql
    }

    fn render_after_order_by(
        &self,
        limit: Option<u64>,
        offset: Option<u64>,
        lock: Option<&LockOptions>,
    ) -> String {
        let mut sql = String::new();
        if self.limit().position() == Position::AfterOrderBy {
            let clause = match (limit, offset) {
                (Some(limit), Some(offset)) => Some(self.limit().limit_offset(limit, offset)),
                (Some(limit), None) => Some(self.limit().limit(limit)),
                (None, Some(offset)) => Some(self.limit().offset(offset)),
                (None, None) => None,
            };
            if let Some(clause) = clause {
                sql.push(' ');
                sql.push_str(&clause);
            }
        }
        if let Some(options) = lock {
            if self.lock().position() == Position::AfterOrderBy {
                if let Some(clause) = self.lock().lock(options) {
                    sql.push(' ');
                    sql.push_str(&clause);
                }
            }
        }
        sql
    }

    fn write_value(&self, value: Value) -> Result<Value> {
        if matches!(value, Value::Array(_)) && !self.array_support().is_supported() {
            return Err(DbError::UnsupportedOperation(format!(
                "{} does not support array columns",
                self.name()
            )));
        }
        Ok(self
            .converters()
            .iter()
            .fold(value, |value, converter| converter.write(value)))
    }

    fn read_value(&self, value: Value, target: &DataType) -> Result<Value> {
        self.converters()
            .iter()
            .try_fold(value, |value, converter| converter.read(value, target))
    }
}

/// LIMIT/OFFSET spelling shared by several dialects.
pub(crate) struct LimitOffsetClause;

impl LimitClause for LimitOffsetClause {
    fn limit(&self, limit: u64) -> String {
        format!("LIMIT {}", limit)
    }

    fn offset(&self, offset: u64) -> String {
        format!("OFFSET {}", offset)
    }

    fn limit_offset(&self, limit: u64, offset: u64) -> String {
        format!("LIMIT {} OFFSET {}", limit, offset)
    }
}

/// FETCH FIRST spelling shared by ANSI, Oracle and DB2.
pub(crate) struct FetchFirstClause;

impl LimitClause for FetchFirstClause {
    fn limit(&self, limit: u64) -> String {
        format!("FETCH FIRST {} ROWS ONLY", limit)
    }

    fn offset(&self, offset: u64) -> String {
        format!("OFFSET {} ROWS", offset)
    }

    fn limit_offset(&self, limit: u64, offset: u64) -> String {
        format!("OFFSET {} ROWS FETCH FIRST {} ROWS ONLY", offset, limit)
    }
}

pub(crate) struct ForUpdateClause;

impl LockClause for ForUpdateClause {
    fn lock(&self, _options: &LockOptions) -> Option<String> {
        Some("FOR UPDATE".to_string())
    }
}

pub(crate) struct DefaultIdGeneration;

impl IdGeneration for DefaultIdGeneration {}

/// `SELECT NEXT VALUE FOR` sequences, as in H2, SQL Server and MariaDB.
pub(crate) struct NextValueForIdGeneration;

impl IdGeneration for NextValueForIdGeneration {
    fn sequence_query(&self, sequence: &str) -> Option<String> {
        Some(format!("SELECT NEXT VALUE FOR {}", sequence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_lock() -> LockOptions {
        LockOptions {
            mode: LockMode::PessimisticWrite,
            table: "\"orders\"".into(),
        }
    }

    #[test]
    fn test_after_order_by_renders_limit_before_lock() {
        let sql = PostgresDialect.render_after_order_by(Some(10), Some(20), Some(&write_lock()));
        assert_eq!(sql, " LIMIT 10 OFFSET 20 FOR UPDATE OF \"orders\"");
        assert_eq!(PostgresDialect.render_after_from_table(Some(&write_lock())), "");
    }

    #[test]
    fn test_sql_server_lock_goes_after_table() {
        let options = write_lock();
        assert_eq!(
            SqlServerDialect.render_after_from_table(Some(&options)),
            " WITH (UPDLOCK, ROWLOCK)"
        );
        assert_eq!(
            SqlServerDialect.render_after_order_by(Some(5), None, Some(&options)),
            " OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY"
        );
    }

    #[test]
    fn test_limit_spellings() {
        assert_eq!(AnsiDialect.limit().limit_offset(10, 30), "OFFSET 30 ROWS FETCH FIRST 10 ROWS ONLY");
        assert_eq!(MySqlDialect.limit().offset(5), "LIMIT 5, 18446744073709551615");
        assert_eq!(MySqlDialect.limit().limit_offset(10, 5), "LIMIT 5, 10");
        assert_eq!(HsqlDbDialect.limit().limit_offset(10, 5), "OFFSET 5 LIMIT 10");
        assert_eq!(SqliteDialect.limit().offset(5), "LIMIT -1 OFFSET 5");
    }

    #[test]
    fn test_lock_spellings() {
        let read = LockOptions {
            mode: LockMode::PessimisticRead,
            table: "t".into(),
        };
        assert_eq!(MySqlDialect.lock().lock(&read).as_deref(), Some("LOCK IN SHARE MODE"));
        assert_eq!(Db2Dialect.lock().lock(&read).as_deref(), Some("FOR READ ONLY WITH RS"));
        assert_eq!(PostgresDialect.lock().lock(&read).as_deref(), Some("FOR SHARE OF t"));
        assert_eq!(SqliteDialect.lock().lock(&read), None);
    }

    #[test]
    fn test_sequence_queries() {
        assert_eq!(
            PostgresDialect.id_generation().sequence_query("order_seq").as_deref(),
            Some("SELECT nextval('order_seq')")
        );
        assert_eq!(
            OracleDialect.id_generation().sequence_query("order_seq").as_deref(),
            Some("SELECT order_seq.nextval FROM DUAL")
        );
        assert_eq!(MySqlDialect.id_generation().sequence_query("s"), None);
        assert!(!SqlServerDialect.id_generation().supported_for_batch_operations());
        assert!(PostgresDialect.id_generation().driver_requires_key_column_names());
    }

    #[test]
    fn test_converters() -> Result<()> {
        assert_eq!(SqliteDialect.write_value(Value::Boolean(true))?, Value::Integer(1));
        assert_eq!(
            SqliteDialect.read_value(Value::Integer(0), &DataType::Boolean)?,
            Value::Boolean(false)
        );
        let id = Uuid::new_v4();
        let written = SqliteDialect.write_value(Value::Uuid(id))?;
        assert_eq!(SqliteDialect.read_value(written, &DataType::Uuid)?, Value::Uuid(id));
        assert!(matches!(
            MySqlDialect.write_value(Value::Array(vec![])),
            Err(DbError::UnsupportedOperation(_))
        ));
        Ok(())
    }
}
