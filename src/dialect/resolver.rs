use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{
    AnsiDialect, Db2Dialect, Dialect, H2Dialect, HsqlDbDialect, MariaDbDialect, MySqlDialect,
    OracleDialect, PostgresDialect, SqlServerDialect, SqliteDialect,
};
use crate::core::{DbError, Result};

/// Names a supported database and hands out its dialect singleton.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Ansi,
    Postgres,
    MySql,
    MariaDb,
    SqlServer,
    Oracle,
    Db2,
    H2,
    HsqlDb,
    Sqlite,
}

impl DialectKind {
    pub const ALL: [DialectKind; 10] = [
        Self::Ansi,
        Self::Postgres,
        Self::MySql,
        Self::MariaDb,
        Self::SqlServer,
        Self::Oracle,
        Self::Db2,
        Self::H2,
        Self::HsqlDb,
        Self::Sqlite,
    ];

    pub fn dialect(&self) -> &'static dyn Dialect {
        match self {
            Self::Ansi => &AnsiDialect,
            Self::Postgres => &PostgresDialect,
            Self::MySql => &MySqlDialect,
            Self::MariaDb => &MariaDbDialect,
            Self::SqlServer => &SqlServerDialect,
            Self::Oracle => &OracleDialect,
            Self::Db2 => &Db2Dialect,
            Self::H2 => &H2Dialect,
            Self::HsqlDb => &HsqlDbDialect,
            Self::Sqlite => &SqliteDialect,
        }
    }

    /// Resolves the dialect from a database product name as reported by the driver.
    pub fn from_product_name(product: &str) -> Result<Self> {
        let product = product.trim().to_lowercase();
        let kind = if product.contains("postgres") {
            Self::Postgres
        } else if product.contains("mariadb") {
            Self::MariaDb
        } else if product.contains("mysql") {
            Self::MySql
        } else if product.contains("sql server") || product.contains("sqlserver") {
            Self::SqlServer
        } else if product.contains("oracle") {
            Self::Oracle
        } else if product.starts_with("db2") {
            Self::Db2
        } else if product == "h2" {
            Self::H2
        } else if product.contains("hsql") {
            Self::HsqlDb
        } else if product.contains("sqlite") {
            Self::Sqlite
        } else if product == "ansi" {
            Self::Ansi
        } else {
            return Err(DbError::Config(format!(
                "Cannot determine a dialect for database product '{}'",
                product
            )));
        };
        Ok(kind)
    }

    /// Resolves the dialect from a JDBC style URL such as `jdbc:postgresql://host/db`.
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url.strip_prefix("jdbc:").unwrap_or(url);
        let scheme = rest
            .split(|c| c == ':' || c == '/')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        match scheme.as_str() {
            "postgresql" | "postgres" => Ok(Self::Postgres),
            "mysql" => Ok(Self::MySql),
            "mariadb" => Ok(Self::MariaDb),
            "sqlserver" => Ok(Self::SqlServer),
            "oracle" => Ok(Self::Oracle),
            "db2" => Ok(Self::Db2),
            "h2" => Ok(Self::H2),
            "hsqldb" => Ok(Self::HsqlDb),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(DbError::Config(format!(
                "Cannot determine a dialect for url '{}'",
                url
            ))),
        }
    }
}

impl FromStr for DialectKind {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_product_name(s)
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dialect().name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_product_names() {
        assert_eq!(DialectKind::from_product_name("PostgreSQL").unwrap(), DialectKind::Postgres);
        assert_eq!(
            DialectKind::from_product_name("Microsoft SQL Server").unwrap(),
            DialectKind::SqlServer
        );
        assert_eq!(DialectKind::from_product_name("DB2/LINUXX8664").unwrap(), DialectKind::Db2);
        assert_eq!(
            DialectKind::from_product_name("HSQL Database Engine").unwrap(),
            DialectKind::HsqlDb
        );
        assert_eq!(DialectKind::from_product_name("MariaDB").unwrap(), DialectKind::MariaDb);
        assert!(DialectKind::from_product_name("Informix").is_err());
    }

    #[test]
    fn test_resolves_urls() {
        assert_eq!(
            DialectKind::from_url("jdbc:postgresql://localhost/shop").unwrap(),
            DialectKind::Postgres
        );
        assert_eq!(DialectKind::from_url("jdbc:h2:mem:test").unwrap(), DialectKind::H2);
        assert_eq!(
            DialectKind::from_url("jdbc:sqlserver://db:1433").unwrap(),
            DialectKind::SqlServer
        );
        assert!(matches!(
            DialectKind::from_url("jdbc:unknown://x"),
            Err(DbError::Config(_))
        ));
    }

    #[test]
    fn test_every_kind_has_a_dialect() {
        for kind in DialectKind::ALL {
            assert!(!kind.dialect().name().is_empty());
        }
    }
}
