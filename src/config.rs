use serde::{Deserialize, Serialize};

use crate::core::{DbError, Result};
use crate::dialect::{Dialect, DialectKind};
use crate::mapping::MappingContextBuilder;

/// Relational mapping configuration
///
/// Selects the dialect and the options applied to every name the mapping derives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationalConfig {
    /// Database dialect used to render statements
    pub dialect: DialectKind,

    /// Quote every identifier, derived ones included
    pub force_quote: bool,

    /// Schema prefixed to every table name
    pub schema: Option<String>,
}

impl RelationalConfig {
    pub fn new(dialect: DialectKind) -> Self {
        Self {
            dialect,
            force_quote: true,
            schema: None,
        }
    }

    /// Set the dialect
    pub fn dialect(mut self, dialect: DialectKind) -> Self {
        self.dialect = dialect;
        self
    }

    /// Enable or disable identifier quoting
    pub fn force_quote(mut self, force_quote: bool) -> Self {
        self.force_quote = force_quote;
        self
    }

    /// Set the default schema
    pub fn schema(mut self, schema: &str) -> Self {
        self.schema = Some(schema.to_string());
        self
    }

    /// Resolve from a database product name
    pub fn from_product_name(product: &str) -> Result<Self> {
        Ok(Self::new(DialectKind::from_product_name(product)?))
    }

    /// Parse from a JDBC style url
    ///
    /// Format: "jdbc:<database>://host[:port]/name[?schema=<schema>]"
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = RelationalConfig::from_url("jdbc:postgresql://localhost/shop?schema=sales")?;
    /// ```
    pub fn from_url(url: &str) -> Result<Self> {
        let mut config = Self::new(DialectKind::from_url(url)?);

        if let Some((_, query)) = url.split_once('?') {
            for pair in query.split('&') {
                match pair.split_once('=') {
                    Some(("schema" | "currentSchema", value)) if !value.is_empty() => {
                        config.schema = Some(value.to_string());
                    }
                    Some(("forceQuote", value)) => {
                        config.force_quote = value.parse().map_err(|_| {
                            DbError::Config(format!("Invalid forceQuote value '{}'", value))
                        })?;
                    }
                    _ => {}
                }
            }
        }

        Ok(config)
    }

    /// The dialect singleton for the configured database
    pub fn resolve_dialect(&self) -> &'static dyn Dialect {
        self.dialect.dialect()
    }

    /// A mapping context builder carrying the naming options
    pub fn mapping_builder(&self) -> MappingContextBuilder {
        let builder = MappingContextBuilder::new().force_quote(self.force_quote);
        match &self.schema {
            Some(schema) => builder.schema(schema.clone()),
            None => builder,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(schema) = &self.schema {
            if schema.trim().is_empty() {
                return Err(DbError::Config("Schema cannot be empty".to_string()));
            }
        }
        Ok(())
    }
}

impl Default for RelationalConfig {
    fn default() -> Self {
        Self::new(DialectKind::Ansi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelationalConfig::default();
        assert_eq!(config.dialect, DialectKind::Ansi);
        assert!(config.force_quote);
        assert_eq!(config.schema, None);
    }

    #[test]
    fn test_builder_pattern() {
        let config = RelationalConfig::new(DialectKind::H2)
            .force_quote(false)
            .schema("sales");

        assert_eq!(config.dialect, DialectKind::H2);
        assert!(!config.force_quote);
        assert_eq!(config.schema.as_deref(), Some("sales"));
        assert_eq!(config.resolve_dialect().name(), "H2");
    }

    #[test]
    fn test_from_url() {
        let config =
            RelationalConfig::from_url("jdbc:postgresql://db.example.com:5432/shop?schema=sales")
                .unwrap();

        assert_eq!(config.dialect, DialectKind::Postgres);
        assert_eq!(config.schema.as_deref(), Some("sales"));
        assert!(config.force_quote);
    }

    #[test]
    fn test_from_url_rejects_bad_option() {
        let result = RelationalConfig::from_url("jdbc:h2:mem:test?forceQuote=maybe");
        assert!(matches!(result, Err(DbError::Config(_))));
    }

    #[test]
    fn test_deserialize() {
        let config: RelationalConfig =
            serde_json::from_str(r#"{"dialect": "mysql", "force_quote": false}"#).unwrap();
        assert_eq!(config.dialect, DialectKind::MySql);
        assert!(!config.force_quote);
    }

    #[test]
    fn test_validate() {
        assert!(RelationalConfig::default().validate().is_ok());
        assert!(RelationalConfig::default().schema(" ").validate().is_err());
    }
}
