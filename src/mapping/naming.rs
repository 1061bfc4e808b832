use std::fmt;

use convert_case::{Case, Casing};

/// Letter casing a database applies to unquoted identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LetterCasing {
    UpperCase,
    LowerCase,
    AsIs,
}

impl LetterCasing {
    pub fn apply(&self, name: &str) -> String {
        match self {
            Self::UpperCase => name.to_uppercase(),
            Self::LowerCase => name.to_lowercase(),
            Self::AsIs => name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quoting {
    prefix: &'static str,
    suffix: &'static str,
}

impl Quoting {
    pub const ANSI: Quoting = Quoting::new("\"", "\"");
    pub const BACKTICK: Quoting = Quoting::new("`", "`");
    pub const BRACKETS: Quoting = Quoting::new("[", "]");
    pub const NONE: Quoting = Quoting::new("", "");

    pub const fn new(prefix: &'static str, suffix: &'static str) -> Self {
        Self { prefix, suffix }
    }

    pub fn apply(&self, name: &str) -> String {
        format!("{}{}{}", self.prefix, name, self.suffix)
    }
}

/// Quoting and letter casing rules used to render identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierProcessing {
    pub quoting: Quoting,
    pub letter_casing: LetterCasing,
}

impl IdentifierProcessing {
    pub const ANSI: IdentifierProcessing =
        IdentifierProcessing::new(Quoting::ANSI, LetterCasing::UpperCase);
    pub const NONE: IdentifierProcessing =
        IdentifierProcessing::new(Quoting::NONE, LetterCasing::AsIs);

    pub const fn new(quoting: Quoting, letter_casing: LetterCasing) -> Self {
        Self {
            quoting,
            letter_casing,
        }
    }

    pub fn quote(&self, name: &str) -> String {
        self.quoting.apply(name)
    }

    pub fn standardize_letter_case(&self, name: &str) -> String {
        self.letter_casing.apply(name)
    }
}

/// A possibly schema-qualified SQL name.
///
/// Derived identifiers come from the naming strategy and get the dialect's letter
/// casing applied on rendering. Explicit identifiers (from attributes) are rendered
/// exactly as given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SqlIdentifier {
    parts: Vec<String>,
    quoted: bool,
    derived: bool,
}

impl SqlIdentifier {
    pub fn quoted(name: impl Into<String>) -> Self {
        Self {
            parts: vec![name.into()],
            quoted: true,
            derived: false,
        }
    }

    pub fn unquoted(name: impl Into<String>) -> Self {
        Self {
            parts: vec![name.into()],
            quoted: false,
            derived: false,
        }
    }

    pub fn derived(name: impl Into<String>, quoted: bool) -> Self {
        Self {
            parts: vec![name.into()],
            quoted,
            derived: true,
        }
    }

    /// Prefixes this identifier with a schema name.
    pub fn in_schema(&self, schema: &str) -> Self {
        let mut parts = Vec::with_capacity(self.parts.len() + 1);
        parts.push(schema.to_string());
        parts.extend(self.parts.iter().cloned());
        Self {
            parts,
            quoted: self.quoted,
            derived: self.derived,
        }
    }

    /// The unqualified name, without quoting or casing applied.
    pub fn reference(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or_default()
    }

    /// A new identifier with the same flags and the last part transformed.
    pub fn transform(&self, f: impl Fn(&str) -> String) -> Self {
        Self {
            parts: vec![f(self.reference())],
            quoted: self.quoted,
            derived: self.derived,
        }
    }

    pub fn is_quoted(&self) -> bool {
        self.quoted
    }

    pub fn to_sql(&self, processing: &IdentifierProcessing) -> String {
        self.parts
            .iter()
            .map(|part| {
                let name = if self.derived {
                    processing.standardize_letter_case(part)
                } else {
                    part.clone()
                };
                if self.quoted {
                    processing.quote(&name)
                } else {
                    name
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Case-insensitive comparison of the unqualified names.
    pub fn matches(&self, other: &SqlIdentifier) -> bool {
        self.reference().eq_ignore_ascii_case(other.reference())
    }
}

impl fmt::Display for SqlIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.parts.join("."))
    }
}

/// Derives table and column names from type and property names.
pub trait NamingStrategy: Send + Sync {
    fn table_name(&self, type_name: &str) -> String {
        type_name.to_case(Case::Snake)
    }

    fn column_name(&self, property_name: &str) -> String {
        property_name.to_case(Case::Snake)
    }

    /// Name of the column in a child table pointing back at its parent.
    fn reverse_column_name(&self, parent_table: &str) -> String {
        parent_table.to_string()
    }

    /// Name of the column holding list indexes or map keys.
    fn key_column(&self, owner_table: &str) -> String {
        format!("{}_key", owner_table)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNamingStrategy;

impl NamingStrategy for DefaultNamingStrategy {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_naming() {
        let naming = DefaultNamingStrategy;
        assert_eq!(naming.table_name("PurchaseOrder"), "purchase_order");
        assert_eq!(naming.column_name("createdAt"), "created_at");
        assert_eq!(naming.key_column("purchase_order"), "purchase_order_key");
    }

    #[test]
    fn test_identifier_rendering() {
        let ansi = IdentifierProcessing::ANSI;
        let lower = IdentifierProcessing::new(Quoting::ANSI, LetterCasing::LowerCase);

        let derived = SqlIdentifier::derived("purchase_order", true);
        assert_eq!(derived.to_sql(&ansi), "\"PURCHASE_ORDER\"");
        assert_eq!(derived.to_sql(&lower), "\"purchase_order\"");

        let explicit = SqlIdentifier::quoted("Orders");
        assert_eq!(explicit.to_sql(&ansi), "\"Orders\"");

        let plain = SqlIdentifier::derived("item", false).in_schema("shop");
        assert_eq!(plain.to_sql(&ansi), "SHOP.ITEM");
        assert_eq!(plain.reference(), "item");
    }
}
