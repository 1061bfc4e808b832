//! Structured statement model.
//!
//! Generators build these values; the renderer turns them into dialect SQL and
//! the in-memory database evaluates them directly.

use lazy_static::lazy_static;
use regex::Regex;

use crate::dialect::{LockMode, NullHandling};
use crate::mapping::SqlIdentifier;
use crate::sql::sort::Direction;

lazy_static! {
    static ref NON_WORD: Regex = Regex::new(r"\W").expect("valid regex");
}

/// Strips characters that are not allowed in bind parameter names.
pub fn sanitize_bind_name(name: &str) -> String {
    NON_WORD.replace_all(name, "").into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BindMarker(String);

impl BindMarker {
    pub fn new(name: &str) -> Self {
        Self(sanitize_bind_name(name))
    }

    /// Marker named after a column reference.
    pub fn for_column(column: &SqlIdentifier) -> Self {
        Self::new(column.reference())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: SqlIdentifier,
    pub alias: Option<SqlIdentifier>,
}

impl TableRef {
    pub fn new(name: SqlIdentifier) -> Self {
        Self { name, alias: None }
    }

    pub fn aliased(name: SqlIdentifier, alias: Option<SqlIdentifier>) -> Self {
        Self { name, alias }
    }

    /// The name columns of this table are qualified with.
    pub fn reference_name(&self) -> &SqlIdentifier {
        self.alias.as_ref().unwrap_or(&self.name)
    }

    pub fn column(&self, name: SqlIdentifier) -> ColumnRef {
        ColumnRef {
            table: self.clone(),
            name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: TableRef,
    pub name: SqlIdentifier,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Column(ColumnRef),
    Aliased(ColumnRef, SqlIdentifier),
    CountAll,
    Count(ColumnRef),
}

impl Expression {
    /// Label under which the expression's value is returned.
    pub fn label(&self) -> String {
        match self {
            Self::Column(column) => column.name.reference().to_string(),
            Self::Aliased(_, alias) => alias.reference().to_string(),
            Self::CountAll | Self::Count(_) => "count".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Equal(ColumnRef, BindMarker),
    /// Membership in a list bound to a single parameter.
    In(ColumnRef, BindMarker),
    InSelect(ColumnRef, Box<Select>),
    IsNotNull(ColumnRef),
    And(Vec<Condition>),
}

impl Condition {
    pub fn and(self, other: Condition) -> Condition {
        match self {
            Self::And(mut conditions) => {
                conditions.push(other);
                Self::And(conditions)
            }
            first => Self::And(vec![first, other]),
        }
    }

    /// Bind markers referenced by this condition, including nested selects.
    pub fn bind_markers(&self) -> Vec<&BindMarker> {
        match self {
            Self::Equal(_, marker) | Self::In(_, marker) => vec![marker],
            Self::InSelect(_, select) => select
                .condition
                .as_ref()
                .map(Condition::bind_markers)
                .unwrap_or_default(),
            Self::IsNotNull(_) => Vec::new(),
            Self::And(conditions) => conditions.iter().flat_map(Condition::bind_markers).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub table: TableRef,
    /// Back-reference column of the joined table.
    pub left: ColumnRef,
    /// Id column of the parent table.
    pub right: ColumnRef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByField {
    pub column: ColumnRef,
    pub direction: Direction,
    pub nulls: NullHandling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Select {
    pub projection: Vec<Expression>,
    pub from: TableRef,
    pub joins: Vec<Join>,
    pub condition: Option<Condition>,
    pub order_by: Vec<OrderByField>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub lock: Option<LockMode>,
}

impl Select {
    pub fn new(projection: Vec<Expression>, from: TableRef) -> Self {
        Self {
            projection,
            from,
            joins: Vec::new(),
            condition: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            lock: None,
        }
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.condition = Some(match self.condition.take() {
            Some(existing) => existing.and(condition),
            None => condition,
        });
        self
    }

    pub fn order_by(mut self, field: OrderByField) -> Self {
        self.order_by.push(field);
        self
    }

    pub fn limit_offset(mut self, limit: Option<u64>, offset: Option<u64>) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn lock(mut self, mode: LockMode) -> Self {
        self.lock = Some(mode);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Insert {
    pub table: TableRef,
    pub columns: Vec<SqlIdentifier>,
    pub values: Vec<BindMarker>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub table: TableRef,
    pub assignments: Vec<(SqlIdentifier, BindMarker)>,
    pub condition: Option<Condition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delete {
    pub table: TableRef,
    pub condition: Option<Condition>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    NextSequenceValue(SqlIdentifier),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_names_drop_non_word_characters() {
        assert_eq!(sanitize_bind_name("order-id"), "orderid");
        assert_eq!(sanitize_bind_name("\"Order Id\""), "OrderId");
        assert_eq!(BindMarker::new("a.b_c").name(), "ab_c");
    }

    #[test]
    fn test_and_flattens() {
        let table = TableRef::new(SqlIdentifier::unquoted("t"));
        let condition = Condition::IsNotNull(table.column(SqlIdentifier::unquoted("a")))
            .and(Condition::IsNotNull(table.column(SqlIdentifier::unquoted("b"))))
            .and(Condition::Equal(
                table.column(SqlIdentifier::unquoted("c")),
                BindMarker::new("c"),
            ));
        match &condition {
            Condition::And(parts) => assert_eq!(parts.len(), 3),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(condition.bind_markers().len(), 1);
    }
}
