use crate::core::{DbError, Result};
use crate::dialect::{Dialect, LockOptions};
use crate::mapping::{IdentifierProcessing, SqlIdentifier};

use super::model::{
    ColumnRef, Condition, Delete, Expression, Insert, Join, OrderByField, Select, Statement,
    TableRef, Update,
};

/// Renders statement models to SQL text for one dialect.
#[derive(Clone, Copy)]
pub struct SqlRenderer {
    dialect: &'static dyn Dialect,
    processing: IdentifierProcessing,
}

impl SqlRenderer {
    pub fn new(dialect: &'static dyn Dialect) -> Self {
        Self {
            dialect,
            processing: dialect.identifier_processing(),
        }
    }

    pub fn render(&self, statement: &Statement) -> Result<String> {
        match statement {
            Statement::Select(select) => Ok(self.select(select)),
            Statement::Insert(insert) => Ok(self.insert(insert)),
            Statement::Update(update) => Ok(self.update(update)),
            Statement::Delete(delete) => Ok(self.delete(delete)),
            Statement::NextSequenceValue(sequence) => {
                let name = self.identifier(sequence);
                self.dialect
                    .id_generation()
                    .sequence_query(&name)
                    .ok_or_else(|| {
                        DbError::UnsupportedOperation(format!(
                            "{} does not support sequences",
                            self.dialect.name()
                        ))
                    })
            }
        }
    }

    fn identifier(&self, identifier: &SqlIdentifier) -> String {
        identifier.to_sql(&self.processing)
    }

    fn table(&self, table: &TableRef) -> String {
        match &table.alias {
            Some(alias) => format!("{} {}", self.identifier(&table.name), self.identifier(alias)),
            None => self.identifier(&table.name),
        }
    }

    fn column(&self, column: &ColumnRef) -> String {
        format!(
            "{}.{}",
            self.identifier(column.table.reference_name()),
            self.identifier(&column.name)
        )
    }

    fn expression(&self, expression: &Expression) -> String {
        match expression {
            Expression::Column(column) => self.column(column),
            Expression::Aliased(column, alias) => {
                format!("{} AS {}", self.column(column), self.identifier(alias))
            }
            Expression::CountAll => "COUNT(*)".to_string(),
            Expression::Count(column) => format!("COUNT({})", self.column(column)),
        }
    }

    fn condition(&self, condition: &Condition) -> String {
        match condition {
            Condition::Equal(column, marker) => {
                format!("{} = :{}", self.column(column), marker.name())
            }
            Condition::In(column, marker) => {
                format!("{} IN (:{})", self.column(column), marker.name())
            }
            Condition::InSelect(column, select) => {
                format!("{} IN ({})", self.column(column), self.select(select))
            }
            Condition::IsNotNull(column) => format!("{} IS NOT NULL", self.column(column)),
            Condition::And(conditions) => conditions
                .iter()
                .map(|c| self.condition(c))
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }

    fn join(&self, join: &Join) -> String {
        format!(
            " LEFT OUTER JOIN {} ON {} = {}",
            self.table(&join.table),
            self.column(&join.left),
            self.column(&join.right)
        )
    }

    fn order_by_field(&self, field: &OrderByField) -> String {
        let direction = if field.direction.is_descending() {
            "DESC"
        } else {
            "ASC"
        };
        format!(
            "{} {}{}",
            self.column(&field.column),
            direction,
            self.dialect.order_by_null_precedence().render(field.nulls)
        )
    }

    pub fn select(&self, select: &Select) -> String {
        let lock = select.lock.map(|mode| LockOptions {
            mode,
            table: self.identifier(&select.from.name),
        });

        let mut sql = String::from("SELECT ");
        sql.push_str(
            &select
                .projection
                .iter()
                .map(|e| self.expression(e))
                .collect::<Vec<_>>()
                .join(", "),
        );
        sql.push_str(" FROM ");
        sql.push_str(&self.table(&select.from));
        sql.push_str(&self.dialect.render_after_from_table(lock.as_ref()));

        for join in &select.joins {
            sql.push_str(&self.join(join));
        }

        if let Some(condition) = &select.condition {
            sql.push_str(" WHERE ");
            sql.push_str(&self.condition(condition));
        }

        let paged = select.limit.is_some() || select.offset.is_some();
        if !select.order_by.is_empty() {
            sql.push_str(" ORDER BY ");
            sql.push_str(
                &select
                    .order_by
                    .iter()
                    .map(|f| self.order_by_field(f))
                    .collect::<Vec<_>>()
                    .join(", "),
            );
        } else if paged && self.dialect.paging_requires_order_by() {
            sql.push_str(" ORDER BY (SELECT 1)");
        }

        sql.push_str(&self.dialect.render_after_order_by(
            select.limit,
            select.offset,
            lock.as_ref(),
        ));
        sql
    }

    fn insert(&self, insert: &Insert) -> String {
        let table = self.identifier(&insert.table.name);
        if insert.columns.is_empty() {
            return format!("INSERT INTO {}{}", table, self.dialect.default_insert_part());
        }
        let columns = insert
            .columns
            .iter()
            .map(|c| self.identifier(c))
            .collect::<Vec<_>>()
            .join(", ");
        let values = insert
            .values
            .iter()
            .map(|m| format!(":{}", m.name()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("INSERT INTO {} ({}) VALUES ({})", table, columns, values)
    }

    fn update(&self, update: &Update) -> String {
        let assignments = update
            .assignments
            .iter()
            .map(|(column, marker)| format!("{} = :{}", self.identifier(column), marker.name()))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!(
            "UPDATE {} SET {}",
            self.identifier(&update.table.name),
            assignments
        );
        if let Some(condition) = &update.condition {
            sql.push_str(" WHERE ");
            sql.push_str(&self.condition(condition));
        }
        sql
    }

    fn delete(&self, delete: &Delete) -> String {
        let mut sql = format!("DELETE FROM {}", self.identifier(&delete.table.name));
        if let Some(condition) = &delete.condition {
            sql.push_str(" WHERE ");
            sql.push_str(&self.condition(condition));
        }
        sql
    }
}
