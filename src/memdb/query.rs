use crate::core::{DbError, Result, Row, Value};
use crate::jdbc::SqlParameterSource;
use crate::sql::model::{ColumnRef, Condition, Expression, Select, TableRef};
use crate::sql::BindMarker;

use super::catalog::key_of;
use super::sort::{sort_rows, SortKey};
use super::table::{RowId, Table};
use super::Storage;

/// One combination of rows from the tables of a scope; `None` stands for the
/// NULL side of an outer join.
type Tuple<'a> = Vec<Option<&'a [Value]>>;

/// Tables visible to column references, by reference name.
#[derive(Default)]
struct Scope<'a> {
    sources: Vec<(String, &'a Table)>,
}

impl<'a> Scope<'a> {
    fn push(&mut self, table_ref: &TableRef, table: &'a Table) {
        self.sources.push((key_of(table_ref.reference_name()), table));
    }

    fn resolve(&self, column: &ColumnRef) -> Result<(usize, usize)> {
        let reference = key_of(column.table.reference_name());
        let source = self
            .sources
            .iter()
            .position(|(name, _)| *name == reference)
            .or(if self.sources.len() == 1 { Some(0) } else { None })
            .ok_or_else(|| {
                DbError::ExecutionError(format!(
                    "Table '{}' is not part of the query",
                    column.table.reference_name()
                ))
            })?;
        let index = self.sources[source].1.required_column(column.name.reference())?;
        Ok((source, index))
    }

    fn value(&self, tuple: &Tuple<'a>, column: &ColumnRef) -> Result<Value> {
        let (source, index) = self.resolve(column)?;
        Ok(tuple
            .get(source)
            .copied()
            .flatten()
            .map(|row| row[index].clone())
            .unwrap_or(Value::Null))
    }
}

/// Evaluates statement models against a storage snapshot.
pub(crate) struct Evaluator<'a> {
    storage: &'a Storage,
    params: &'a SqlParameterSource,
}

impl<'a> Evaluator<'a> {
    pub fn new(storage: &'a Storage, params: &'a SqlParameterSource) -> Self {
        Self { storage, params }
    }

    fn table(&self, table_ref: &TableRef) -> Result<&'a Table> {
        self.storage.table(&table_ref.name)
    }

    pub fn param(&self, marker: &BindMarker) -> Result<&'a Value> {
        self.params.get(marker.name()).ok_or_else(|| {
            DbError::ExecutionError(format!("No value bound for parameter :{}", marker.name()))
        })
    }

    pub fn select(&self, select: &Select) -> Result<Vec<Row>> {
        let (scope, tuples) = self.scan(select)?;
        let mut tuples = self.filter(&scope, tuples, select.condition.as_ref())?;

        if select
            .projection
            .iter()
            .any(|e| matches!(e, Expression::CountAll | Expression::Count(_)))
        {
            return Ok(vec![self.count(&scope, &tuples, &select.projection)?]);
        }

        if !select.order_by.is_empty() {
            let keys: Vec<SortKey> = select
                .order_by
                .iter()
                .map(|field| SortKey {
                    direction: field.direction,
                    nulls: field.nulls,
                })
                .collect();
            let mut keyed = tuples
                .into_iter()
                .map(|tuple| {
                    let values = select
                        .order_by
                        .iter()
                        .map(|field| scope.value(&tuple, &field.column))
                        .collect::<Result<Vec<_>>>()?;
                    Ok((values, tuple))
                })
                .collect::<Result<Vec<_>>>()?;
            sort_rows(&mut keyed, &keys)?;
            tuples = keyed.into_iter().map(|(_, tuple)| tuple).collect();
        }

        let offset = select.offset.unwrap_or(0) as usize;
        let limit = select.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        tuples
            .iter()
            .skip(offset)
            .take(limit)
            .map(|tuple| self.project(&scope, tuple, &select.projection))
            .collect()
    }

    /// Values of the first projected column, as needed by `IN (SELECT ...)`.
    fn select_values(&self, select: &Select) -> Result<Vec<Value>> {
        let expression = select.projection.first().ok_or_else(|| {
            DbError::ExecutionError("A sub-select needs a projection".into())
        })?;
        let label = expression.label();
        Ok(self
            .select(select)?
            .into_iter()
            .filter_map(|row| row.get(&label).cloned())
            .collect())
    }

    fn scan(&self, select: &Select) -> Result<(Scope<'a>, Vec<Tuple<'a>>)> {
        let from = self.table(&select.from)?;
        let mut scope = Scope::default();
        scope.push(&select.from, from);
        let mut tuples: Vec<Tuple<'a>> = from.rows().map(|(_, row)| vec![Some(row)]).collect();

        // Left outer joins on back-reference = parent id.
        for join in &select.joins {
            let table = self.table(&join.table)?;
            scope.push(&join.table, table);
            let (_, left) = scope.resolve(&join.left)?;

            let mut joined = Vec::with_capacity(tuples.len());
            for tuple in tuples {
                let parent = scope.value(&tuple, &join.right)?;
                let matches: Vec<&[Value]> = table
                    .rows()
                    .filter(|(_, row)| !parent.is_null() && row[left] == parent)
                    .map(|(_, row)| row)
                    .collect();
                if matches.is_empty() {
                    let mut tuple = tuple;
                    tuple.push(None);
                    joined.push(tuple);
                } else {
                    for row in matches {
                        let mut extended = tuple.clone();
                        extended.push(Some(row));
                        joined.push(extended);
                    }
                }
            }
            tuples = joined;
        }
        Ok((scope, tuples))
    }

    fn filter(
        &self,
        scope: &Scope<'a>,
        tuples: Vec<Tuple<'a>>,
        condition: Option<&Condition>,
    ) -> Result<Vec<Tuple<'a>>> {
        let Some(condition) = condition else {
            return Ok(tuples);
        };
        let mut kept = Vec::new();
        for tuple in tuples {
            if self.matches(scope, &tuple, condition)? {
                kept.push(tuple);
            }
        }
        Ok(kept)
    }

    fn matches(&self, scope: &Scope<'a>, tuple: &Tuple<'a>, condition: &Condition) -> Result<bool> {
        match condition {
            Condition::Equal(column, marker) => {
                let value = scope.value(tuple, column)?;
                let expected = self.param(marker)?;
                Ok(!value.is_null() && !expected.is_null() && value == *expected)
            }
            Condition::In(column, marker) => {
                let value = scope.value(tuple, column)?;
                Ok(!value.is_null() && self.param(marker)?.elements().contains(&value))
            }
            Condition::InSelect(column, select) => {
                let value = scope.value(tuple, column)?;
                Ok(!value.is_null() && self.select_values(select)?.contains(&value))
            }
            Condition::IsNotNull(column) => Ok(!scope.value(tuple, column)?.is_null()),
            Condition::And(conditions) => {
                for condition in conditions {
                    if !self.matches(scope, tuple, condition)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    fn project(&self, scope: &Scope<'a>, tuple: &Tuple<'a>, projection: &[Expression]) -> Result<Row> {
        let mut row = Row::new();
        for expression in projection {
            let value = match expression {
                Expression::Column(column) | Expression::Aliased(column, _) => {
                    scope.value(tuple, column)?
                }
                Expression::CountAll | Expression::Count(_) => {
                    return Err(DbError::UnsupportedOperation(
                        "Counts cannot be mixed with row projections".into(),
                    ));
                }
            };
            row.insert(expression.label(), value);
        }
        Ok(row)
    }

    fn count(&self, scope: &Scope<'a>, tuples: &[Tuple<'a>], projection: &[Expression]) -> Result<Row> {
        let mut row = Row::new();
        for expression in projection {
            let value = match expression {
                Expression::CountAll => tuples.len() as i64,
                Expression::Count(column) => {
                    let mut count = 0;
                    for tuple in tuples {
                        if !scope.value(tuple, column)?.is_null() {
                            count += 1;
                        }
                    }
                    count
                }
                Expression::Column(_) | Expression::Aliased(..) => {
                    return Err(DbError::UnsupportedOperation(
                        "Grouping is not supported".into(),
                    ));
                }
            };
            row.insert(expression.label(), Value::Integer(value));
        }
        Ok(row)
    }

    /// Rows of a single table matching `condition`.
    pub fn matching_rows(
        &self,
        table_ref: &TableRef,
        condition: Option<&Condition>,
    ) -> Result<Vec<RowId>> {
        let table = self.table(table_ref)?;
        let mut scope = Scope::default();
        scope.push(table_ref, table);

        let mut ids = Vec::new();
        for (id, row) in table.rows() {
            let tuple = vec![Some(row)];
            let keep = match condition {
                Some(condition) => self.matches(&scope, &tuple, condition)?,
                None => true,
            };
            if keep {
                ids.push(id);
            }
        }
        Ok(ids)
    }
}
