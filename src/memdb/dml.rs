use log::debug;

use crate::core::{DbError, Result, Row, Value};
use crate::dialect::Dialect;
use crate::jdbc::{KeyHolder, SqlParameterSource};
use crate::mapping::SqlIdentifier;
use crate::sql::model::{Delete, Insert, Update};

use super::catalog::key_of;
use super::query::Evaluator;
use super::table::RowId;
use super::Storage;

/// Inserts one row. The returned key holder carries the generated values
/// plus any explicitly requested `key_columns`.
pub(crate) fn insert(
    storage: &mut Storage,
    insert: &Insert,
    params: &SqlParameterSource,
    dialect: &dyn Dialect,
    key_columns: Option<&[String]>,
) -> Result<KeyHolder> {
    let values = {
        let evaluator = Evaluator::new(storage, params);
        let table = storage.table(&insert.table.name)?;
        insert
            .columns
            .iter()
            .zip(&insert.values)
            .map(|(column, marker)| {
                Ok((
                    table.required_column(column.reference())?,
                    evaluator.param(marker)?.clone(),
                ))
            })
            .collect::<Result<Vec<_>>>()?
    };

    let (row, generated) = storage
        .table_mut(&insert.table.name)?
        .prepare_insert(values, dialect)?;
    check_parents(storage, &insert.table.name, &row, None)?;

    let table = storage.table_mut(&insert.table.name)?;
    let mut keys: Row = generated.into_iter().collect();
    for name in key_columns.unwrap_or_default() {
        let index = table.required_column(name)?;
        keys.insert(name.clone(), row[index].clone());
    }
    let row_id = table.insert(row);
    debug!("memdb: inserted row {} into '{}'", row_id, table.name());

    Ok(KeyHolder {
        rows_affected: 1,
        keys: if keys.is_empty() { None } else { Some(keys) },
    })
}

pub(crate) fn update(
    storage: &mut Storage,
    update: &Update,
    params: &SqlParameterSource,
) -> Result<u64> {
    let (ids, assignments) = {
        let evaluator = Evaluator::new(storage, params);
        let table = storage.table(&update.table.name)?;
        let ids = evaluator.matching_rows(&update.table, update.condition.as_ref())?;
        let assignments = update
            .assignments
            .iter()
            .map(|(column, marker)| {
                Ok((
                    table.required_column(column.reference())?,
                    evaluator.param(marker)?.clone(),
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        (ids, assignments)
    };

    let mut changed = Vec::with_capacity(ids.len());
    {
        let table = storage.table(&update.table.name)?;
        for id in &ids {
            let Some(old) = table.row(*id) else { continue };
            let mut row = old.to_vec();
            for (index, value) in &assignments {
                row[*index] = value.clone();
            }
            changed.push((*id, old.to_vec(), row));
        }
    }

    for (_, old, row) in &changed {
        check_parents(storage, &update.table.name, row, Some(old.as_slice()))?;
        check_children(
            storage,
            &update.table.name,
            std::slice::from_ref(old),
            Some(row.as_slice()),
        )?;
    }

    let table = storage.table_mut(&update.table.name)?;
    for (id, _, row) in changed {
        table.replace(id, row)?;
    }
    Ok(ids.len() as u64)
}

pub(crate) fn delete(
    storage: &mut Storage,
    delete: &Delete,
    params: &SqlParameterSource,
) -> Result<u64> {
    let ids: Vec<RowId> = Evaluator::new(storage, params)
        .matching_rows(&delete.table, delete.condition.as_ref())?;
    if ids.is_empty() {
        return Ok(0);
    }
    let rows: Vec<Vec<Value>> = {
        let table = storage.table(&delete.table.name)?;
        ids.iter()
            .filter_map(|id| table.row(*id).map(<[Value]>::to_vec))
            .collect()
    };
    check_children(storage, &delete.table.name, &rows, None)?;

    let deleted = storage.table_mut(&delete.table.name)?.delete(&ids);
    Ok(deleted as u64)
}

/// Every non-null back-reference of `row` must point at an existing parent.
/// `previous` skips references an update leaves unchanged.
fn check_parents(
    storage: &Storage,
    table: &SqlIdentifier,
    row: &[Value],
    previous: Option<&[Value]>,
) -> Result<()> {
    let schema = storage.table(table)?.schema();
    for fk in &schema.foreign_keys {
        let Some(index) = schema.column_index(&fk.column) else {
            continue;
        };
        let value = &row[index];
        if value.is_null() || previous.is_some_and(|old| old[index] == *value) {
            continue;
        }
        let parent = storage.table_by_key(&fk.parent_table)?;
        let parent_index = parent.required_column(&fk.parent_column)?;
        if !parent.contains_value(parent_index, value) {
            return Err(DbError::ConstraintViolation(format!(
                "'{}.{}' references missing '{}.{}' = {}",
                schema.name, fk.column, parent.name(), fk.parent_column, value
            )));
        }
    }
    Ok(())
}

/// No child row may keep referencing a value of `rows` that goes away,
/// either by deletion or, with `replacement`, by an update.
fn check_children(
    storage: &Storage,
    table: &SqlIdentifier,
    rows: &[Vec<Value>],
    replacement: Option<&[Value]>,
) -> Result<()> {
    let schema = storage.table(table)?.schema();
    for (child_schema, fk) in storage.catalog().referencing(&key_of(table)) {
        if child_schema.name.eq_ignore_ascii_case(&schema.name) {
            continue;
        }
        let Some(index) = schema.column_index(&fk.parent_column) else {
            continue;
        };
        let child = storage.table_by_key(&child_schema.name)?;
        let child_index = child.required_column(&fk.column)?;
        for row in rows {
            let value = &row[index];
            if replacement.is_some_and(|new| new[index] == *value) {
                continue;
            }
            if child.contains_value(child_index, value) {
                return Err(DbError::ConstraintViolation(format!(
                    "'{}.{}' still references '{}.{}' = {}",
                    child.name(), fk.column, schema.name, fk.parent_column, value
                )));
            }
        }
    }
    Ok(())
}
