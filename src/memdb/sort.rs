// ============================================================================
// ORDER BY evaluation
// ============================================================================
//
// Rows are sorted stably on every ORDER BY field in turn. NULL placement
// follows the field's null handling; native handling puts NULLs last when
// ascending and first when descending.
//
// ============================================================================

use std::cmp::Ordering;

use crate::core::{Result, Value};
use crate::dialect::NullHandling;
use crate::sql::Direction;

// ============================================================================
// SORT KEY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub direction: Direction,
    pub nulls: NullHandling,
}

impl SortKey {
    fn nulls_first(&self) -> bool {
        match self.nulls {
            NullHandling::NullsFirst => true,
            NullHandling::NullsLast => false,
            NullHandling::Native => self.direction.is_descending(),
        }
    }

    /// Compares two values of this key, direction and NULL placement applied.
    pub fn compare(&self, left: &Value, right: &Value) -> Result<Ordering> {
        let ordering = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) if self.nulls_first() => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, true) if self.nulls_first() => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => {
                let ordering = left.compare(right)?;
                if self.direction.is_descending() {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
        };
        Ok(ordering)
    }
}

// ============================================================================
// ROW SORTING
// ============================================================================

/// Sorts `rows` by their precomputed key values.
///
/// Comparison errors (incompatible types in one column) abort the sort.
pub fn sort_rows<T>(rows: &mut Vec<(Vec<Value>, T)>, keys: &[SortKey]) -> Result<()> {
    if keys.is_empty() {
        return Ok(());
    }
    let mut failure = None;
    rows.sort_by(|(left, _), (right, _)| {
        for (index, key) in keys.iter().enumerate() {
            match key.compare(&left[index], &right[index]) {
                Ok(Ordering::Equal) => continue,
                Ok(ordering) => return ordering,
                Err(err) => {
                    failure.get_or_insert(err);
                    return Ordering::Equal;
                }
            }
        }
        Ordering::Equal
    });
    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(values: Vec<Value>, key: SortKey) -> Result<Vec<Value>> {
        let mut rows: Vec<_> = values.into_iter().map(|v| (vec![v.clone()], v)).collect();
        sort_rows(&mut rows, &[key])?;
        Ok(rows.into_iter().map(|(_, v)| v).collect())
    }

    #[test]
    fn test_native_null_placement() -> Result<()> {
        let values = vec![Value::Integer(2), Value::Null, Value::Integer(1)];
        let asc = sorted(
            values.clone(),
            SortKey { direction: Direction::Asc, nulls: NullHandling::Native },
        )?;
        assert_eq!(asc, vec![Value::Integer(1), Value::Integer(2), Value::Null]);

        let desc = sorted(
            values,
            SortKey { direction: Direction::Desc, nulls: NullHandling::Native },
        )?;
        assert_eq!(desc, vec![Value::Null, Value::Integer(2), Value::Integer(1)]);
        Ok(())
    }

    #[test]
    fn test_explicit_null_placement() -> Result<()> {
        let values = vec![Value::Null, Value::from("b"), Value::from("a")];
        let result = sorted(
            values,
            SortKey { direction: Direction::Asc, nulls: NullHandling::NullsFirst },
        )?;
        assert_eq!(result, vec![Value::Null, Value::from("a"), Value::from("b")]);
        Ok(())
    }

    #[test]
    fn test_incompatible_values_fail() {
        let values = vec![Value::Integer(1), Value::from("a")];
        let result = sorted(
            values,
            SortKey { direction: Direction::Asc, nulls: NullHandling::Native },
        );
        assert!(result.is_err());
    }
}
