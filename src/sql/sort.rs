use serde::{Deserialize, Serialize};

use crate::core::{DbError, Result};
use crate::dialect::NullHandling;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn is_descending(&self) -> bool {
        matches!(self, Self::Desc)
    }
}

/// Ordering by one property, addressed by its dot path from the aggregate root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub property: String,
    pub direction: Direction,
    pub nulls: NullHandling,
}

impl Order {
    pub fn asc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Asc,
            nulls: NullHandling::Native,
        }
    }

    pub fn desc(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            direction: Direction::Desc,
            nulls: NullHandling::Native,
        }
    }

    pub fn nulls_first(mut self) -> Self {
        self.nulls = NullHandling::NullsFirst;
        self
    }

    pub fn nulls_last(mut self) -> Self {
        self.nulls = NullHandling::NullsLast;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Sort {
    orders: Vec<Order>,
}

impl Sort {
    pub fn unsorted() -> Self {
        Self::default()
    }

    /// Ascending order over the given properties.
    pub fn by(properties: &[&str]) -> Self {
        Self {
            orders: properties.iter().map(|p| Order::asc(*p)).collect(),
        }
    }

    pub fn and(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn is_sorted(&self) -> bool {
        !self.orders.is_empty()
    }
}

impl From<Order> for Sort {
    fn from(order: Order) -> Self {
        Self {
            orders: vec![order],
        }
    }
}

/// A page request: zero based page number, page size and ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pageable {
    page: u64,
    size: u64,
    sort: Sort,
}

impl Pageable {
    pub fn of(page: u64, size: u64) -> Result<Self> {
        Self::sorted(page, size, Sort::unsorted())
    }

    pub fn sorted(page: u64, size: u64, sort: Sort) -> Result<Self> {
        if size == 0 {
            return Err(DbError::InvalidApiUsage(
                "Page size must be greater than zero".into(),
            ));
        }
        if page.checked_mul(size).is_none() {
            return Err(DbError::InvalidApiUsage(format!(
                "Page {} of size {} is out of range",
                page, size
            )));
        }
        Ok(Self { page, size, sort })
    }

    pub fn page(&self) -> u64 {
        self.page
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn offset(&self) -> u64 {
        self.page * self.size
    }

    pub fn sort(&self) -> &Sort {
        &self.sort
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pageable_offset() {
        let page = Pageable::of(3, 20).unwrap();
        assert_eq!(page.offset(), 60);
        assert!(!page.sort().is_sorted());
    }

    #[test]
    fn test_zero_page_size_is_rejected() {
        assert!(matches!(
            Pageable::of(0, 0),
            Err(DbError::InvalidApiUsage(_))
        ));
    }

    #[test]
    fn test_page_beyond_offset_range_is_rejected() {
        assert!(matches!(
            Pageable::of(u64::MAX / 2, 4),
            Err(DbError::InvalidApiUsage(_))
        ));
        let last = Pageable::of(u64::MAX / 4, 4).unwrap();
        assert_eq!(last.offset(), (u64::MAX / 4) * 4);
    }

    #[test]
    fn test_sort_builder() {
        let sort = Sort::by(&["name"]).and(Order::desc("created").nulls_last());
        assert_eq!(sort.orders().len(), 2);
        assert_eq!(sort.orders()[1].direction, Direction::Desc);
        assert_eq!(sort.orders()[1].nulls, NullHandling::NullsLast);
    }
}
