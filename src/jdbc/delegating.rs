use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

use crate::conversion::IdValueSource;
use crate::core::{DbError, Result, Value};
use crate::dialect::LockMode;
use crate::mapping::{AggregatePath, Record};
use crate::sql::{Pageable, Sort};

use super::identifier::Identifier;
use super::strategy::{DataAccessStrategy, PathElement};

/// Forwards every call to a strategy supplied after construction, which lets
/// a strategy resolve relations through an outer one that wraps it.
#[derive(Default)]
pub struct DelegatingDataAccessStrategy {
    delegate: OnceLock<Arc<dyn DataAccessStrategy>>,
}

impl DelegatingDataAccessStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the delegate. Only the first call succeeds.
    pub fn set_delegate(&self, delegate: Arc<dyn DataAccessStrategy>) -> Result<()> {
        self.delegate.set(delegate).map_err(|_| {
            DbError::IllegalState("The delegate data access strategy is already set".into())
        })
    }

    fn delegate(&self) -> Result<&dyn DataAccessStrategy> {
        self.delegate.get().map(Arc::as_ref).ok_or_else(|| {
            DbError::IllegalState("No delegate data access strategy set".into())
        })
    }
}

#[async_trait]
impl DataAccessStrategy for DelegatingDataAccessStrategy {
    async fn insert(
        &self,
        record: &Record,
        entity_type: &str,
        identifier: &Identifier,
        id_value_source: IdValueSource,
    ) -> Result<Option<Value>> {
        self.delegate()?
            .insert(record, entity_type, identifier, id_value_source)
            .await
    }

    async fn insert_batch(
        &self,
        rows: &[(Record, Identifier)],
        entity_type: &str,
        id_value_source: IdValueSource,
    ) -> Result<Vec<Option<Value>>> {
        self.delegate()?
            .insert_batch(rows, entity_type, id_value_source)
            .await
    }

    async fn update(&self, record: &Record, entity_type: &str) -> Result<bool> {
        self.delegate()?.update(record, entity_type).await
    }

    async fn update_with_version(
        &self,
        record: &Record,
        entity_type: &str,
        previous_version: &Value,
    ) -> Result<bool> {
        self.delegate()?
            .update_with_version(record, entity_type, previous_version)
            .await
    }

    async fn delete(&self, id: &Value, entity_type: &str) -> Result<()> {
        self.delegate()?.delete(id, entity_type).await
    }

    async fn delete_with_version(
        &self,
        id: &Value,
        entity_type: &str,
        previous_version: &Value,
    ) -> Result<()> {
        self.delegate()?
            .delete_with_version(id, entity_type, previous_version)
            .await
    }

    async fn delete_by_ids(&self, ids: &[Value], entity_type: &str) -> Result<()> {
        self.delegate()?.delete_by_ids(ids, entity_type).await
    }

    async fn delete_by_path(&self, root_id: &Value, path: &AggregatePath) -> Result<()> {
        self.delegate()?.delete_by_path(root_id, path).await
    }

    async fn delete_in_by_path(&self, root_ids: &[Value], path: &AggregatePath) -> Result<()> {
        self.delegate()?.delete_in_by_path(root_ids, path).await
    }

    async fn delete_all(&self, entity_type: &str) -> Result<()> {
        self.delegate()?.delete_all(entity_type).await
    }

    async fn delete_all_by_path(&self, path: &AggregatePath) -> Result<()> {
        self.delegate()?.delete_all_by_path(path).await
    }

    async fn acquire_lock_by_id(
        &self,
        id: &Value,
        mode: LockMode,
        entity_type: &str,
    ) -> Result<()> {
        self.delegate()?.acquire_lock_by_id(id, mode, entity_type).await
    }

    async fn acquire_lock_all(&self, mode: LockMode, entity_type: &str) -> Result<()> {
        self.delegate()?.acquire_lock_all(mode, entity_type).await
    }

    async fn count(&self, entity_type: &str) -> Result<u64> {
        self.delegate()?.count(entity_type).await
    }

    async fn exists_by_id(&self, id: &Value, entity_type: &str) -> Result<bool> {
        self.delegate()?.exists_by_id(id, entity_type).await
    }

    async fn find_by_id(&self, id: &Value, entity_type: &str) -> Result<Option<Record>> {
        self.delegate()?.find_by_id(id, entity_type).await
    }

    async fn find_all(&self, entity_type: &str) -> Result<Vec<Record>> {
        self.delegate()?.find_all(entity_type).await
    }

    async fn find_all_by_id(&self, ids: &[Value], entity_type: &str) -> Result<Vec<Record>> {
        self.delegate()?.find_all_by_id(ids, entity_type).await
    }

    async fn find_all_by_path(
        &self,
        identifier: &Identifier,
        path: &AggregatePath,
    ) -> Result<Vec<PathElement>> {
        self.delegate()?.find_all_by_path(identifier, path).await
    }

    async fn find_all_sorted(&self, entity_type: &str, sort: &Sort) -> Result<Vec<Record>> {
        self.delegate()?.find_all_sorted(entity_type, sort).await
    }

    async fn find_all_paged(&self, entity_type: &str, pageable: &Pageable) -> Result<Vec<Record>> {
        self.delegate()?.find_all_paged(entity_type, pageable).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_use_before_delegate_is_set_fails() {
        let strategy = DelegatingDataAccessStrategy::new();
        let result = strategy.count("Order").await;
        assert!(matches!(result, Err(DbError::IllegalState(_))));
    }

    #[tokio::test]
    async fn test_delegate_can_only_be_set_once() {
        let outer = Arc::new(DelegatingDataAccessStrategy::new());
        let inner: Arc<dyn DataAccessStrategy> = Arc::new(DelegatingDataAccessStrategy::new());
        assert!(outer.set_delegate(inner.clone()).is_ok());
        assert!(matches!(
            outer.set_delegate(inner),
            Err(DbError::IllegalState(_))
        ));
        // The inner strategy has no delegate of its own.
        assert!(matches!(
            outer.find_all("Order").await,
            Err(DbError::IllegalState(_))
        ));
    }
}
