//! Aggregate lifecycle notifications.
//!
//! Every template operation publishes one [`RelationalEvent`] per phase and
//! root to the configured [`EventPublisher`], then runs the registered
//! [`EntityCallback`]s for the same phase. Callbacks may hand back a different
//! record, which replaces the aggregate from then on.

use std::fmt;
use std::sync::{Arc, Mutex};

use crate::conversion::RootAggregateChange;
use crate::core::{Result, Value};
use crate::mapping::Record;

#[derive(Debug, Clone, PartialEq)]
pub enum RelationalEvent {
    BeforeConvert {
        entity_type: String,
        entity: Record,
    },
    BeforeSave {
        entity_type: String,
        entity: Record,
        actions: usize,
    },
    AfterSave {
        entity_type: String,
        entity: Record,
    },
    /// `entity` is absent when deleting by id.
    BeforeDelete {
        entity_type: String,
        id: Value,
        entity: Option<Record>,
    },
    AfterDelete {
        entity_type: String,
        id: Value,
        entity: Option<Record>,
    },
    AfterConvert {
        entity_type: String,
        entity: Record,
    },
}

impl RelationalEvent {
    pub fn entity_type(&self) -> &str {
        match self {
            Self::BeforeConvert { entity_type, .. }
            | Self::BeforeSave { entity_type, .. }
            | Self::AfterSave { entity_type, .. }
            | Self::BeforeDelete { entity_type, .. }
            | Self::AfterDelete { entity_type, .. }
            | Self::AfterConvert { entity_type, .. } => entity_type,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BeforeConvert { .. } => "BeforeConvert",
            Self::BeforeSave { .. } => "BeforeSave",
            Self::AfterSave { .. } => "AfterSave",
            Self::BeforeDelete { .. } => "BeforeDelete",
            Self::AfterDelete { .. } => "AfterDelete",
            Self::AfterConvert { .. } => "AfterConvert",
        }
    }
}

impl fmt::Display for RelationalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.entity_type())
    }
}

pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &RelationalEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventPublisher;

impl EventPublisher for NoopEventPublisher {
    fn publish(&self, _event: &RelationalEvent) {}
}

/// Keeps every published event, in order.
#[derive(Debug, Default)]
pub struct CollectingEventPublisher {
    events: Mutex<Vec<RelationalEvent>>,
}

impl CollectingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RelationalEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(RelationalEvent::name).collect()
    }
}

impl EventPublisher for CollectingEventPublisher {
    fn publish(&self, event: &RelationalEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Hooks around the lifecycle of aggregates of the types it supports.
pub trait EntityCallback: Send + Sync {
    fn supports(&self, _entity_type: &str) -> bool {
        true
    }

    fn before_convert(&self, entity: Record) -> Result<Record> {
        Ok(entity)
    }

    /// Runs after planning; the returned record replaces the root of `change`.
    fn before_save(&self, entity: Record, _change: &RootAggregateChange) -> Result<Record> {
        Ok(entity)
    }

    fn after_save(&self, entity: Record) -> Result<Record> {
        Ok(entity)
    }

    fn before_delete(&self, _id: &Value, entity: Option<Record>) -> Result<Option<Record>> {
        Ok(entity)
    }

    fn after_delete(&self, _id: &Value, entity: Option<Record>) -> Result<Option<Record>> {
        Ok(entity)
    }

    fn after_convert(&self, entity: Record) -> Result<Record> {
        Ok(entity)
    }
}

/// Registered callbacks, applied in registration order.
#[derive(Clone, Default)]
pub struct EntityCallbacks {
    callbacks: Vec<Arc<dyn EntityCallback>>,
}

impl EntityCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, callback: Arc<dyn EntityCallback>) {
        self.callbacks.push(callback);
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    fn apply<T>(
        &self,
        entity_type: &str,
        value: T,
        callback: impl Fn(&dyn EntityCallback, T) -> Result<T>,
    ) -> Result<T> {
        self.callbacks
            .iter()
            .filter(|c| c.supports(entity_type))
            .try_fold(value, |value, c| callback(c.as_ref(), value))
    }

    pub fn before_convert(&self, entity_type: &str, entity: Record) -> Result<Record> {
        self.apply(entity_type, entity, |c, e| c.before_convert(e))
    }

    pub fn before_save(
        &self,
        entity_type: &str,
        entity: Record,
        change: &RootAggregateChange,
    ) -> Result<Record> {
        self.apply(entity_type, entity, |c, e| c.before_save(e, change))
    }

    pub fn after_save(&self, entity_type: &str, entity: Record) -> Result<Record> {
        self.apply(entity_type, entity, |c, e| c.after_save(e))
    }

    pub fn before_delete(
        &self,
        entity_type: &str,
        id: &Value,
        entity: Option<Record>,
    ) -> Result<Option<Record>> {
        self.apply(entity_type, entity, |c, e| c.before_delete(id, e))
    }

    pub fn after_delete(
        &self,
        entity_type: &str,
        id: &Value,
        entity: Option<Record>,
    ) -> Result<Option<Record>> {
        self.apply(entity_type, entity, |c, e| c.after_delete(id, e))
    }

    pub fn after_convert(&self, entity_type: &str, entity: Record) -> Result<Record> {
        self.apply(entity_type, entity, |c, e| c.after_convert(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Renaming;

    impl EntityCallback for Renaming {
        fn supports(&self, entity_type: &str) -> bool {
            entity_type == "Order"
        }

        fn before_convert(&self, entity: Record) -> Result<Record> {
            Ok(entity.set("name", Value::from("renamed")))
        }
    }

    #[test]
    fn test_callbacks_apply_to_supported_types() -> Result<()> {
        let mut callbacks = EntityCallbacks::new();
        callbacks.register(Arc::new(Renaming));

        let order = callbacks.before_convert("Order", Record::new("Order"))?;
        assert_eq!(order.value("name"), Value::from("renamed"));

        let item = callbacks.before_convert("Item", Record::new("Item"))?;
        assert_eq!(item.value("name"), Value::Null);
        Ok(())
    }

    #[test]
    fn test_collecting_publisher_keeps_order() {
        let publisher = CollectingEventPublisher::new();
        publisher.publish(&RelationalEvent::BeforeConvert {
            entity_type: "Order".into(),
            entity: Record::new("Order"),
        });
        publisher.publish(&RelationalEvent::AfterSave {
            entity_type: "Order".into(),
            entity: Record::new("Order"),
        });
        assert_eq!(publisher.names(), vec!["BeforeConvert", "AfterSave"]);
        assert_eq!(publisher.events()[1].to_string(), "AfterSave(Order)");
    }
}
