//! Event sink trait and implementations.

use super::LifecycleEvent;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::{debug, info, Level};

/// Shared handle to an event sink.
pub type SharedEventSink = Arc<dyn EventSink>;

/// Receives lifecycle events.
#[async_trait]
pub trait EventSink: Send + Sync + Debug {
    /// Emits an event. Implementations must not fail.
    async fn emit(&self, event: LifecycleEvent, data: Value);
}

/// Discards all events. The default sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: LifecycleEvent, _data: Value) {}
}

/// Logs events through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink at the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: LifecycleEvent, data: Value) {
        if self.level == Level::DEBUG {
            debug!(event = %event, data = %data, "Event: {}", event);
        } else {
            info!(event = %event, data = %data, "Event: {}", event);
        }
    }
}

/// Records events in memory, for tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<(LifecycleEvent, Value)>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<(LifecycleEvent, Value)> {
        self.events.read().clone()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Returns the payloads of one event kind, in emission order.
    #[must_use]
    pub fn of_kind(&self, kind: LifecycleEvent) -> Vec<Value> {
        self.events
            .read()
            .iter()
            .filter(|(e, _)| *e == kind)
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Counts events of one kind.
    #[must_use]
    pub fn count(&self, kind: LifecycleEvent) -> usize {
        self.events.read().iter().filter(|(e, _)| *e == kind).count()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: LifecycleEvent, data: Value) {
        self.events.write().push((event, data));
    }
}
