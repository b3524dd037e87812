//! Progress sink trait and implementations.

use crate::core::ProgressEvent;
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, Level};

/// Receives progress events from the coordinator and its workers.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Delivers an event, waiting for capacity if the sink is bounded.
    async fn emit(&self, event: ProgressEvent);

    /// Delivers an event without waiting. Never fails; a sink that cannot
    /// accept the event drops it.
    fn try_emit(&self, event: ProgressEvent);
}

/// A sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgressSink;

#[async_trait]
impl ProgressSink for NoOpProgressSink {
    async fn emit(&self, _event: ProgressEvent) {}

    fn try_emit(&self, _event: ProgressEvent) {}
}

/// A sink that logs events through `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingProgressSink {
    level: Level,
}

impl Default for LoggingProgressSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingProgressSink {
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

    fn log_event(&self, event: &ProgressEvent) {
        let stage = event.stage().unwrap_or("coordinator");
        let detail = match event {
            ProgressEvent::Todos { todos, .. } => {
                let done = todos
                    .iter()
                    .filter(|t| t.status == crate::core::TodoStatus::Completed)
                    .count();
                format!("{done}/{} todos completed", todos.len())
            }
            ProgressEvent::Message { text, .. } => text.clone(),
        };
        if self.level == Level::DEBUG {
            debug!(stage = %stage, kind = event.kind(), "{}", detail);
        } else {
            info!(stage = %stage, kind = event.kind(), "{}", detail);
        }
    }
}

#[async_trait]
impl ProgressSink for LoggingProgressSink {
    async fn emit(&self, event: ProgressEvent) {
        self.log_event(&event);
    }

    fn try_emit(&self, event: ProgressEvent) {
        self.log_event(&event);
    }
}

/// A sink that records every event, for tests.
#[derive(Debug, Default)]
pub struct CollectingProgressSink {
    events: RwLock<Vec<ProgressEvent>>,
}

impl CollectingProgressSink {
    /// Creates an empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
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

    /// Returns the last coordinator task-list snapshot.
    #[must_use]
    pub fn last_todos(&self) -> Option<Vec<crate::core::TodoItem>> {
        self.events.read().iter().rev().find_map(|event| match event {
            ProgressEvent::Todos { stage: None, todos } => Some(todos.clone()),
            _ => None,
        })
    }

    /// Returns the text of every message fragment.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.events
            .read()
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::Message { text, .. } => Some(text.clone()),
                ProgressEvent::Todos { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl ProgressSink for CollectingProgressSink {
    async fn emit(&self, event: ProgressEvent) {
        self.events.write().push(event);
    }

    fn try_emit(&self, event: ProgressEvent) {
        self.events.write().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TodoItem;

    #[tokio::test]
    async fn test_noop_and_logging_sinks() {
        NoOpProgressSink.emit(ProgressEvent::message("x")).await;
        let sink = LoggingProgressSink::debug();
        sink.emit(ProgressEvent::todos(vec![TodoItem::pending("a")])).await;
        sink.try_emit(ProgressEvent::stage_message("input_parser", "hello"));
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingProgressSink::new();
        assert!(sink.is_empty());

        sink.emit(ProgressEvent::todos(vec![TodoItem::pending("first")])).await;
        sink.try_emit(ProgressEvent::message("working"));
        sink.emit(ProgressEvent::stage_todos("claims_writer", vec![])).await;

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.messages(), vec!["working".to_string()]);
        assert_eq!(sink.last_todos().unwrap()[0].content, "first");
    }
}
