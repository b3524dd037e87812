//! Progress events produced by the coordinator and its workers.

use super::todo::TodoItem;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A progress update relayed to the caller.
///
/// Events are ephemeral: each one is consumed exactly once by the relay
/// queue and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A complete task-list snapshot. Replaces any earlier snapshot.
    Todos {
        /// The stage the list belongs to, or `None` for the coordinator.
        stage: Option<String>,
        /// The full list.
        todos: Vec<TodoItem>,
    },
    /// A fragment of free text.
    Message {
        /// The stage that produced the text, or `None` for the coordinator.
        stage: Option<String>,
        /// The text.
        text: String,
    },
}

impl ProgressEvent {
    /// Creates a coordinator task-list snapshot.
    #[must_use]
    pub fn todos(todos: Vec<TodoItem>) -> Self {
        Self::Todos { stage: None, todos }
    }

    /// Creates a coordinator message fragment.
    #[must_use]
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message {
            stage: None,
            text: text.into(),
        }
    }

    /// Creates a message fragment attributed to a stage.
    #[must_use]
    pub fn stage_message(stage: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Message {
            stage: Some(stage.into()),
            text: text.into(),
        }
    }

    /// Creates a task-list snapshot attributed to a stage.
    #[must_use]
    pub fn stage_todos(stage: impl Into<String>, todos: Vec<TodoItem>) -> Self {
        Self::Todos {
            stage: Some(stage.into()),
            todos,
        }
    }

    /// Returns the stage the event is attributed to.
    #[must_use]
    pub fn stage(&self) -> Option<&str> {
        match self {
            Self::Todos { stage, .. } | Self::Message { stage, .. } => stage.as_deref(),
        }
    }

    /// Returns the event kind name.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Todos { .. } => "todos",
            Self::Message { .. } => "message",
        }
    }

    /// Converts the event to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind()));
        if let Some(stage) = self.stage() {
            map.insert("stage".to_string(), serde_json::json!(stage));
        }
        match self {
            Self::Todos { todos, .. } => {
                map.insert("todos".to_string(), serde_json::json!(todos));
            }
            Self::Message { text, .. } => {
                map.insert("text".to_string(), serde_json::json!(text));
            }
        }
        map
    }
}

/// The front-end view of a run: `{stage_label, todo_snapshot, message_fragments}`.
///
/// Folding events into a view keeps only the latest task-list snapshot and
/// accumulates message fragments in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressView {
    /// The stage most recently seen on an event.
    pub stage_label: Option<String>,
    /// The latest coordinator task list.
    pub todo_snapshot: Vec<TodoItem>,
    /// Every message fragment seen so far.
    pub message_fragments: Vec<String>,
}

impl ProgressView {
    /// Creates an empty view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one event.
    pub fn apply(&mut self, event: &ProgressEvent) {
        if let Some(stage) = event.stage() {
            self.stage_label = Some(stage.to_string());
        }
        match event {
            // Stage-private lists are not the run's task list.
            ProgressEvent::Todos { stage: None, todos } => {
                self.todo_snapshot.clone_from(todos);
            }
            ProgressEvent::Todos { .. } => {}
            ProgressEvent::Message { text, .. } => {
                self.message_fragments.push(text.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::todo::TodoStatus;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = ProgressEvent::stage_message("input_parser", "reading");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "message");
        assert_eq!(json["stage"], "input_parser");
        assert_eq!(json["text"], "reading");
    }

    #[test]
    fn test_view_last_snapshot_wins() {
        let mut view = ProgressView::new();
        view.apply(&ProgressEvent::todos(vec![
            TodoItem::pending("a"),
            TodoItem::pending("b"),
        ]));
        view.apply(&ProgressEvent::todos(vec![TodoItem {
            content: "a".to_string(),
            status: TodoStatus::Completed,
        }]));

        assert_eq!(view.todo_snapshot.len(), 1);
        assert_eq!(view.todo_snapshot[0].status, TodoStatus::Completed);
    }

    #[test]
    fn test_view_ignores_stage_lists() {
        let mut view = ProgressView::new();
        view.apply(&ProgressEvent::todos(vec![TodoItem::pending("run")]));
        view.apply(&ProgressEvent::stage_todos(
            "claims_writer",
            vec![TodoItem::pending("draft claim 1")],
        ));
        view.apply(&ProgressEvent::stage_message("claims_writer", "drafting"));

        assert_eq!(view.todo_snapshot[0].content, "run");
        assert_eq!(view.stage_label.as_deref(), Some("claims_writer"));
        assert_eq!(view.message_fragments, vec!["drafting".to_string()]);
    }

    #[test]
    fn test_to_dict() {
        let dict = ProgressEvent::message("done").to_dict();
        assert_eq!(dict.get("type").unwrap(), "message");
        assert!(dict.get("stage").is_none());
    }
}
