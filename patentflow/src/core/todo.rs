//! Task-list items surfaced with every progress snapshot.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a todo item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    /// Not started.
    #[default]
    Pending,
    /// Currently being worked on.
    InProgress,
    /// Done.
    Completed,
    /// Abandoned.
    Cancelled,
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One entry of a task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    /// What needs doing.
    pub content: String,
    /// Current status.
    #[serde(default)]
    pub status: TodoStatus,
}

impl TodoItem {
    /// Creates a pending item.
    #[must_use]
    pub fn pending(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            status: TodoStatus::Pending,
        }
    }
}

/// An ordered task list, replaced wholesale on every update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoList {
    items: Vec<TodoItem>,
}

impl TodoList {
    /// Creates a list of pending items.
    #[must_use]
    pub fn from_contents<I, S>(contents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: contents.into_iter().map(TodoItem::pending).collect(),
        }
    }

    /// Overwrites the list with a new snapshot.
    pub fn replace(&mut self, items: Vec<TodoItem>) {
        self.items = items;
    }

    /// Sets the status of the item at `index`. Out-of-range indices are ignored.
    pub fn set_status(&mut self, index: usize, status: TodoStatus) {
        if let Some(item) = self.items.get_mut(index) {
            item.status = status;
        }
    }

    /// Returns the items in order.
    #[must_use]
    pub fn items(&self) -> &[TodoItem] {
        &self.items
    }

    /// Returns a copy of the items.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TodoItem> {
        self.items.clone()
    }

    /// Returns the number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Counts items with a given status.
    #[must_use]
    pub fn count(&self, status: TodoStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }

    /// Returns true if the list is non-empty and every item is completed.
    #[must_use]
    pub fn all_completed(&self) -> bool {
        !self.items.is_empty() && self.count(TodoStatus::Completed) == self.items.len()
    }

    /// One-line progress summary, e.g. `2/9 completed, 1 in progress, 6 pending`.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{}/{} completed, {} in progress, {} pending",
            self.count(TodoStatus::Completed),
            self.items.len(),
            self.count(TodoStatus::InProgress),
            self.count(TodoStatus::Pending),
        )
    }
}

impl From<Vec<TodoItem>> for TodoList {
    fn from(items: Vec<TodoItem>) -> Self {
        Self { items }
    }
}
