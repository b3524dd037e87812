//! Core domain model types for patentflow.
//!
//! This module contains the fundamental types shared by the coordinator,
//! the workers and the bridge:
//! - Project identity and layout
//! - Todo items and task lists
//! - Progress events
//! - Run and attempt status enums

mod event;
mod project;
mod status;
mod todo;

pub use event::{ProgressEvent, ProgressView};
pub use project::Project;
pub use status::{AttemptOutcome, RunState};
pub use todo::{TodoItem, TodoList, TodoStatus};
