//! Testing utilities for patentflow pipelines.
//!
//! This module provides:
//! - Scripted stage workers that write, skip or fail on cue
//! - A blocking worker for cancellation tests
//! - A scripted team covering all nine stages

mod workers;

pub use workers::{BlockingWorker, Script, ScriptedTeam, ScriptedWorker};
