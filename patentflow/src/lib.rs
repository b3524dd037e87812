//! # Patentflow
//!
//! An orchestration engine that drives a fixed pipeline of nine agent stages
//! to draft a patent application from one input document.
//!
//! Patentflow provides:
//!
//! - **A static stage registry**: names, working directories, input and output
//!   artifacts and capability sets of all nine stages
//! - **A sandboxed artifact store**: every file operation stays under one root
//! - **A retrying coordinator**: strict stage order, output validation and a
//!   bounded per-stage retry ceiling
//! - **An execution bridge**: the run happens on a background thread while the
//!   caller iterates progress events and may cancel at any time
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use patentflow::prelude::*;
//!
//! let config = PipelineConfig::default();
//! let store = Arc::new(ArtifactStore::open(&config.workspace_root)?);
//! let providers = CapabilityProviders::from_config(&config, Arc::clone(&store));
//! let client = Arc::new(OpenAiClient::from_config(&config.model)?);
//! let workers = WorkerSet::agents(&config, &providers, client)?;
//!
//! let bridge = ExecutionBridge::new(PipelineCoordinator::new(config, store, workers)?);
//! for event in bridge.start("draft.docx", None)? {
//!     println!("{:?}", event?);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, missing_docs, rust_2018_idioms)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod bridge;
pub mod cancellation;
pub mod config;
pub mod coordinator;
pub mod core;
pub mod errors;
pub mod events;
pub mod registry;
pub mod store;
pub mod testing;
pub mod tools;
pub mod worker;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::bridge::{ExecutionBridge, RunEvents};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{ModelConfig, PipelineConfig, SearchConfig};
    pub use crate::coordinator::{validate_outputs, PipelineCoordinator, RunReport};
    pub use crate::core::{
        ProgressEvent, ProgressView, Project, RunState, TodoItem, TodoList, TodoStatus,
    };
    pub use crate::errors::{PipelineError, StoreError, ValidationError};
    pub use crate::events::{LoggingProgressSink, NoOpProgressSink, ProgressSink};
    pub use crate::registry::{stage, stages, Capability, StageDef};
    pub use crate::store::ArtifactStore;
    pub use crate::tools::CapabilityProviders;
    #[cfg(feature = "http")]
    pub use crate::worker::OpenAiClient;
    pub use crate::worker::{ChatClient, StageWorker, WorkerContext, WorkerSet};
    pub use std::sync::Arc;
}
