//! Stage workers.
//!
//! Every stage is driven through the same [`StageWorker`] contract: one
//! natural-language instruction in, one text result out. Workers never retry
//! on their own; the coordinator owns every retry decision.

mod agent;
mod chat;
#[cfg(feature = "http")]
mod openai;
mod prompts;

pub use agent::{AgentWorker, WRITE_TODOS};
#[cfg(test)]
pub use chat::MockChatClient;
pub use chat::{ChatClient, ChatError, ChatMessage, ChatRequest, ChatResponse, Role};
#[cfg(feature = "http")]
pub use openai::OpenAiClient;
pub use prompts::PromptLibrary;

use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::core::{ProgressEvent, Project, TodoItem};
use crate::errors::PipelineError;
use crate::events::ProgressSink;
use crate::registry::{self, StageDef};
use crate::tools::CapabilityProviders;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a worker may touch during one invocation.
pub struct WorkerContext<'a> {
    /// The stage being run.
    pub stage: &'static StageDef,
    /// Attempt number, starting at 1.
    pub attempt: u32,
    /// The run's project.
    pub project: &'a Project,
    /// Where progress goes.
    pub sink: &'a Arc<dyn ProgressSink>,
    /// The run's cancellation token.
    pub token: &'a CancellationToken,
}

impl WorkerContext<'_> {
    /// Emits a message fragment attributed to the stage.
    pub async fn report(&self, text: impl Into<String> + Send) {
        self.sink
            .emit(ProgressEvent::stage_message(self.stage.name, text))
            .await;
    }

    /// Emits the stage's private task list.
    pub async fn report_todos(&self, todos: Vec<TodoItem>) {
        self.sink
            .emit(ProgressEvent::stage_todos(self.stage.name, todos))
            .await;
    }

    /// Fails once the run has been cancelled.
    pub fn checkpoint(&self) -> Result<(), PipelineError> {
        self.token.checkpoint()
    }
}

/// A bounded execution unit that performs one stage.
#[async_trait]
pub trait StageWorker: Send + Sync {
    /// Name of the stage this worker performs.
    fn stage(&self) -> &str;

    /// Performs the stage once.
    ///
    /// Provider or transport faults are [`PipelineError::Upstream`]. Missing
    /// or partial outputs are not errors here; the coordinator validates them.
    async fn invoke(&self, instruction: &str, ctx: &WorkerContext<'_>) -> Result<String, PipelineError>;
}

/// The workers for all stages, keyed by stage name.
#[derive(Clone, Default)]
pub struct WorkerSet {
    workers: HashMap<String, Arc<dyn StageWorker>>,
}

impl WorkerSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a worker, replacing any worker for the same stage.
    #[must_use]
    pub fn with_worker(mut self, worker: Arc<dyn StageWorker>) -> Self {
        self.insert(worker);
        self
    }

    /// Adds a worker, replacing any worker for the same stage.
    pub fn insert(&mut self, worker: Arc<dyn StageWorker>) {
        self.workers.insert(worker.stage().to_string(), worker);
    }

    /// Looks up the worker for a stage.
    #[must_use]
    pub fn get(&self, stage: &str) -> Option<&Arc<dyn StageWorker>> {
        self.workers.get(stage)
    }

    /// Fails unless every registry stage has a worker.
    pub fn ensure_complete(&self) -> Result<(), PipelineError> {
        let missing: Vec<&str> = registry::stages()
            .iter()
            .map(|def| def.name)
            .filter(|name| !self.workers.contains_key(*name))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Config(format!(
                "no worker for stage(s): {}",
                missing.join(", ")
            )))
        }
    }

    /// Builds an agent worker for every stage, sharing one chat client.
    pub fn agents(
        config: &PipelineConfig,
        providers: &CapabilityProviders,
        client: Arc<dyn ChatClient>,
    ) -> Result<Self, PipelineError> {
        let prompts = PromptLibrary::new(config.prompts_dir.clone());
        let mut set = Self::new();
        for stage in registry::stages() {
            let worker = AgentWorker::new(
                stage,
                Arc::clone(&client),
                providers.tools_for(stage.capabilities),
                &config.model,
                prompts.system_prompt(stage)?,
                config.agent_max_turns,
            );
            set.insert(Arc::new(worker));
        }
        Ok(set)
    }
}

impl std::fmt::Debug for WorkerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut stages: Vec<_> = self.workers.keys().collect();
        stages.sort();
        f.debug_struct("WorkerSet").field("stages", &stages).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ArtifactStore;
    use crate::tools::{ProgramConverter, SkillLibrary, UnavailableSearch};
    use tempfile::TempDir;

    #[test]
    fn test_agents_cover_every_stage() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ArtifactStore::open(dir.path().join("ws")).unwrap());
        let providers = CapabilityProviders::new(
            Arc::clone(&store),
            Arc::new(ProgramConverter::new(store, "markitdown")),
            Arc::new(UnavailableSearch::new("test")),
            SkillLibrary::new(dir.path()),
        );
        let client: Arc<dyn ChatClient> = Arc::new(MockChatClient::new());

        let set = WorkerSet::agents(&PipelineConfig::default(), &providers, client).unwrap();
        assert!(set.ensure_complete().is_ok());
        assert_eq!(set.get("markdown_merger").unwrap().stage(), "markdown_merger");
    }

    #[test]
    fn test_incomplete_set_names_missing_stages() {
        let err = WorkerSet::new().ensure_complete().unwrap_err();
        assert!(err.to_string().contains("input_parser"));
        assert!(err.to_string().contains("markdown_merger"));
    }
}
