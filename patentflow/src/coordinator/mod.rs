//! The pipeline coordinator.
//!
//! The coordinator walks the registry in order. For each stage it checks the
//! declared inputs, delegates to the stage's worker, validates the outputs and
//! either advances, cleans up and retries, or fails the run. Every retry
//! decision is made here, through [`StageMachine`].

mod instruction;
mod machine;
mod validation;

#[cfg(test)]
mod integration_tests;

pub use machine::{Phase, RetryDecision, StageMachine};
pub use validation::validate_outputs;

use crate::cancellation::CancellationToken;
use crate::config::PipelineConfig;
use crate::core::{AttemptOutcome, ProgressEvent, Project, TodoList, TodoStatus};
use crate::errors::{PipelineError, ValidationError};
use crate::events::ProgressSink;
use crate::registry::{self, StageDef, SOURCE_DIR, SOURCE_STEM, STAGE_DIRS};
use crate::store::{ArtifactStore, FileDigest};
use crate::worker::{WorkerContext, WorkerSet};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Directory under the workspace root that relative source paths resolve against.
pub const DATA_DIR: &str = "data";

/// Extension used for a source document that has none.
const DEFAULT_SOURCE_EXT: &str = "docx";

/// Attempts spent on one stage of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    /// Stage name.
    pub stage: String,
    /// Attempts used, at most the retry ceiling.
    pub attempts: u32,
    /// Outcome of the last attempt.
    pub outcome: AttemptOutcome,
}

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique id of this run.
    pub run_id: Uuid,
    /// The project the run populated.
    pub project: Project,
    /// The seeded source document.
    pub source: PathBuf,
    /// Attempts per stage, in registry order.
    pub stages: Vec<StageRecord>,
    /// Every final artifact with its size and digest.
    pub artifacts: Vec<FileDigest>,
    /// Total worker invocations.
    pub delegations: u32,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the last stage passed validation.
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Returns the number of stages that needed more than one attempt.
    #[must_use]
    pub fn retried_stages(&self) -> usize {
        self.stages.iter().filter(|s| s.attempts > 1).count()
    }

    /// Wall-clock duration of the run in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Drives the nine stages of one run.
pub struct PipelineCoordinator {
    config: PipelineConfig,
    store: Arc<ArtifactStore>,
    workers: WorkerSet,
}

impl PipelineCoordinator {
    /// Creates a coordinator. Fails unless every stage has a worker.
    pub fn new(
        config: PipelineConfig,
        store: Arc<ArtifactStore>,
        workers: WorkerSet,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        workers.ensure_complete()?;
        Ok(Self {
            config,
            store,
            workers,
        })
    }

    /// The configuration this coordinator was built with.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// The artifact store shared with the workers.
    #[must_use]
    pub fn store(&self) -> &Arc<ArtifactStore> {
        &self.store
    }

    /// Runs every stage against `source`.
    ///
    /// A relative `source` resolves under `<workspace>/data/`. Without a
    /// `project_id` the current Unix timestamp is used.
    pub async fn run(
        &self,
        source: &Path,
        project_id: Option<&str>,
        sink: &Arc<dyn ProgressSink>,
        token: &CancellationToken,
    ) -> Result<RunReport, PipelineError> {
        token.checkpoint()?;
        let started_at = Utc::now();
        let project = match project_id {
            Some(id) => Project::new(id, self.store.root())?,
            None => Project::from_timestamp(self.store.root())?,
        };
        info!(project_id = project.id(), source = %source.display(), "pipeline run started");

        let mut run = Run {
            coordinator: self,
            machine: StageMachine::new(registry::stages().len(), self.config.max_attempts),
            todos: TodoList::from_contents(registry::stages().iter().map(StageDef::todo_label)),
            source: PathBuf::new(),
            project,
            sink,
            token,
            inherited: Vec::new(),
        };

        match run.execute(source).await {
            Ok(()) => {
                let report = run.report(started_at)?;
                info!(
                    project_id = report.project.id(),
                    delegations = report.delegations,
                    "pipeline run completed"
                );
                Ok(report)
            }
            Err(err) => {
                run.machine.abort();
                if err.is_cancelled() {
                    warn!(project_id = run.project.id(), "pipeline run cancelled");
                } else {
                    error!(project_id = run.project.id(), error = %err, "pipeline run failed");
                }
                Err(err)
            }
        }
    }

    /// Builds the project directory skeleton, create-if-absent.
    pub fn prepare_project(&self, project: &Project) -> Result<(), PipelineError> {
        self.store.ensure_dir(project.root())?;
        for dir in STAGE_DIRS {
            if self.store.ensure_dir(project.stage_dir(dir))? {
                debug!(project_id = project.id(), dir, "created stage directory");
            }
        }
        Ok(())
    }

    /// Copies the caller's document to `01_input/raw_document.<ext>`.
    ///
    /// An existing seeded copy is never overwritten.
    pub fn seed_source(&self, project: &Project, source: &Path) -> Result<PathBuf, PipelineError> {
        let input = if source.is_absolute() {
            source.to_path_buf()
        } else {
            self.store.root().join(DATA_DIR).join(source)
        };
        let ext = input
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| !ext.is_empty())
            .unwrap_or(DEFAULT_SOURCE_EXT);
        let target = self
            .store
            .resolve(project.artifact_path(SOURCE_DIR, &format!("{SOURCE_STEM}.{ext}")))?;

        if self.store.exists(&target) {
            debug!(path = %target.display(), "source already seeded");
            return Ok(target);
        }
        self.store.copy_file(&input, &target)?;
        Ok(target)
    }
}

impl std::fmt::Debug for PipelineCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCoordinator")
            .field("root", &self.store.root())
            .field("max_attempts", &self.config.max_attempts)
            .field("workers", &self.workers)
            .finish()
    }
}

/// State of one run in flight.
struct Run<'a> {
    coordinator: &'a PipelineCoordinator,
    machine: StageMachine,
    todos: TodoList,
    project: Project,
    source: PathBuf,
    sink: &'a Arc<dyn ProgressSink>,
    token: &'a CancellationToken,
    /// Outputs shared with earlier stages, as they were before the current attempt.
    inherited: Vec<(String, FileDigest)>,
}

impl Run<'_> {
    async fn execute(&mut self, source: &Path) -> Result<(), PipelineError> {
        self.machine.plan()?;
        self.coordinator.prepare_project(&self.project)?;
        self.source = self.coordinator.seed_source(&self.project, source)?;
        self.publish_todos().await;
        self.say(format!(
            "Project {} ready at {}",
            self.project.id(),
            self.project.root().display()
        ))
        .await;

        let mut previous_failure: Option<String> = None;
        let mut phase = self.machine.start()?;
        loop {
            match phase {
                Phase::Delegating { stage, attempt } => {
                    if let Err(err) = self.delegate(stage, attempt, previous_failure.as_deref()).await {
                        self.fail_item(stage, &err).await;
                        return Err(err);
                    }
                    phase = self.machine.delegated()?;
                }
                Phase::Validating { stage, attempt } => {
                    let def = &registry::stages()[stage];
                    let store = &self.coordinator.store;
                    let mut report = validation::validate_outputs(store, &self.project, def);
                    report.unchanged = validation::unchanged_outputs(store, &self.inherited);
                    if report.is_clean() {
                        info!(stage = def.name, attempt, "stage passed validation");
                        previous_failure = None;
                        self.todos.set_status(stage, TodoStatus::Completed);
                        self.publish_todos().await;
                        phase = self.machine.passed()?;
                    } else {
                        match self.reject(stage, &report).await {
                            Ok(next) => {
                                previous_failure = Some(report.reason());
                                phase = next;
                            }
                            Err(err) => {
                                self.fail_item(stage, &err).await;
                                return Err(err);
                            }
                        }
                    }
                }
                Phase::Completed => {
                    self.say("All stages completed").await;
                    // The last event of a successful run is the full snapshot.
                    self.publish_todos().await;
                    return Ok(());
                }
                Phase::Idle | Phase::Planning | Phase::Failed => {
                    return Err(PipelineError::Internal(format!("unexpected phase {phase}")));
                }
            }
        }
    }

    async fn delegate(
        &mut self,
        index: usize,
        attempt: u32,
        previous_failure: Option<&str>,
    ) -> Result<(), PipelineError> {
        self.token.checkpoint()?;
        let coordinator = self.coordinator;
        let def = &registry::stages()[index];
        let store = &coordinator.store;

        if let Some(missing) = validation::missing_inputs(store, &self.project, def, &self.source)
            .into_iter()
            .next()
        {
            return Err(PipelineError::MissingInput {
                stage: def.name.to_string(),
                artifact: missing.display().to_string(),
            });
        }

        let worker = coordinator
            .workers
            .get(def.name)
            .ok_or_else(|| PipelineError::Config(format!("no worker for stage {}", def.name)))?;

        if attempt == 1 {
            self.todos.set_status(index, TodoStatus::InProgress);
            self.publish_todos().await;
        }
        let max = self.machine.max_attempts();
        info!(stage = def.name, attempt, max_attempts = max, "delegating stage");
        self.say(format!("Delegating {} (attempt {attempt}/{max})", def.name))
            .await;

        let instruction = instruction::delegation(
            def,
            &self.project,
            &self.source,
            attempt,
            max,
            previous_failure,
        );
        self.inherited = validation::inherited_digests(store, &self.project, index);
        let ctx = WorkerContext {
            stage: def,
            attempt,
            project: &self.project,
            sink: self.sink,
            token: self.token,
        };

        let result = tokio::select! {
            biased;
            () = self.token.cancelled() => Err(self.token.to_error()),
            result = worker.invoke(&instruction, &ctx) => result,
        }?;
        debug!(stage = def.name, attempt, chars = result.len(), "worker returned");
        self.token.checkpoint()
    }

    async fn reject(
        &mut self,
        index: usize,
        report: &ValidationError,
    ) -> Result<Phase, PipelineError> {
        let def = &registry::stages()[index];
        let reason = report.reason();
        warn!(stage = def.name, attempts = self.machine.attempts(index), %reason, "stage failed validation");

        match self.machine.rejected()? {
            RetryDecision::Retry(next) => {
                let removed = validation::clean_stage_dir(
                    &self.coordinator.store,
                    &self.project,
                    index,
                    &self.source,
                )?;
                debug!(stage = def.name, removed = removed.len(), "stage directory cleaned");
                self.say(format!(
                    "{} produced invalid output ({reason}); retrying (attempt {next})",
                    def.name
                ))
                .await;
                Ok(self.machine.phase())
            }
            RetryDecision::Exhausted(attempts) => Err(PipelineError::RetryExhausted {
                stage: def.name.to_string(),
                attempts,
                reason,
            }),
        }
    }

    async fn fail_item(&mut self, index: usize, err: &PipelineError) {
        self.machine.abort();
        self.todos.set_status(index, TodoStatus::Cancelled);
        self.publish_todos().await;
        self.say(err.to_string()).await;
    }

    async fn publish_todos(&self) {
        self.sink.emit(ProgressEvent::todos(self.todos.snapshot())).await;
    }

    async fn say(&self, text: impl Into<String> + Send) {
        self.sink.emit(ProgressEvent::message(text)).await;
    }

    fn report(&self, started_at: DateTime<Utc>) -> Result<RunReport, PipelineError> {
        let store = &self.coordinator.store;
        let mut seen = HashSet::new();
        let mut artifacts = vec![store.digest(&self.source)?];
        for def in registry::stages() {
            for path in def.output_paths(&self.project) {
                if seen.insert(path.clone()) {
                    artifacts.push(store.digest(&path)?);
                }
            }
        }

        let stages = registry::stages()
            .iter()
            .enumerate()
            .map(|(index, def)| StageRecord {
                stage: def.name.to_string(),
                attempts: self.machine.attempts(index),
                outcome: self.machine.outcome(index),
            })
            .collect();

        Ok(RunReport {
            run_id: Uuid::new_v4(),
            project: self.project.clone(),
            source: self.source.clone(),
            stages,
            artifacts,
            delegations: self.machine.delegations(),
            started_at,
            finished_at: Utc::now(),
        })
    }
}
