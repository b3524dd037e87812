//! Scripted stage workers.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::PipelineError;
use crate::registry::{self, StageDef};
use crate::store::ArtifactStore;
use crate::worker::{StageWorker, WorkerContext, WorkerSet};

/// What a [`ScriptedWorker`] does on one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    /// Write every required output.
    WriteOutputs,
    /// Write a scratch file but none of the required outputs.
    Partial,
    /// Fail with an upstream error carrying this message.
    Upstream(String),
}

/// A worker that follows a script instead of calling a model.
///
/// Queued steps run first; once the queue is empty every invocation runs
/// the fallback step.
#[derive(Debug)]
pub struct ScriptedWorker {
    stage: &'static StageDef,
    store: Arc<ArtifactStore>,
    queue: Mutex<VecDeque<Script>>,
    fallback: Script,
    delay: Option<Duration>,
    instructions: Mutex<Vec<String>>,
}

impl ScriptedWorker {
    /// Creates a worker that always writes its outputs.
    #[must_use]
    pub fn new(stage: &'static StageDef, store: Arc<ArtifactStore>) -> Self {
        Self {
            stage,
            store,
            queue: Mutex::new(VecDeque::new()),
            fallback: Script::WriteOutputs,
            delay: None,
            instructions: Mutex::new(Vec::new()),
        }
    }

    /// Creates a worker for a stage looked up by name.
    pub fn for_stage(name: &str, store: Arc<ArtifactStore>) -> Result<Self, PipelineError> {
        let stage = registry::stage(name)
            .ok_or_else(|| PipelineError::Config(format!("unknown stage {name}")))?;
        Ok(Self::new(stage, store))
    }

    /// Queues steps that run before the fallback.
    #[must_use]
    pub fn with_steps(self, steps: impl IntoIterator<Item = Script>) -> Self {
        self.queue.lock().extend(steps);
        self
    }

    /// Sets the step used once the queue is empty.
    #[must_use]
    pub fn with_fallback(mut self, step: Script) -> Self {
        self.fallback = step;
        self
    }

    /// Sleeps before every step.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of invocations so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.instructions.lock().len()
    }

    /// Every instruction received, in order.
    #[must_use]
    pub fn instructions(&self) -> Vec<String> {
        self.instructions.lock().clone()
    }

    fn write_outputs(&self, ctx: &WorkerContext<'_>) -> Result<(), PipelineError> {
        for (name, path) in self.stage.outputs.iter().zip(self.stage.output_paths(ctx.project)) {
            if is_json(name) {
                let body = serde_json::json!({ "stage": self.stage.name, "attempt": ctx.attempt });
                self.store.write_json(&path, &body)?;
            } else if self.store.exists(&path) {
                self.store
                    .append_text(&path, &format!("\n## {}\n", self.stage.name))?;
            } else {
                self.store
                    .write_text(&path, &format!("# {name}\n\nWritten by {}.\n", self.stage.name))?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl StageWorker for ScriptedWorker {
    fn stage(&self) -> &str {
        self.stage.name
    }

    async fn invoke(&self, instruction: &str, ctx: &WorkerContext<'_>) -> Result<String, PipelineError> {
        self.instructions.lock().push(instruction.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let step = self
            .queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match step {
            Script::WriteOutputs => {
                self.write_outputs(ctx)?;
                ctx.report(format!("{} wrote its outputs", self.stage.name)).await;
                Ok(format!("{} done", self.stage.name))
            }
            Script::Partial => {
                let scratch = ctx.project.artifact_path(self.stage.dir, "scratch.tmp");
                self.store.write_text(scratch, "partial")?;
                Ok(format!("{} gave up early", self.stage.name))
            }
            Script::Upstream(message) => Err(PipelineError::upstream(self.stage.name, message)),
        }
    }
}

/// A worker that never returns. Used to exercise cancellation.
#[derive(Debug)]
pub struct BlockingWorker {
    stage: &'static StageDef,
    started: AtomicBool,
}

impl BlockingWorker {
    /// Creates a blocking worker for a stage.
    #[must_use]
    pub fn new(stage: &'static StageDef) -> Self {
        Self {
            stage,
            started: AtomicBool::new(false),
        }
    }

    /// Returns true once the worker has been invoked.
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageWorker for BlockingWorker {
    fn stage(&self) -> &str {
        self.stage.name
    }

    async fn invoke(&self, _instruction: &str, ctx: &WorkerContext<'_>) -> Result<String, PipelineError> {
        self.started.store(true, Ordering::SeqCst);
        ctx.report(format!("{} is waiting", self.stage.name)).await;
        std::future::pending::<()>().await;
        Ok(String::new())
    }
}

/// One scripted worker per stage.
#[derive(Debug, Clone)]
pub struct ScriptedTeam {
    workers: Vec<Arc<ScriptedWorker>>,
}

impl ScriptedTeam {
    /// Workers that write their outputs on the first attempt.
    #[must_use]
    pub fn writing(store: &Arc<ArtifactStore>) -> Self {
        Self {
            workers: registry::stages()
                .iter()
                .map(|stage| Arc::new(ScriptedWorker::new(stage, Arc::clone(store))))
                .collect(),
        }
    }

    /// Replaces the worker for its stage.
    #[must_use]
    pub fn with_worker(mut self, worker: ScriptedWorker) -> Self {
        let worker = Arc::new(worker);
        if let Some(slot) = self
            .workers
            .iter_mut()
            .find(|w| w.stage.name == worker.stage.name)
        {
            *slot = worker;
        }
        self
    }

    /// Looks up a worker by stage name.
    #[must_use]
    pub fn worker(&self, stage: &str) -> Option<&Arc<ScriptedWorker>> {
        self.workers.iter().find(|w| w.stage.name == stage)
    }

    /// Call counts in registry order.
    #[must_use]
    pub fn call_counts(&self) -> Vec<usize> {
        self.workers.iter().map(|w| w.call_count()).collect()
    }

    /// Builds the worker set for a coordinator.
    #[must_use]
    pub fn worker_set(&self) -> WorkerSet {
        self.workers
            .iter()
            .fold(WorkerSet::new(), |set, worker| {
                set.with_worker(Arc::clone(worker) as Arc<dyn StageWorker>)
            })
    }
}

fn is_json(name: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
