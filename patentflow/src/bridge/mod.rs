//! Synchronous access to an asynchronous pipeline run.
//!
//! [`ExecutionBridge::start`] drives the coordinator on a dedicated thread
//! running a single-threaded tokio runtime, and hands the caller a blocking
//! [`RunEvents`] iterator fed through a bounded relay queue. The caller's
//! thread never runs pipeline code.

mod events;

pub use events::RunEvents;

use crate::cancellation::CancellationToken;
use crate::coordinator::{PipelineCoordinator, RunReport};
use crate::core::RunState;
use crate::errors::PipelineError;
use crate::events::{relay, ProgressSink, RelayMetrics};
use events::ErrorSlot;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info};

#[derive(Default)]
struct Shared {
    state: RunState,
    report: Option<RunReport>,
    token: Option<CancellationToken>,
    metrics: Option<Arc<RelayMetrics>>,
    handle: Option<JoinHandle<()>>,
}

/// Runs one pipeline at a time on a background thread.
#[derive(Clone)]
pub struct ExecutionBridge {
    coordinator: Arc<PipelineCoordinator>,
    shared: Arc<Mutex<Shared>>,
}

impl ExecutionBridge {
    /// Creates a bridge around a coordinator.
    #[must_use]
    pub fn new(coordinator: PipelineCoordinator) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            shared: Arc::new(Mutex::new(Shared::default())),
        }
    }

    /// Starts a run and returns its event stream.
    ///
    /// Fails with [`PipelineError::RunInProgress`] while another run started
    /// through this bridge is still running.
    pub fn start(
        &self,
        source: impl Into<PathBuf>,
        project_id: Option<String>,
    ) -> Result<RunEvents, PipelineError> {
        let source = source.into();
        let mut shared = self.shared.lock();
        if shared.state == RunState::Running {
            return Err(PipelineError::RunInProgress);
        }
        // A previous run's thread has already published its outcome.
        if let Some(handle) = shared.handle.take() {
            let _ = handle.join();
        }

        let config = self.coordinator.config();
        let token = CancellationToken::new();
        let (sink, rx) = relay(config.relay_capacity, token.clone());
        let error: ErrorSlot = Arc::new(Mutex::new(None));
        let poll = config.poll_interval();

        shared.state = RunState::Running;
        shared.report = None;
        shared.token = Some(token.clone());
        shared.metrics = Some(sink.metrics());

        let task = RunTask {
            coordinator: Arc::clone(&self.coordinator),
            shared: Arc::clone(&self.shared),
            error: Arc::clone(&error),
            token: token.clone(),
            source,
            project_id,
        };
        let spawned = std::thread::Builder::new()
            .name("patentflow-run".to_string())
            .spawn(move || task.run(sink));
        match spawned {
            Ok(handle) => shared.handle = Some(handle),
            Err(e) => {
                shared.state = RunState::FinishedError;
                return Err(PipelineError::Internal(format!("cannot spawn run thread: {e}")));
            }
        }
        info!("pipeline run dispatched");
        Ok(RunEvents::new(rx, token, error, poll))
    }

    /// Requests cancellation of the current run, if any.
    pub fn cancel(&self) {
        if let Some(token) = &self.shared.lock().token {
            token.cancel("cancelled by caller");
        }
    }

    /// State of the most recent run.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.shared.lock().state
    }

    /// Report of the most recent run, if it succeeded.
    #[must_use]
    pub fn report(&self) -> Option<RunReport> {
        self.shared.lock().report.clone()
    }

    /// Relay metrics of the most recent run.
    #[must_use]
    pub fn metrics(&self) -> Option<Arc<RelayMetrics>> {
        self.shared.lock().metrics.clone()
    }

    /// Blocks until the background thread of the most recent run exits and
    /// returns the final state.
    pub fn wait(&self) -> RunState {
        let handle = self.shared.lock().handle.take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("pipeline run thread panicked");
                let mut shared = self.shared.lock();
                if shared.state == RunState::Running {
                    shared.state = RunState::FinishedError;
                }
            }
        }
        self.state()
    }
}

impl std::fmt::Debug for ExecutionBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionBridge")
            .field("coordinator", &self.coordinator)
            .field("state", &self.state())
            .finish()
    }
}

/// Everything the background thread owns.
struct RunTask {
    coordinator: Arc<PipelineCoordinator>,
    shared: Arc<Mutex<Shared>>,
    error: ErrorSlot,
    token: CancellationToken,
    source: PathBuf,
    project_id: Option<String>,
}

impl RunTask {
    fn run(self, sink: crate::events::RelaySink) {
        // Keeps the queue open until the outcome is published, so the caller
        // never sees the end of the stream before the error slot is filled.
        let keepalive = sink.clone();
        let outcome = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime.block_on(async {
                let sink: Arc<dyn ProgressSink> = Arc::new(sink);
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => Err(self.token.to_error()),
                    result = self.coordinator.run(
                        &self.source,
                        self.project_id.as_deref(),
                        &sink,
                        &self.token,
                    ) => result,
                }
            }),
            Err(e) => Err(PipelineError::Internal(format!("cannot build runtime: {e}"))),
        };

        let state = match &outcome {
            Ok(_) => RunState::FinishedSuccess,
            Err(err) if err.is_cancelled() => RunState::Cancelled,
            Err(_) => RunState::FinishedError,
        };
        debug!(%state, "pipeline run thread finishing");

        {
            let mut shared = self.shared.lock();
            shared.state = state;
            match outcome {
                Ok(report) => shared.report = Some(report),
                Err(err) => *self.error.lock() = Some(err),
            }
        }
        drop(keepalive);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::store::ArtifactStore;
    use crate::testing::ScriptedTeam;
    use tempfile::TempDir;

    fn bridge(dir: &TempDir) -> ExecutionBridge {
        let store = Arc::new(ArtifactStore::open(dir.path().join("ws")).unwrap());
        let data = store.root().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("draft.docx"), "invention").unwrap();
        let team = ScriptedTeam::writing(&store);
        let config = PipelineConfig::default().with_poll_interval_ms(10);
        ExecutionBridge::new(PipelineCoordinator::new(config, store, team.worker_set()).unwrap())
    }

    #[test]
    fn test_initial_state() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir);
        assert_eq!(bridge.state(), RunState::NotStarted);
        assert!(bridge.report().is_none());
        assert!(bridge.metrics().is_none());
    }

    #[test]
    fn test_missing_source_surfaces_error() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir);

        let results: Vec<_> = bridge
            .start("absent.docx", Some("p1".to_string()))
            .unwrap()
            .collect();
        let last = results.last().unwrap();
        assert!(matches!(last, Err(PipelineError::Store(e)) if e.is_not_found()));
        assert_eq!(bridge.wait(), RunState::FinishedError);
    }

    #[test]
    fn test_invalid_project_id_fails_run() {
        let dir = TempDir::new().unwrap();
        let bridge = bridge(&dir);

        let results: Vec<_> = bridge
            .start("draft.docx", Some("../escape".to_string()))
            .unwrap()
            .collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(PipelineError::Config(_))));
        assert_eq!(bridge.wait(), RunState::FinishedError);
    }
}
