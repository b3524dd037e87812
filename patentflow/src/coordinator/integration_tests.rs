//! End-to-end scenarios for the coordinator and the execution bridge.

#[cfg(test)]
mod tests {
    use crate::bridge::ExecutionBridge;
    use crate::cancellation::CancellationToken;
    use crate::config::PipelineConfig;
    use crate::coordinator::PipelineCoordinator;
    use crate::core::{AttemptOutcome, ProgressEvent, ProgressView, RunState, TodoStatus};
    use crate::errors::PipelineError;
    use crate::events::{CollectingProgressSink, ProgressSink};
    use crate::registry::{self, STAGE_DIRS};
    use crate::store::ArtifactStore;
    use crate::testing::{BlockingWorker, Script, ScriptedTeam, ScriptedWorker};
    use crate::worker::{StageWorker, WorkerSet};
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;

    const PROJECT_ID: &str = "1700000000";

    struct Workspace {
        _dir: TempDir,
        store: Arc<ArtifactStore>,
    }

    fn workspace() -> Workspace {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ArtifactStore::open(dir.path().join("ws")).unwrap());
        let data = store.root().join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("draft.docx"), "an invention disclosure").unwrap();
        Workspace { _dir: dir, store }
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default().with_poll_interval_ms(10)
    }

    async fn run_direct(
        ws: &Workspace,
        workers: WorkerSet,
        config: PipelineConfig,
    ) -> (Result<crate::coordinator::RunReport, PipelineError>, Arc<CollectingProgressSink>) {
        let coordinator = PipelineCoordinator::new(config, Arc::clone(&ws.store), workers).unwrap();
        let collector = Arc::new(CollectingProgressSink::new());
        let sink: Arc<dyn ProgressSink> = collector.clone();
        let result = coordinator
            .run(
                Path::new("draft.docx"),
                Some(PROJECT_ID),
                &sink,
                &CancellationToken::new(),
            )
            .await;
        (result, collector)
    }

    fn delegated_stages(collector: &CollectingProgressSink) -> Vec<String> {
        collector
            .messages()
            .into_iter()
            .filter_map(|text| {
                text.strip_prefix("Delegating ")
                    .and_then(|rest| rest.split(' ').next())
                    .map(str::to_string)
            })
            .collect()
    }

    #[test]
    fn test_full_run_through_bridge() {
        let ws = workspace();
        let team = ScriptedTeam::writing(&ws.store);
        let coordinator =
            PipelineCoordinator::new(config(), Arc::clone(&ws.store), team.worker_set()).unwrap();
        let bridge = ExecutionBridge::new(coordinator);

        let events: Vec<ProgressEvent> = bridge
            .start("draft.docx", Some(PROJECT_ID.to_string()))
            .unwrap()
            .map(Result::unwrap)
            .collect();

        assert_eq!(bridge.wait(), RunState::FinishedSuccess);

        let root = ws.store.root().join("temp_1700000000");
        for dir in STAGE_DIRS {
            assert!(root.join(dir).is_dir(), "missing {dir}");
        }
        assert!(root.join("01_input/raw_document.docx").is_file());
        for stage in registry::stages() {
            for name in stage.outputs {
                let path = root.join(stage.dir).join(name);
                assert!(std::fs::metadata(&path).unwrap().len() > 0, "{}", path.display());
            }
        }

        match events.last().unwrap() {
            ProgressEvent::Todos { stage: None, todos } => {
                assert_eq!(todos.len(), 9);
                assert!(todos.iter().all(|t| t.status == TodoStatus::Completed));
            }
            other => panic!("last event was {other:?}"),
        }

        let report = bridge.report().unwrap();
        assert_eq!(report.project.id(), PROJECT_ID);
        assert_eq!(report.delegations, 9);
        assert_eq!(report.retried_stages(), 0);
        assert!(report
            .stages
            .iter()
            .all(|s| s.outcome == AttemptOutcome::Success));
        assert_eq!(report.artifacts.len(), 13);
        assert!(report.artifacts.iter().all(|a| a.sha256.len() == 64));
        assert_eq!(team.call_counts(), vec![1; 9]);

        let metrics = bridge.metrics().unwrap();
        assert_eq!(metrics.emitted(), events.len() as u64);
        assert_eq!(metrics.dropped(), 0);
    }

    #[test]
    fn test_view_folds_to_completed_snapshot() {
        let ws = workspace();
        let team = ScriptedTeam::writing(&ws.store);
        let bridge = ExecutionBridge::new(
            PipelineCoordinator::new(config(), Arc::clone(&ws.store), team.worker_set()).unwrap(),
        );

        let mut view = ProgressView::new();
        for event in bridge.start("draft.docx", None).unwrap() {
            view.apply(&event.unwrap());
        }

        assert!(view
            .todo_snapshot
            .iter()
            .all(|t| t.status == TodoStatus::Completed));
        assert!(view
            .message_fragments
            .iter()
            .any(|m| m == "All stages completed"));
    }

    #[tokio::test]
    async fn test_missing_description_exhausts_retries() {
        let ws = workspace();
        let team = ScriptedTeam::writing(&ws.store).with_worker(
            ScriptedWorker::for_stage("description_writer_part1", Arc::clone(&ws.store))
                .unwrap()
                .with_fallback(Script::Partial),
        );

        let (result, collector) = run_direct(&ws, team.worker_set(), config()).await;

        match result.unwrap_err() {
            PipelineError::RetryExhausted { stage, attempts, reason } => {
                assert_eq!(stage, "description_writer_part1");
                assert_eq!(attempts, 5);
                assert!(reason.contains("description.md"));
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(team.call_counts(), vec![1, 1, 1, 1, 1, 5, 0, 0, 0]);

        let content = ws.store.root().join("temp_1700000000/04_content");
        assert!(content.join("abstract.md").is_file());
        assert!(content.join("claims.md").is_file());
        assert!(!content.join("description.md").exists());

        let todos = collector.last_todos().unwrap();
        assert_eq!(todos[4].status, TodoStatus::Completed);
        assert_eq!(todos[5].status, TodoStatus::Cancelled);
        assert_eq!(todos[6].status, TodoStatus::Pending);
        assert!(collector
            .messages()
            .last()
            .unwrap()
            .contains("description_writer_part1"));
    }

    #[tokio::test]
    async fn test_retry_then_success_cleans_between_attempts() {
        let ws = workspace();
        let team = ScriptedTeam::writing(&ws.store).with_worker(
            ScriptedWorker::for_stage("claims_writer", Arc::clone(&ws.store))
                .unwrap()
                .with_steps([Script::Partial, Script::Partial]),
        );

        let (result, _collector) = run_direct(&ws, team.worker_set(), config()).await;
        let report = result.unwrap();

        let claims = team.worker("claims_writer").unwrap();
        assert_eq!(claims.call_count(), 3);
        let instructions = claims.instructions();
        assert!(!instructions[0].contains("rejected"));
        assert!(instructions[1].contains("rejected: missing claims.md"));
        assert!(instructions[2].contains("Attempt 3 of 5"));

        assert_eq!(report.delegations, 11);
        assert_eq!(report.retried_stages(), 1);
        assert_eq!(report.stages[4].attempts, 3);
        let content = ws.store.root().join("temp_1700000000/04_content");
        assert!(!content.join("scratch.tmp").exists());
        assert!(content.join("abstract.md").is_file());
    }

    #[tokio::test]
    async fn test_untouched_shared_output_fails_validation() {
        let ws = workspace();
        let team = ScriptedTeam::writing(&ws.store).with_worker(
            ScriptedWorker::for_stage("description_writer_part2", Arc::clone(&ws.store))
                .unwrap()
                .with_fallback(Script::Partial),
        );

        let (result, _collector) = run_direct(&ws, team.worker_set(), config()).await;

        match result.unwrap_err() {
            PipelineError::RetryExhausted {
                stage,
                attempts,
                reason,
            } => {
                assert_eq!(stage, "description_writer_part2");
                assert_eq!(attempts, 5);
                assert!(reason.contains("unchanged description.md"), "{reason}");
            }
            other => panic!("expected retry exhaustion, got {other:?}"),
        }
        assert_eq!(team.call_counts(), vec![1, 1, 1, 1, 1, 1, 5, 0, 0]);
        let description = ws.store.root().join("temp_1700000000/04_content/description.md");
        assert!(description.is_file());
    }

    #[tokio::test]
    async fn test_shared_output_passes_once_extended() {
        let ws = workspace();
        let team = ScriptedTeam::writing(&ws.store).with_worker(
            ScriptedWorker::for_stage("description_writer_part2", Arc::clone(&ws.store))
                .unwrap()
                .with_steps([Script::Partial]),
        );

        let (result, _collector) = run_direct(&ws, team.worker_set(), config()).await;
        let report = result.unwrap();

        let part2 = team.worker("description_writer_part2").unwrap();
        assert_eq!(part2.call_count(), 2);
        assert!(part2.instructions()[1].contains("unchanged description.md"));
        assert_eq!(report.stages[6].attempts, 2);
        assert_eq!(report.stages[6].outcome, AttemptOutcome::Success);
    }

    #[tokio::test]
    async fn test_stages_run_in_registry_order() {
        let ws = workspace();
        let team = ScriptedTeam::writing(&ws.store).with_worker(
            ScriptedWorker::for_stage("outline_generator", Arc::clone(&ws.store))
                .unwrap()
                .with_steps([Script::Partial]),
        );

        let (result, collector) = run_direct(&ws, team.worker_set(), config()).await;
        assert!(result.is_ok());

        let mut expected: Vec<String> =
            registry::stages().iter().map(|s| s.name.to_string()).collect();
        expected.insert(2, "outline_generator".to_string());
        assert_eq!(delegated_stages(&collector), expected);
    }

    #[tokio::test]
    async fn test_upstream_error_is_not_retried() {
        let ws = workspace();
        let team = ScriptedTeam::writing(&ws.store).with_worker(
            ScriptedWorker::for_stage("patent_searcher", Arc::clone(&ws.store))
                .unwrap()
                .with_fallback(Script::Upstream("provider unreachable".to_string())),
        );

        let (result, collector) = run_direct(&ws, team.worker_set(), config()).await;

        let err = result.unwrap_err();
        assert_eq!(err.stage(), Some("patent_searcher"));
        assert!(err.to_string().contains("provider unreachable"));
        assert_eq!(team.call_counts(), vec![1, 1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(collector.last_todos().unwrap()[1].status, TodoStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_retry_ceiling_is_configurable() {
        let ws = workspace();
        let team = ScriptedTeam::writing(&ws.store).with_worker(
            ScriptedWorker::for_stage("input_parser", Arc::clone(&ws.store))
                .unwrap()
                .with_fallback(Script::Partial),
        );

        let (result, _) = run_direct(&ws, team.worker_set(), config().with_max_attempts(2)).await;

        assert!(matches!(
            result.unwrap_err(),
            PipelineError::RetryExhausted { attempts: 2, .. }
        ));
        assert_eq!(team.call_counts()[0], 2);
        let source = ws.store.root().join("temp_1700000000/01_input/raw_document.docx");
        assert!(source.is_file());
    }

    #[test]
    fn test_cancel_mid_run() {
        let ws = workspace();
        let team = ScriptedTeam::writing(&ws.store);
        let blocker = Arc::new(BlockingWorker::new(registry::stage("abstract_writer").unwrap()));
        let workers = team
            .worker_set()
            .with_worker(Arc::clone(&blocker) as Arc<dyn StageWorker>);
        let bridge = ExecutionBridge::new(
            PipelineCoordinator::new(config(), Arc::clone(&ws.store), workers).unwrap(),
        );

        let mut events = bridge.start("draft.docx", Some(PROJECT_ID.to_string())).unwrap();
        let handle = events.cancel_handle();
        let mut seen_after_cancel = 0;
        let mut last = None;
        for item in events.by_ref() {
            if handle.is_cancelled() && item.is_ok() {
                seen_after_cancel += 1;
            }
            if let Ok(event) = &item {
                if event.stage() == Some("abstract_writer") {
                    handle.cancel("user pressed stop");
                }
            }
            last = Some(item);
        }

        assert_eq!(seen_after_cancel, 0);
        match last {
            Some(Err(PipelineError::Cancelled(reason))) => {
                assert_eq!(reason, "user pressed stop");
            }
            other => panic!("expected the run to end cancelled, got {other:?}"),
        }
        assert!(events.is_done());
        assert!(blocker.has_started());
        assert_eq!(bridge.wait(), RunState::Cancelled);
        assert!(bridge.report().is_none());
        assert_eq!(&team.call_counts()[4..], &[0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_second_start_while_running_is_rejected() {
        let ws = workspace();
        let team = ScriptedTeam::writing(&ws.store);
        let workers = team.worker_set().with_worker(Arc::new(BlockingWorker::new(
            registry::stage("input_parser").unwrap(),
        )));
        let bridge = ExecutionBridge::new(
            PipelineCoordinator::new(config(), Arc::clone(&ws.store), workers).unwrap(),
        );

        let events = bridge.start("draft.docx", Some("first".to_string())).unwrap();
        assert!(matches!(
            bridge.start("draft.docx", Some("second".to_string())),
            Err(PipelineError::RunInProgress)
        ));

        bridge.cancel();
        drop(events);
        assert_eq!(bridge.wait(), RunState::Cancelled);

        // The bridge accepts a new run once the previous one has ended.
        let again = bridge.start("draft.docx", Some("third".to_string())).unwrap();
        drop(again);
        assert_eq!(bridge.wait(), RunState::Cancelled);
    }

    #[test]
    fn test_small_relay_delivers_everything() {
        let ws = workspace();
        let team = ScriptedTeam::writing(&ws.store);
        let config = config().with_relay_capacity(1);
        let bridge = ExecutionBridge::new(
            PipelineCoordinator::new(config, Arc::clone(&ws.store), team.worker_set()).unwrap(),
        );

        let mut received = 0_u64;
        for event in bridge.start("draft.docx", None).unwrap() {
            event.unwrap();
            received += 1;
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        assert_eq!(bridge.wait(), RunState::FinishedSuccess);
        let metrics = bridge.metrics().unwrap();
        assert_eq!(metrics.emitted(), received);
        assert_eq!(metrics.dropped(), 0);
    }
}
