//! Tool-calling agent worker.

use super::chat::{ChatClient, ChatMessage, ChatRequest};
use super::{StageWorker, WorkerContext};
use crate::config::ModelConfig;
use crate::core::{TodoItem, TodoList};
use crate::errors::PipelineError;
use crate::registry::StageDef;
use crate::tools::{ToolCall, ToolDefinition, ToolRegistry};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Name of the built-in planning tool.
pub const WRITE_TODOS: &str = "write_todos";

#[derive(Deserialize)]
struct WriteTodosArgs {
    todos: Vec<TodoItem>,
}

fn write_todos_definition() -> ToolDefinition {
    ToolDefinition::new(WRITE_TODOS)
        .with_description(
            "Replace your task list. Send the complete list every time; items not sent are removed.",
        )
        .with_input_schema(serde_json::json!({
            "type": "object",
            "properties": {
                "todos": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "content": {"type": "string"},
                            "status": {
                                "type": "string",
                                "enum": ["pending", "in_progress", "completed", "cancelled"]
                            }
                        },
                        "required": ["content", "status"]
                    }
                }
            },
            "required": ["todos"]
        }))
}

/// A stage worker that drives a chat model through a bounded tool loop.
///
/// Each invocation starts a fresh conversation: the system prompt, then the
/// delegation instruction. The loop ends when the model answers without tool
/// calls, or after `max_turns` model turns. Tool failures go back to the model
/// as text and are never retried here.
pub struct AgentWorker {
    stage: &'static StageDef,
    client: Arc<dyn ChatClient>,
    tools: ToolRegistry,
    model: String,
    temperature: f32,
    system_prompt: String,
    max_turns: usize,
}

impl AgentWorker {
    /// Creates a worker for a stage.
    #[must_use]
    pub fn new(
        stage: &'static StageDef,
        client: Arc<dyn ChatClient>,
        tools: ToolRegistry,
        model: &ModelConfig,
        system_prompt: String,
        max_turns: usize,
    ) -> Self {
        Self {
            stage,
            client,
            tools,
            model: model.name.clone(),
            temperature: model.temperature(stage.tier),
            system_prompt,
            max_turns: max_turns.max(1),
        }
    }

    /// Returns the sampling temperature this worker uses.
    #[must_use]
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = self.tools.definitions();
        defs.push(write_todos_definition());
        defs
    }

    async fn write_todos(
        &self,
        call: &ToolCall,
        board: &mut TodoList,
        ctx: &WorkerContext<'_>,
    ) -> String {
        let args: WriteTodosArgs = match serde_json::from_str(&call.arguments) {
            Ok(args) => args,
            Err(e) => return format!("Invalid arguments for {WRITE_TODOS}: {e}"),
        };
        board.replace(args.todos);
        let summary = board.summary();
        ctx.report_todos(board.snapshot()).await;
        ctx.report(format!("todos: {summary}")).await;
        format!("Todo list updated: {summary}")
    }
}

#[async_trait]
impl StageWorker for AgentWorker {
    fn stage(&self) -> &str {
        self.stage.name
    }

    async fn invoke(&self, instruction: &str, ctx: &WorkerContext<'_>) -> Result<String, PipelineError> {
        info!(stage = self.stage.name, attempt = ctx.attempt, "agent invocation started");
        let tools = self.definitions();
        let mut board = TodoList::default();
        let mut messages = vec![
            ChatMessage::system(self.system_prompt.clone()),
            ChatMessage::user(instruction),
        ];

        for turn in 1..=self.max_turns {
            ctx.checkpoint()?;
            let request = ChatRequest {
                model: self.model.clone(),
                temperature: self.temperature,
                messages: messages.clone(),
                tools: tools.clone(),
            };
            let response = self
                .client
                .complete(&request)
                .await
                .map_err(|e| PipelineError::upstream(self.stage.name, e.to_string()))?;
            ctx.checkpoint()?;

            if response.tool_calls.is_empty() {
                let result = response.content.unwrap_or_default();
                debug!(stage = self.stage.name, turn, "agent finished");
                ctx.report(result.clone()).await;
                return Ok(result);
            }

            if let Some(text) = response.content.as_deref().filter(|t| !t.trim().is_empty()) {
                ctx.report(text.to_string()).await;
            }
            messages.push(ChatMessage::assistant(
                response.content.clone(),
                response.tool_calls.clone(),
            ));

            for call in &response.tool_calls {
                ctx.checkpoint()?;
                debug!(stage = self.stage.name, turn, tool = %call.name, "tool call");
                let output = if call.name == WRITE_TODOS {
                    self.write_todos(call, &mut board, ctx).await
                } else {
                    self.tools.execute(call).await
                };
                messages.push(ChatMessage::tool(call.id.clone(), output));
            }
        }

        warn!(stage = self.stage.name, max_turns = self.max_turns, "agent hit turn limit");
        Ok(format!(
            "Stopped after {} model turns without a final answer.",
            self.max_turns
        ))
    }
}

impl std::fmt::Debug for AgentWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentWorker")
            .field("stage", &self.stage.name)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("tools", &self.tools)
            .field("max_turns", &self.max_turns)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationToken;
    use crate::config::TemperatureTier;
    use crate::core::{ProgressEvent, Project, TodoStatus};
    use crate::events::{CollectingProgressSink, ProgressSink};
    use crate::registry;
    use crate::store::ArtifactStore;
    use crate::tools::filesystem_tools;
    use crate::worker::chat::{ChatError, ChatResponse, MockChatClient};
    use mockall::Sequence;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        store: Arc<ArtifactStore>,
        project: Project,
        collector: Arc<CollectingProgressSink>,
        sink: Arc<dyn ProgressSink>,
        token: CancellationToken,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ArtifactStore::open(dir.path().join("ws")).unwrap());
        let project = Project::new("1700000000", store.root()).unwrap();
        let collector = Arc::new(CollectingProgressSink::new());
        let sink: Arc<dyn ProgressSink> = collector.clone();
        Fixture {
            _dir: dir,
            store,
            project,
            collector,
            sink,
            token: CancellationToken::new(),
        }
    }

    fn worker(stage: &str, client: MockChatClient, fx: &Fixture, max_turns: usize) -> AgentWorker {
        let tools = ToolRegistry::new();
        tools.extend(filesystem_tools(&fx.store));
        AgentWorker::new(
            registry::stage(stage).unwrap(),
            Arc::new(client),
            tools,
            &ModelConfig::default(),
            "system".to_string(),
            max_turns,
        )
    }

    fn ctx<'a>(fx: &'a Fixture, stage: &str) -> WorkerContext<'a> {
        WorkerContext {
            stage: registry::stage(stage).unwrap(),
            attempt: 1,
            project: &fx.project,
            sink: &fx.sink,
            token: &fx.token,
        }
    }

    #[tokio::test]
    async fn test_tool_loop_writes_output_and_returns_final_text() {
        let fx = fixture();
        let target = fx.project.artifact_path("04_content", "abstract.md");
        let write_args = serde_json::json!({"path": target, "content": "An abstract."}).to_string();
        let todos_args = serde_json::json!({
            "todos": [{"content": "write abstract", "status": "completed"}]
        })
        .to_string();

        let mut client = MockChatClient::new();
        let mut seq = Sequence::new();
        client
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |request| {
                assert_eq!(request.messages.len(), 2);
                assert!(request.tools.iter().any(|t| t.name == WRITE_TODOS));
                Ok(ChatResponse::calls(vec![
                    ToolCall::new("c1", WRITE_TODOS, todos_args.clone()),
                    ToolCall::new("c2", "write_file", write_args.clone()),
                ]))
            });
        client
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|request| {
                let last = request.messages.last().unwrap();
                assert_eq!(last.tool_call_id.as_deref(), Some("c2"));
                assert!(last.content.as_deref().unwrap().starts_with("File written"));
                Ok(ChatResponse::text("Abstract written."))
            });

        let worker = worker("abstract_writer", client, &fx, 10);
        let result = worker.invoke("write it", &ctx(&fx, "abstract_writer")).await.unwrap();

        assert_eq!(result, "Abstract written.");
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "An abstract.");

        let stage_lists: Vec<_> = fx
            .collector
            .events()
            .into_iter()
            .filter_map(|e| match e {
                ProgressEvent::Todos { stage: Some(_), todos } => Some(todos),
                _ => None,
            })
            .collect();
        assert_eq!(stage_lists.len(), 1);
        assert_eq!(stage_lists[0][0].status, TodoStatus::Completed);
    }

    #[tokio::test]
    async fn test_provider_failure_is_upstream() {
        let fx = fixture();
        let mut client = MockChatClient::new();
        client.expect_complete().times(1).returning(|_| {
            Err(ChatError::Api {
                status: 503,
                body: "overloaded".to_string(),
            })
        });

        let err = worker("claims_writer", client, &fx, 10)
            .invoke("go", &ctx(&fx, "claims_writer"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Upstream { ref stage, .. } if stage == "claims_writer"));
    }

    #[tokio::test]
    async fn test_turn_limit_returns_note() {
        let fx = fixture();
        let mut client = MockChatClient::new();
        client
            .expect_complete()
            .times(2)
            .returning(|_| Ok(ChatResponse::calls(vec![ToolCall::new("c", "return_work_path", "")])));

        let result = worker("outline_generator", client, &fx, 2)
            .invoke("go", &ctx(&fx, "outline_generator"))
            .await
            .unwrap();
        assert!(result.contains("2 model turns"));
    }

    #[tokio::test]
    async fn test_bad_todos_go_back_to_model() {
        let fx = fixture();
        let mut client = MockChatClient::new();
        let mut seq = Sequence::new();
        client
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ChatResponse::calls(vec![ToolCall::new("c", WRITE_TODOS, "{}")])));
        client
            .expect_complete()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|request| {
                let last = request.messages.last().unwrap().content.clone().unwrap();
                assert!(last.starts_with("Invalid arguments for write_todos"));
                Ok(ChatResponse::text("done"))
            });

        let result = worker("abstract_writer", client, &fx, 5)
            .invoke("go", &ctx(&fx, "abstract_writer"))
            .await
            .unwrap();
        assert_eq!(result, "done");
    }

    #[tokio::test]
    async fn test_cancelled_before_first_turn() {
        let fx = fixture();
        fx.token.cancel("stop");
        let client = MockChatClient::new();

        let err = worker("abstract_writer", client, &fx, 5)
            .invoke("go", &ctx(&fx, "abstract_writer"))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_temperature_follows_stage_tier() {
        let fx = fixture();
        let model = ModelConfig::default();
        let diagrams = worker("diagram_generator", MockChatClient::new(), &fx, 1);
        let claims = worker("claims_writer", MockChatClient::new(), &fx, 1);

        assert_eq!(diagrams.temperature(), model.temperature(TemperatureTier::Low));
        assert_eq!(claims.temperature(), model.temperature(TemperatureTier::High));
    }
}
