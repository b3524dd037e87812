//! Tool registry for one stage's capability set.

use super::{ToolCall, ToolDefinition};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A resolved tool call ready for execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedToolCall {
    /// The call ID.
    pub id: String,
    /// The tool name.
    pub name: String,
    /// The parsed arguments.
    pub arguments: serde_json::Value,
}

/// A tool call that failed parsing or resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnresolvedToolCall {
    /// The call ID.
    pub id: String,
    /// The tool name as requested.
    pub name: String,
    /// The error message.
    pub error: String,
}

/// A capability operation callable by a stage worker.
///
/// `call` never fails: every outcome, including errors, is a human-readable
/// status string handed back to the model.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool definition.
    fn definition(&self) -> ToolDefinition;

    /// Executes the tool.
    async fn call(&self, arguments: serde_json::Value) -> String;

    /// Returns the tool's name.
    fn name(&self) -> String {
        self.definition().name
    }
}

/// Registry of the tools bound to one stage.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, replacing any tool with the same name.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.tools.write().insert(tool.name(), tool);
    }

    /// Registers every tool in `tools`.
    pub fn extend(&self, tools: impl IntoIterator<Item = Arc<dyn Tool>>) {
        for tool in tools {
            self.register(tool);
        }
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.read().get(name).cloned()
    }

    /// Checks if a tool is registered.
    #[must_use]
    pub fn can_execute(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// Lists registered tool names in sorted order.
    #[must_use]
    pub fn list_tools(&self) -> Vec<String> {
        self.tools.read().keys().cloned().collect()
    }

    /// Returns every definition in name order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.read().values().map(|t| t.definition()).collect()
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    /// Returns true if no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    /// Parses a call's arguments and checks the tool exists.
    pub fn resolve(&self, call: &ToolCall) -> Result<ResolvedToolCall, UnresolvedToolCall> {
        let unresolved = |error: String| UnresolvedToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            error,
        };

        let arguments = if call.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            match serde_json::from_str::<serde_json::Value>(&call.arguments) {
                Ok(value @ serde_json::Value::Object(_)) => value,
                Ok(serde_json::Value::Null) => serde_json::json!({}),
                Ok(_) => return Err(unresolved("Arguments must be a JSON object".to_string())),
                Err(e) => return Err(unresolved(format!("Invalid JSON in arguments: {e}"))),
            }
        };

        if !self.can_execute(&call.name) {
            return Err(unresolved(format!("No tool registered with name '{}'", call.name)));
        }

        Ok(ResolvedToolCall {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments,
        })
    }

    /// Resolves and runs a call, rendering any failure as text.
    pub async fn execute(&self, call: &ToolCall) -> String {
        let resolved = match self.resolve(call) {
            Ok(resolved) => resolved,
            Err(unresolved) => {
                debug!(tool = %unresolved.name, error = %unresolved.error, "unresolved tool call");
                return unresolved.error;
            }
        };
        let Some(tool) = self.get(&resolved.name) else {
            return format!("No tool registered with name '{}'", resolved.name);
        };
        debug!(tool = %resolved.name, "executing tool");
        tool.call(resolved.arguments).await
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.list_tools())
            .finish()
    }
}
