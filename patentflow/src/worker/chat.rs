//! Chat-completion types and the client seam.

use crate::tools::{ToolCall, ToolDefinition};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// System instructions.
    System,
    /// Caller input.
    User,
    /// Model output.
    Assistant,
    /// A tool result.
    Tool,
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the message.
    pub role: Role,
    /// Text content, absent on tool-call-only assistant turns.
    pub content: Option<String>,
    /// Tool calls made on an assistant turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// The call a tool message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// A system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    /// A user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    /// An assistant turn.
    #[must_use]
    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    /// A tool result answering `call_id`.
    #[must_use]
    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    /// Renders the message in the chat-completions wire format.
    #[must_use]
    pub fn to_openai(&self) -> serde_json::Value {
        let mut value = serde_json::json!({
            "role": self.role,
            "content": self.content,
        });
        if !self.tool_calls.is_empty() {
            value["tool_calls"] = self.tool_calls.iter().map(ToolCall::to_openai).collect();
        }
        if let Some(id) = &self.tool_call_id {
            value["tool_call_id"] = serde_json::json!(id);
        }
        value
    }
}

/// One model turn request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    /// Model name.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// The conversation so far.
    pub messages: Vec<ChatMessage>,
    /// Tools the model may call.
    pub tools: Vec<ToolDefinition>,
}

/// One model turn response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Text content.
    pub content: Option<String>,
    /// Requested tool calls.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

impl ChatResponse {
    /// A final text answer.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    /// A turn that only calls tools.
    #[must_use]
    pub fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }
}

/// Failures talking to a model provider.
#[derive(Debug, Error)]
pub enum ChatError {
    /// The request never got a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered with an error status.
    #[error("provider returned {status}: {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The response could not be decoded.
    #[error("invalid response: {0}")]
    Decode(String),
}

/// A chat-completions provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Runs one model turn.
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ChatError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_message_wire_format() {
        let msg = ChatMessage::assistant(None, vec![ToolCall::new("c1", "read_file", "{}")]);
        let wire = msg.to_openai();

        assert_eq!(wire["role"], "assistant");
        assert!(wire["content"].is_null());
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "read_file");
    }

    #[test]
    fn test_tool_message_wire_format() {
        let wire = ChatMessage::tool("c1", "ok").to_openai();
        assert_eq!(wire["role"], "tool");
        assert_eq!(wire["tool_call_id"], "c1");
        assert_eq!(wire["content"], "ok");
    }
}
