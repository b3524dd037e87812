//! Chat-completions client for OpenAI-compatible providers (DeepSeek, OpenAI).

use super::chat::{ChatClient, ChatError, ChatRequest, ChatResponse};
use crate::config::ModelConfig;
use crate::errors::PipelineError;
use crate::tools::ToolCall;
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

/// HTTP client for a `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    /// Creates a client with an explicit endpoint and key.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Creates a client from model settings, reading the key from the environment.
    pub fn from_config(model: &ModelConfig) -> Result<Self, PipelineError> {
        let api_key = model.api_key().ok_or_else(|| {
            PipelineError::Config(format!(
                "{} is not set for model {}",
                model.provider.api_key_env(),
                model.name
            ))
        })?;
        Self::new(&model.base_url, api_key, model.request_timeout())
    }

    fn body(request: &ChatRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "temperature": request.temperature,
            "messages": request.messages.iter().map(|m| m.to_openai()).collect::<Vec<_>>(),
        });
        if !request.tools.is_empty() {
            body["tools"] = request.tools.iter().map(|t| t.to_openai()).collect();
        }
        body
    }

    fn parse(body: &serde_json::Value) -> Result<ChatResponse, ChatError> {
        let message = body
            .pointer("/choices/0/message")
            .ok_or_else(|| ChatError::Decode("response has no choices".to_string()))?;
        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .map(str::to_string);
        let tool_calls = match message.get("tool_calls") {
            Some(serde_json::Value::Array(calls)) => calls
                .iter()
                .map(|raw| {
                    ToolCall::from_openai(raw)
                        .ok_or_else(|| ChatError::Decode(format!("malformed tool call: {raw}")))
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };
        Ok(ChatResponse {
            content,
            tool_calls,
        })
    }
}

#[async_trait]
impl ChatClient for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, ChatError> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "sending chat completion"
        );
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&Self::body(request))
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ChatError::Decode(e.to_string()))?;
        Self::parse(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolDefinition;
    use crate::worker::chat::ChatMessage;

    #[test]
    fn test_request_body() {
        let request = ChatRequest {
            model: "deepseek-chat".to_string(),
            temperature: 1.0,
            messages: vec![ChatMessage::system("sys"), ChatMessage::user("go")],
            tools: vec![ToolDefinition::new("return_work_path")],
        };
        let body = OpenAiClient::body(&request);

        assert_eq!(body["model"], "deepseek-chat");
        assert_eq!(body["messages"][1]["content"], "go");
        assert_eq!(body["tools"][0]["function"]["name"], "return_work_path");
    }

    #[test]
    fn test_parse_tool_calls() {
        let body = serde_json::json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "read_file", "arguments": "{\"path\":\"/ws/a.md\"}"}
                    }]
                }
            }]
        });
        let response = OpenAiClient::parse(&body).unwrap();

        assert!(response.content.is_none());
        assert_eq!(response.tool_calls[0].id, "call_9");
    }

    #[test]
    fn test_parse_rejects_empty_choices() {
        let err = OpenAiClient::parse(&serde_json::json!({"choices": []})).unwrap_err();
        assert!(matches!(err, ChatError::Decode(_)));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        let client =
            OpenAiClient::new("https://api.deepseek.com/", "k", std::time::Duration::from_secs(1))
                .unwrap();
        assert_eq!(client.base_url, "https://api.deepseek.com");
    }
}
