//! Tool definitions and call types.

use serde::{Deserialize, Serialize};

/// Definition of a tool offered to a stage worker's model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name.
    pub name: String,
    /// Description of what the tool does.
    pub description: String,
    /// JSON Schema for the arguments object.
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    /// Creates a definition that takes no arguments.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Sets the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: serde_json::Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Builds an object schema of required string parameters from `(name, description)` pairs.
    #[must_use]
    pub fn with_string_params(self, params: &[(&str, &str)]) -> Self {
        let properties: serde_json::Map<String, serde_json::Value> = params
            .iter()
            .map(|(name, desc)| {
                (
                    (*name).to_string(),
                    serde_json::json!({"type": "string", "description": desc}),
                )
            })
            .collect();
        let required: Vec<&str> = params.iter().map(|(name, _)| *name).collect();
        self.with_input_schema(serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }))
    }

    /// Renders the definition in the chat-completions `tools` format.
    #[must_use]
    pub fn to_openai(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema,
            }
        })
    }
}

/// A tool call requested by a model. Arguments arrive as a JSON string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned call id, echoed back with the result.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Raw JSON arguments.
    pub arguments: String,
}

impl ToolCall {
    /// Creates a tool call.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Renders the call in the chat-completions `tool_calls` format.
    #[must_use]
    pub fn to_openai(&self) -> serde_json::Value {
        serde_json::json!({
            "id": self.id,
            "type": "function",
            "function": {
                "name": self.name,
                "arguments": self.arguments,
            }
        })
    }

    /// Parses a call from the chat-completions `tool_calls` format.
    #[must_use]
    pub fn from_openai(value: &serde_json::Value) -> Option<Self> {
        let function = value.get("function")?;
        let arguments = match function.get("arguments") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        Some(Self {
            id: value
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            name: function.get("name")?.as_str()?.to_string(),
            arguments,
        })
    }
}
