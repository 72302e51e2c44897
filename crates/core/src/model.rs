//! Model client trait — the abstraction over LLM backends.
//!
//! A model client receives a system prompt, the transcript records and the
//! available tools, and replies with either free text or a list of tool
//! invocations. Retry, pricing and routing live in decorators around it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::transcript::{ToolInvocation, TurnRecord};

/// A request for the next model reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// The model to use (e.g., "gpt-4o-mini")
    pub model: String,

    /// Instructions placed before the conversation
    pub system: String,

    /// The conversation so far
    pub turns: Vec<TurnRecord>,

    /// Tools the model may call. Empty disables tool calls.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,

    /// Temperature (0.0 = deterministic)
    #[serde(default)]
    pub temperature: f32,
}

impl ModelRequest {
    pub fn new(model: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: system.into(),
            turns: Vec::new(),
            tools: Vec::new(),
            temperature: 0.0,
        }
    }

    pub fn with_turns(mut self, turns: Vec<TurnRecord>) -> Self {
        self.turns = turns;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Whether the model is allowed to call tools.
    pub fn tools_enabled(&self) -> bool {
        !self.tools.is_empty()
    }
}

/// A tool definition sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// The single code-execution tool: one required string parameter `code`.
    pub fn code_execution(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: "Execute code in the task environment and return its printed output."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "The code to execute."
                    }
                },
                "required": ["code"],
                "additionalProperties": false
            }),
        }
    }
}

/// What the model decided to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ModelReply {
    /// Free text. Each string becomes one model turn.
    FinalAnswer(Vec<String>),
    /// One or more tool invocations, executed in order.
    ToolCalls(Vec<ToolInvocation>),
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self::FinalAnswer(vec![text.into()])
    }

    /// All free text joined, or `None` for a tool-call reply.
    pub fn joined_text(&self) -> Option<String> {
        match self {
            Self::FinalAnswer(parts) => Some(parts.join("\n")),
            Self::ToolCalls(_) => None,
        }
    }
}

/// A complete response from a model client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    pub reply: ModelReply,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }

    pub fn add(&mut self, other: &Usage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// The core model client trait.
///
/// Implementations own transport, authentication and rate limiting; the
/// loops only see [`ModelReply`] values.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// A human-readable name for this client.
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_tool_requires_code_parameter() {
        let tool = ToolDefinition::code_execution("execute_code");
        assert_eq!(tool.name, "execute_code");
        assert_eq!(tool.parameters["required"][0], "code");
        assert_eq!(tool.parameters["properties"]["code"]["type"], "string");
    }

    #[test]
    fn request_without_tools_disables_them() {
        let req = ModelRequest::new("gpt-4o-mini", "be brief");
        assert!(!req.tools_enabled());
        let req = req.with_tools(vec![ToolDefinition::code_execution("run")]);
        assert!(req.tools_enabled());
    }

    #[test]
    fn usage_accumulates() {
        let mut total = Usage::default();
        total.add(&Usage::new(100, 20));
        total.add(&Usage::new(50, 5));
        assert_eq!(total, Usage::new(150, 25));
        assert_eq!(total.total_tokens, 175);
    }

    #[test]
    fn joined_text_only_for_final_answers() {
        let reply = ModelReply::FinalAnswer(vec!["a".into(), "b".into()]);
        assert_eq!(reply.joined_text().as_deref(), Some("a\nb"));
        let reply = ModelReply::ToolCalls(vec![]);
        assert!(reply.joined_text().is_none());
    }
}
