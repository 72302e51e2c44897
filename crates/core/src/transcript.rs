//! Conversation transcript — the ordered, append-only turn log of one trial.
//!
//! A trial seeds its transcript with a user turn and then grows it with
//! model output, tool invocations and their results. Two serializations are
//! offered: [`TurnRecord`]s (the model-ready and persisted shape) and a
//! sectioned human-readable trace used in logs and reflector prompts.
//!
//! Invariant: every tool invocation is followed by exactly one tool result
//! with the same invocation id before any other turn is appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::ProtocolError;

/// Unique identifier for a trial (one transcript).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrialId(pub String);

impl TrialId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TrialId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TrialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A structured request, emitted by the model, to act on the environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Correlation id (matches the model's tool call id)
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON string, exactly as the model produced them
    pub arguments: String,
}

impl ToolInvocation {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Extract a string argument from the JSON arguments object.
    pub fn string_argument(&self, key: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(&self.arguments).ok()?;
        value.get(key)?.as_str().map(str::to_string)
    }

    /// The most readable form of the arguments: the sole string argument
    /// when there is exactly one, the raw JSON otherwise.
    pub fn display_arguments(&self) -> String {
        if let Ok(serde_json::Value::Object(map)) =
            serde_json::from_str::<serde_json::Value>(&self.arguments)
            && map.len() == 1
            && let Some(serde_json::Value::String(s)) = map.values().next()
        {
            return s.clone();
        }
        self.arguments.clone()
    }
}

/// One typed turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationTurn {
    /// Task instructions or environment-derived context.
    User { text: String },
    /// Free-text model output signalling completion or a final answer.
    Model { text: String },
    /// A model-emitted request to act on the environment.
    ToolInvocation(ToolInvocation),
    /// The environment's response to an invocation.
    ToolResult { invocation_id: String, output: String },
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::User { text: text.into() }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::Model { text: text.into() }
    }

    pub fn tool_result(invocation_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::ToolResult {
            invocation_id: invocation_id.into(),
            output: output.into(),
        }
    }

    /// Rough text length, used for token estimates.
    fn text_len(&self) -> usize {
        match self {
            Self::User { text } | Self::Model { text } => text.len(),
            Self::ToolInvocation(inv) => inv.name.len() + inv.arguments.len(),
            Self::ToolResult { output, .. } => output.len(),
        }
    }
}

/// The role of a plain (non-tool) record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A plain `{role, content}` record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub role: Role,
    pub content: String,
}

/// A tool record discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ItemRecord {
    FunctionCall {
        call_id: String,
        name: String,
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

/// The persisted / model-ready shape of a turn.
///
/// Plain turns serialize as `{"role": "user"|"assistant", "content": ...}`;
/// tool turns as `{"type": "function_call", ...}` or
/// `{"type": "function_call_output", ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnRecord {
    Message(MessageRecord),
    Item(ItemRecord),
}

impl From<&ConversationTurn> for TurnRecord {
    fn from(turn: &ConversationTurn) -> Self {
        match turn {
            ConversationTurn::User { text } => TurnRecord::Message(MessageRecord {
                role: Role::User,
                content: text.clone(),
            }),
            ConversationTurn::Model { text } => TurnRecord::Message(MessageRecord {
                role: Role::Assistant,
                content: text.clone(),
            }),
            ConversationTurn::ToolInvocation(inv) => TurnRecord::Item(ItemRecord::FunctionCall {
                call_id: inv.id.clone(),
                name: inv.name.clone(),
                arguments: inv.arguments.clone(),
            }),
            ConversationTurn::ToolResult {
                invocation_id,
                output,
            } => TurnRecord::Item(ItemRecord::FunctionCallOutput {
                call_id: invocation_id.clone(),
                output: output.clone(),
            }),
        }
    }
}

impl From<TurnRecord> for ConversationTurn {
    fn from(record: TurnRecord) -> Self {
        match record {
            TurnRecord::Message(MessageRecord {
                role: Role::User,
                content,
            }) => ConversationTurn::User { text: content },
            TurnRecord::Message(MessageRecord {
                role: Role::Assistant,
                content,
            }) => ConversationTurn::Model { text: content },
            TurnRecord::Item(ItemRecord::FunctionCall {
                call_id,
                name,
                arguments,
            }) => ConversationTurn::ToolInvocation(ToolInvocation {
                id: call_id,
                name,
                arguments,
            }),
            TurnRecord::Item(ItemRecord::FunctionCallOutput { call_id, output }) => {
                ConversationTurn::ToolResult {
                    invocation_id: call_id,
                    output,
                }
            }
        }
    }
}

/// An ordered, append-only sequence of turns owned by one running trial.
#[derive(Debug, Clone)]
pub struct Transcript {
    id: TrialId,
    turns: Vec<ConversationTurn>,
    /// Invocation id awaiting its result, if any.
    pending: Option<String>,
    /// Every invocation id seen so far.
    invocation_ids: HashSet<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Transcript {
    /// Create a new empty transcript.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: TrialId::new(),
            turns: Vec::new(),
            pending: None,
            invocation_ids: HashSet::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a transcript seeded with a single user turn.
    pub fn seeded(user_text: impl Into<String>) -> Self {
        let mut transcript = Self::new();
        transcript.turns.push(ConversationTurn::user(user_text));
        transcript
    }

    pub fn id(&self) -> &TrialId {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Append a turn, enforcing invocation/result correlation.
    ///
    /// Nothing is appended when an error is returned.
    pub fn append(&mut self, turn: ConversationTurn) -> Result<(), ProtocolError> {
        match (&turn, &self.pending) {
            (ConversationTurn::ToolResult { invocation_id, .. }, Some(expected)) => {
                if invocation_id != expected {
                    return Err(ProtocolError::MismatchedResult {
                        expected: expected.clone(),
                        got: invocation_id.clone(),
                    });
                }
                self.pending = None;
            }
            (ConversationTurn::ToolResult { invocation_id, .. }, None) => {
                return Err(ProtocolError::UnexpectedResult(invocation_id.clone()));
            }
            (_, Some(pending)) => {
                return Err(ProtocolError::PendingInvocation(pending.clone()));
            }
            (ConversationTurn::ToolInvocation(inv), None) => {
                if !self.invocation_ids.insert(inv.id.clone()) {
                    return Err(ProtocolError::DuplicateInvocation(inv.id.clone()));
                }
                self.pending = Some(inv.id.clone());
            }
            (ConversationTurn::User { .. } | ConversationTurn::Model { .. }, None) => {}
        }

        self.turns.push(turn);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Append an invocation together with its result as one step.
    ///
    /// Either both turns land or neither does, so a transcript observed
    /// between steps never holds a dangling invocation.
    pub fn append_exchange(
        &mut self,
        invocation: ToolInvocation,
        output: impl Into<String>,
    ) -> Result<(), ProtocolError> {
        if let Some(pending) = &self.pending {
            return Err(ProtocolError::PendingInvocation(pending.clone()));
        }
        if self.invocation_ids.contains(&invocation.id) {
            return Err(ProtocolError::DuplicateInvocation(invocation.id));
        }

        let result = ConversationTurn::tool_result(invocation.id.clone(), output);
        self.append(ConversationTurn::ToolInvocation(invocation))?;
        self.append(result)
    }

    /// All turns, in order.
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The invocation id still awaiting its result, if any.
    pub fn pending_invocation(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Whether the transcript may be handed to the model (no pending invocation).
    pub fn is_settled(&self) -> bool {
        self.pending.is_none()
    }

    /// The text of the last model turn, if any.
    pub fn last_model_text(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|t| match t {
            ConversationTurn::Model { text } => Some(text.as_str()),
            _ => None,
        })
    }

    /// Number of tool invocations recorded.
    pub fn invocation_count(&self) -> usize {
        self.invocation_ids.len()
    }

    /// Model-ready serialization of every turn.
    pub fn snapshot(&self) -> Vec<TurnRecord> {
        self.turns.iter().map(TurnRecord::from).collect()
    }

    /// Rebuild a transcript from persisted records, re-checking every invariant.
    pub fn from_records(records: Vec<TurnRecord>) -> Result<Self, ProtocolError> {
        let mut transcript = Self::new();
        for (index, record) in records.into_iter().enumerate() {
            transcript
                .append(ConversationTurn::from(record))
                .map_err(|e| ProtocolError::MalformedRecord {
                    index,
                    reason: e.to_string(),
                })?;
        }
        Ok(transcript)
    }

    /// Rough token estimate (4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        self.turns.iter().map(|t| t.text_len() / 4).sum()
    }

    /// Render the transcript with each turn grouped under an XML-like tag.
    pub fn render_human_readable(&self) -> String {
        render_turns(&self.turns)
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new()
    }
}

/// Render a turn sequence as a sectioned, readable trace.
pub fn render_turns(turns: &[ConversationTurn]) -> String {
    let mut out = String::new();
    for turn in turns {
        match turn {
            ConversationTurn::User { text } => {
                out.push_str("<User>\n");
                out.push_str(text.trim());
                out.push_str("\n</User>\n\n");
            }
            ConversationTurn::Model { text } => {
                out.push_str("<Answer>\n");
                out.push_str(text.trim());
                out.push_str("\n</Answer>\n\n");
            }
            ConversationTurn::ToolInvocation(inv) => {
                out.push_str("<Thought and Action>\n");
                out.push_str(&format!("[{}] {}\n```\n", inv.id, inv.name));
                out.push_str(inv.display_arguments().trim_end());
                out.push_str("\n```\n</Thought and Action>\n\n");
            }
            ConversationTurn::ToolResult { output, .. } => {
                out.push_str("<Observation>\n");
                out.push_str(output.trim_end());
                out.push_str("\n</Observation>\n\n");
            }
        }
    }
    out
}
