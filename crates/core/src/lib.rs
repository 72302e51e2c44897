//! # Reflace Core
//!
//! Domain types, traits, and error definitions for the Reflace agent harness.
//! This crate defines the transcript model and the three collaborator seams
//! (model client, environment, embedder) that every other crate builds on.
//!
//! Implementations of the collaborator traits live outside this crate, so
//! loops can be driven by real services or by scripted test doubles alike.

pub mod embedding;
pub mod environment;
pub mod error;
pub mod model;
pub mod transcript;

// Re-export key types at crate root for ergonomics
pub use embedding::Embedder;
pub use environment::{
    Environment, EvaluationResult, GroundTruth, Observation, RequirementCheck, Supervisor,
    TaskSource,
};
pub use error::{
    EmbeddingError, EnvironmentError, Error, ModelError, PlaybookError, ProtocolError, Result,
};
pub use model::{ModelClient, ModelReply, ModelRequest, ModelResponse, ToolDefinition, Usage};
pub use transcript::{ConversationTurn, ToolInvocation, Transcript, TrialId, TurnRecord};
