//! Environment trait — the task simulator the agent acts on.
//!
//! The core treats the environment as an opaque request/response service:
//! it executes action payloads, reports an evaluation after a trial, and
//! exposes the task instruction and supervisor identity for templating.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::EnvironmentError;

/// The person on whose behalf the agent works.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supervisor {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone_number: String,
}

impl Supervisor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// The task's known-correct solution, used by ground-truth reflection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundTruth {
    /// Reference action sequence (e.g. API calls in order)
    #[serde(default)]
    pub actions: Vec<String>,

    /// Reference solution code
    #[serde(default)]
    pub code: String,
}

/// Initial observation returned by [`Environment::reset`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Observation {
    pub text: String,
    #[serde(default)]
    pub info: serde_json::Map<String, serde_json::Value>,
}

/// One checked requirement from the evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementCheck {
    pub requirement: String,

    /// Label for passes, failure trace for fails
    #[serde(default)]
    pub detail: String,
}

/// The environment's verdict after a trial. Immutable once produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub passed_count: usize,
    pub failed_count: usize,
    pub total_count: usize,
    #[serde(default)]
    pub pass_details: Vec<RequirementCheck>,
    #[serde(default)]
    pub fail_details: Vec<RequirementCheck>,
}

impl EvaluationResult {
    pub fn new(passed_count: usize, failed_count: usize) -> Self {
        Self {
            passed_count,
            failed_count,
            total_count: passed_count + failed_count,
            pass_details: Vec::new(),
            fail_details: Vec::new(),
        }
    }

    /// A trial succeeds when no requirement failed.
    pub fn success(&self) -> bool {
        self.failed_count == 0
    }
}

/// A stateful task environment, owned by exactly one trial at a time.
#[async_trait]
pub trait Environment: Send + Sync {
    /// The task id this handle was opened for.
    fn task_id(&self) -> &str;

    /// Restore the environment to the task's initial state.
    async fn reset(&mut self) -> Result<Observation, EnvironmentError>;

    /// Execute an opaque action payload and return the printed output.
    async fn execute(&mut self, payload: &str) -> Result<String, EnvironmentError>;

    /// Evaluate the current environment state against the task requirements.
    async fn evaluate(&mut self) -> Result<EvaluationResult, EnvironmentError>;

    /// The natural-language task instruction.
    fn instruction(&self) -> &str;

    /// Identity of the supervisor the task is performed for.
    fn supervisor(&self) -> &Supervisor;

    /// The reference solution, when the task carries one.
    fn ground_truth(&self) -> Option<&GroundTruth> {
        None
    }

    /// Release the handle. Called exactly once per task.
    async fn close(&mut self) -> Result<(), EnvironmentError>;
}

/// Opens environment handles for a dataset of tasks.
#[async_trait]
pub trait TaskSource: Send + Sync {
    /// A human-readable name for the dataset.
    fn name(&self) -> &str;

    /// All task ids in dataset order.
    fn task_ids(&self) -> Vec<String>;

    /// Open a fresh handle for one task.
    async fn open(&self, task_id: &str) -> Result<Box<dyn Environment>, EnvironmentError>;
}
