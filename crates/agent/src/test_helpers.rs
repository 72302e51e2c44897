//! Shared test helpers: scripted models, environments and embedders.

use async_trait::async_trait;
use reflace_core::embedding::Embedder;
use reflace_core::environment::{
    Environment, EvaluationResult, GroundTruth, Observation, RequirementCheck, Supervisor,
    TaskSource,
};
use reflace_core::error::{EmbeddingError, EnvironmentError, ModelError};
use reflace_core::model::{ModelClient, ModelReply, ModelRequest, ModelResponse, Usage};
use reflace_core::transcript::ToolInvocation;
use std::sync::{Arc, Mutex};

type ResponseFn = dyn Fn(usize) -> Result<ModelResponse, ModelError> + Send + Sync;

enum Script {
    Sequence(Vec<ModelResponse>),
    Generated(Box<ResponseFn>),
}

/// A model that replays scripted responses and records every request.
///
/// Panics if a sequence runs out.
pub struct ScriptedModel {
    script: Script,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<ModelResponse>) -> Self {
        Self {
            script: Script::Sequence(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Responses computed from the zero-based call index.
    pub fn from_fn(
        f: impl Fn(usize) -> Result<ModelResponse, ModelError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Script::Generated(Box::new(f)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Never finishes: one fresh tool call per round.
    pub fn endless_tool_calls(payload: &str) -> Self {
        let payload = payload.to_string();
        Self::from_fn(move |n| Ok(tool_calls(vec![code_call(&format!("call_{n}"), &payload)])))
    }

    /// Fails every call with the same error.
    pub fn failing(error: ModelError) -> Self {
        Self::from_fn(move |_| Err(error.clone()))
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len() - 1
        };
        match &self.script {
            Script::Sequence(responses) => match responses.get(index) {
                Some(response) => Ok(response.clone()),
                None => panic!(
                    "ScriptedModel: no more responses (call #{index}, have {})",
                    responses.len()
                ),
            },
            Script::Generated(f) => f(index),
        }
    }
}

/// A free-text response.
pub fn text_response(text: &str) -> ModelResponse {
    ModelResponse {
        reply: ModelReply::text(text),
        usage: Some(Usage::new(10, 5)),
        model: "mock-model".into(),
    }
}

/// A tool-call response.
pub fn tool_calls(invocations: Vec<ToolInvocation>) -> ModelResponse {
    ModelResponse {
        reply: ModelReply::ToolCalls(invocations),
        usage: Some(Usage::new(20, 10)),
        model: "mock-model".into(),
    }
}

/// An invocation of the default code tool.
pub fn code_call(id: &str, code: &str) -> ToolInvocation {
    ToolInvocation::new(
        id,
        "execute_code",
        serde_json::json!({ "code": code }).to_string(),
    )
}

/// A passing evaluation.
pub fn eval_pass() -> EvaluationResult {
    let mut eval = EvaluationResult::new(1, 0);
    eval.pass_details.push(RequirementCheck {
        requirement: "assert answer matches".into(),
        detail: "passed".into(),
    });
    eval
}

/// A failing evaluation with one failed requirement.
pub fn eval_fail(reason: &str) -> EvaluationResult {
    let mut eval = EvaluationResult::new(0, 1);
    eval.fail_details.push(RequirementCheck {
        requirement: "assert answer matches".into(),
        detail: reason.into(),
    });
    eval
}

/// What a scripted environment saw.
#[derive(Debug, Default)]
pub struct EnvProbe {
    pub executed: Vec<String>,
    pub resets: usize,
    pub evaluations: usize,
    pub closes: usize,
}

/// An in-memory environment. Clones share one probe.
#[derive(Clone)]
pub struct ScriptedEnvironment {
    task_id: String,
    instruction: String,
    supervisor: Supervisor,
    evaluations: Vec<EvaluationResult>,
    failing_payload: Option<String>,
    ground_truth: Option<GroundTruth>,
    fail_evaluate: bool,
    fail_close: bool,
    probe: Arc<Mutex<EnvProbe>>,
}

impl ScriptedEnvironment {
    pub fn new(task_id: &str, instruction: &str) -> Self {
        Self {
            task_id: task_id.into(),
            instruction: instruction.into(),
            supervisor: Supervisor {
                first_name: "Joyce".into(),
                last_name: "Weaver".into(),
                email: "joyce@example.com".into(),
                phone_number: "5550100".into(),
            },
            evaluations: Vec::new(),
            failing_payload: None,
            ground_truth: None,
            fail_evaluate: false,
            fail_close: false,
            probe: Arc::new(Mutex::new(EnvProbe::default())),
        }
    }

    /// Evaluations returned in order; the last one repeats. Passes by default.
    pub fn with_evaluations(mut self, evaluations: Vec<EvaluationResult>) -> Self {
        self.evaluations = evaluations;
        self
    }

    /// Payloads containing `needle` fail to execute.
    pub fn with_failing_payload(mut self, needle: &str) -> Self {
        self.failing_payload = Some(needle.into());
        self
    }

    pub fn with_ground_truth(mut self, truth: GroundTruth) -> Self {
        self.ground_truth = Some(truth);
        self
    }

    pub fn with_failing_evaluate(mut self) -> Self {
        self.fail_evaluate = true;
        self
    }

    pub fn with_failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    pub fn probe(&self) -> Arc<Mutex<EnvProbe>> {
        self.probe.clone()
    }
}

#[async_trait]
impl Environment for ScriptedEnvironment {
    fn task_id(&self) -> &str {
        &self.task_id
    }

    async fn reset(&mut self) -> Result<Observation, EnvironmentError> {
        self.probe.lock().unwrap().resets += 1;
        Ok(Observation {
            text: self.instruction.clone(),
            info: Default::default(),
        })
    }

    async fn execute(&mut self, payload: &str) -> Result<String, EnvironmentError> {
        self.probe.lock().unwrap().executed.push(payload.to_string());
        if let Some(needle) = &self.failing_payload
            && payload.contains(needle.as_str())
        {
            return Err(EnvironmentError::Execution(format!("NameError: {needle}")));
        }
        Ok(format!("Executed: {payload}"))
    }

    async fn evaluate(&mut self) -> Result<EvaluationResult, EnvironmentError> {
        if self.fail_evaluate {
            return Err(EnvironmentError::Evaluation("evaluator crashed".into()));
        }
        let index = {
            let mut probe = self.probe.lock().unwrap();
            probe.evaluations += 1;
            probe.evaluations - 1
        };
        Ok(match self.evaluations.len() {
            0 => eval_pass(),
            n => self.evaluations[index.min(n - 1)].clone(),
        })
    }

    fn instruction(&self) -> &str {
        &self.instruction
    }

    fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    fn ground_truth(&self) -> Option<&GroundTruth> {
        self.ground_truth.as_ref()
    }

    async fn close(&mut self) -> Result<(), EnvironmentError> {
        self.probe.lock().unwrap().closes += 1;
        if self.fail_close {
            return Err(EnvironmentError::Close("socket already closed".into()));
        }
        Ok(())
    }
}

/// Hands out clones of pre-built environments.
pub struct ScriptedTaskSource {
    tasks: Vec<ScriptedEnvironment>,
}

impl ScriptedTaskSource {
    pub fn new(tasks: Vec<ScriptedEnvironment>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
impl TaskSource for ScriptedTaskSource {
    fn name(&self) -> &str {
        "scripted"
    }

    fn task_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.task_id.clone()).collect()
    }

    async fn open(&self, task_id: &str) -> Result<Box<dyn Environment>, EnvironmentError> {
        self.tasks
            .iter()
            .find(|t| t.task_id == task_id)
            .map(|t| Box::new(t.clone()) as Box<dyn Environment>)
            .ok_or_else(|| EnvironmentError::TaskNotFound(task_id.into()))
    }
}

/// Deterministic bag-of-words embedder: identical word sets embed identically.
pub struct FixedEmbedder;

#[async_trait]
impl Embedder for FixedEmbedder {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut v = vec![0.0f32; 32];
        for word in text.split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if word.is_empty() {
                continue;
            }
            let bucket = word.bytes().fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize));
            v[bucket % 32] += 1.0;
        }
        if v.iter().all(|x| *x == 0.0) {
            v[0] = 1.0;
        }
        Ok(v)
    }
}
