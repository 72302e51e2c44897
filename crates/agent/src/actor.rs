//! Actor Loop — the ReAct core that drives one trial.
//!
//! Each round the model sees the system directive plus the full transcript
//! and replies with either free text (the trial ends) or tool invocations.
//! Invocations run strictly in order against the environment; each
//! invocation lands in the transcript together with its result. A payload
//! containing the completion marker ends the trial right after its result,
//! and whatever invocations follow it in the same batch are dropped.
//!
//! ```text
//! AwaitingModel ──final answer──────────────▶ Terminated(explicit_completion)
//!      │  ▲
//!  tool│  │ all results appended
//!  call▼  │
//! AwaitingToolResults ──completion marker───▶ Terminated(explicit_completion)
//!
//! max_steps rounds without termination ─────▶ Terminated(step_budget_exhausted)
//! ```

use reflace_core::environment::Environment;
use reflace_core::error::{Error, ProtocolError};
use reflace_core::model::{ModelClient, ModelReply, ModelRequest, ToolDefinition};
use reflace_core::transcript::{ConversationTurn, ToolInvocation, Transcript};
use reflace_telemetry::UsageLedger;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::prompt::{ACTOR_SYSTEM_PROMPT, PromptAugmentation, seed_prompt};

/// Name of the single argument carrying the action payload.
pub const PAYLOAD_ARGUMENT: &str = "code";

/// Why a trial stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminatedBy {
    ExplicitCompletion,
    StepBudgetExhausted,
}

/// The result of one trial.
#[derive(Debug, Clone)]
pub struct TrialOutcome {
    pub transcript: Transcript,
    pub terminated_by: TerminatedBy,
    /// Model calls made
    pub rounds: usize,
    pub usage: UsageLedger,
}

/// Runs trials against an environment.
pub struct Actor {
    model: Arc<dyn ModelClient>,
    model_name: String,
    temperature: f32,
    system_prompt: String,
    tool: ToolDefinition,
    max_steps: usize,
    completion_marker: String,
}

impl Actor {
    pub fn new(model: Arc<dyn ModelClient>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            temperature: 0.0,
            system_prompt: ACTOR_SYSTEM_PROMPT.to_string(),
            tool: ToolDefinition::code_execution("execute_code"),
            max_steps: 30,
            completion_marker: "complete_task".into(),
        }
    }

    /// Set max model-call rounds per trial. Clamped to at least 1.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    pub fn with_completion_marker(mut self, marker: impl Into<String>) -> Self {
        self.completion_marker = marker.into();
        self
    }

    /// Name of the code-execution tool offered to the model.
    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool = ToolDefinition::code_execution(name);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn tool(&self) -> &ToolDefinition {
        &self.tool
    }

    pub fn completion_marker(&self) -> &str {
        &self.completion_marker
    }

    pub(crate) fn model(&self) -> &Arc<dyn ModelClient> {
        &self.model
    }

    pub(crate) fn model_name(&self) -> &str {
        &self.model_name
    }

    pub(crate) fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Run one trial seeded from the environment's task and the augmentation.
    pub async fn run_trial(
        &self,
        env: &mut dyn Environment,
        augmentation: &PromptAugmentation,
    ) -> Result<TrialOutcome, Error> {
        let seed = seed_prompt(env.supervisor(), env.instruction(), augmentation);
        let mut transcript = Transcript::seeded(seed);
        let mut usage = UsageLedger::new();

        info!(
            task_id = %env.task_id(),
            trial = %transcript.id(),
            max_steps = self.max_steps,
            "Trial starting"
        );

        for round in 1..=self.max_steps {
            let request = ModelRequest::new(&self.model_name, &self.system_prompt)
                .with_turns(transcript.snapshot())
                .with_tools(vec![self.tool.clone()])
                .with_temperature(self.temperature);

            let response = self.model.complete(request).await?;
            usage.record(&response.model, response.usage.as_ref());

            match response.reply {
                ModelReply::FinalAnswer(texts) => {
                    if texts.is_empty() {
                        return Err(Error::UnexpectedResponse {
                            stage: "actor".into(),
                            reason: "final answer carried no text".into(),
                        });
                    }
                    for text in texts {
                        transcript.append(ConversationTurn::model(text))?;
                    }
                    info!(round, turns = transcript.len(), "Trial ended with final answer");
                    return Ok(TrialOutcome {
                        transcript,
                        terminated_by: TerminatedBy::ExplicitCompletion,
                        rounds: round,
                        usage,
                    });
                }
                ModelReply::ToolCalls(invocations) => {
                    if invocations.is_empty() {
                        return Err(ProtocolError::EmptyToolCalls.into());
                    }
                    debug!(round, count = invocations.len(), "Executing tool calls");

                    let batch = invocations.len();
                    for (i, invocation) in invocations.into_iter().enumerate() {
                        let step = execute_invocation(
                            env,
                            &self.tool.name,
                            &invocation,
                            Some(&self.completion_marker),
                        )
                        .await;
                        transcript.append_exchange(invocation, step.output)?;

                        if step.completes {
                            if i + 1 < batch {
                                debug!(dropped = batch - i - 1, "Ignoring invocations after completion");
                            }
                            info!(round, turns = transcript.len(), "Trial ended by completion marker");
                            return Ok(TrialOutcome {
                                transcript,
                                terminated_by: TerminatedBy::ExplicitCompletion,
                                rounds: round,
                                usage,
                            });
                        }
                    }
                }
            }
        }

        warn!(max_steps = self.max_steps, "Trial stopped: step budget exhausted");
        Ok(TrialOutcome {
            transcript,
            terminated_by: TerminatedBy::StepBudgetExhausted,
            rounds: self.max_steps,
            usage,
        })
    }
}

/// Output of one executed invocation.
pub(crate) struct ExecutedStep {
    pub output: String,
    /// The payload carried the completion marker
    pub completes: bool,
}

/// Decode and execute one invocation. Never fails: decoding and environment
/// errors become the result text so the model can react to them.
/// Without a `completion_marker` no payload is treated as completing.
pub(crate) async fn execute_invocation(
    env: &mut dyn Environment,
    tool_name: &str,
    invocation: &ToolInvocation,
    completion_marker: Option<&str>,
) -> ExecutedStep {
    let payload = match decode_payload(tool_name, invocation) {
        Ok(payload) => payload,
        Err(output) => {
            warn!(invocation_id = %invocation.id, error = %output, "Invocation rejected");
            return ExecutedStep {
                output,
                completes: false,
            };
        }
    };

    let completes = completion_marker
        .map(|marker| !marker.is_empty() && payload.contains(marker))
        .unwrap_or(false);

    let output = match env.execute(&payload).await {
        Ok(output) => output,
        Err(e) => {
            warn!(invocation_id = %invocation.id, error = %e, "Environment execution failed");
            e.to_string()
        }
    };
    debug!(invocation_id = %invocation.id, output_len = output.len(), "Invocation executed");

    ExecutedStep { output, completes }
}

/// Execute an invocation on behalf of a caller that must not finish the task.
pub(crate) async fn execute_guarded(
    env: &mut dyn Environment,
    tool_name: &str,
    invocation: &ToolInvocation,
    completion_marker: &str,
) -> String {
    if let Ok(payload) = decode_payload(tool_name, invocation)
        && !completion_marker.is_empty()
        && payload.contains(completion_marker)
    {
        warn!(invocation_id = %invocation.id, "Blocked completion attempt");
        return format!(
            "Error: '{completion_marker}' may not be called here; inspect the environment only."
        );
    }
    execute_invocation(env, tool_name, invocation, None).await.output
}

fn decode_payload(tool_name: &str, invocation: &ToolInvocation) -> Result<String, String> {
    if invocation.name != tool_name {
        return Err(format!(
            "Error: unknown tool '{}'; the only available tool is '{tool_name}'.",
            invocation.name
        ));
    }
    invocation.string_argument(PAYLOAD_ARGUMENT).ok_or_else(|| {
        format!(
            "Error: invalid arguments for '{tool_name}': expected a JSON object with a string '{PAYLOAD_ARGUMENT}' field."
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use reflace_core::error::ModelError;

    fn actor(model: Arc<ScriptedModel>) -> Actor {
        Actor::new(model, "mock-model").with_max_steps(5)
    }

    #[tokio::test]
    async fn completion_marker_ends_trial_after_one_round() {
        let model = Arc::new(ScriptedModel::new(vec![tool_calls(vec![code_call(
            "call_1",
            "apis.supervisor.complete_task()",
        )])]));
        let mut env = ScriptedEnvironment::new("task-1", "eat the apple");

        let outcome = actor(model.clone())
            .run_trial(&mut env, &PromptAugmentation::None)
            .await
            .unwrap();

        assert_eq!(outcome.terminated_by, TerminatedBy::ExplicitCompletion);
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.transcript.len(), 3);
        assert!(matches!(
            &outcome.transcript.turns()[0],
            ConversationTurn::User { text } if text.contains("eat the apple")
        ));
        assert!(matches!(
            &outcome.transcript.turns()[1],
            ConversationTurn::ToolInvocation(_)
        ));
        assert!(matches!(
            &outcome.transcript.turns()[2],
            ConversationTurn::ToolResult { invocation_id, .. } if invocation_id == "call_1"
        ));
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn invocations_after_completion_are_ignored() {
        let model = Arc::new(ScriptedModel::new(vec![tool_calls(vec![
            code_call("call_1", "print('x')"),
            code_call("call_2", "apis.supervisor.complete_task(answer=3)"),
            code_call("call_3", "print('never')"),
        ])]));
        let mut env = ScriptedEnvironment::new("task-1", "count");
        let probe = env.probe();

        let outcome = actor(model)
            .run_trial(&mut env, &PromptAugmentation::None)
            .await
            .unwrap();

        assert_eq!(outcome.terminated_by, TerminatedBy::ExplicitCompletion);
        assert_eq!(outcome.transcript.len(), 5);
        assert_eq!(
            probe.lock().unwrap().executed,
            vec!["print('x')", "apis.supervisor.complete_task(answer=3)"]
        );
    }

    #[tokio::test]
    async fn final_answer_ends_trial() {
        let model = Arc::new(ScriptedModel::new(vec![
            tool_calls(vec![code_call("call_1", "print(1)")]),
            text_response("I am done."),
        ]));
        let mut env = ScriptedEnvironment::new("task-1", "t");

        let outcome = actor(model)
            .run_trial(&mut env, &PromptAugmentation::None)
            .await
            .unwrap();

        assert_eq!(outcome.terminated_by, TerminatedBy::ExplicitCompletion);
        assert_eq!(outcome.rounds, 2);
        assert_eq!(outcome.transcript.last_model_text(), Some("I am done."));
        assert_eq!(outcome.usage.calls(), 2);
    }

    #[tokio::test]
    async fn adversarial_model_stops_at_exactly_max_steps() {
        let model = Arc::new(ScriptedModel::endless_tool_calls("print('still working')"));
        let mut env = ScriptedEnvironment::new("task-1", "t");

        let outcome = Actor::new(model.clone(), "mock-model")
            .with_max_steps(7)
            .run_trial(&mut env, &PromptAugmentation::None)
            .await
            .unwrap();

        assert_eq!(outcome.terminated_by, TerminatedBy::StepBudgetExhausted);
        assert_eq!(outcome.rounds, 7);
        assert_eq!(model.call_count(), 7);
        assert_eq!(outcome.transcript.len(), 1 + 2 * 7);
        assert!(outcome.transcript.is_settled());
    }

    #[tokio::test]
    async fn environment_errors_become_observations() {
        let model = Arc::new(ScriptedModel::new(vec![
            tool_calls(vec![code_call("call_1", "raise_error()")]),
            text_response("giving up"),
        ]));
        let mut env = ScriptedEnvironment::new("task-1", "t").with_failing_payload("raise_error");

        let outcome = actor(model)
            .run_trial(&mut env, &PromptAugmentation::None)
            .await
            .unwrap();

        match &outcome.transcript.turns()[2] {
            ConversationTurn::ToolResult { output, .. } => {
                assert!(output.contains("Action failed to execute"))
            }
            other => panic!("expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_arguments_and_unknown_tools_reported_to_model() {
        let model = Arc::new(ScriptedModel::new(vec![
            tool_calls(vec![
                ToolInvocation::new("call_1", "execute_code", "{not json"),
                ToolInvocation::new("call_2", "browse_web", r#"{"code": "x"}"#),
            ]),
            text_response("ok"),
        ]));
        let mut env = ScriptedEnvironment::new("task-1", "t");
        let probe = env.probe();

        let outcome = actor(model)
            .run_trial(&mut env, &PromptAugmentation::None)
            .await
            .unwrap();

        let outputs: Vec<&str> = outcome
            .transcript
            .turns()
            .iter()
            .filter_map(|t| match t {
                ConversationTurn::ToolResult { output, .. } => Some(output.as_str()),
                _ => None,
            })
            .collect();
        assert!(outputs[0].contains("invalid arguments"));
        assert!(outputs[1].contains("unknown tool 'browse_web'"));
        assert!(probe.lock().unwrap().executed.is_empty());
    }

    #[tokio::test]
    async fn model_failure_propagates() {
        let model = Arc::new(ScriptedModel::failing(ModelError::RetriesExhausted {
            attempts: 3,
            last_error: "timeout".into(),
        }));
        let mut env = ScriptedEnvironment::new("task-1", "t");

        let err = actor(model)
            .run_trial(&mut env, &PromptAugmentation::None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Model(ModelError::RetriesExhausted { .. })));
    }

    #[tokio::test]
    async fn empty_tool_call_batch_is_protocol_error() {
        let model = Arc::new(ScriptedModel::new(vec![tool_calls(vec![])]));
        let mut env = ScriptedEnvironment::new("task-1", "t");

        let err = actor(model)
            .run_trial(&mut env, &PromptAugmentation::None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolError::EmptyToolCalls)));
    }

    #[tokio::test]
    async fn reused_invocation_id_is_protocol_error() {
        let model = Arc::new(ScriptedModel::new(vec![
            tool_calls(vec![code_call("call_1", "a")]),
            tool_calls(vec![code_call("call_1", "b")]),
        ]));
        let mut env = ScriptedEnvironment::new("task-1", "t");

        let err = actor(model)
            .run_trial(&mut env, &PromptAugmentation::None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::DuplicateInvocation(_))
        ));
    }

    #[tokio::test]
    async fn request_carries_tool_and_snapshot() {
        let model = Arc::new(ScriptedModel::new(vec![
            tool_calls(vec![code_call("call_1", "print(1)")]),
            text_response("done"),
        ]));
        let mut env = ScriptedEnvironment::new("task-1", "t");

        actor(model.clone())
            .with_tool_name("appworld_execute")
            .run_trial(&mut env, &PromptAugmentation::None)
            .await
            .unwrap();

        // "execute_code" is rejected once the tool is renamed.
        let requests = model.requests();
        assert_eq!(requests[0].tools[0].name, "appworld_execute");
        assert_eq!(requests[0].turns.len(), 1);
        assert_eq!(requests[1].turns.len(), 3);
        assert!(
            serde_json::to_string(&requests[1].turns[2])
                .unwrap()
                .contains("unknown tool 'execute_code'")
        );
    }

    #[tokio::test]
    async fn seed_prompt_carries_augmentation() {
        let model = Arc::new(ScriptedModel::new(vec![text_response("done")]));
        let mut env = ScriptedEnvironment::new("task-1", "t");

        actor(model.clone())
            .run_trial(
                &mut env,
                &PromptAugmentation::Reflections("1. Check pagination.\n\n".into()),
            )
            .await
            .unwrap();

        let requests = model.requests();
        let seed = serde_json::to_value(&requests[0].turns[0]).unwrap();
        assert!(
            seed["content"]
                .as_str()
                .unwrap()
                .contains("1. Check pagination.")
        );
    }
}
