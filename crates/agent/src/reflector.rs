//! Reflector — writes a natural-language critique of a failed trial.
//!
//! Two modes:
//! - **Ground truth**: one tool-less call that sees the reference solution.
//!   A tool-call reply is a contract violation.
//! - **Exploratory**: the reflector may inspect the environment through the
//!   code tool for a bounded number of rounds (it may not complete the task),
//!   then must answer in a final tool-less call.

use reflace_core::environment::{Environment, EvaluationResult};
use reflace_core::error::{Error, ProtocolError};
use reflace_core::model::{ModelClient, ModelReply, ModelRequest, ModelResponse, ToolDefinition};
use reflace_core::transcript::{ConversationTurn, Transcript, render_turns};
use reflace_telemetry::UsageLedger;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::actor::execute_guarded;
use crate::evaluation::render_report;
use crate::prompt::{
    CritiqueInput, EMPTY_REFLECTION_PLACEHOLDER, REFLECTOR_SYSTEM_PROMPT, critique_prompt,
};
use crate::reflection::{ReflectionEntry, ReflectionHistory};

const STAGE: &str = "reflector";

const FINAL_NUDGE: &str =
    "Your inspection budget is used up. Write the reflection now, without calling any tool.";

/// A critique plus the tokens spent writing it.
#[derive(Debug, Clone)]
pub struct CritiqueOutcome {
    pub entry: ReflectionEntry,
    pub usage: UsageLedger,
}

pub struct Reflector {
    model: Arc<dyn ModelClient>,
    model_name: String,
    temperature: f32,
    system_prompt: String,
    tool: ToolDefinition,
    completion_marker: String,
    max_steps: usize,
    ground_truth: bool,
}

impl Reflector {
    pub fn new(model: Arc<dyn ModelClient>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            temperature: 0.0,
            system_prompt: REFLECTOR_SYSTEM_PROMPT.to_string(),
            tool: ToolDefinition::code_execution("execute_code"),
            completion_marker: "complete_task".into(),
            max_steps: 10,
            ground_truth: false,
        }
    }

    /// Critique from the reference solution in a single call.
    pub fn with_ground_truth(mut self, enabled: bool) -> Self {
        self.ground_truth = enabled;
        self
    }

    /// Tool rounds allowed in exploratory mode. Zero means answer directly.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool = ToolDefinition::code_execution(name);
        self
    }

    pub fn with_completion_marker(mut self, marker: impl Into<String>) -> Self {
        self.completion_marker = marker.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn ground_truth(&self) -> bool {
        self.ground_truth
    }

    /// Critique `trial` given its evaluation and the critiques so far.
    pub async fn critique(
        &self,
        env: &mut dyn Environment,
        trial: &Transcript,
        evaluation: &EvaluationResult,
        history: &ReflectionHistory,
    ) -> Result<CritiqueOutcome, Error> {
        let report = render_report(evaluation);
        let trajectory = render_turns(trial.turns());
        let past = history.render();

        let reference = if self.ground_truth {
            let truth = env.ground_truth();
            if truth.is_none() {
                warn!(task_id = %env.task_id(), "Ground-truth reflection without a reference solution");
            }
            truth
        } else {
            None
        };

        let prompt = critique_prompt(&CritiqueInput {
            supervisor: env.supervisor(),
            instruction: env.instruction(),
            evaluation_report: &report,
            reflection_history: &past,
            trajectory: &trajectory,
            ground_truth: reference,
        });

        let mut usage = UsageLedger::new();
        let mut transcript = Transcript::seeded(prompt);

        let text = if self.ground_truth {
            self.final_answer(&transcript, &mut usage).await?
        } else {
            self.explore(env, &mut transcript, &mut usage).await?
        };

        let critique_text = match text.trim() {
            "" => {
                warn!(trial = %trial.id(), "Reflector returned no text");
                EMPTY_REFLECTION_PLACEHOLDER.to_string()
            }
            t => t.to_string(),
        };

        info!(
            trial = %trial.id(),
            ground_truth = self.ground_truth,
            calls = usage.calls(),
            "Reflection generated"
        );

        Ok(CritiqueOutcome {
            entry: ReflectionEntry {
                source_trial_ref: trial.id().clone(),
                critique_text,
            },
            usage,
        })
    }

    async fn explore(
        &self,
        env: &mut dyn Environment,
        transcript: &mut Transcript,
        usage: &mut UsageLedger,
    ) -> Result<String, Error> {
        for step in 1..=self.max_steps {
            let request = ModelRequest::new(&self.model_name, &self.system_prompt)
                .with_turns(transcript.snapshot())
                .with_tools(vec![self.tool.clone()])
                .with_temperature(self.temperature);
            let response = self.call(request, usage).await?;

            match response.reply {
                ModelReply::FinalAnswer(texts) => return Ok(texts.join("\n")),
                ModelReply::ToolCalls(invocations) => {
                    if invocations.is_empty() {
                        return Err(ProtocolError::EmptyToolCalls.into());
                    }
                    debug!(step, count = invocations.len(), "Reflector inspecting environment");
                    for invocation in invocations {
                        let output = execute_guarded(
                            env,
                            &self.tool.name,
                            &invocation,
                            &self.completion_marker,
                        )
                        .await;
                        transcript.append_exchange(invocation, output)?;
                    }
                }
            }
        }

        if self.max_steps > 0 {
            transcript.append(ConversationTurn::user(FINAL_NUDGE))?;
        }
        self.final_answer(transcript, usage).await
    }

    /// One tool-less call that must produce text.
    async fn final_answer(
        &self,
        transcript: &Transcript,
        usage: &mut UsageLedger,
    ) -> Result<String, Error> {
        let request = ModelRequest::new(&self.model_name, &self.system_prompt)
            .with_turns(transcript.snapshot())
            .with_temperature(self.temperature);
        let response = self.call(request, usage).await?;

        match response.reply {
            ModelReply::FinalAnswer(texts) => Ok(texts.join("\n")),
            ModelReply::ToolCalls(_) => Err(Error::UnexpectedToolCall {
                stage: STAGE.into(),
            }),
        }
    }

    async fn call(
        &self,
        request: ModelRequest,
        usage: &mut UsageLedger,
    ) -> Result<ModelResponse, Error> {
        let response = self.model.complete(request).await?;
        usage.record(&response.model, response.usage.as_ref());
        Ok(response)
    }
}
