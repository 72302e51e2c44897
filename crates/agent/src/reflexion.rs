//! Reflection Loop — retry a task, carrying critiques of failed trials.
//!
//! For attempt `0..=max_retries`: reset the environment, run a trial seeded
//! with the current reflection history, evaluate. Success stops the loop.
//! A failure with retries left is critiqued and the critique joins the
//! bounded history. The last failure is not critiqued, so a task that never
//! passes runs `max_retries + 1` trials and produces `max_retries` critiques.

use reflace_core::environment::{Environment, EvaluationResult};
use reflace_core::error::Error;
use reflace_telemetry::UsageLedger;
use tracing::info;

use crate::actor::{Actor, TrialOutcome};
use crate::prompt::PromptAugmentation;
use crate::reflection::ReflectionHistory;
use crate::reflector::Reflector;

/// Result of one reflexion run over a single task.
#[derive(Debug, Clone)]
pub struct ReflexionOutcome {
    /// The last trial
    pub outcome: TrialOutcome,
    /// Evaluation of the last trial
    pub evaluation: EvaluationResult,
    pub history: ReflectionHistory,
    pub attempts: usize,
    pub reflections_generated: usize,
    /// Tokens across all trials and critiques
    pub usage: UsageLedger,
}

pub struct ReflexionLoop {
    actor: Actor,
    reflector: Reflector,
    max_retries: usize,
    max_history: usize,
}

impl ReflexionLoop {
    pub fn new(actor: Actor, reflector: Reflector) -> Self {
        Self {
            actor,
            reflector,
            max_retries: 3,
            max_history: 3,
        }
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Run one task to success or until retries are spent.
    pub async fn run(&self, env: &mut dyn Environment) -> Result<ReflexionOutcome, Error> {
        let mut history = ReflectionHistory::new(self.max_history);
        let mut usage = UsageLedger::new();
        let mut reflections_generated = 0;
        let mut attempt = 0;

        loop {
            env.reset().await?;
            let augmentation = if history.is_empty() {
                PromptAugmentation::None
            } else {
                PromptAugmentation::Reflections(history.render())
            };

            let outcome = self.actor.run_trial(env, &augmentation).await?;
            usage.merge(&outcome.usage);
            let evaluation = env.evaluate().await?;
            attempt += 1;

            info!(
                task_id = %env.task_id(),
                attempt,
                success = evaluation.success(),
                passed = evaluation.passed_count,
                total = evaluation.total_count,
                terminated_by = ?outcome.terminated_by,
                "Reflexion attempt evaluated"
            );

            if evaluation.success() || attempt > self.max_retries {
                return Ok(ReflexionOutcome {
                    outcome,
                    evaluation,
                    history,
                    attempts: attempt,
                    reflections_generated,
                    usage,
                });
            }

            let critique = self
                .reflector
                .critique(env, &outcome.transcript, &evaluation, &history)
                .await?;
            usage.merge(&critique.usage);
            history.push(critique.entry);
            reflections_generated += 1;
        }
    }
}
