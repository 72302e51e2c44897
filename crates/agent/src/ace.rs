//! Insight-learning loop: generate with the playbook, reflect, curate.
//!
//! Each round renders the Insight Store into the trial's seed prompt, runs
//! the trial and evaluates it. A failed round (or any round, with
//! `reflect_on_success`) is analyzed by the insight reflector, whose JSON
//! answer the [`Curator`] folds back into the store. The store outlives the
//! task; the caller owns it.

use reflace_core::environment::{Environment, EvaluationResult};
use reflace_core::error::Error;
use reflace_core::model::{ModelClient, ModelReply, ModelRequest};
use reflace_core::transcript::{Transcript, render_turns};
use reflace_playbook::{CurationReport, Curator, InsightStore, ReflectorOutput};
use reflace_telemetry::UsageLedger;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::actor::{Actor, TrialOutcome};
use crate::evaluation::render_report;
use crate::prompt::{INSIGHT_REFLECTOR_SYSTEM_PROMPT, PromptAugmentation, insight_reflection_prompt};

const STAGE: &str = "insight_reflector";

/// Result of one insight-learning run over a single task.
#[derive(Debug, Clone)]
pub struct AceOutcome {
    /// The last trial
    pub outcome: TrialOutcome,
    pub evaluation: EvaluationResult,
    pub rounds: usize,
    /// One report per curation pass
    pub curation: Vec<CurationReport>,
    pub usage: UsageLedger,
}

pub struct AceLoop {
    actor: Actor,
    reflector_model: Arc<dyn ModelClient>,
    reflector_model_name: String,
    temperature: f32,
    curator: Curator,
    max_rounds: usize,
    reflect_on_success: bool,
}

impl AceLoop {
    pub fn new(
        actor: Actor,
        reflector_model: Arc<dyn ModelClient>,
        reflector_model_name: impl Into<String>,
    ) -> Self {
        Self {
            actor,
            reflector_model,
            reflector_model_name: reflector_model_name.into(),
            temperature: 0.0,
            curator: Curator::new(),
            max_rounds: 3,
            reflect_on_success: false,
        }
    }

    /// Rounds per task. Clamped to at least 1.
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn with_reflect_on_success(mut self, enabled: bool) -> Self {
        self.reflect_on_success = enabled;
        self
    }

    pub fn with_curator(mut self, curator: Curator) -> Self {
        self.curator = curator;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Run one task, growing `store` from every reflected round.
    pub async fn run(
        &self,
        env: &mut dyn Environment,
        store: &mut InsightStore,
    ) -> Result<AceOutcome, Error> {
        let mut usage = UsageLedger::new();
        let mut curation = Vec::new();
        let mut round = 0;

        loop {
            round += 1;
            env.reset().await?;
            let playbook = store.render();
            let outcome = self
                .actor
                .run_trial(env, &PromptAugmentation::Insights(playbook.clone()))
                .await?;
            usage.merge(&outcome.usage);
            let evaluation = env.evaluate().await?;

            info!(
                task_id = %env.task_id(),
                round,
                success = evaluation.success(),
                insights = store.len(),
                "Insight round evaluated"
            );

            if !evaluation.success() || self.reflect_on_success {
                let output = self
                    .reflect(env.instruction(), &outcome.transcript, &evaluation, &playbook, &mut usage)
                    .await?;
                if let Some(output) = output {
                    curation.push(self.curator.apply(store, &output).await?);
                }
            }

            if evaluation.success() || round >= self.max_rounds {
                return Ok(AceOutcome {
                    outcome,
                    evaluation,
                    rounds: round,
                    curation,
                    usage,
                });
            }
        }
    }

    /// Ask the insight reflector for its analysis. `None` when it said nothing.
    async fn reflect(
        &self,
        instruction: &str,
        trial: &Transcript,
        evaluation: &EvaluationResult,
        playbook: &str,
        usage: &mut UsageLedger,
    ) -> Result<Option<ReflectorOutput>, Error> {
        let prompt = insight_reflection_prompt(
            instruction,
            &render_report(evaluation),
            &render_turns(trial.turns()),
            playbook,
        );
        let request = ModelRequest::new(&self.reflector_model_name, INSIGHT_REFLECTOR_SYSTEM_PROMPT)
            .with_turns(Transcript::seeded(prompt).snapshot())
            .with_temperature(self.temperature);

        let response = self.reflector_model.complete(request).await?;
        usage.record(&response.model, response.usage.as_ref());

        let text = match response.reply {
            ModelReply::FinalAnswer(texts) => texts.join("\n"),
            ModelReply::ToolCalls(_) => {
                return Err(Error::UnexpectedToolCall {
                    stage: STAGE.into(),
                });
            }
        };
        if text.trim().is_empty() {
            warn!(trial = %trial.id(), "Insight reflector returned no text");
            return Ok(None);
        }

        match ReflectorOutput::parse(&text) {
            Ok(output) => {
                debug!(
                    tags = output.bullet_tags.len(),
                    proposals = output.new_insights.len(),
                    "Insight reflector output parsed"
                );
                Ok(Some(output))
            }
            Err(e) => {
                warn!(error = %e, "Insight reflector output is not JSON, keeping it as a key insight");
                Ok(Some(ReflectorOutput::from_key_insight(text.trim())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use reflace_playbook::{InsightTag, Section};

    fn ace(model: Arc<ScriptedModel>, max_rounds: usize) -> AceLoop {
        let actor = Actor::new(model.clone(), "mock-model").with_max_steps(3);
        AceLoop::new(actor, model, "mock-model").with_max_rounds(max_rounds)
    }

    fn store() -> InsightStore {
        InsightStore::new(Arc::new(FixedEmbedder))
    }

    const REFLECTION: &str = r#"```json
{
  "reasoning": "The generator stopped after the first page.",
  "key_insight": "Paginate until an empty page",
  "bullet_tags": [],
  "new_insights": [
    {"section": "strategies", "content": "Always paginate list APIs until an empty page is returned."}
  ]
}
```"#;

    #[tokio::test]
    async fn failed_round_is_curated_into_store() {
        let model = Arc::new(ScriptedModel::new(vec![
            text_response("done"),
            text_response(REFLECTION),
            text_response("done"),
        ]));
        let mut env = ScriptedEnvironment::new("task-1", "t")
            .with_evaluations(vec![eval_fail("3 != 5"), eval_pass()]);
        let mut store = store();

        let result = ace(model.clone(), 3).run(&mut env, &mut store).await.unwrap();

        assert!(result.evaluation.success());
        assert_eq!(result.rounds, 2);
        assert_eq!(result.curation.len(), 1);
        assert_eq!(result.curation[0].added, vec!["shr-00001"]);
        assert_eq!(store.len(), 1);

        let requests = model.requests();
        // The reflector runs without tools.
        assert!(requests[1].tools.is_empty());
        // The second round sees the learned insight.
        let seed = serde_json::to_string(&requests[2].turns[0]).unwrap();
        assert!(seed.contains("shr-00001 [neutral] : Always paginate list APIs"));
    }

    #[tokio::test]
    async fn success_does_not_reflect_by_default() {
        let model = Arc::new(ScriptedModel::new(vec![text_response("done")]));
        let mut env = ScriptedEnvironment::new("task-1", "t");
        let mut store = store();

        let result = ace(model.clone(), 3).run(&mut env, &mut store).await.unwrap();

        assert_eq!(result.rounds, 1);
        assert!(result.curation.is_empty());
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn reflect_on_success_tags_helpful_insights() {
        let model = Arc::new(ScriptedModel::new(vec![
            text_response("done"),
            text_response(r#"{"bullet_tags": [{"id": "shr-00001", "tag": "helpful"}]}"#),
        ]));
        let mut env = ScriptedEnvironment::new("task-1", "t");
        let mut store = store();
        store
            .add_insight(Section::Strategies, "Log in before calling app APIs.")
            .await
            .unwrap();

        let result = ace(model, 3)
            .with_reflect_on_success(true)
            .run(&mut env, &mut store)
            .await
            .unwrap();

        assert_eq!(result.curation[0].retagged, vec!["shr-00001"]);
        assert_eq!(store.get("shr-00001").unwrap().tag, InsightTag::Helpful);
    }

    #[tokio::test]
    async fn prose_reply_falls_back_to_key_insight() {
        let model = Arc::new(ScriptedModel::new(vec![
            text_response("done"),
            text_response("Check the API docs before guessing parameter names."),
        ]));
        let mut env = ScriptedEnvironment::new("task-1", "t")
            .with_evaluations(vec![eval_fail("x")]);
        let mut store = store();

        let result = ace(model, 1).run(&mut env, &mut store).await.unwrap();

        assert!(!result.evaluation.success());
        assert_eq!(result.rounds, 1);
        assert_eq!(
            store.get("shr-00001").unwrap().text,
            "Check the API docs before guessing parameter names."
        );
    }

    #[tokio::test]
    async fn rounds_are_bounded() {
        let model = Arc::new(ScriptedModel::from_fn(|n| {
            Ok(if n % 2 == 0 {
                text_response("done")
            } else {
                text_response(r#"{"key_insight": "Read the task twice."}"#)
            })
        }));
        let mut env = ScriptedEnvironment::new("task-1", "t")
            .with_evaluations(vec![eval_fail("x")]);
        let probe = env.probe();
        let mut store = store();

        let result = ace(model.clone(), 3).run(&mut env, &mut store).await.unwrap();

        assert_eq!(result.rounds, 3);
        assert_eq!(model.call_count(), 6);
        assert_eq!(probe.lock().unwrap().resets, 3);
        // Identical insights deduplicate into one entry.
        assert_eq!(store.len(), 1);
        assert_eq!(result.curation[1].merged, vec!["shr-00001"]);
    }

    #[tokio::test]
    async fn reflector_tool_call_is_contract_violation() {
        let model = Arc::new(ScriptedModel::new(vec![
            text_response("done"),
            tool_calls(vec![code_call("r_1", "print(1)")]),
        ]));
        let mut env = ScriptedEnvironment::new("task-1", "t")
            .with_evaluations(vec![eval_fail("x")]);
        let mut store = store();

        let err = ace(model, 2).run(&mut env, &mut store).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedToolCall { stage } if stage == "insight_reflector"));
    }
}
