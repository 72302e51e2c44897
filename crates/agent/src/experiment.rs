//! Experiment driver — runs one strategy over a dataset of tasks.
//!
//! The driver is the outermost error boundary. Every task gets its own
//! environment handle, which is closed exactly once whatever happens; any
//! error while running a task classifies it as errored and the batch moves
//! on. The Insight Store lives for the whole experiment, reflection history
//! only for one task.

use reflace_config::{AgentKind, ExperimentConfig};
use reflace_core::embedding::Embedder;
use reflace_core::environment::{Environment, EvaluationResult, TaskSource};
use reflace_core::error::Error;
use reflace_core::model::ModelClient;
use reflace_playbook::{DedupConfig, InsightStore, MergePolicy, persist};
use reflace_providers::RetryingClient;
use reflace_telemetry::{PricingTable, TaskMetrics, UsageLedger};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::ace::AceLoop;
use crate::actor::{Actor, TrialOutcome};
use crate::prompt::PromptAugmentation;
use crate::reflector::Reflector;
use crate::reflexion::ReflexionLoop;
use crate::results::{
    PerformanceReport, TaskStatus, TrajectoryArchive, TrajectoryRecord, save_json,
};

/// The agent variant an experiment runs.
pub enum Strategy {
    /// A single trial per task
    React(Actor),
    Reflexion(ReflexionLoop),
    Ace { ace: AceLoop, store: InsightStore },
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::React(_) => "react",
            Self::Reflexion(_) => "reflexion",
            Self::Ace { .. } => "ace",
        }
    }
}

/// What running one task produced before classification.
struct TaskRun {
    outcome: TrialOutcome,
    evaluation: EvaluationResult,
    reflection_history: Option<Vec<String>>,
    usage: UsageLedger,
}

/// Results of a finished experiment.
#[derive(Debug, Clone)]
pub struct ExperimentSummary {
    pub report: PerformanceReport,
    pub trajectories: TrajectoryArchive,
}

pub struct Experiment {
    run_id: Uuid,
    name: String,
    first_k_tasks: Option<usize>,
    trajectories_path: PathBuf,
    report_path: PathBuf,
    playbook_path: Option<PathBuf>,
    strategy: Strategy,
    pricing: PricingTable,
}

impl Experiment {
    /// Assemble the configured strategy around `model`, which is wrapped in a
    /// retrying client.
    pub fn from_config(
        config: &ExperimentConfig,
        model: Arc<dyn ModelClient>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, Error> {
        let model: Arc<dyn ModelClient> = Arc::new(
            RetryingClient::new(model)
                .with_max_attempts(config.model.max_retries)
                .with_backoff(Duration::from_millis(config.model.retry_backoff_ms)),
        );
        let model_name = config.model.name.as_str();

        let actor = || {
            Actor::new(model.clone(), model_name)
                .with_max_steps(config.actor.max_steps)
                .with_completion_marker(&config.actor.completion_marker)
                .with_tool_name(&config.actor.tool_name)
                .with_temperature(config.model.temperature)
        };

        let strategy = match config.agent {
            AgentKind::React => Strategy::React(actor()),
            AgentKind::Reflexion => {
                let reflector = Reflector::new(model.clone(), model_name)
                    .with_ground_truth(config.reflexion.ground_truth)
                    .with_max_steps(config.reflexion.reflector_max_steps)
                    .with_tool_name(&config.actor.tool_name)
                    .with_completion_marker(&config.actor.completion_marker)
                    .with_temperature(config.model.temperature);
                Strategy::Reflexion(
                    ReflexionLoop::new(actor(), reflector)
                        .with_max_retries(config.reflexion.max_retries)
                        .with_max_history(config.reflexion.max_history),
                )
            }
            AgentKind::Ace => {
                let policy: MergePolicy = config
                    .ace
                    .merge_policy
                    .parse()
                    .map_err(|message| Error::Config { message })?;
                let dedup = DedupConfig {
                    threshold: config.ace.similarity_threshold,
                    policy,
                };
                let store = match &config.ace.playbook_path {
                    Some(path) => persist::load(path, embedder)?,
                    None => InsightStore::new(embedder),
                }
                .with_dedup(dedup);
                let ace = AceLoop::new(actor(), model.clone(), model_name)
                    .with_max_rounds(config.ace.max_rounds)
                    .with_reflect_on_success(config.ace.reflect_on_success)
                    .with_temperature(config.model.temperature);
                Strategy::Ace { ace, store }
            }
            AgentKind::Reflace => {
                return Err(Error::Unsupported(
                    "combining reflection history with playbook insights has no prompt template"
                        .into(),
                ));
            }
        };

        Ok(Self {
            run_id: Uuid::new_v4(),
            name: config.experiment_name.clone(),
            first_k_tasks: config.first_k_tasks,
            trajectories_path: config.trajectories_path(),
            report_path: config.report_path(),
            playbook_path: config.ace.playbook_path.clone(),
            strategy,
            pricing: PricingTable::with_defaults(),
        })
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// The experiment's Insight Store, for the `ace` strategy.
    pub fn insight_store(&self) -> Option<&InsightStore> {
        match &self.strategy {
            Strategy::Ace { store, .. } => Some(store),
            _ => None,
        }
    }

    /// Run every selected task, then write both artifacts.
    pub async fn run(&mut self, source: &dyn TaskSource) -> Result<ExperimentSummary, Error> {
        let mut task_ids = source.task_ids();
        if let Some(k) = self.first_k_tasks {
            task_ids.truncate(k);
        }
        let total = task_ids.len();

        info!(
            run_id = %self.run_id,
            experiment = %self.name,
            agent = self.strategy.name(),
            dataset = source.name(),
            tasks = total,
            "Experiment starting"
        );

        let mut report = PerformanceReport::new(&self.name, self.strategy.name());
        let mut trajectories = TrajectoryArchive::new();

        for (i, task_id) in task_ids.iter().enumerate() {
            info!(task_id = %task_id, index = i + 1, total, "Task starting");
            let started = Instant::now();

            let mut env = match source.open(task_id).await {
                Ok(env) => env,
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "Task errored: environment did not open");
                    report.record(task_id, TaskStatus::Errored, None);
                    continue;
                }
            };

            let result = self.run_task(env.as_mut()).await;
            let closed = env.close().await;
            let latency_ms = started.elapsed().as_millis() as u64;

            match (result, closed) {
                (Ok(run), closed) => {
                    let metrics = TaskMetrics::from_ledger(&run.usage, &self.pricing, latency_ms);
                    let mut record = TrajectoryRecord::new(&run.outcome.transcript);
                    if let Some(history) = run.reflection_history {
                        record = record.with_reflection_history(history);
                    }
                    trajectories.insert(task_id.clone(), record);

                    let status = match closed {
                        Err(e) => {
                            error!(task_id = %task_id, error = %e, "Task errored: environment did not close");
                            TaskStatus::Errored
                        }
                        Ok(()) if run.evaluation.success() => {
                            info!(task_id = %task_id, latency_ms, "Task passed");
                            TaskStatus::Passed
                        }
                        Ok(()) => {
                            warn!(
                                task_id = %task_id,
                                passed = run.evaluation.passed_count,
                                failed = run.evaluation.failed_count,
                                "Task failed"
                            );
                            TaskStatus::Failed
                        }
                    };
                    report.record(task_id, status, Some(metrics));
                }
                (Err(e), closed) => {
                    if let Err(close_err) = closed {
                        warn!(task_id = %task_id, error = %close_err, "Environment close failed");
                    }
                    error!(task_id = %task_id, error = %e, "Task errored");
                    report.record(task_id, TaskStatus::Errored, None);
                }
            }

            self.save_playbook();
        }

        info!(
            experiment = %self.name,
            total = report.total_tasks,
            passed = report.passed_tasks,
            failed = report.failed_tasks,
            errored = report.errored_tasks,
            success_rate = report.success_rate,
            cost_usd = report.totals.cost_usd,
            "Experiment finished"
        );

        save_json(&report, &self.report_path)?;
        save_json(&trajectories, &self.trajectories_path)?;
        info!(
            report = %self.report_path.display(),
            trajectories = %self.trajectories_path.display(),
            "Artifacts written"
        );

        Ok(ExperimentSummary {
            report,
            trajectories,
        })
    }

    async fn run_task(&mut self, env: &mut dyn Environment) -> Result<TaskRun, Error> {
        match &mut self.strategy {
            Strategy::React(actor) => {
                env.reset().await?;
                let outcome = actor.run_trial(env, &PromptAugmentation::None).await?;
                let evaluation = env.evaluate().await?;
                let usage = outcome.usage.clone();
                Ok(TaskRun {
                    outcome,
                    evaluation,
                    reflection_history: None,
                    usage,
                })
            }
            Strategy::Reflexion(reflexion) => {
                let result = reflexion.run(env).await?;
                Ok(TaskRun {
                    outcome: result.outcome,
                    evaluation: result.evaluation,
                    reflection_history: Some(result.history.critiques()),
                    usage: result.usage,
                })
            }
            Strategy::Ace { ace, store } => {
                let result = ace.run(env, store).await?;
                Ok(TaskRun {
                    outcome: result.outcome,
                    evaluation: result.evaluation,
                    reflection_history: None,
                    usage: result.usage,
                })
            }
        }
    }

    fn save_playbook(&self) {
        if let (Some(path), Some(store)) = (&self.playbook_path, self.insight_store())
            && let Err(e) = persist::save(store, path)
        {
            warn!(path = %path.display(), error = %e, "Failed to save playbook");
        }
    }
}
