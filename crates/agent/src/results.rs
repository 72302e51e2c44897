//! Experiment artifacts: the trajectory archive and the performance report.
//!
//! Both are pretty-printed JSON documents written into the experiment's
//! save directory. Every task lands in exactly one of three buckets.

use chrono::{DateTime, Utc};
use reflace_core::error::Error;
use reflace_core::transcript::{Transcript, TurnRecord};
use reflace_telemetry::TaskMetrics;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

/// Final classification of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Passed,
    Failed,
    /// The run aborted before an evaluation was produced
    Errored,
}

/// Persisted trajectory of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryRecord {
    pub trajectory: Vec<TurnRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflection_history: Option<Vec<String>>,
}

impl TrajectoryRecord {
    pub fn new(transcript: &Transcript) -> Self {
        Self {
            trajectory: transcript.snapshot(),
            reflection_history: None,
        }
    }

    pub fn with_reflection_history(mut self, history: Vec<String>) -> Self {
        self.reflection_history = Some(history);
        self
    }
}

/// Task id → trajectory, for one experiment.
pub type TrajectoryArchive = BTreeMap<String, TrajectoryRecord>;

/// Aggregate outcome of an experiment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    #[serde(default)]
    pub experiment_name: String,
    #[serde(default)]
    pub agent: String,
    #[serde(default = "Utc::now")]
    pub generated_at: DateTime<Utc>,
    pub total_tasks: usize,
    pub passed_tasks: usize,
    pub failed_tasks: usize,
    pub errored_tasks: usize,
    /// Percentage of passed tasks, 0 when there are none
    pub success_rate: f64,
    pub passed_task_ids: Vec<String>,
    pub failed_task_ids: Vec<String>,
    pub errored_task_ids: Vec<String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, TaskMetrics>,
    #[serde(default)]
    pub totals: TaskMetrics,
}

impl PerformanceReport {
    pub fn new(experiment_name: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            experiment_name: experiment_name.into(),
            agent: agent.into(),
            generated_at: Utc::now(),
            total_tasks: 0,
            passed_tasks: 0,
            failed_tasks: 0,
            errored_tasks: 0,
            success_rate: 0.0,
            passed_task_ids: Vec::new(),
            failed_task_ids: Vec::new(),
            errored_task_ids: Vec::new(),
            metrics: BTreeMap::new(),
            totals: TaskMetrics::default(),
        }
    }

    /// Record one task's classification and, when available, its metrics.
    pub fn record(&mut self, task_id: &str, status: TaskStatus, metrics: Option<TaskMetrics>) {
        let bucket = match status {
            TaskStatus::Passed => &mut self.passed_task_ids,
            TaskStatus::Failed => &mut self.failed_task_ids,
            TaskStatus::Errored => &mut self.errored_task_ids,
        };
        bucket.push(task_id.to_string());

        if let Some(metrics) = metrics {
            self.totals.add(&metrics);
            self.metrics.insert(task_id.to_string(), metrics);
        }

        self.passed_tasks = self.passed_task_ids.len();
        self.failed_tasks = self.failed_task_ids.len();
        self.errored_tasks = self.errored_task_ids.len();
        self.total_tasks = self.passed_tasks + self.failed_tasks + self.errored_tasks;
        self.success_rate = if self.total_tasks > 0 {
            self.passed_tasks as f64 / self.total_tasks as f64 * 100.0
        } else {
            0.0
        };
    }

    /// Which bucket a task landed in.
    pub fn status_of(&self, task_id: &str) -> Option<TaskStatus> {
        [
            (TaskStatus::Passed, &self.passed_task_ids),
            (TaskStatus::Failed, &self.failed_task_ids),
            (TaskStatus::Errored, &self.errored_task_ids),
        ]
        .into_iter()
        .find(|(_, ids)| ids.iter().any(|id| id == task_id))
        .map(|(status, _)| status)
    }

    /// Plain-text summary for terminals.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Experiment: {} ({})\n",
            self.experiment_name, self.agent
        ));
        out.push_str(&format!("  Total Tasks:  {}\n", self.total_tasks));
        out.push_str(&format!("  Passed:       {}\n", self.passed_tasks));
        out.push_str(&format!("  Failed:       {}\n", self.failed_tasks));
        out.push_str(&format!("  Errors:       {}\n", self.errored_tasks));
        out.push_str(&format!("  Success Rate: {:.2}%\n", self.success_rate));
        if self.totals.model_calls > 0 {
            out.push_str(&format!(
                "  Tokens:       {} in / {} out ({} calls)\n",
                self.totals.input_tokens, self.totals.output_tokens, self.totals.model_calls
            ));
            out.push_str(&format!("  Cost:         ${:.4}\n", self.totals.cost_usd));
        }
        if !self.failed_task_ids.is_empty() {
            out.push_str(&format!("\nFailed Task IDs: {:?}\n", self.failed_task_ids));
        }
        if !self.errored_task_ids.is_empty() {
            out.push_str(&format!("\nErrored Task IDs: {:?}\n", self.errored_task_ids));
        }
        out
    }
}

/// Write `value` as pretty JSON, creating parent directories.
pub fn save_json<T: Serialize>(value: &T, path: &Path) -> Result<(), Error> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    debug!(path = %path.display(), "Artifact written");
    Ok(())
}

/// Read a JSON artifact.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T, Error> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
