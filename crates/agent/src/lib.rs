//! Agent loops for Reflace.
//!
//! One parameterized **Actor Loop** runs every trial; the strategies differ
//! only in what they inject into the seed prompt and what they do after a
//! trial is evaluated:
//!
//! 1. **ReAct**: a single trial, no augmentation
//! 2. **Reflexion**: retry failed trials, carrying a bounded history of
//!    critiques
//! 3. **ACE**: render a cross-task Insight Store into the prompt and curate
//!    it from each reflected trial
//!
//! The [`Experiment`] driver runs a strategy over a dataset and persists
//! the trajectories and the performance report.

pub mod ace;
pub mod actor;
pub mod evaluation;
pub mod experiment;
pub mod prompt;
pub mod reflection;
pub mod reflector;
pub mod reflexion;
pub mod results;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use ace::{AceLoop, AceOutcome};
pub use actor::{Actor, TerminatedBy, TrialOutcome};
pub use evaluation::render_report;
pub use experiment::{Experiment, ExperimentSummary, Strategy};
pub use prompt::PromptAugmentation;
pub use reflection::{ReflectionEntry, ReflectionHistory};
pub use reflector::{CritiqueOutcome, Reflector};
pub use reflexion::{ReflexionLoop, ReflexionOutcome};
pub use results::{PerformanceReport, TaskStatus, TrajectoryArchive, TrajectoryRecord};
