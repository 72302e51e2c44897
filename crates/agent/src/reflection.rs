//! Bounded reflection history with first-in, first-out eviction.

use reflace_core::transcript::TrialId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// One critique of a failed trial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionEntry {
    /// The trial the critique was written about
    pub source_trial_ref: TrialId,
    pub critique_text: String,
}

/// Critiques carried between trials of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionHistory {
    max_history: usize,
    entries: VecDeque<ReflectionEntry>,
}

impl ReflectionHistory {
    /// `max_history` is clamped to at least 1.
    pub fn new(max_history: usize) -> Self {
        let max_history = max_history.max(1);
        Self {
            max_history,
            entries: VecDeque::with_capacity(max_history),
        }
    }

    /// Append a critique, evicting the oldest entries beyond capacity.
    pub fn push(&mut self, entry: ReflectionEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.max_history {
            if let Some(evicted) = self.entries.pop_front() {
                debug!(trial = %evicted.source_trial_ref, "Reflection evicted");
            }
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &ReflectionEntry> {
        self.entries.iter()
    }

    pub fn critiques(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.critique_text.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// Numbered list of critiques, or `None` when there are none.
    pub fn render(&self) -> String {
        if self.entries.is_empty() {
            return "None".into();
        }
        let mut out = String::new();
        for (i, entry) in self.entries.iter().enumerate() {
            out.push_str(&format!("{}. {}\n\n", i + 1, entry.critique_text.trim()));
        }
        out
    }
}
