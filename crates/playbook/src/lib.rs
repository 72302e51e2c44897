//! Insight store (playbook) for Reflace.
//!
//! A cross-task knowledge base of strategy notes, deduplicated by cosine
//! similarity of their embeddings, curated from reflector output and
//! rendered into generator prompts.

pub mod curator;
pub mod insight;
pub mod persist;
pub mod store;
pub mod vector;

pub use curator::{BulletTag, CurationReport, Curator, ProposedInsight, ReflectorOutput};
pub use insight::{Insight, InsightTag, Section};
pub use store::{
    AddOutcome, DedupConfig, InsightStore, MergePolicy, PlaybookSnapshot, RewriteOutcome,
};
pub use vector::cosine_similarity;
