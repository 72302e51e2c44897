//! Curator — integrates a reflector's proposals into the Insight Store.
//!
//! The reflector answers with a JSON document naming existing insights it
//! found helpful or harmful and proposing new ones. The curator applies tag
//! updates, in-place rewrites and additions; `add_insight`'s similarity
//! check is the only deduplication. Ids the store does not know are skipped
//! and reported, never fatal.

use reflace_core::error::PlaybookError;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::insight::{InsightTag, Section};
use crate::store::{AddOutcome, InsightStore, RewriteOutcome};

/// A tag verdict on an existing insight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulletTag {
    pub id: String,
    pub tag: String,
}

/// A newly proposed insight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedInsight {
    #[serde(default)]
    pub section: String,
    pub content: String,
    /// Existing id whose text this proposal should replace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,
}

/// Structured analysis returned by the insight reflector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectorOutput {
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub error_identification: String,
    #[serde(default)]
    pub root_cause_analysis: String,
    #[serde(default)]
    pub correct_approach: String,
    #[serde(default)]
    pub key_insight: String,
    #[serde(default)]
    pub bullet_tags: Vec<BulletTag>,
    #[serde(default)]
    pub new_insights: Vec<ProposedInsight>,
}

impl ReflectorOutput {
    /// Parse the reflector's reply, tolerating code fences and prose around
    /// the JSON object.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(extract_json_object(text))
    }

    /// Output carrying only a free-text key insight.
    pub fn from_key_insight(text: impl Into<String>) -> Self {
        Self {
            key_insight: text.into(),
            ..Default::default()
        }
    }
}

/// Slice from the first `{` to the last `}`, or the whole text.
fn extract_json_object(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text.trim(),
    }
}

/// What one curation pass changed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurationReport {
    pub added: Vec<String>,
    pub merged: Vec<String>,
    pub retagged: Vec<String>,
    pub rewritten: Vec<String>,
    /// Unknown ids, unknown tags and unusable proposals
    pub skipped: Vec<String>,
}

impl CurationReport {
    pub fn changed(&self) -> bool {
        !(self.added.is_empty()
            && self.merged.is_empty()
            && self.retagged.is_empty()
            && self.rewritten.is_empty())
    }
}

/// Applies reflector output to an Insight Store.
#[derive(Debug, Clone)]
pub struct Curator {
    default_section: Section,
}

impl Curator {
    pub fn new() -> Self {
        Self {
            default_section: Section::Strategies,
        }
    }

    /// Section used for proposals that name none, and for a bare key insight.
    pub fn with_default_section(mut self, section: Section) -> Self {
        self.default_section = section;
        self
    }

    /// Apply one reflector output. Only embedding failures abort the pass.
    pub async fn apply(
        &self,
        store: &mut InsightStore,
        output: &ReflectorOutput,
    ) -> Result<CurationReport, PlaybookError> {
        let mut report = CurationReport::default();

        for bullet in &output.bullet_tags {
            let Some(tag) = parse_tag(&bullet.tag) else {
                warn!(id = %bullet.id, tag = %bullet.tag, "Curator: unknown tag, skipping");
                report.skipped.push(bullet.id.clone());
                continue;
            };
            match store.update_tag(&bullet.id, tag) {
                Ok(()) => report.retagged.push(bullet.id.clone()),
                Err(PlaybookError::NotFound(id)) => {
                    warn!(id = %id, "Curator: tag references unknown insight, skipping");
                    report.skipped.push(id);
                }
                Err(e) => return Err(e),
            }
        }

        for proposal in &output.new_insights {
            let section = if proposal.section.trim().is_empty() {
                self.default_section
            } else {
                match proposal.section.parse::<Section>() {
                    Ok(section) => section,
                    Err(_) => {
                        warn!(section = %proposal.section, "Curator: unknown section, skipping");
                        report.skipped.push(proposal.section.clone());
                        continue;
                    }
                }
            };

            if let Some(target) = &proposal.replaces {
                if store.contains(target) {
                    match store.rewrite_insight(target, &proposal.content).await {
                        Ok(RewriteOutcome::Rewritten) => report.rewritten.push(target.clone()),
                        Ok(RewriteOutcome::Merged { id, .. }) => report.merged.push(id),
                        Err(PlaybookError::EmptyText) => report.skipped.push(target.clone()),
                        Err(e) => return Err(e),
                    }
                    continue;
                }
                warn!(id = %target, "Curator: replacement target unknown, adding instead");
            }

            self.add(store, section, &proposal.content, &mut report)
                .await?;
        }

        if output.new_insights.is_empty() && !output.key_insight.trim().is_empty() {
            self.add(store, self.default_section, &output.key_insight, &mut report)
                .await?;
        }

        info!(
            added = report.added.len(),
            merged = report.merged.len(),
            retagged = report.retagged.len(),
            rewritten = report.rewritten.len(),
            skipped = report.skipped.len(),
            total = store.len(),
            "Curation applied"
        );
        Ok(report)
    }

    async fn add(
        &self,
        store: &mut InsightStore,
        section: Section,
        text: &str,
        report: &mut CurationReport,
    ) -> Result<(), PlaybookError> {
        match store.add_insight(section, text).await {
            Ok(AddOutcome::Added(id)) => report.added.push(id),
            Ok(AddOutcome::Merged { id, .. }) => report.merged.push(id),
            Err(PlaybookError::EmptyText) => report.skipped.push(String::new()),
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

impl Default for Curator {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_tag(tag: &str) -> Option<InsightTag> {
    match tag.trim().to_ascii_lowercase().as_str() {
        "helpful" => Some(InsightTag::Helpful),
        "harmful" => Some(InsightTag::Harmful),
        "neutral" => Some(InsightTag::Neutral),
        _ => None,
    }
}
