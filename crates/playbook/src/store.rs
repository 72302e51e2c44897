//! Insight Store — the cross-task playbook of strategy notes.
//!
//! Entries are partitioned into fixed [`Section`]s and deduplicated by
//! embedding similarity: a new text whose embedding is at least
//! `threshold`-similar to an entry in the same section is folded into that
//! entry according to the [`MergePolicy`] instead of being appended.
//!
//! Entries are never removed. The store is owned by one loop at a time and
//! mutated through `&mut self`; hosts that share it across concurrent tasks
//! must wrap it in a lock so the similarity check and the append stay atomic.

use chrono::Utc;
use reflace_core::embedding::Embedder;
use reflace_core::error::{EmbeddingError, PlaybookError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::insight::{Insight, InsightTag, Section};
use crate::vector::best_match;

/// What happens to a near-duplicate insight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Leave the existing entry untouched
    Skip,
    /// Count the duplicate against the existing entry
    #[default]
    Count,
    /// Replace the existing entry's text and embedding
    Overwrite,
}

impl std::str::FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "count" => Ok(Self::Count),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(format!("unknown merge policy '{other}'")),
        }
    }
}

/// Deduplication settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DedupConfig {
    pub threshold: f32,
    pub policy: MergePolicy,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            policy: MergePolicy::Count,
        }
    }
}

/// Result of [`InsightStore::add_insight`].
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome {
    /// A new entry was appended.
    Added(String),
    /// The text duplicated an existing entry.
    Merged { id: String, similarity: f32 },
}

impl AddOutcome {
    /// Id of the entry that now holds the text.
    pub fn id(&self) -> &str {
        match self {
            Self::Added(id) => id,
            Self::Merged { id, .. } => id,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, Self::Added(_))
    }
}

/// Result of [`InsightStore::rewrite_insight`].
#[derive(Debug, Clone, PartialEq)]
pub enum RewriteOutcome {
    /// The target now holds the new text.
    Rewritten,
    /// The new text duplicated another entry in the section.
    Merged { id: String, similarity: f32 },
}

/// Serializable state of an [`InsightStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlaybookSnapshot {
    pub insights: Vec<Insight>,
    /// Last issued sequence number per section
    #[serde(default)]
    pub counters: BTreeMap<Section, u64>,
}

/// The deduplicating store of insights.
pub struct InsightStore {
    embedder: Arc<dyn Embedder>,
    dedup: DedupConfig,
    insights: Vec<Insight>,
    counters: BTreeMap<Section, u64>,
}

impl InsightStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            dedup: DedupConfig::default(),
            insights: Vec::new(),
            counters: BTreeMap::new(),
        }
    }

    pub fn with_dedup(mut self, dedup: DedupConfig) -> Self {
        self.dedup = dedup;
        self
    }

    /// Rebuild a store from a snapshot. Counters never fall behind the ids present.
    pub fn from_snapshot(embedder: Arc<dyn Embedder>, snapshot: PlaybookSnapshot) -> Self {
        let mut counters = snapshot.counters;
        for insight in &snapshot.insights {
            if let Some(seq) = insight.sequence() {
                let counter = counters.entry(insight.section).or_insert(0);
                *counter = (*counter).max(seq);
            }
        }
        Self {
            embedder,
            dedup: DedupConfig::default(),
            insights: snapshot.insights,
            counters,
        }
    }

    pub fn snapshot(&self) -> PlaybookSnapshot {
        PlaybookSnapshot {
            insights: self.insights.clone(),
            counters: self.counters.clone(),
        }
    }

    pub fn dedup(&self) -> DedupConfig {
        self.dedup
    }

    /// Add an insight, folding it into a near-duplicate when one exists.
    pub async fn add_insight(
        &mut self,
        section: Section,
        text: &str,
    ) -> Result<AddOutcome, PlaybookError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PlaybookError::EmptyText);
        }

        let embedding = self.embed(text).await?;

        let in_section: Vec<usize> = self
            .insights
            .iter()
            .enumerate()
            .filter(|(_, i)| i.section == section)
            .map(|(idx, _)| idx)
            .collect();
        let candidates = in_section
            .iter()
            .map(|&idx| self.insights[idx].embedding.as_slice());

        if let Some((pos, similarity)) = best_match(&embedding, candidates, self.dedup.threshold) {
            let id = self.merge_into(in_section[pos], text, embedding, similarity);
            return Ok(AddOutcome::Merged { id, similarity });
        }

        let id = self.next_id(section);
        debug!(id = %id, section = %section.name(), "Insight added");
        self.insights
            .push(Insight::new(id.clone(), section, text.to_string(), embedding));
        Ok(AddOutcome::Added(id))
    }

    /// Set an insight's tag.
    pub fn update_tag(&mut self, id: &str, tag: InsightTag) -> Result<(), PlaybookError> {
        let insight = self.get_mut(id)?;
        insight.tag = tag;
        match tag {
            InsightTag::Helpful => insight.helpful_count += 1,
            InsightTag::Harmful => insight.harmful_count += 1,
            InsightTag::Neutral => {}
        }
        insight.updated_at = Utc::now();
        Ok(())
    }

    /// Replace an insight's text and re-embed it.
    pub async fn update_text(&mut self, id: &str, text: &str) -> Result<(), PlaybookError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PlaybookError::EmptyText);
        }
        // Fail before spending an embedding call on an unknown id.
        self.get_mut(id)?;

        let embedding = self.embed(text).await?;
        let insight = self.get_mut(id)?;
        insight.text = text.to_string();
        insight.embedding = embedding;
        insight.updated_at = Utc::now();
        Ok(())
    }

    /// Replace an insight's text unless the new text near-duplicates another
    /// entry in the same section. In that case the rewrite is folded into
    /// that entry under the merge policy and the target is left untouched.
    pub async fn rewrite_insight(
        &mut self,
        id: &str,
        text: &str,
    ) -> Result<RewriteOutcome, PlaybookError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(PlaybookError::EmptyText);
        }
        let section = self.get_mut(id)?.section;

        let embedding = self.embed(text).await?;

        let siblings: Vec<usize> = self
            .insights
            .iter()
            .enumerate()
            .filter(|(_, i)| i.section == section && i.id != id)
            .map(|(idx, _)| idx)
            .collect();
        let candidates = siblings
            .iter()
            .map(|&idx| self.insights[idx].embedding.as_slice());

        if let Some((pos, similarity)) = best_match(&embedding, candidates, self.dedup.threshold) {
            let merged = self.merge_into(siblings[pos], text, embedding, similarity);
            return Ok(RewriteOutcome::Merged {
                id: merged,
                similarity,
            });
        }

        let insight = self.get_mut(id)?;
        insight.text = text.to_string();
        insight.embedding = embedding;
        insight.updated_at = Utc::now();
        debug!(id = %id, "Insight rewritten");
        Ok(RewriteOutcome::Rewritten)
    }

    pub fn get(&self, id: &str) -> Option<&Insight> {
        self.insights.iter().find(|i| i.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Entries of one section in insertion order.
    pub fn section(&self, section: Section) -> impl Iterator<Item = &Insight> {
        self.insights.iter().filter(move |i| i.section == section)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Insight> {
        self.insights.iter()
    }

    pub fn len(&self) -> usize {
        self.insights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insights.is_empty()
    }

    /// Render every section with ids and tags for prompt injection.
    ///
    /// ```text
    /// STRATEGIES AND HARD RULES:
    ///   * shr-00001 [helpful] : Always log in before calling app APIs.
    /// ```
    pub fn render(&self) -> String {
        let mut out = String::new();
        for section in Section::ALL {
            out.push_str(section.title());
            out.push_str(":\n");
            let mut any = false;
            for insight in self.section(section) {
                any = true;
                out.push_str(&format!(
                    "  * {} [{}] : {}\n",
                    insight.id, insight.tag, insight.text
                ));
            }
            if !any {
                out.push_str("  (none)\n");
            }
            out.push('\n');
        }
        out
    }

    fn next_id(&mut self, section: Section) -> String {
        let counter = self.counters.entry(section).or_insert(0);
        *counter += 1;
        format!("{}-{:05}", section.prefix(), counter)
    }

    fn get_mut(&mut self, id: &str) -> Result<&mut Insight, PlaybookError> {
        self.insights
            .iter_mut()
            .find(|i| i.id == id)
            .ok_or_else(|| PlaybookError::NotFound(id.to_string()))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, PlaybookError> {
        let embedding = self.embedder.embed(text).await?;
        if embedding.is_empty() {
            return Err(EmbeddingError::Empty(text.len()).into());
        }
        if let Some(pos) = embedding.iter().position(|x| !x.is_finite()) {
            return Err(EmbeddingError::NonFinite(pos).into());
        }
        Ok(embedding)
    }

    /// Fold `text` into the entry at `idx` under the merge policy.
    fn merge_into(
        &mut self,
        idx: usize,
        text: &str,
        embedding: Vec<f32>,
        similarity: f32,
    ) -> String {
        let policy = self.dedup.policy;
        let existing = &mut self.insights[idx];
        match policy {
            MergePolicy::Skip => {}
            MergePolicy::Count => {
                existing.hits += 1;
                existing.updated_at = Utc::now();
            }
            MergePolicy::Overwrite => {
                existing.text = text.to_string();
                existing.embedding = embedding;
                existing.hits += 1;
                existing.updated_at = Utc::now();
            }
        }
        debug!(
            id = %existing.id,
            similarity,
            policy = ?policy,
            "Insight merged into near-duplicate"
        );
        existing.id.clone()
    }
}

impl std::fmt::Debug for InsightStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsightStore")
            .field("embedder", &self.embedder.name())
            .field("dedup", &self.dedup)
            .field("len", &self.insights.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Returns a fixed vector per known text, a fresh axis otherwise.
    struct TableEmbedder {
        table: HashMap<String, Vec<f32>>,
    }

    impl TableEmbedder {
        fn new(entries: &[(&str, Vec<f32>)]) -> Arc<Self> {
            Arc::new(Self {
                table: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
            })
        }
    }

    #[async_trait]
    impl Embedder for TableEmbedder {
        fn name(&self) -> &str {
            "table"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.table
                .get(text)
                .cloned()
                .ok_or_else(|| EmbeddingError::Failed(format!("no vector for '{text}'")))
        }
    }

    fn unit(angle_cos: f32) -> Vec<f32> {
        vec![angle_cos, (1.0 - angle_cos * angle_cos).sqrt()]
    }

    #[tokio::test]
    async fn near_duplicate_is_not_appended() {
        let embedder = TableEmbedder::new(&[("A", vec![1.0, 0.0]), ("B", unit(0.85))]);
        let mut store = InsightStore::new(embedder);

        let first = store.add_insight(Section::Strategies, "A").await.unwrap();
        assert_eq!(first, AddOutcome::Added("shr-00001".into()));

        let second = store.add_insight(Section::Strategies, "B").await.unwrap();
        assert!(!second.is_added());
        assert_eq!(second.id(), "shr-00001");
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("shr-00001").unwrap().hits, 1);
    }

    #[tokio::test]
    async fn same_text_twice_is_idempotent() {
        let embedder = TableEmbedder::new(&[("login first", vec![0.3, 0.4, 0.5])]);
        let mut store = InsightStore::new(embedder);

        store
            .add_insight(Section::Strategies, "login first")
            .await
            .unwrap();
        let count = store.len();
        store
            .add_insight(Section::Strategies, "login first")
            .await
            .unwrap();
        assert_eq!(store.len(), count);
    }

    #[tokio::test]
    async fn dissimilar_text_is_appended_with_neutral_tag() {
        let embedder = TableEmbedder::new(&[("A", vec![1.0, 0.0]), ("C", unit(0.5))]);
        let mut store = InsightStore::new(embedder);

        store.add_insight(Section::Strategies, "A").await.unwrap();
        let outcome = store.add_insight(Section::Strategies, "C").await.unwrap();
        assert_eq!(outcome, AddOutcome::Added("shr-00002".into()));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("shr-00002").unwrap().tag, InsightTag::Neutral);
    }

    #[tokio::test]
    async fn similarity_only_checked_within_section() {
        let embedder = TableEmbedder::new(&[("A", vec![1.0, 0.0])]);
        let mut store = InsightStore::new(embedder);

        store.add_insight(Section::Strategies, "A").await.unwrap();
        let outcome = store.add_insight(Section::Troubleshooting, "A").await.unwrap();
        assert_eq!(outcome, AddOutcome::Added("ts-00001".into()));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn merge_policies() {
        let entries = [("A", vec![1.0, 0.0]), ("B", unit(0.9))];

        let mut skip = InsightStore::new(TableEmbedder::new(&entries)).with_dedup(DedupConfig {
            threshold: 0.8,
            policy: MergePolicy::Skip,
        });
        skip.add_insight(Section::Strategies, "A").await.unwrap();
        skip.add_insight(Section::Strategies, "B").await.unwrap();
        let entry = skip.get("shr-00001").unwrap();
        assert_eq!((entry.text.as_str(), entry.hits), ("A", 0));

        let mut overwrite =
            InsightStore::new(TableEmbedder::new(&entries)).with_dedup(DedupConfig {
                threshold: 0.8,
                policy: MergePolicy::Overwrite,
            });
        overwrite.add_insight(Section::Strategies, "A").await.unwrap();
        overwrite.add_insight(Section::Strategies, "B").await.unwrap();
        let entry = overwrite.get("shr-00001").unwrap();
        assert_eq!(entry.text, "B");
        assert_eq!(entry.embedding, unit(0.9));
        assert_eq!(overwrite.len(), 1);
    }

    #[tokio::test]
    async fn threshold_is_configurable() {
        let entries = [("A", vec![1.0, 0.0]), ("B", unit(0.7))];
        let mut strict = InsightStore::new(TableEmbedder::new(&entries));
        strict.add_insight(Section::Strategies, "A").await.unwrap();
        strict.add_insight(Section::Strategies, "B").await.unwrap();
        assert_eq!(strict.len(), 2);

        let mut loose = InsightStore::new(TableEmbedder::new(&entries)).with_dedup(DedupConfig {
            threshold: 0.6,
            policy: MergePolicy::Count,
        });
        loose.add_insight(Section::Strategies, "A").await.unwrap();
        loose.add_insight(Section::Strategies, "B").await.unwrap();
        assert_eq!(loose.len(), 1);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let mut store = InsightStore::new(TableEmbedder::new(&[]));
        assert!(matches!(
            store.update_tag("shr-00009", InsightTag::Helpful),
            Err(PlaybookError::NotFound(id)) if id == "shr-00009"
        ));
        assert!(matches!(
            store.update_text("ts-00001", "new").await,
            Err(PlaybookError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn update_tag_and_text() {
        let embedder = TableEmbedder::new(&[("A", vec![1.0, 0.0]), ("A2", vec![0.0, 1.0])]);
        let mut store = InsightStore::new(embedder);
        store.add_insight(Section::CodeSnippets, "A").await.unwrap();

        store.update_tag("code-00001", InsightTag::Harmful).unwrap();
        store.update_text("code-00001", "A2").await.unwrap();

        let entry = store.get("code-00001").unwrap();
        assert_eq!(entry.tag, InsightTag::Harmful);
        assert_eq!(entry.harmful_count, 1);
        assert_eq!(entry.text, "A2");
        assert_eq!(entry.embedding, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn empty_text_and_embedding_failures_rejected() {
        let mut store = InsightStore::new(TableEmbedder::new(&[("blank", vec![])]));
        assert!(matches!(
            store.add_insight(Section::Strategies, "   ").await,
            Err(PlaybookError::EmptyText)
        ));
        assert!(matches!(
            store.add_insight(Section::Strategies, "blank").await,
            Err(PlaybookError::Embedding(EmbeddingError::Empty(_)))
        ));
        assert!(matches!(
            store.add_insight(Section::Strategies, "unknown").await,
            Err(PlaybookError::Embedding(EmbeddingError::Failed(_)))
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn non_finite_embedding_rejected_without_merging() {
        let embedder = TableEmbedder::new(&[
            ("A", vec![1.0, 0.0]),
            ("totally different", vec![f32::NAN, 1.0]),
        ]);
        let mut store = InsightStore::new(embedder);
        store.add_insight(Section::Strategies, "A").await.unwrap();

        let err = store
            .add_insight(Section::Strategies, "totally different")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PlaybookError::Embedding(EmbeddingError::NonFinite(0))
        ));
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("shr-00001").unwrap().hits, 0);
    }

    #[tokio::test]
    async fn restored_nan_vector_does_not_absorb_inserts() {
        let embedder = TableEmbedder::new(&[("B", vec![0.0, 1.0])]);
        let snapshot = PlaybookSnapshot {
            insights: vec![Insight::new(
                "shr-00001".into(),
                Section::Strategies,
                "corrupt".into(),
                vec![f32::NAN, 1.0],
            )],
            counters: BTreeMap::new(),
        };
        let mut store = InsightStore::from_snapshot(embedder, snapshot);
        let outcome = store.add_insight(Section::Strategies, "B").await.unwrap();
        assert_eq!(outcome, AddOutcome::Added("shr-00002".into()));
    }

    #[tokio::test]
    async fn rewrite_into_sibling_duplicate_merges() {
        let embedder = TableEmbedder::new(&[
            ("A", vec![1.0, 0.0]),
            ("C", vec![0.0, 1.0]),
            ("A again", unit(0.95)),
        ]);
        let mut store = InsightStore::new(embedder);
        store.add_insight(Section::Strategies, "A").await.unwrap();
        store.add_insight(Section::Strategies, "C").await.unwrap();

        let outcome = store.rewrite_insight("shr-00002", "A again").await.unwrap();
        assert!(matches!(outcome, RewriteOutcome::Merged { ref id, .. } if id == "shr-00001"));
        assert_eq!(store.get("shr-00002").unwrap().text, "C");
        assert_eq!(store.get("shr-00001").unwrap().hits, 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn rewrite_ignores_its_own_entry() {
        let embedder = TableEmbedder::new(&[("A", vec![1.0, 0.0]), ("A v2", unit(0.99))]);
        let mut store = InsightStore::new(embedder);
        store.add_insight(Section::Strategies, "A").await.unwrap();

        let outcome = store.rewrite_insight("shr-00001", "A v2").await.unwrap();
        assert_eq!(outcome, RewriteOutcome::Rewritten);
        assert_eq!(store.get("shr-00001").unwrap().text, "A v2");
        assert!(matches!(
            store.rewrite_insight("shr-00009", "A").await,
            Err(PlaybookError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn render_lists_sections_ids_and_tags() {
        let embedder = TableEmbedder::new(&[
            ("Log in before calling app APIs.", vec![1.0, 0.0]),
            ("Paginate until an empty page.", vec![0.0, 1.0]),
        ]);
        let mut store = InsightStore::new(embedder);
        store
            .add_insight(Section::Strategies, "Log in before calling app APIs.")
            .await
            .unwrap();
        store
            .add_insight(Section::Troubleshooting, "Paginate until an empty page.")
            .await
            .unwrap();
        store.update_tag("shr-00001", InsightTag::Helpful).unwrap();

        let text = store.render();
        assert!(text.contains("STRATEGIES AND HARD RULES:\n  * shr-00001 [helpful] : Log in"));
        assert!(text.contains("USEFUL CODE SNIPPETS AND TEMPLATES:\n  (none)"));
        assert!(text.contains("  * ts-00001 [neutral] : Paginate until an empty page."));
    }

    #[tokio::test]
    async fn snapshot_restores_counters() {
        let embedder = TableEmbedder::new(&[("A", vec![1.0, 0.0]), ("B", vec![0.0, 1.0])]);
        let mut store = InsightStore::new(embedder.clone());
        store.add_insight(Section::Strategies, "A").await.unwrap();

        let mut snapshot = store.snapshot();
        snapshot.counters.clear();
        let mut restored = InsightStore::from_snapshot(embedder, snapshot);
        let outcome = restored.add_insight(Section::Strategies, "B").await.unwrap();
        assert_eq!(outcome.id(), "shr-00002");
    }

    #[test]
    fn merge_policy_parses() {
        assert_eq!("COUNT".parse::<MergePolicy>().unwrap(), MergePolicy::Count);
        assert_eq!("skip".parse::<MergePolicy>().unwrap(), MergePolicy::Skip);
        assert!("append".parse::<MergePolicy>().is_err());
    }
}
