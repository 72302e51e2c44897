//! Insight entries and the fixed sections they live in.

use chrono::{DateTime, Utc};
use reflace_core::error::PlaybookError;
use serde::{Deserialize, Serialize};

/// A fixed, named partition of the playbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    Strategies,
    CodeSnippets,
    Troubleshooting,
}

impl Section {
    /// All sections in render order.
    pub const ALL: [Section; 3] = [
        Section::Strategies,
        Section::CodeSnippets,
        Section::Troubleshooting,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            Self::Strategies => "STRATEGIES AND HARD RULES",
            Self::CodeSnippets => "USEFUL CODE SNIPPETS AND TEMPLATES",
            Self::Troubleshooting => "TROUBLESHOOTING AND PITFALLS",
        }
    }

    /// Machine name, matching the serialized form.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Strategies => "strategies",
            Self::CodeSnippets => "code_snippets",
            Self::Troubleshooting => "troubleshooting",
        }
    }

    /// Id prefix, e.g. `shr` in `shr-00001`.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Strategies => "shr",
            Self::CodeSnippets => "code",
            Self::Troubleshooting => "ts",
        }
    }

    /// Recover the section from an insight id.
    pub fn from_id(id: &str) -> Option<Self> {
        let (prefix, _) = id.split_once('-')?;
        Self::ALL.into_iter().find(|s| s.prefix() == prefix)
    }
}

impl std::str::FromStr for Section {
    type Err = PlaybookError;

    /// Accepts the snake_case name, the id prefix or the rendered title.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|section| {
                normalized == section.prefix()
                    || normalized == section.name()
                    || normalized == section.title().to_ascii_lowercase()
            })
            .ok_or_else(|| PlaybookError::UnknownSection(s.to_string()))
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.title())
    }
}

/// How an insight has proven itself in practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightTag {
    Helpful,
    Harmful,
    #[default]
    Neutral,
}

impl InsightTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Helpful => "helpful",
            Self::Harmful => "harmful",
            Self::Neutral => "neutral",
        }
    }
}

impl std::fmt::Display for InsightTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persistent, deduplicated strategy note.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: String,
    pub section: Section,
    pub text: String,
    #[serde(default)]
    pub tag: InsightTag,
    pub embedding: Vec<f32>,

    /// Near-duplicates folded into this entry
    #[serde(default)]
    pub hits: u32,
    #[serde(default)]
    pub helpful_count: u32,
    #[serde(default)]
    pub harmful_count: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Insight {
    pub(crate) fn new(id: String, section: Section, text: String, embedding: Vec<f32>) -> Self {
        let now = Utc::now();
        Self {
            id,
            section,
            text,
            tag: InsightTag::Neutral,
            embedding,
            hits: 0,
            helpful_count: 0,
            harmful_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sequence number encoded in the id (`shr-00042` → 42).
    pub fn sequence(&self) -> Option<u64> {
        self.id.split_once('-')?.1.parse().ok()
    }
}
