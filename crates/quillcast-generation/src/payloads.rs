//! Typed payloads produced by each pipeline stage.
//!
//! Every payload is stored as JSON on its stage artifact and deserialized
//! back into these types as the next stage's input. Fields the model may
//! omit are `#[serde(default)]`; fields a downstream stage cannot work
//! without are required, so their absence is a parse error.

use quillcast_core::{
    find_heading, find_list, render_blocks, BlockKind, ContentBlock,
};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// keyword_research
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordPriority {
    High,
    #[default]
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Keyword {
    pub keyword: String,
    /// Search intent, e.g. `informational` or `transactional`.
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub priority: KeywordPriority,
}

/// Output of `keyword_research`. Accepts either `{"keywords": [...]}` or a
/// bare array of keywords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordSet {
    pub keywords: Vec<Keyword>,
}

impl<'de> Deserialize<'de> for KeywordSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Wrapped { keywords: Vec<Keyword> },
            Bare(Vec<Keyword>),
        }

        let keywords = match Repr::deserialize(deserializer)? {
            Repr::Wrapped { keywords } | Repr::Bare(keywords) => keywords,
        };
        if keywords.is_empty() {
            return Err(serde::de::Error::custom("keyword list is empty"));
        }
        Ok(Self { keywords })
    }
}

impl KeywordSet {
    /// Keyword strings, high priority first, stable within a priority.
    #[must_use]
    pub fn ranked_terms(&self) -> Vec<&str> {
        let mut ranked: Vec<&Keyword> = self.keywords.iter().collect();
        ranked.sort_by_key(|k| match k.priority {
            KeywordPriority::High => 0,
            KeywordPriority::Medium => 1,
            KeywordPriority::Low => 2,
        });
        ranked.into_iter().map(|k| k.keyword.as_str()).collect()
    }
}

// ---------------------------------------------------------------------------
// content_strategy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedArticle {
    pub title: String,
    pub primary_keyword: String,
    #[serde(default)]
    pub secondary_keywords: Vec<String>,
    #[serde(default)]
    pub angle: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentStrategy {
    #[serde(default)]
    pub search_terms: Vec<String>,
    pub articles: Vec<PlannedArticle>,
}

impl ContentStrategy {
    /// The article a campaign run writes: the first one planned.
    #[must_use]
    pub fn lead_article(&self) -> Option<&PlannedArticle> {
        self.articles.first()
    }
}

// ---------------------------------------------------------------------------
// source_discovery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCandidate {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCandidates {
    pub sources: Vec<SourceCandidate>,
}

/// Analysis of one fetched page. `relevance_score` is clamped to 1..=10.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInsights {
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub content_angles: Vec<String>,
    #[serde(default = "default_relevance", deserialize_with = "clamped_relevance")]
    pub relevance_score: u8,
}

fn default_relevance() -> u8 {
    5
}

fn clamped_relevance<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    if raw.is_nan() {
        return Ok(default_relevance());
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let clamped = raw.round().clamp(1.0, 10.0) as u8;
    Ok(clamped)
}

/// Fetch/analysis outcome for one source, as carried in [`ResearchContext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub status: quillcast_core::SourceStatus,
    #[serde(default)]
    pub content_excerpt: Option<String>,
    #[serde(default)]
    pub insights: Option<SourceInsights>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Insights merged across every usable source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedStrategy {
    pub topics: Vec<String>,
    pub key_insights: Vec<String>,
    pub content_angles: Vec<String>,
    pub source_count: usize,
    pub average_relevance: f64,
}

/// Stored payload of `source_discovery`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchContext {
    pub sources: Vec<SourceResult>,
    pub strategy: AggregatedStrategy,
}

// ---------------------------------------------------------------------------
// writing / humanization / review
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineSection {
    pub heading: String,
    #[serde(default)]
    pub points: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    #[serde(default)]
    pub sections: Vec<OutlineSection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleDraft {
    pub title: String,
    #[serde(default)]
    pub outline: Outline,
    pub html_content: String,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceProfile {
    #[serde(default)]
    pub tone: String,
    #[serde(default)]
    pub reading_level: String,
    #[serde(default)]
    pub style_notes: Vec<String>,
    #[serde(default)]
    pub signature_phrases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanizedDraft {
    #[serde(default)]
    pub voice_profile: VoiceProfile,
    pub title: String,
    pub html_content: String,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Stored payload of `review`. `blocks` is optional structured content the
/// reviewer may return instead of, or alongside, raw HTML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewedArticle {
    pub title: String,
    #[serde(default)]
    pub html_content: String,
    #[serde(default)]
    pub blocks: Vec<ContentBlock>,
    #[serde(default)]
    pub meta_description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub review_notes: Vec<String>,
}

/// Block key of a heading that overrides the reviewed title.
pub const TITLE_BLOCK_KEY: &str = "title";
/// Block key of a list used when the reviewer returned no keyword array.
pub const KEYWORDS_BLOCK_KEY: &str = "keywords";

impl ReviewedArticle {
    /// The `title` heading block when present and non-blank, else `title`.
    #[must_use]
    pub fn article_title(&self) -> &str {
        find_heading(&self.blocks, TITLE_BLOCK_KEY)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.title)
    }

    /// Non-blank keywords, falling back to the `keywords` list block.
    #[must_use]
    pub fn article_keywords(&self) -> Vec<String> {
        let listed = if self.keywords.iter().any(|k| !k.trim().is_empty()) {
            self.keywords.as_slice()
        } else {
            find_list(&self.blocks, KEYWORDS_BLOCK_KEY).unwrap_or_default()
        };
        listed
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(str::to_owned)
            .collect()
    }

    /// Publishable HTML: the reviewed HTML, or the rendered blocks when the
    /// reviewer returned blocks only. The title heading and keyword list are
    /// metadata and stay out of the body.
    #[must_use]
    pub fn body_html(&self) -> String {
        if !self.html_content.trim().is_empty() {
            return self.html_content.clone();
        }
        let body: Vec<ContentBlock> = self
            .blocks
            .iter()
            .filter(|block| !is_metadata_block(block))
            .cloned()
            .collect();
        render_blocks(&body)
    }
}

fn is_metadata_block(block: &ContentBlock) -> bool {
    match block.kind() {
        BlockKind::Heading => block.key() == TITLE_BLOCK_KEY,
        BlockKind::List => block.key() == KEYWORDS_BLOCK_KEY,
        BlockKind::Paragraph | BlockKind::Button => false,
    }
}
