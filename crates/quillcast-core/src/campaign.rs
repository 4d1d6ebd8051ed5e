//! Campaign lifecycle vocabulary: the ordered pipeline stages, the campaign
//! status enum, and the progress rule.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// One named step of the content pipeline, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    KeywordResearch,
    ContentStrategy,
    SourceDiscovery,
    Writing,
    Humanization,
    Review,
}

impl Stage {
    /// Every stage in the order a campaign must complete them.
    pub const ALL: [Stage; 6] = [
        Stage::KeywordResearch,
        Stage::ContentStrategy,
        Stage::SourceDiscovery,
        Stage::Writing,
        Stage::Humanization,
        Stage::Review,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::KeywordResearch => "keyword_research",
            Stage::ContentStrategy => "content_strategy",
            Stage::SourceDiscovery => "source_discovery",
            Stage::Writing => "writing",
            Stage::Humanization => "humanization",
            Stage::Review => "review",
        }
    }

    /// Zero-based position in [`Stage::ALL`].
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Stage::KeywordResearch => 0,
            Stage::ContentStrategy => 1,
            Stage::SourceDiscovery => 2,
            Stage::Writing => 3,
            Stage::Humanization => 4,
            Stage::Review => 5,
        }
    }

    /// The stage whose successful artifact feeds this one, if any.
    #[must_use]
    pub fn previous(self) -> Option<Stage> {
        self.index().checked_sub(1).map(|i| Stage::ALL[i])
    }

    /// The stage that follows this one, or `None` after `review`.
    #[must_use]
    pub fn next(self) -> Option<Stage> {
        Stage::ALL.get(self.index() + 1).copied()
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| CoreError::InvalidStage(s.to_string()))
    }
}

/// Campaign status as persisted in `campaigns.status`.
///
/// The six working states mirror [`Stage`]; `Completed` and `Failed` are the
/// two outcomes. Only `Completed` is terminal: a failed campaign can resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    KeywordResearch,
    ContentStrategy,
    SourceDiscovery,
    Writing,
    Humanization,
    Review,
    Completed,
    Failed,
}

impl CampaignStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self.stage() {
            Some(stage) => stage.as_str(),
            None if self.is_completed() => "completed",
            None => "failed",
        }
    }

    /// The working stage this status represents, if it is one.
    #[must_use]
    pub fn stage(self) -> Option<Stage> {
        match self {
            CampaignStatus::KeywordResearch => Some(Stage::KeywordResearch),
            CampaignStatus::ContentStrategy => Some(Stage::ContentStrategy),
            CampaignStatus::SourceDiscovery => Some(Stage::SourceDiscovery),
            CampaignStatus::Writing => Some(Stage::Writing),
            CampaignStatus::Humanization => Some(Stage::Humanization),
            CampaignStatus::Review => Some(Stage::Review),
            CampaignStatus::Completed | CampaignStatus::Failed => None,
        }
    }

    #[must_use]
    pub fn is_completed(self) -> bool {
        self == CampaignStatus::Completed
    }

    /// A resume action is offered for everything except `completed`.
    #[must_use]
    pub fn can_resume(self) -> bool {
        !self.is_completed()
    }
}

impl From<Stage> for CampaignStatus {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::KeywordResearch => CampaignStatus::KeywordResearch,
            Stage::ContentStrategy => CampaignStatus::ContentStrategy,
            Stage::SourceDiscovery => CampaignStatus::SourceDiscovery,
            Stage::Writing => CampaignStatus::Writing,
            Stage::Humanization => CampaignStatus::Humanization,
            Stage::Review => CampaignStatus::Review,
        }
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CampaignStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(CampaignStatus::Completed),
            "failed" => Ok(CampaignStatus::Failed),
            other => other
                .parse::<Stage>()
                .map(CampaignStatus::from)
                .map_err(|_| CoreError::InvalidCampaignStatus(s.to_string())),
        }
    }
}

/// Target length class for generated articles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArticleLength {
    Short,
    Medium,
    Long,
}

impl ArticleLength {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ArticleLength::Short => "short",
            ArticleLength::Medium => "medium",
            ArticleLength::Long => "long",
        }
    }

    /// Approximate word target handed to the writing prompt.
    #[must_use]
    pub fn target_words(self) -> u32 {
        match self {
            ArticleLength::Short => 800,
            ArticleLength::Medium => 1500,
            ArticleLength::Long => 2500,
        }
    }
}

impl std::fmt::Display for ArticleLength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArticleLength {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "short" => Ok(ArticleLength::Short),
            "medium" => Ok(ArticleLength::Medium),
            "long" => Ok(ArticleLength::Long),
            _ => Err(CoreError::InvalidArticleLength(s.to_string())),
        }
    }
}

/// `floor(100 * completed / total)` over the six canonical stages.
#[must_use]
pub fn progress_for(completed_stages: usize) -> i16 {
    let total = Stage::ALL.len();
    let completed = completed_stages.min(total);
    // Bounded by 100, so the cast cannot truncate.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    let pct = (100 * completed / total) as i16;
    pct
}
