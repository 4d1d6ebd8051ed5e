//! Prompt construction for each stage.
//!
//! Prompts always end with the exact JSON shape expected back; the parser
//! tolerates prose around it but the shape itself is not negotiable.

use quillcast_core::{ArticleLength, Stage};
use serde::Serialize;

use crate::payloads::{
    ArticleDraft, ContentStrategy, HumanizedDraft, KeywordSet, PlannedArticle, ResearchContext,
};

/// Appended to the user prompt on the single re-prompt after a parse failure.
pub const STRICT_JSON_INSTRUCTION: &str = "Your previous reply could not be parsed. \
Respond with ONLY the JSON value described above: no prose, no markdown fences, no comments.";

const MAX_SOURCE_CHARS_IN_PROMPT: usize = 12_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

impl PromptPair {
    /// The same prompt with [`STRICT_JSON_INSTRUCTION`] appended.
    #[must_use]
    pub fn stricter(&self) -> Self {
        Self {
            system: self.system.clone(),
            user: format!("{}\n\n{STRICT_JSON_INSTRUCTION}", self.user),
        }
    }
}

/// Campaign settings every stage prompt can draw on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignContext {
    pub website_url: String,
    pub brand_context: String,
    pub country: String,
    pub language: String,
    pub article_length: ArticleLength,
    pub seed_keywords: Vec<String>,
    pub target_articles: u32,
}

impl CampaignContext {
    fn brief(&self) -> String {
        let brand = if self.brand_context.trim().is_empty() {
            "(none provided)"
        } else {
            self.brand_context.trim()
        };
        format!(
            "Website: {}\nTarget country: {}\nLanguage: {}\nBrand context: {brand}",
            self.website_url, self.country, self.language
        )
    }
}

/// Typed input for one stage: campaign context plus the previous stage's
/// payload.
#[derive(Debug, Clone)]
pub enum StageInput {
    KeywordResearch {
        context: CampaignContext,
    },
    ContentStrategy {
        context: CampaignContext,
        keywords: KeywordSet,
    },
    SourceDiscovery {
        context: CampaignContext,
        strategy: ContentStrategy,
    },
    Writing {
        context: CampaignContext,
        article: PlannedArticle,
        research: ResearchContext,
    },
    Humanization {
        context: CampaignContext,
        draft: ArticleDraft,
    },
    Review {
        context: CampaignContext,
        draft: HumanizedDraft,
    },
}

impl StageInput {
    #[must_use]
    pub fn stage(&self) -> Stage {
        match self {
            StageInput::KeywordResearch { .. } => Stage::KeywordResearch,
            StageInput::ContentStrategy { .. } => Stage::ContentStrategy,
            StageInput::SourceDiscovery { .. } => Stage::SourceDiscovery,
            StageInput::Writing { .. } => Stage::Writing,
            StageInput::Humanization { .. } => Stage::Humanization,
            StageInput::Review { .. } => Stage::Review,
        }
    }

    #[must_use]
    pub fn prompt(&self) -> PromptPair {
        match self {
            StageInput::KeywordResearch { context } => keyword_research(context),
            StageInput::ContentStrategy { context, keywords } => {
                content_strategy(context, keywords)
            }
            StageInput::SourceDiscovery { context, strategy } => {
                source_discovery(context, strategy)
            }
            StageInput::Writing {
                context,
                article,
                research,
            } => writing(context, article, research),
            StageInput::Humanization { context, draft } => humanization(context, draft),
            StageInput::Review { context, draft } => review(context, draft),
        }
    }
}

/// Input for the per-source analysis sub-call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAnalysisInput {
    pub keyword_context: String,
    pub url: String,
    pub content: String,
}

impl SourceAnalysisInput {
    #[must_use]
    pub fn prompt(&self) -> PromptPair {
        let content: String = self.content.chars().take(MAX_SOURCE_CHARS_IN_PROMPT).collect();
        PromptPair {
            system: "You analyse web pages as research material for SEO articles.".to_string(),
            user: format!(
                "Keywords we are writing about: {}\nSource URL: {}\n\nPage content:\n{content}\n\n\
                 Return JSON: {{\"topics\": [string], \"key_insights\": [string], \
                 \"content_angles\": [string], \"relevance_score\": integer 1-10}}",
                self.keyword_context, self.url
            ),
        }
    }
}

fn keyword_research(context: &CampaignContext) -> PromptPair {
    let seeds = if context.seed_keywords.is_empty() {
        "(none, infer from the website)".to_string()
    } else {
        context.seed_keywords.join(", ")
    };
    PromptPair {
        system: "You are an SEO strategist doing keyword research.".to_string(),
        user: format!(
            "{}\nSeed keywords: {seeds}\n\nPropose 10-20 keywords worth targeting.\n\
             Return JSON: {{\"keywords\": [{{\"keyword\": string, \"intent\": \
             \"informational\"|\"commercial\"|\"transactional\"|\"navigational\", \
             \"priority\": \"high\"|\"medium\"|\"low\"}}]}}",
            context.brief()
        ),
    }
}

fn content_strategy(context: &CampaignContext, keywords: &KeywordSet) -> PromptPair {
    PromptPair {
        system: "You are a content strategist planning SEO articles.".to_string(),
        user: format!(
            "{}\nKeywords (highest priority first): {}\n\nPlan {} article(s) of about {} words \
             each, and list search terms for finding research sources.\n\
             Return JSON: {{\"search_terms\": [string], \"articles\": [{{\"title\": string, \
             \"primary_keyword\": string, \"secondary_keywords\": [string], \"angle\": string}}]}}",
            context.brief(),
            keywords.ranked_terms().join(", "),
            context.target_articles.max(1),
            context.article_length.target_words()
        ),
    }
}

fn source_discovery(context: &CampaignContext, strategy: &ContentStrategy) -> PromptPair {
    let article = strategy
        .lead_article()
        .map_or_else(String::new, |a| format!("Article: {} ({})", a.title, a.primary_keyword));
    PromptPair {
        system: "You find authoritative web sources for article research.".to_string(),
        user: format!(
            "{}\n{article}\nSearch terms: {}\n\nSuggest 5-8 publicly reachable URLs with \
             substantive content on these topics.\n\
             Return JSON: {{\"sources\": [{{\"url\": string, \"title\": string, \
             \"reason\": string}}]}}",
            context.brief(),
            strategy.search_terms.join(", ")
        ),
    }
}

fn writing(
    context: &CampaignContext,
    article: &PlannedArticle,
    research: &ResearchContext,
) -> PromptPair {
    let insights = research
        .strategy
        .key_insights
        .iter()
        .map(|i| format!("- {i}"))
        .collect::<Vec<_>>()
        .join("\n");
    PromptPair {
        system: "You are an expert SEO writer producing publish-ready HTML articles.".to_string(),
        user: format!(
            "{}\nTitle: {}\nPrimary keyword: {}\nSecondary keywords: {}\nAngle: {}\n\
             Length: about {} words\nResearch topics: {}\nResearch insights:\n{insights}\n\n\
             Write the article. Use <h2>/<h3>, <p>, <ul> only.\n\
             Return JSON: {{\"title\": string, \"outline\": {{\"sections\": [{{\"heading\": \
             string, \"points\": [string]}}]}}, \"html_content\": string, \
             \"meta_description\": string, \"keywords\": [string]}}",
            context.brief(),
            article.title,
            article.primary_keyword,
            article.secondary_keywords.join(", "),
            article.angle,
            context.article_length.target_words(),
            research.strategy.topics.join(", ")
        ),
    }
}

fn humanization(context: &CampaignContext, draft: &ArticleDraft) -> PromptPair {
    PromptPair {
        system: "You rewrite drafts in a brand's natural voice without changing facts."
            .to_string(),
        user: format!(
            "{}\n\nDerive a voice profile from the brand context, then rewrite the draft in \
             that voice. Keep the HTML structure and keywords.\n\nTitle: {}\nDraft HTML:\n{}\n\n\
             Return JSON: {{\"voice_profile\": {{\"tone\": string, \"reading_level\": string, \
             \"style_notes\": [string], \"signature_phrases\": [string]}}, \"title\": string, \
             \"html_content\": string, \"meta_description\": string, \"keywords\": [string]}}",
            context.brief(),
            draft.title,
            draft.html_content
        ),
    }
}

fn review(context: &CampaignContext, draft: &HumanizedDraft) -> PromptPair {
    PromptPair {
        system: "You are a meticulous editor doing a final SEO and quality review.".to_string(),
        user: format!(
            "{}\nTone: {}\n\nFix errors, tighten prose, and make sure the primary keywords ({}) \
             appear naturally. The meta description must be under 160 characters.\n\n\
             Title: {}\nHTML:\n{}\n\n\
             Return JSON: {{\"title\": string, \"html_content\": string, \
             \"meta_description\": string, \"keywords\": [string], \"review_notes\": [string]}}",
            context.brief(),
            draft.voice_profile.tone,
            draft.keywords.join(", "),
            draft.title,
            draft.html_content
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> CampaignContext {
        CampaignContext {
            website_url: "https://coldbrew.example".to_string(),
            brand_context: "Small-batch cold brew".to_string(),
            country: "US".to_string(),
            language: "en".to_string(),
            article_length: ArticleLength::Short,
            seed_keywords: vec!["cold brew".to_string()],
            target_articles: 2,
        }
    }

    #[test]
    fn keyword_prompt_mentions_seeds_and_shape() {
        let prompt = StageInput::KeywordResearch { context: context() }.prompt();
        assert!(prompt.user.contains("cold brew"));
        assert!(prompt.user.contains("\"keywords\""));
    }

    #[test]
    fn strategy_prompt_uses_length_and_target_count() {
        let keywords: KeywordSet =
            serde_json::from_str(r#"[{"keyword":"nitro coffee","priority":"high"}]"#).unwrap();
        let prompt = StageInput::ContentStrategy {
            context: context(),
            keywords,
        }
        .prompt();
        assert!(prompt.user.contains("Plan 2 article(s) of about 800 words"));
        assert!(prompt.user.contains("nitro coffee"));
    }

    #[test]
    fn stricter_prompt_appends_instruction() {
        let prompt = StageInput::KeywordResearch { context: context() }.prompt();
        let strict = prompt.stricter();
        assert_eq!(strict.system, prompt.system);
        assert!(strict.user.ends_with(STRICT_JSON_INSTRUCTION));
    }

    #[test]
    fn source_prompt_truncates_long_content() {
        let input = SourceAnalysisInput {
            keyword_context: "cold brew".to_string(),
            url: "https://example.com".to_string(),
            content: "x".repeat(50_000),
        };
        assert!(input.prompt().user.len() < 13_000);
    }
}
