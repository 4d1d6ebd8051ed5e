//! Quick-setup input for new campaigns.

use quillcast_core::ArticleLength;
use quillcast_db::NewCampaign;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::PipelineError;

const MAX_TARGET_ARTICLES: u32 = 50;
const MAX_KEYWORDS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuickSetup {
    pub user_id: Uuid,
    pub brand_id: Uuid,
    pub website_url: String,
    #[serde(default)]
    pub brand_context: String,
    pub country: String,
    pub language: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default = "default_target_articles")]
    pub target_articles: u32,
    #[serde(default = "default_article_length")]
    pub article_length: ArticleLength,
}

fn default_target_articles() -> u32 {
    1
}

fn default_article_length() -> ArticleLength {
    ArticleLength::Medium
}

impl QuickSetup {
    /// Trim and check the input, producing the row to insert.
    ///
    /// Keywords are trimmed, blank ones dropped, and repeats removed
    /// case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Validation`] describing the first bad field.
    pub fn validate(&self) -> Result<NewCampaign, PipelineError> {
        let website_url = self.website_url.trim();
        let has_host = website_url
            .strip_prefix("https://")
            .or_else(|| website_url.strip_prefix("http://"))
            .is_some_and(|rest| !rest.is_empty() && !rest.starts_with('/'));
        if !has_host {
            return Err(PipelineError::Validation(
                "website_url must be an absolute http(s) URL".to_string(),
            ));
        }

        let country = required("country", &self.country)?;
        let language = required("language", &self.language)?;

        if self.target_articles == 0 || self.target_articles > MAX_TARGET_ARTICLES {
            return Err(PipelineError::Validation(format!(
                "target_articles must be between 1 and {MAX_TARGET_ARTICLES}"
            )));
        }

        let mut keywords: Vec<String> = Vec::new();
        for keyword in self.keywords.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
            if !keywords.iter().any(|k| k.eq_ignore_ascii_case(keyword)) {
                keywords.push(keyword.to_string());
            }
        }
        if keywords.len() > MAX_KEYWORDS {
            return Err(PipelineError::Validation(format!(
                "at most {MAX_KEYWORDS} keywords are allowed"
            )));
        }

        Ok(NewCampaign {
            user_id: self.user_id,
            brand_id: self.brand_id,
            website_url: website_url.to_string(),
            brand_context: self.brand_context.trim().to_string(),
            country,
            language,
            keywords,
            target_articles: i32::try_from(self.target_articles).unwrap_or(1),
            article_length: self.article_length,
        })
    }
}

fn required(field: &str, value: &str) -> Result<String, PipelineError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(PipelineError::Validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> QuickSetup {
        QuickSetup {
            user_id: Uuid::new_v4(),
            brand_id: Uuid::new_v4(),
            website_url: " https://brew.example ".to_string(),
            brand_context: "Small-batch coffee roaster".to_string(),
            country: "US".to_string(),
            language: "en".to_string(),
            keywords: vec![
                "cold brew".to_string(),
                "  ".to_string(),
                "Cold Brew".to_string(),
                "pour over".to_string(),
            ],
            target_articles: 3,
            article_length: ArticleLength::Long,
        }
    }

    #[test]
    fn normalizes_keywords_and_url() {
        let new = setup().validate().unwrap();
        assert_eq!(new.website_url, "https://brew.example");
        assert_eq!(new.keywords, vec!["cold brew", "pour over"]);
        assert_eq!(new.target_articles, 3);
    }

    #[test]
    fn rejects_relative_url() {
        let mut bad = setup();
        bad.website_url = "brew.example".to_string();
        assert!(matches!(bad.validate(), Err(PipelineError::Validation(_))));
    }

    #[test]
    fn rejects_zero_target_articles() {
        let mut bad = setup();
        bad.target_articles = 0;
        assert!(matches!(bad.validate(), Err(PipelineError::Validation(_))));
    }

    #[test]
    fn rejects_blank_language() {
        let mut bad = setup();
        bad.language = " ".to_string();
        let err = bad.validate().unwrap_err();
        assert!(err.to_string().contains("language"));
    }

    #[test]
    fn defaults_apply_when_deserializing() {
        let json = serde_json::json!({
            "user_id": Uuid::nil(),
            "brand_id": Uuid::nil(),
            "website_url": "https://brew.example",
            "country": "US",
            "language": "en"
        });
        let parsed: QuickSetup = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.target_articles, 1);
        assert_eq!(parsed.article_length, ArticleLength::Medium);
    }
}
