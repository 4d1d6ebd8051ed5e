use std::time::Duration;

use async_trait::async_trait;
use quillcast_db::{ArticleRow, IntegrationRow};
use reqwest::Client;

use crate::error::PublishError;

/// Timeout and retry policy shared by the CMS clients.
#[derive(Debug, Clone, Copy)]
pub struct PublishConfig {
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 2,
            backoff_base_ms: 1_000,
        }
    }
}

/// The article fields a CMS receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticlePost {
    pub title: String,
    pub html_content: String,
    pub meta_description: String,
    pub keywords: Vec<String>,
}

impl From<&ArticleRow> for ArticlePost {
    fn from(row: &ArticleRow) -> Self {
        Self {
            title: row.title.clone(),
            html_content: row.html_content.clone(),
            meta_description: row.meta_description.clone(),
            keywords: row.keywords.clone(),
        }
    }
}

/// One CMS. Creates the post when `existing_id` is `None`, otherwise updates
/// it; returns the remote id either way.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        integration: &IntegrationRow,
        post: &ArticlePost,
        existing_id: Option<&str>,
    ) -> Result<String, PublishError>;
}

pub(crate) fn build_http_client(
    config: &PublishConfig,
    user_agent: &str,
) -> Result<Client, PublishError> {
    Ok(Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(user_agent)
        .build()?)
}

/// `https://` is assumed when the stored URL has no scheme.
pub(crate) fn normalize_base_url(raw: &str) -> Result<String, PublishError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(PublishError::InvalidIntegration(
            "integration has no site URL".to_string(),
        ));
    }
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("https://{trimmed}"))
    }
}
