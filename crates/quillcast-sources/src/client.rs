//! HTTP client for the page-scraping service.
//!
//! `POST {base_url}/scrape` with `{url, formats: ["markdown"], onlyMainContent: true}`
//! returns `{success, data: {markdown, metadata: {title, description}}}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

const DEFAULT_BASE_URL: &str = "https://api.firecrawl.dev/v1";

/// Main content of one page, as markdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapedPage {
    pub url: String,
    pub markdown: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: [&'a str; 1],
    only_main_content: bool,
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    success: bool,
    #[serde(default)]
    data: Option<ScrapeData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScrapeData {
    #[serde(default)]
    markdown: Option<String>,
    #[serde(default)]
    metadata: Option<ScrapeMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct ScrapeMetadata {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Fetches one page's main content.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ScrapedPage, SourceError>;
}

pub struct ScrapeClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl ScrapeClient {
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(api_key: Option<&str>, timeout_secs: u64) -> Result<Self, SourceError> {
        Self::with_base_url(api_key, timeout_secs, DEFAULT_BASE_URL)
    }

    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn with_base_url(
        api_key: Option<&str>,
        timeout_secs: u64,
        base_url: &str,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("quillcast/0.1 (source-research)")
            .build()?;

        Ok(Self {
            client,
            api_key: api_key
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_owned),
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }
}

#[async_trait]
impl PageFetcher for ScrapeClient {
    async fn fetch(&self, url: &str) -> Result<ScrapedPage, SourceError> {
        let api_key = self.api_key.as_deref().ok_or(SourceError::MissingApiKey)?;
        let endpoint = format!("{}/scrape", self.base_url);

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(api_key)
            .json(&ScrapeRequest {
                url,
                formats: ["markdown"],
                only_main_content: true,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_owned(),
            });
        }

        let body = response.text().await?;
        let parsed: ScrapeResponse =
            serde_json::from_str(&body).map_err(|e| SourceError::Deserialize {
                context: format!("scrape({url})"),
                source: e,
            })?;

        if !parsed.success {
            return Err(SourceError::ScrapeFailed {
                url: url.to_owned(),
                reason: parsed
                    .error
                    .unwrap_or_else(|| "scraper reported failure".to_string()),
            });
        }

        let data = parsed.data.ok_or_else(|| SourceError::ScrapeFailed {
            url: url.to_owned(),
            reason: "response had no data".to_string(),
        })?;
        let metadata = data.metadata.unwrap_or_default();

        Ok(ScrapedPage {
            url: url.to_owned(),
            markdown: data.markdown.unwrap_or_default(),
            title: metadata.title.filter(|t| !t.trim().is_empty()),
            description: metadata.description.filter(|d| !d.trim().is_empty()),
        })
    }
}
