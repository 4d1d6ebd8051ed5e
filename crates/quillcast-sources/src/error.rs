use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("scraper API key is not configured")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unexpected HTTP status {status} scraping {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// The scraper answered 2xx but reported the page as not scraped.
    #[error("scrape of {url} failed: {reason}")]
    ScrapeFailed { url: String, reason: String },

    #[error("source analysis failed: {0}")]
    Analysis(String),
}
