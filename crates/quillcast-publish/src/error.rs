use quillcast_core::Platform;
use quillcast_db::DbError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("no {platform} integration configured for brand {brand_id}")]
    IntegrationMissing { brand_id: Uuid, platform: Platform },

    #[error("article {0} not found")]
    ArticleNotFound(Uuid),

    #[error("article {0} has no keywords; refusing to publish")]
    MissingKeywords(Uuid),

    #[error("invalid integration: {0}")]
    InvalidIntegration(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{platform} rate limited the request")]
    RateLimited { platform: Platform },

    /// Non-2xx from the CMS; `body` is kept verbatim for the sync record.
    #[error("{platform} returned {status}: {body}")]
    Publish {
        platform: Platform,
        status: u16,
        body: String,
    },

    #[error("could not resolve Shopify blog: {0}")]
    BlogResolution(String),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] DbError),
}

impl PublishError {
    /// Errors that end the sync attempt without touching the sync record.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PublishError::IntegrationMissing { .. }
                | PublishError::ArticleNotFound(_)
                | PublishError::MissingKeywords(_)
                | PublishError::InvalidIntegration(_)
                | PublishError::Store(_)
        )
    }
}
