//! Idempotent distribution of an article to one CMS, with the outcome kept
//! on the `(article, platform)` sync record.

use std::sync::Arc;

use quillcast_core::{Platform, SyncStatus};
use quillcast_db::{ArticleStore, IntegrationStore, SyncResult};
use uuid::Uuid;

use crate::error::PublishError;
use crate::publisher::{ArticlePost, PublishConfig, Publisher};
use crate::shopify::ShopifyClient;
use crate::wordpress::WordPressClient;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Already synced and no re-sync was requested; no remote call was made.
    AlreadySynced { external_id: String },
    Published { external_id: String, updated: bool },
    /// The CMS rejected the post. The record and article are `sync_error`;
    /// the article's content is unchanged.
    Failed { error: String },
}

impl SyncOutcome {
    #[must_use]
    pub fn external_id(&self) -> Option<&str> {
        match self {
            SyncOutcome::AlreadySynced { external_id }
            | SyncOutcome::Published { external_id, .. } => Some(external_id),
            SyncOutcome::Failed { .. } => None,
        }
    }
}

pub struct SyncAdapter {
    articles: Arc<dyn ArticleStore>,
    integrations: Arc<dyn IntegrationStore>,
    wordpress: Arc<dyn Publisher>,
    shopify: Arc<dyn Publisher>,
}

impl SyncAdapter {
    #[must_use]
    pub fn new(
        articles: Arc<dyn ArticleStore>,
        integrations: Arc<dyn IntegrationStore>,
        wordpress: Arc<dyn Publisher>,
        shopify: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            articles,
            integrations,
            wordpress,
            shopify,
        }
    }

    /// Adapter backed by the real WordPress and Shopify clients.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Http`] if an HTTP client cannot be built.
    pub fn with_config(
        articles: Arc<dyn ArticleStore>,
        integrations: Arc<dyn IntegrationStore>,
        config: PublishConfig,
    ) -> Result<Self, PublishError> {
        Ok(Self::new(
            articles,
            integrations,
            Arc::new(WordPressClient::new(config)?),
            Arc::new(ShopifyClient::new(config)?),
        ))
    }

    fn publisher(&self, platform: Platform) -> &dyn Publisher {
        match platform {
            Platform::Wordpress => self.wordpress.as_ref(),
            Platform::Shopify => self.shopify.as_ref(),
        }
    }

    /// Publish `article_id` for `brand_id` to `platform`.
    ///
    /// A record already `synced` is returned as-is unless `force` is set.
    /// Whenever a remote id is stored, the remote post is updated in place
    /// rather than created again.
    ///
    /// # Errors
    ///
    /// Returns a fatal [`PublishError`] when the article or integration is
    /// missing, the article has no keywords, or the store fails. Remote
    /// rejections are not errors; they come back as [`SyncOutcome::Failed`].
    pub async fn sync_article(
        &self,
        article_id: Uuid,
        brand_id: Uuid,
        platform: Platform,
        force: bool,
    ) -> Result<SyncOutcome, PublishError> {
        let article = self
            .articles
            .get_article(article_id)
            .await?
            .filter(|a| a.brand_id == brand_id)
            .ok_or(PublishError::ArticleNotFound(article_id))?;

        if article.keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(PublishError::MissingKeywords(article_id));
        }

        let record = self.articles.get_sync_record(article_id, platform).await?;
        let existing_id = record.as_ref().and_then(|r| r.external_id.clone());
        let already_synced = record
            .as_ref()
            .is_some_and(|r| r.status().is_ok_and(|s| s == SyncStatus::Synced));

        if already_synced && !force {
            if let Some(external_id) = existing_id {
                tracing::debug!(%article_id, %platform, %external_id, "already synced, skipping");
                return Ok(SyncOutcome::AlreadySynced { external_id });
            }
        }

        let integration = self
            .integrations
            .get_integration(brand_id, platform)
            .await?
            .ok_or(PublishError::IntegrationMissing { brand_id, platform })?;

        let post = ArticlePost::from(&article);
        let update_id = existing_id.as_deref();

        match self
            .publisher(platform)
            .publish(&integration, &post, update_id)
            .await
        {
            Ok(external_id) => {
                self.articles
                    .record_sync_result(
                        article_id,
                        platform,
                        &SyncResult::Synced {
                            external_id: external_id.clone(),
                        },
                    )
                    .await?;
                tracing::info!(%article_id, %platform, %external_id, "article published");
                Ok(SyncOutcome::Published {
                    external_id,
                    updated: update_id.is_some(),
                })
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                let error = match &e {
                    PublishError::Publish { body, .. } => body.clone(),
                    other => other.to_string(),
                };
                tracing::warn!(%article_id, %platform, error = %e, "article sync failed");
                self.articles
                    .record_sync_result(
                        article_id,
                        platform,
                        &SyncResult::Failed {
                            error: error.clone(),
                        },
                    )
                    .await?;
                Ok(SyncOutcome::Failed { error })
            }
        }
    }
}
