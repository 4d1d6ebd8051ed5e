//! Database operations for `cms_integrations`.

use chrono::{DateTime, Utc};
use quillcast_core::{CoreError, Platform};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A brand's connection to one CMS.
///
/// For WordPress, `username` is the account name and `secret` the application
/// password. For Shopify, `base_url` is the shop URL, `secret` the Admin API
/// access token, and `blog_id` an optional pinned blog.
#[derive(Clone, sqlx::FromRow)]
pub struct IntegrationRow {
    pub id: Uuid,
    pub brand_id: Uuid,
    pub platform: String,
    pub base_url: String,
    pub username: Option<String>,
    pub secret: String,
    pub blog_id: Option<String>,
    /// Remote status applied on publish, e.g. `publish` or `draft`.
    pub publish_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IntegrationRow {
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPlatform`] for an unknown stored value.
    pub fn platform(&self) -> Result<Platform, CoreError> {
        self.platform.parse()
    }
}

impl std::fmt::Debug for IntegrationRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrationRow")
            .field("id", &self.id)
            .field("brand_id", &self.brand_id)
            .field("platform", &self.platform)
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("secret", &"[redacted]")
            .field("blog_id", &self.blog_id)
            .field("publish_status", &self.publish_status)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct NewIntegration {
    pub brand_id: Uuid,
    pub platform: Platform,
    pub base_url: String,
    pub username: Option<String>,
    pub secret: String,
    pub blog_id: Option<String>,
    pub publish_status: String,
}

impl std::fmt::Debug for NewIntegration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewIntegration")
            .field("brand_id", &self.brand_id)
            .field("platform", &self.platform)
            .field("base_url", &self.base_url)
            .field("secret", &"[redacted]")
            .finish_non_exhaustive()
    }
}

const INTEGRATION_COLUMNS: &str = "id, brand_id, platform, base_url, username, secret, blog_id, \
     publish_status, created_at, updated_at";

/// Insert or replace the integration for `(brand_id, platform)`.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_integration(
    pool: &PgPool,
    new: &NewIntegration,
) -> Result<IntegrationRow, DbError> {
    let row = sqlx::query_as::<_, IntegrationRow>(&format!(
        "INSERT INTO cms_integrations \
             (id, brand_id, platform, base_url, username, secret, blog_id, publish_status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         ON CONFLICT (brand_id, platform) DO UPDATE SET \
             base_url       = EXCLUDED.base_url, \
             username       = EXCLUDED.username, \
             secret         = EXCLUDED.secret, \
             blog_id        = EXCLUDED.blog_id, \
             publish_status = EXCLUDED.publish_status, \
             updated_at     = NOW() \
         RETURNING {INTEGRATION_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(new.brand_id)
    .bind(new.platform.as_str())
    .bind(&new.base_url)
    .bind(new.username.as_deref())
    .bind(&new.secret)
    .bind(new.blog_id.as_deref())
    .bind(&new.publish_status)
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_integration(
    pool: &PgPool,
    brand_id: Uuid,
    platform: Platform,
) -> Result<Option<IntegrationRow>, DbError> {
    let row = sqlx::query_as::<_, IntegrationRow>(&format!(
        "SELECT {INTEGRATION_COLUMNS} FROM cms_integrations \
         WHERE brand_id = $1 AND platform = $2"
    ))
    .bind(brand_id)
    .bind(platform.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
