//! Database operations for `campaign_sources`.

use chrono::{DateTime, Utc};
use quillcast_core::{CoreError, SourceStatus};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

/// A row from the `campaign_sources` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SourceRow {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: String,
    pub content_excerpt: Option<String>,
    pub insights: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SourceRow {
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSourceStatus`] for an unknown stored value.
    pub fn status(&self) -> Result<SourceStatus, CoreError> {
        self.status.parse()
    }
}

#[derive(Debug, Clone)]
pub struct NewSource {
    pub campaign_id: Uuid,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: SourceStatus,
    pub content_excerpt: Option<String>,
    pub insights: Option<serde_json::Value>,
    pub error: Option<String>,
}

const SOURCE_COLUMNS: &str = "id, campaign_id, url, title, description, status, content_excerpt, \
     insights, error, created_at, updated_at";

/// Upsert a source on `(campaign_id, url)`. A re-run of source discovery
/// overwrites the previous fetch outcome for the same URL.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_source(pool: &PgPool, new: &NewSource) -> Result<SourceRow, DbError> {
    let row = sqlx::query_as::<_, SourceRow>(&format!(
        "INSERT INTO campaign_sources \
             (id, campaign_id, url, title, description, status, content_excerpt, insights, error) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
         ON CONFLICT (campaign_id, url) DO UPDATE SET \
             title           = EXCLUDED.title, \
             description     = EXCLUDED.description, \
             status          = EXCLUDED.status, \
             content_excerpt = EXCLUDED.content_excerpt, \
             insights        = EXCLUDED.insights, \
             error           = EXCLUDED.error, \
             updated_at      = NOW() \
         RETURNING {SOURCE_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(new.campaign_id)
    .bind(&new.url)
    .bind(new.title.as_deref())
    .bind(new.description.as_deref())
    .bind(new.status.as_str())
    .bind(new.content_excerpt.as_deref())
    .bind(&new.insights)
    .bind(new.error.as_deref())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// All sources for a campaign in insertion order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_sources(pool: &PgPool, campaign_id: Uuid) -> Result<Vec<SourceRow>, DbError> {
    let rows = sqlx::query_as::<_, SourceRow>(&format!(
        "SELECT {SOURCE_COLUMNS} FROM campaign_sources \
         WHERE campaign_id = $1 \
         ORDER BY created_at, url"
    ))
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
