//! Database operations for `articles` and `cms_sync_records`.

use chrono::{DateTime, Utc};
use quillcast_core::{truncate_meta_description, ArticleStatus, CoreError, Platform, SyncStatus};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `articles` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ArticleRow {
    pub id: Uuid,
    pub brand_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub title: String,
    pub html_content: String,
    pub meta_description: String,
    pub keywords: Vec<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ArticleRow {
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArticleStatus`] for an unknown stored value.
    pub fn status(&self) -> Result<ArticleStatus, CoreError> {
        self.status.parse()
    }
}

/// Input for [`insert_article`]. Built through [`NewArticle::new`] so the
/// meta description is always clamped before it reaches the table.
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub brand_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub title: String,
    pub html_content: String,
    pub meta_description: String,
    pub keywords: Vec<String>,
}

impl NewArticle {
    #[must_use]
    pub fn new(
        brand_id: Uuid,
        campaign_id: Option<Uuid>,
        title: impl Into<String>,
        html_content: impl Into<String>,
        meta_description: &str,
        keywords: Vec<String>,
    ) -> Self {
        Self {
            brand_id,
            campaign_id,
            title: title.into(),
            html_content: html_content.into(),
            meta_description: truncate_meta_description(meta_description),
            keywords,
        }
    }
}

/// A row from the `cms_sync_records` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SyncRecordRow {
    pub id: Uuid,
    pub article_id: Uuid,
    pub platform: String,
    pub status: String,
    /// Remote post/article id. Always present when `status = 'synced'`.
    pub external_id: Option<String>,
    /// Raw upstream body or error text from the last failed attempt.
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncRecordRow {
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidSyncStatus`] for an unknown stored value.
    pub fn status(&self) -> Result<SyncStatus, CoreError> {
        self.status.parse()
    }

    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPlatform`] for an unknown stored value.
    pub fn platform(&self) -> Result<Platform, CoreError> {
        self.platform.parse()
    }
}

/// Outcome of one publish attempt, written by [`record_sync_result`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncResult {
    Synced { external_id: String },
    Failed { error: String },
}

const ARTICLE_COLUMNS: &str = "id, brand_id, campaign_id, title, html_content, meta_description, \
     keywords, status, created_at, updated_at";

const SYNC_COLUMNS: &str = "id, article_id, platform, status, external_id, last_error, \
     last_attempt_at, created_at, updated_at";

// ---------------------------------------------------------------------------
// articles operations
// ---------------------------------------------------------------------------

/// Insert a draft article.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn insert_article(pool: &PgPool, new: &NewArticle) -> Result<ArticleRow, DbError> {
    let row = sqlx::query_as::<_, ArticleRow>(&format!(
        "INSERT INTO articles \
             (id, brand_id, campaign_id, title, html_content, meta_description, keywords, status) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING {ARTICLE_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(new.brand_id)
    .bind(new.campaign_id)
    .bind(&new.title)
    .bind(&new.html_content)
    .bind(&new.meta_description)
    .bind(&new.keywords)
    .bind(ArticleStatus::Draft.as_str())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_article(pool: &PgPool, id: Uuid) -> Result<Option<ArticleRow>, DbError> {
    let row = sqlx::query_as::<_, ArticleRow>(&format!(
        "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

// ---------------------------------------------------------------------------
// cms_sync_records operations
// ---------------------------------------------------------------------------

/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_sync_record(
    pool: &PgPool,
    article_id: Uuid,
    platform: Platform,
) -> Result<Option<SyncRecordRow>, DbError> {
    let row = sqlx::query_as::<_, SyncRecordRow>(&format!(
        "SELECT {SYNC_COLUMNS} FROM cms_sync_records WHERE article_id = $1 AND platform = $2"
    ))
    .bind(article_id)
    .bind(platform.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Record a publish attempt and move the article status in one transaction.
///
/// Success marks the record `synced` with the remote id and the article
/// `published`. Failure marks both `sync_error`; a previously stored external
/// id is kept so a later forced re-sync can still target the remote post.
/// Article content is never touched.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the article does not exist, or
/// [`DbError::Sqlx`] if any statement fails.
pub async fn record_sync_result(
    pool: &PgPool,
    article_id: Uuid,
    platform: Platform,
    result: &SyncResult,
) -> Result<SyncRecordRow, DbError> {
    let (sync_status, article_status, external_id, last_error) = match result {
        SyncResult::Synced { external_id } => (
            SyncStatus::Synced,
            ArticleStatus::Published,
            Some(external_id.as_str()),
            None,
        ),
        SyncResult::Failed { error } => (
            SyncStatus::SyncError,
            ArticleStatus::SyncError,
            None,
            Some(error.as_str()),
        ),
    };

    let mut tx = pool.begin().await?;

    let updated = sqlx::query("UPDATE articles SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(article_id)
        .bind(article_status.as_str())
        .execute(&mut *tx)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }

    let row = sqlx::query_as::<_, SyncRecordRow>(&format!(
        "INSERT INTO cms_sync_records \
             (id, article_id, platform, status, external_id, last_error, last_attempt_at) \
         VALUES ($1, $2, $3, $4, $5, $6, NOW()) \
         ON CONFLICT (article_id, platform) DO UPDATE SET \
             status          = EXCLUDED.status, \
             external_id     = COALESCE(EXCLUDED.external_id, cms_sync_records.external_id), \
             last_error      = EXCLUDED.last_error, \
             last_attempt_at = EXCLUDED.last_attempt_at, \
             updated_at      = NOW() \
         RETURNING {SYNC_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(article_id)
    .bind(platform.as_str())
    .bind(sync_status.as_str())
    .bind(external_id)
    .bind(last_error)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row)
}
