//! Database operations for `campaigns`.

use chrono::{DateTime, Utc};
use quillcast_core::{ArticleLength, CampaignStatus, CoreError, Stage};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `campaigns` table.
///
/// `status`, `current_step` and `article_length` are stored as text; use the
/// typed accessors to read them.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CampaignRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub brand_id: Uuid,
    pub website_url: String,
    pub brand_context: String,
    pub country: String,
    pub language: String,
    pub keywords: Vec<String>,
    pub target_articles: i32,
    pub article_length: String,
    pub status: String,
    /// Stage being worked on or last attempted. `None` once completed.
    pub current_step: Option<String>,
    pub progress: i16,
    pub error_message: Option<String>,
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CampaignRow {
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidCampaignStatus`] for an unknown stored value.
    pub fn status(&self) -> Result<CampaignStatus, CoreError> {
        self.status.parse()
    }

    /// # Errors
    ///
    /// Returns [`CoreError::InvalidStage`] for an unknown stored value.
    pub fn current_stage(&self) -> Result<Option<Stage>, CoreError> {
        self.current_step.as_deref().map(str::parse).transpose()
    }

    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArticleLength`] for an unknown stored value.
    pub fn article_length(&self) -> Result<ArticleLength, CoreError> {
        self.article_length.parse()
    }
}

/// Input for [`insert_campaign`]. New campaigns always start at
/// `keyword_research` with zero progress.
#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub user_id: Uuid,
    pub brand_id: Uuid,
    pub website_url: String,
    pub brand_context: String,
    pub country: String,
    pub language: String,
    pub keywords: Vec<String>,
    pub target_articles: i32,
    pub article_length: ArticleLength,
}

/// Full replacement of the mutable state columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignUpdate {
    pub status: CampaignStatus,
    pub current_step: Option<Stage>,
    pub progress: i16,
    pub error_message: Option<String>,
}

const CAMPAIGN_COLUMNS: &str = "id, user_id, brand_id, website_url, brand_context, country, \
     language, keywords, target_articles, article_length, status, current_step, progress, \
     error_message, archived_at, created_at, updated_at";

// ---------------------------------------------------------------------------
// campaigns operations
// ---------------------------------------------------------------------------

/// Inserts a campaign at `keyword_research`, progress 0.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including CHECK violations).
pub async fn insert_campaign(pool: &PgPool, new: &NewCampaign) -> Result<CampaignRow, DbError> {
    let row = sqlx::query_as::<_, CampaignRow>(&format!(
        "INSERT INTO campaigns \
             (id, user_id, brand_id, website_url, brand_context, country, language, \
              keywords, target_articles, article_length, status, current_step, progress) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11, 0) \
         RETURNING {CAMPAIGN_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(new.user_id)
    .bind(new.brand_id)
    .bind(&new.website_url)
    .bind(&new.brand_context)
    .bind(&new.country)
    .bind(&new.language)
    .bind(&new.keywords)
    .bind(new.target_articles)
    .bind(new.article_length.as_str())
    .bind(Stage::KeywordResearch.as_str())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Fetch a campaign by id, including archived ones.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn get_campaign(pool: &PgPool, id: Uuid) -> Result<Option<CampaignRow>, DbError> {
    let row = sqlx::query_as::<_, CampaignRow>(&format!(
        "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Non-archived campaigns for a user, newest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_campaigns_for_user(
    pool: &PgPool,
    user_id: Uuid,
    limit: i64,
) -> Result<Vec<CampaignRow>, DbError> {
    let rows = sqlx::query_as::<_, CampaignRow>(&format!(
        "SELECT {CAMPAIGN_COLUMNS} FROM campaigns \
         WHERE user_id = $1 AND archived_at IS NULL \
         ORDER BY created_at DESC \
         LIMIT $2"
    ))
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Overwrite status, current step, progress, and error message.
///
/// Transition legality is enforced by the caller; the table CHECKs only the
/// failed-has-error and full-progress-is-completed invariants.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no campaign has this id, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn update_campaign_state(
    pool: &PgPool,
    id: Uuid,
    update: &CampaignUpdate,
) -> Result<CampaignRow, DbError> {
    let row = sqlx::query_as::<_, CampaignRow>(&format!(
        "UPDATE campaigns SET \
             status        = $2, \
             current_step  = $3, \
             progress      = $4, \
             error_message = $5, \
             updated_at    = NOW() \
         WHERE id = $1 \
         RETURNING {CAMPAIGN_COLUMNS}"
    ))
    .bind(id)
    .bind(update.status.as_str())
    .bind(update.current_step.map(Stage::as_str))
    .bind(update.progress)
    .bind(update.error_message.as_deref())
    .fetch_optional(pool)
    .await?;

    row.ok_or(DbError::NotFound)
}

/// Apply `update` only while the campaign is still in `expected` status.
///
/// Returns `Ok(None)` when the stored status has moved on, e.g. an operator
/// failed the campaign while a stage was running.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no campaign has this id, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn transition_campaign_state(
    pool: &PgPool,
    id: Uuid,
    expected: CampaignStatus,
    update: &CampaignUpdate,
) -> Result<Option<CampaignRow>, DbError> {
    let row = sqlx::query_as::<_, CampaignRow>(&format!(
        "UPDATE campaigns SET \
             status        = $2, \
             current_step  = $3, \
             progress      = $4, \
             error_message = $5, \
             updated_at    = NOW() \
         WHERE id = $1 AND status = $6 \
         RETURNING {CAMPAIGN_COLUMNS}"
    ))
    .bind(id)
    .bind(update.status.as_str())
    .bind(update.current_step.map(Stage::as_str))
    .bind(update.progress)
    .bind(update.error_message.as_deref())
    .bind(expected.as_str())
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(row)),
        None if get_campaign(pool, id).await?.is_some() => Ok(None),
        None => Err(DbError::NotFound),
    }
}

/// Soft-archive a campaign. Campaigns are never hard-deleted.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no campaign has this id, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn archive_campaign(pool: &PgPool, id: Uuid) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE campaigns SET archived_at = COALESCE(archived_at, NOW()), updated_at = NOW() \
         WHERE id = $1",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}
