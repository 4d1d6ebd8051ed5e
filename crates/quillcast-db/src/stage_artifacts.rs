//! Database operations for `stage_artifacts`.
//!
//! The table is append-only: every run of a stage inserts the next version for
//! `(campaign_id, stage)` and rows are never updated or deleted.

use chrono::{DateTime, Utc};
use quillcast_core::{CoreError, Stage};
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `stage_artifacts` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StageArtifactRow {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub stage: String,
    pub version: i32,
    pub raw_response: String,
    /// Parsed stage payload. `None` on failed runs.
    pub payload: Option<serde_json::Value>,
    pub success: bool,
    pub model: String,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StageArtifactRow {
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidStage`] for an unknown stored value.
    pub fn stage(&self) -> Result<Stage, CoreError> {
        self.stage.parse()
    }
}

#[derive(Debug, Clone)]
pub struct NewStageArtifact {
    pub campaign_id: Uuid,
    pub stage: Stage,
    pub raw_response: String,
    pub payload: Option<serde_json::Value>,
    pub success: bool,
    pub model: String,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

const ARTIFACT_COLUMNS: &str = "id, campaign_id, stage, version, raw_response, payload, success, \
     model, error_kind, error_message, created_at";

// ---------------------------------------------------------------------------
// stage_artifacts operations
// ---------------------------------------------------------------------------

/// Append an artifact as version `max(version) + 1` for its stage.
///
/// The parent campaign row is locked for the duration of the transaction so
/// concurrent appends for the same campaign serialize instead of colliding on
/// the version unique key.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the campaign does not exist, or
/// [`DbError::Sqlx`] if any statement fails.
pub async fn insert_stage_artifact(
    pool: &PgPool,
    new: &NewStageArtifact,
) -> Result<StageArtifactRow, DbError> {
    let mut tx = pool.begin().await?;

    let locked: Option<Uuid> =
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM campaigns WHERE id = $1 FOR UPDATE")
            .bind(new.campaign_id)
            .fetch_optional(&mut *tx)
            .await?;
    if locked.is_none() {
        return Err(DbError::NotFound);
    }

    let row = sqlx::query_as::<_, StageArtifactRow>(&format!(
        "INSERT INTO stage_artifacts \
             (id, campaign_id, stage, version, raw_response, payload, success, model, \
              error_kind, error_message) \
         SELECT $1, $2, $3, COALESCE(MAX(version), 0) + 1, $4, $5, $6, $7, $8, $9 \
         FROM stage_artifacts WHERE campaign_id = $2 AND stage = $3 \
         RETURNING {ARTIFACT_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(new.campaign_id)
    .bind(new.stage.as_str())
    .bind(&new.raw_response)
    .bind(&new.payload)
    .bind(new.success)
    .bind(&new.model)
    .bind(new.error_kind.as_deref())
    .bind(new.error_message.as_deref())
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(row)
}

/// Highest-version successful artifact for one stage.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn latest_successful_artifact(
    pool: &PgPool,
    campaign_id: Uuid,
    stage: Stage,
) -> Result<Option<StageArtifactRow>, DbError> {
    let row = sqlx::query_as::<_, StageArtifactRow>(&format!(
        "SELECT {ARTIFACT_COLUMNS} FROM stage_artifacts \
         WHERE campaign_id = $1 AND stage = $2 AND success \
         ORDER BY version DESC \
         LIMIT 1"
    ))
    .bind(campaign_id)
    .bind(stage.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// Stages with at least one successful artifact, in pipeline order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or [`DbError::InvalidValue`]
/// if a stored stage name is unknown.
pub async fn successful_stages(pool: &PgPool, campaign_id: Uuid) -> Result<Vec<Stage>, DbError> {
    let names: Vec<String> = sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT stage FROM stage_artifacts WHERE campaign_id = $1 AND success",
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;

    let mut stages = names
        .iter()
        .map(|name| name.parse::<Stage>())
        .collect::<Result<Vec<_>, _>>()?;
    stages.sort();
    Ok(stages)
}

/// All artifacts for a campaign ordered by stage then version.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_stage_artifacts(
    pool: &PgPool,
    campaign_id: Uuid,
) -> Result<Vec<StageArtifactRow>, DbError> {
    let rows = sqlx::query_as::<_, StageArtifactRow>(&format!(
        "SELECT {ARTIFACT_COLUMNS} FROM stage_artifacts \
         WHERE campaign_id = $1 \
         ORDER BY created_at, version"
    ))
    .bind(campaign_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
