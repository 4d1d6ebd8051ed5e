//! Campaign handlers: setup, listing, detail, and stage control.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use quillcast_core::Stage;
use quillcast_db::{CampaignRow, SourceRow, StageArtifactRow};
use quillcast_pipeline::{QuickSetup, RunOutcome, StageReport, StageResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{
    map_db_error, map_pipeline_error, normalize_limit, ApiError, ApiResponse, AppState,
};

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(super) struct CampaignListQuery {
    pub user_id: Uuid,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct RunStageQuery {
    #[serde(default)]
    pub rerun: bool,
}

#[derive(Debug, Deserialize)]
pub(super) struct FailCampaignRequest {
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(super) struct CampaignItem {
    id: Uuid,
    user_id: Uuid,
    brand_id: Uuid,
    website_url: String,
    country: String,
    language: String,
    keywords: Vec<String>,
    target_articles: i32,
    article_length: String,
    status: String,
    current_step: Option<String>,
    progress: i16,
    error_message: Option<String>,
    can_resume: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CampaignRow> for CampaignItem {
    fn from(row: CampaignRow) -> Self {
        let can_resume = row.status().is_ok_and(|s| s.can_resume());
        Self {
            id: row.id,
            user_id: row.user_id,
            brand_id: row.brand_id,
            website_url: row.website_url,
            country: row.country,
            language: row.language,
            keywords: row.keywords,
            target_articles: row.target_articles,
            article_length: row.article_length,
            status: row.status,
            current_step: row.current_step,
            progress: row.progress,
            error_message: row.error_message,
            can_resume,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Artifact metadata. Raw responses and payloads stay out of the API.
#[derive(Debug, Serialize)]
pub(super) struct ArtifactSummary {
    stage: String,
    version: i32,
    success: bool,
    model: String,
    error_kind: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<StageArtifactRow> for ArtifactSummary {
    fn from(row: StageArtifactRow) -> Self {
        Self {
            stage: row.stage,
            version: row.version,
            success: row.success,
            model: row.model,
            error_kind: row.error_kind,
            error_message: row.error_message,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct SourceItem {
    url: String,
    title: Option<String>,
    status: String,
    error: Option<String>,
    insights: Option<serde_json::Value>,
}

impl From<SourceRow> for SourceItem {
    fn from(row: SourceRow) -> Self {
        Self {
            url: row.url,
            title: row.title,
            status: row.status,
            error: row.error,
            insights: row.insights,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct CampaignDetail {
    #[serde(flatten)]
    campaign: CampaignItem,
    artifacts: Vec<ArtifactSummary>,
    sources: Vec<SourceItem>,
}

#[derive(Debug, Serialize)]
pub(super) struct StageRunItem {
    stage: Option<Stage>,
    /// `succeeded`, `failed`, or `completed` when nothing was left to run.
    outcome: &'static str,
    version: Option<i32>,
    article_id: Option<Uuid>,
    error_kind: Option<String>,
    error_message: Option<String>,
    campaign: CampaignItem,
}

impl From<StageReport> for StageRunItem {
    fn from(report: StageReport) -> Self {
        let campaign = CampaignItem::from(report.campaign);
        match report.result {
            StageResult::Succeeded {
                version,
                article_id,
            } => Self {
                stage: Some(report.stage),
                outcome: "succeeded",
                version: Some(version),
                article_id,
                error_kind: None,
                error_message: None,
                campaign,
            },
            StageResult::Failed { kind, message } => Self {
                stage: Some(report.stage),
                outcome: "failed",
                version: None,
                article_id: None,
                error_kind: Some(kind),
                error_message: Some(message),
                campaign,
            },
        }
    }
}

impl From<RunOutcome> for StageRunItem {
    fn from(outcome: RunOutcome) -> Self {
        match outcome {
            RunOutcome::Ran(report) => report.into(),
            RunOutcome::Completed(row) => Self {
                stage: None,
                outcome: "completed",
                version: None,
                article_id: None,
                error_kind: None,
                error_message: None,
                campaign: row.into(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/campaigns?user_id=&limit=
pub(super) async fn list_campaigns(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<CampaignListQuery>,
) -> Result<Json<ApiResponse<Vec<CampaignItem>>>, ApiError> {
    let rows = state
        .campaigns
        .list_campaigns(query.user_id, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    let data = rows.into_iter().map(CampaignItem::from).collect();
    Ok(Json(ApiResponse::new(req_id.0, data)))
}

/// POST /api/v1/campaigns
pub(super) async fn create_campaign(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<QuickSetup>,
) -> Result<(StatusCode, Json<ApiResponse<CampaignItem>>), ApiError> {
    let row = state
        .orchestrator
        .create_campaign(&body)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::new(req_id.0, row.into())),
    ))
}

/// GET /api/v1/campaigns/{id}
pub(super) async fn get_campaign(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CampaignDetail>>, ApiError> {
    let rid = &req_id.0;
    let row = state
        .orchestrator
        .campaign(id)
        .await
        .map_err(|e| map_pipeline_error(rid.clone(), &e))?;
    let artifacts = state
        .campaigns
        .list_artifacts(id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;
    let sources = state
        .campaigns
        .list_sources(id)
        .await
        .map_err(|e| map_db_error(rid.clone(), &e))?;

    let detail = CampaignDetail {
        campaign: row.into(),
        artifacts: artifacts.into_iter().map(ArtifactSummary::from).collect(),
        sources: sources.into_iter().map(SourceItem::from).collect(),
    };
    Ok(Json(ApiResponse::new(req_id.0, detail)))
}

/// DELETE /api/v1/campaigns/{id}: soft archive.
pub(super) async fn archive_campaign(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .campaigns
        .archive_campaign(id)
        .await
        .map_err(|e| map_db_error(req_id.0, &e))?;
    tracing::info!(campaign_id = %id, "campaign archived");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/campaigns/{id}/resume
pub(super) async fn resume_campaign(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<StageRunItem>>, ApiError> {
    let outcome = state
        .orchestrator
        .resume(id)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(req_id.0, outcome.into())))
}

/// POST /api/v1/campaigns/{id}/fail
pub(super) async fn fail_campaign(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<Uuid>,
    Json(body): Json<FailCampaignRequest>,
) -> Result<Json<ApiResponse<CampaignItem>>, ApiError> {
    let row = state
        .orchestrator
        .mark_failed(id, &body.reason)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(req_id.0, row.into())))
}

/// POST /api/v1/campaigns/{id}/stages/{stage}?rerun=
pub(super) async fn run_stage(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path((id, stage)): Path<(Uuid, String)>,
    Query(query): Query<RunStageQuery>,
) -> Result<Json<ApiResponse<StageRunItem>>, ApiError> {
    let stage: Stage = stage.parse().map_err(|_| {
        ApiError::new(
            req_id.0.clone(),
            "validation_error",
            format!("unknown stage '{stage}'"),
        )
    })?;

    let report = state
        .orchestrator
        .run_stage(id, stage, query.rerun)
        .await
        .map_err(|e| map_pipeline_error(req_id.0.clone(), &e))?;
    Ok(Json(ApiResponse::new(req_id.0, report.into())))
}
