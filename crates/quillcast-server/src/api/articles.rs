use axum::{
    extract::{Path, State},
    Extension, Json,
};
use quillcast_core::Platform;
use quillcast_publish::SyncOutcome;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{map_publish_error, ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct SyncArticleRequest {
    pub platform: String,
    pub brand_id: Uuid,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub(super) struct SyncItem {
    article_id: Uuid,
    platform: Platform,
    /// `already_synced` or `published`.
    status: &'static str,
    external_id: String,
    updated: bool,
}

/// POST /api/v1/articles/{id}/sync
///
/// A CMS rejection is recorded on the article and answered with 502.
pub(super) async fn sync_article(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(article_id): Path<Uuid>,
    Json(body): Json<SyncArticleRequest>,
) -> Result<Json<ApiResponse<SyncItem>>, ApiError> {
    let rid = req_id.0;
    let platform: Platform = body.platform.parse().map_err(|_| {
        ApiError::new(
            rid.clone(),
            "validation_error",
            format!(
                "platform must be 'wordpress' or 'shopify', got '{}'",
                body.platform
            ),
        )
    })?;

    let outcome = state
        .sync
        .sync_article(article_id, body.brand_id, platform, body.force)
        .await
        .map_err(|e| map_publish_error(rid.clone(), &e))?;

    let (status, external_id, updated) = match outcome {
        SyncOutcome::AlreadySynced { external_id } => ("already_synced", external_id, false),
        SyncOutcome::Published {
            external_id,
            updated,
        } => ("published", external_id, updated),
        SyncOutcome::Failed { error } => {
            return Err(ApiError::new(
                rid,
                "upstream_error",
                format!("{platform} rejected the article: {error}"),
            ));
        }
    };

    Ok(Json(ApiResponse::new(
        rid,
        SyncItem {
            article_id,
            platform,
            status,
            external_id,
            updated,
        },
    )))
}
