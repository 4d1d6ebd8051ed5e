use axum::{
    extract::{Query, State},
    Extension, Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::middleware::RequestId;

use super::{ApiError, ApiResponse, AppState};

#[derive(Debug, Deserialize)]
pub(super) struct BalanceQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub(super) struct BalanceItem {
    user_id: Uuid,
    balance: Decimal,
}

/// GET /api/v1/balance?user_id=
pub(super) async fn get_balance(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<ApiResponse<BalanceItem>>, ApiError> {
    let balance = state.gate().balance(query.user_id).await.map_err(|e| {
        tracing::error!(error = %e, user_id = %query.user_id, "balance lookup failed");
        ApiError::new(req_id.0.clone(), "internal_error", "balance lookup failed")
    })?;

    Ok(Json(ApiResponse::new(
        req_id.0,
        BalanceItem {
            user_id: query.user_id,
            balance,
        },
    )))
}
