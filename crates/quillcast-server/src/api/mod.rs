mod articles;
mod balance;
mod campaigns;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use quillcast_billing::QuotaGate;
use quillcast_db::{CampaignStore, DbError};
use quillcast_pipeline::{Orchestrator, PipelineError};
use quillcast_publish::{PublishError, SyncAdapter};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{
    enforce_rate_limit, request_id, require_bearer_auth, AuthState, RateLimitState, RequestId,
};

#[derive(Clone)]
pub struct AppState {
    pub campaigns: Arc<dyn CampaignStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub sync: Arc<SyncAdapter>,
    /// `None` when running on the in-memory store.
    pub pool: Option<PgPool>,
}

impl AppState {
    fn gate(&self) -> &QuotaGate {
        self.orchestrator.gate()
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: ErrorBody,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(crate) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
        }
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub(crate) fn new(request_id: String, data: T) -> Self {
        Self {
            data,
            meta: ResponseMeta::new(request_id),
        }
    }
}

impl ApiError {
    pub fn new(
        request_id: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.error.code.as_str() {
            "not_found" => StatusCode::NOT_FOUND,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "insufficient_balance" => StatusCode::PAYMENT_REQUIRED,
            "conflict" => StatusCode::CONFLICT,
            "rate_limited" => StatusCode::TOO_MANY_REQUESTS,
            "upstream_error" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(crate) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(crate) fn map_db_error(request_id: String, error: &DbError) -> ApiError {
    if matches!(error, DbError::NotFound) {
        return ApiError::new(request_id, "not_found", "record not found");
    }
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

pub(crate) fn map_pipeline_error(request_id: String, error: &PipelineError) -> ApiError {
    match error {
        PipelineError::NotFound(_) => ApiError::new(request_id, "not_found", error.to_string()),
        PipelineError::Validation(message) => {
            ApiError::new(request_id, "validation_error", message.clone())
        }
        PipelineError::InvalidTransition { .. }
        | PipelineError::StageAlreadySucceeded(_)
        | PipelineError::CampaignBusy(_) => {
            ApiError::new(request_id, "conflict", error.to_string())
        }
        PipelineError::InsufficientBalance { .. } => {
            ApiError::new(request_id, "insufficient_balance", error.to_string())
        }
        PipelineError::Billing(e) => {
            tracing::warn!(error = %e, "billing call failed");
            ApiError::new(request_id, "upstream_error", "billing provider request failed")
        }
        PipelineError::Store(e) => map_db_error(request_id, e),
        PipelineError::InvalidArtifact { .. } | PipelineError::Core(_) => {
            tracing::error!(error = %error, "pipeline state is inconsistent");
            ApiError::new(request_id, "internal_error", "campaign state is inconsistent")
        }
    }
}

pub(crate) fn map_publish_error(request_id: String, error: &PublishError) -> ApiError {
    match error {
        PublishError::ArticleNotFound(_) | PublishError::IntegrationMissing { .. } => {
            ApiError::new(request_id, "not_found", error.to_string())
        }
        PublishError::MissingKeywords(_) | PublishError::InvalidIntegration(_) => {
            ApiError::new(request_id, "validation_error", error.to_string())
        }
        PublishError::Store(e) => map_db_error(request_id, e),
        _ => {
            tracing::warn!(error = %error, "publish call failed");
            ApiError::new(request_id, "upstream_error", error.to_string())
        }
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState, rate_limit: RateLimitState) -> Router<AppState> {
    Router::new()
        .route(
            "/api/v1/campaigns",
            get(campaigns::list_campaigns).post(campaigns::create_campaign),
        )
        .route(
            "/api/v1/campaigns/{id}",
            get(campaigns::get_campaign).delete(campaigns::archive_campaign),
        )
        .route(
            "/api/v1/campaigns/{id}/resume",
            post(campaigns::resume_campaign),
        )
        .route("/api/v1/campaigns/{id}/fail", post(campaigns::fail_campaign))
        .route(
            "/api/v1/campaigns/{id}/stages/{stage}",
            post(campaigns::run_stage),
        )
        .route("/api/v1/articles/{id}/sync", post(articles::sync_article))
        .route("/api/v1/balance", get(balance::get_balance))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    rate_limit,
                    enforce_rate_limit,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    auth,
                    require_bearer_auth,
                )),
        )
}

pub fn build_app(state: AppState, auth: AuthState, rate_limit: RateLimitState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth, rate_limit))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(request_id))
                .layer(TraceLayer::new_for_http())
                .layer(build_cors()),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    let Some(pool) = &state.pool else {
        return (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "not_configured",
                },
                meta,
            }),
        );
    };

    match quillcast_db::health_check(pool).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse {
                data: HealthData {
                    status: "ok",
                    database: "ok",
                },
                meta,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "health check: database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiResponse {
                    data: HealthData {
                        status: "degraded",
                        database: "unavailable",
                    },
                    meta,
                }),
            )
        }
    }
}

pub fn default_rate_limit_state() -> RateLimitState {
    RateLimitState::new(120, Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use quillcast_core::PricingTable;
    use quillcast_db::{LedgerStore, MemoryStore};
    use quillcast_generation::{GenerationClient, ProcessorConfig};
    use quillcast_pipeline::PipelineConfig;
    use quillcast_publish::PublishConfig;
    use quillcast_sources::ScrapeClient;
    use rust_decimal::Decimal;
    use tower::ServiceExt;
    use uuid::Uuid;

    // Clients without API keys: any call they make fails fast with a config error.
    fn memory_state() -> (AppState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = PipelineConfig {
            processor: ProcessorConfig {
                max_retries: 0,
                backoff_base_ms: 0,
                call_timeout: Duration::from_secs(5),
            },
            ..PipelineConfig::new("openai/gpt-4o-mini")
        };
        let orchestrator = Orchestrator::new(
            store.clone(),
            Arc::new(GenerationClient::new(None, 5).expect("generation client")),
            Arc::new(ScrapeClient::new(None, 5).expect("scrape client")),
            PricingTable::default(),
            config,
        );
        let sync = SyncAdapter::with_config(store.clone(), store.clone(), PublishConfig::default())
            .expect("sync adapter");
        let state = AppState {
            campaigns: store.clone(),
            orchestrator: Arc::new(orchestrator),
            sync: Arc::new(sync),
            pool: None,
        };
        (state, store)
    }

    fn app(state: AppState) -> Router {
        build_app(state, AuthState::from_keys([]), default_rate_limit_state())
    }

    async fn send(
        app: Router,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");
        let response = app.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json parse")
        };
        (status, json)
    }

    fn setup_body(user_id: Uuid) -> serde_json::Value {
        serde_json::json!({
            "user_id": user_id,
            "brand_id": Uuid::new_v4(),
            "website_url": "https://brew.example",
            "country": "US",
            "language": "en",
            "keywords": ["cold brew", "Cold Brew "]
        })
    }

    async fn create(app: &Router, user_id: Uuid) -> String {
        let (status, json) = send(app.clone(), "POST", "/api/v1/campaigns", Some(setup_body(user_id))).await;
        assert_eq!(status, StatusCode::CREATED);
        json["data"]["id"].as_str().expect("campaign id").to_string()
    }

    #[test]
    fn error_codes_map_to_statuses() {
        let status = |code: &str| ApiError::new("req-1", code, "m").into_response().status();
        assert_eq!(status("validation_error"), StatusCode::BAD_REQUEST);
        assert_eq!(status("insufficient_balance"), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(status("conflict"), StatusCode::CONFLICT);
        assert_eq!(status("upstream_error"), StatusCode::BAD_GATEWAY);
        assert_eq!(status("internal_error"), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn normalize_limit_applies_defaults_and_bounds() {
        assert_eq!(normalize_limit(None), 50);
        assert_eq!(normalize_limit(Some(0)), 1);
        assert_eq!(normalize_limit(Some(1_000)), 200);
    }

    #[tokio::test]
    async fn health_reports_missing_database_and_echoes_request_id() {
        let (state, _) = memory_state();
        let response = app(state)
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .header("x-request-id", "req-42")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-request-id"], "req-42");
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
        assert_eq!(json["data"]["database"], "not_configured");
        assert_eq!(json["meta"]["request_id"], "req-42");
    }

    #[tokio::test]
    async fn protected_routes_require_a_token_when_keys_are_set() {
        let (state, _) = memory_state();
        let app = build_app(state, AuthState::from_keys(["secret"]), default_rate_limit_state());

        let (status, json) = send(app.clone(), "GET", "/api/v1/balance?user_id=00000000-0000-0000-0000-000000000001", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"]["code"], "unauthorized");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/balance?user_id=00000000-0000-0000-0000-000000000001")
                    .header(header::AUTHORIZATION, "Bearer secret")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn rate_limit_rejects_past_the_window_budget() {
        let (state, _) = memory_state();
        let app = build_app(
            state,
            AuthState::from_keys([]),
            RateLimitState::new(1, Duration::from_secs(60)),
        );
        let uri = format!("/api/v1/campaigns?user_id={}", Uuid::new_v4());
        let (first, _) = send(app.clone(), "GET", &uri, None).await;
        let (second, json) = send(app, "GET", &uri, None).await;
        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["error"]["code"], "rate_limited");
    }

    #[tokio::test]
    async fn created_campaign_is_listed_with_deduplicated_keywords() {
        let (state, _) = memory_state();
        let app = app(state);
        let user_id = Uuid::new_v4();
        let id = create(&app, user_id).await;

        let (status, json) = send(app, "GET", &format!("/api/v1/campaigns?user_id={user_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let rows = json["data"].as_array().expect("data array");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], id.as_str());
        assert_eq!(rows[0]["status"], "keyword_research");
        assert_eq!(rows[0]["progress"], 0);
        assert_eq!(rows[0]["can_resume"], true);
        assert_eq!(rows[0]["keywords"], serde_json::json!(["cold brew"]));
    }

    #[tokio::test]
    async fn invalid_setup_is_a_validation_error() {
        let (state, _) = memory_state();
        let mut body = setup_body(Uuid::new_v4());
        body["website_url"] = serde_json::json!("not a url");
        let (status, json) = send(app(state), "POST", "/api/v1/campaigns", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "validation_error");
    }

    #[tokio::test]
    async fn unknown_campaign_is_not_found() {
        let (state, _) = memory_state();
        let (status, json) = send(app(state), "GET", &format!("/api/v1/campaigns/{}", Uuid::new_v4()), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn stage_run_without_balance_is_payment_required() {
        let (state, _) = memory_state();
        let app = app(state);
        let id = create(&app, Uuid::new_v4()).await;

        let (status, json) = send(app.clone(), "POST", &format!("/api/v1/campaigns/{id}/stages/keyword_research"), None).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(json["error"]["code"], "insufficient_balance");

        let (_, detail) = send(app, "GET", &format!("/api/v1/campaigns/{id}"), None).await;
        assert_eq!(detail["data"]["status"], "failed");
        assert_eq!(detail["data"]["can_resume"], true);
    }

    #[tokio::test]
    async fn skipping_ahead_and_unknown_stages_are_rejected() {
        let (state, _) = memory_state();
        let app = app(state);
        let id = create(&app, Uuid::new_v4()).await;

        let (status, json) = send(app.clone(), "POST", &format!("/api/v1/campaigns/{id}/stages/writing"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(json["error"]["code"], "conflict");

        let (status, _) = send(app, "POST", &format!("/api/v1/campaigns/{id}/stages/publishing"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn failed_generation_is_reported_in_the_run_result() {
        let (state, store) = memory_state();
        let app = app(state);
        let user_id = Uuid::new_v4();
        store
            .credit(user_id, Decimal::ONE, "test", serde_json::json!({}))
            .await
            .expect("credit");
        let id = create(&app, user_id).await;

        let (status, json) = send(app.clone(), "POST", &format!("/api/v1/campaigns/{id}/resume"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["outcome"], "failed");
        assert_eq!(json["data"]["stage"], "keyword_research");
        assert_eq!(json["data"]["error_kind"], "config_error");
        assert_eq!(json["data"]["campaign"]["status"], "failed");

        let (_, detail) = send(app, "GET", &format!("/api/v1/campaigns/{id}"), None).await;
        let artifacts = detail["data"]["artifacts"].as_array().expect("artifacts");
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0]["success"], false);
        assert_eq!(artifacts[0]["version"], 1);
    }

    #[tokio::test]
    async fn operator_fail_requires_a_reason_and_archive_hides_the_campaign() {
        let (state, _) = memory_state();
        let app = app(state);
        let user_id = Uuid::new_v4();
        let id = create(&app, user_id).await;

        let (status, _) = send(app.clone(), "POST", &format!("/api/v1/campaigns/{id}/fail"), Some(serde_json::json!({"reason": "  "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, json) = send(app.clone(), "POST", &format!("/api/v1/campaigns/{id}/fail"), Some(serde_json::json!({"reason": "paused by brand"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["error_message"], "paused by brand");

        let (status, _) = send(app.clone(), "DELETE", &format!("/api/v1/campaigns/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, json) = send(app, "GET", &format!("/api/v1/campaigns?user_id={user_id}"), None).await;
        assert!(json["data"].as_array().expect("data array").is_empty());
    }

    #[tokio::test]
    async fn syncing_a_missing_article_is_not_found() {
        let (state, _) = memory_state();
        let body = serde_json::json!({"platform": "wordpress", "brand_id": Uuid::new_v4()});
        let (status, json) = send(app(state), "POST", &format!("/api/v1/articles/{}/sync", Uuid::new_v4()), Some(body)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "not_found");
    }

    #[tokio::test]
    async fn unknown_platform_is_a_validation_error() {
        let (state, _) = memory_state();
        let body = serde_json::json!({"platform": "ghost", "brand_id": Uuid::new_v4()});
        let (status, _) = send(app(state), "POST", &format!("/api/v1/articles/{}/sync", Uuid::new_v4()), Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn balance_reflects_credits() {
        let (state, store) = memory_state();
        let user_id = Uuid::new_v4();
        store
            .credit(user_id, Decimal::new(250, 2), "test", serde_json::json!({}))
            .await
            .expect("credit");
        let (status, json) = send(app(state), "GET", &format!("/api/v1/balance?user_id={user_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["data"]["balance"], "2.50");
    }
}
