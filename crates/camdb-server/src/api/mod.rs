mod accounts;
mod campaigns;
mod kpis;
mod links;
mod posts;

use axum::{
    extract::{Request, State},
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, patch, post, put},
    Extension, Json, Router,
};
use camdb_kpi::{DispatchReport, Dispatcher, EngineError, MutationEvent};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{request_id, RequestId};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub dispatcher: Dispatcher,
}

impl AppState {
    /// Runs the KPI triggers for a committed mutation. Trigger failures are
    /// logged by the dispatcher and never fail the request.
    pub(super) async fn sync_kpis(&self, event: MutationEvent) -> KpiSync {
        KpiSync::from(&self.dispatcher.dispatch(&event).await)
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

/// Summary of the KPI work a mutation triggered, returned next to the
/// mutated record.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct KpiSync {
    pub triggers: usize,
    pub failed: usize,
}

impl From<&DispatchReport> for KpiSync {
    fn from(report: &DispatchReport) -> Self {
        Self {
            triggers: report.executed.len() + report.failures.len(),
            failed: report.failures.len(),
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
    database: &'static str,
}

impl ResponseMeta {
    pub(super) fn new(request_id: String) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
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
            "bad_request" | "validation_error" => StatusCode::BAD_REQUEST,
            "conflict" => StatusCode::CONFLICT,
            "timeout" => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

pub(super) fn normalize_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(50).clamp(1, 200)
}

pub(super) fn map_db_error(request_id: String, error: &camdb_db::DbError) -> ApiError {
    if matches!(error, camdb_db::DbError::NotFound) {
        return ApiError::new(request_id, "not_found", "record not found");
    }
    if error.is_foreign_key_violation() {
        return ApiError::new(
            request_id,
            "not_found",
            "referenced campaign or account does not exist",
        );
    }
    if error.is_unique_violation() {
        return ApiError::new(request_id, "conflict", "record already exists");
    }
    tracing::error!(error = %error, "database query failed");
    ApiError::new(request_id, "internal_error", "database query failed")
}

pub(super) fn map_engine_error(request_id: String, error: &EngineError) -> ApiError {
    tracing::error!(error = %error, "kpi recalculation failed");
    if error.is_timeout() {
        ApiError::new(request_id, "timeout", "kpi recalculation timed out")
    } else {
        ApiError::new(request_id, "internal_error", "kpi recalculation failed")
    }
}

pub(super) fn validation_error(request_id: &str, message: impl Into<String>) -> ApiError {
    ApiError::new(request_id, "validation_error", message)
}

/// Resolves a campaign id, returning 404 if it does not exist.
pub(super) async fn resolve_campaign(
    pool: &PgPool,
    id: i64,
    request_id: &str,
) -> Result<camdb_db::CampaignRow, ApiError> {
    camdb_db::get_campaign(pool, id)
        .await
        .map_err(|e| map_db_error(request_id.to_owned(), &e))?
        .ok_or_else(|| ApiError::new(request_id, "not_found", format!("campaign {id} not found")))
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
}

fn api_router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/health", get(health))
        .route(
            "/api/v1/campaigns",
            get(campaigns::list_campaigns).post(campaigns::create_campaign),
        )
        .route(
            "/api/v1/campaigns/{id}",
            get(campaigns::get_campaign)
                .patch(campaigns::update_campaign)
                .delete(campaigns::delete_campaign),
        )
        .route(
            "/api/v1/campaigns/{id}/accounts/{account_id}",
            post(links::link_account).delete(links::unlink_account),
        )
        .route("/api/v1/campaigns/{id}/kpis", get(kpis::list_campaign_kpis))
        .route(
            "/api/v1/campaigns/{id}/kpis/recalculate",
            post(kpis::recalculate_campaign),
        )
        .route("/api/v1/kpis/{id}/target", put(kpis::set_target))
        .route(
            "/api/v1/accounts",
            get(accounts::list_accounts).post(accounts::create_account),
        )
        .route("/api/v1/posts", post(posts::create_post))
        .route(
            "/api/v1/posts/{id}",
            patch(posts::update_post).delete(posts::delete_post),
        )
}

pub fn build_app(state: AppState) -> Router {
    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        let request_id = request
            .extensions()
            .get::<RequestId>()
            .map_or("", |id| id.0.as_str());
        tracing::info_span!(
            "http",
            %request_id,
            method = %request.method(),
            path = %request.uri().path()
        )
    });

    api_router()
        .layer(
            ServiceBuilder::new()
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id))
                .layer(trace),
        )
        .with_state(state)
}

async fn health(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let meta = ResponseMeta::new(req_id.0);

    match camdb_db::health_check(&state.pool).await {
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

#[cfg(test)]
mod tests;
