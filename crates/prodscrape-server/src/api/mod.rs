mod scrape;

use std::{sync::Arc, time::Duration};

use axum::{
    http::{header, HeaderName, Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use prodscrape_scraper::{
    InMemorySink, ScrapeError, ScrapeErrorKind, ScrapeOrchestrator, SinkError,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{request_id, require_bearer_auth, AuthState, RequestId};

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ScrapeOrchestrator<InMemorySink>>,
    /// Upper bound on one scrape; the request's cancellation token fires after it.
    pub scrape_deadline: Duration,
    /// Parent of every request's cancellation token; cancelled on shutdown.
    pub shutdown: CancellationToken,
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

/// Error body: `{"status":"error","kind":...,"message":...,"meta":{...}}`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    http_status: StatusCode,
    status: &'static str,
    pub kind: String,
    pub message: String,
    pub meta: ResponseMeta,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct HealthData {
    status: &'static str,
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
        kind: ScrapeErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::with_status(status_for_kind(kind), request_id, kind.as_str(), message)
    }

    pub fn unauthorized(request_id: impl Into<String>) -> Self {
        Self::with_status(
            StatusCode::UNAUTHORIZED,
            request_id,
            "Unauthorized",
            "missing or invalid bearer token",
        )
    }

    /// Duplicate inserts are a conflict; any other sink failure is internal.
    pub fn from_scrape(request_id: impl Into<String>, error: &ScrapeError) -> Self {
        let kind = error.kind();
        let http_status = match error {
            ScrapeError::PersistenceFailed(SinkError::Duplicate { .. }) => StatusCode::CONFLICT,
            _ => status_for_kind(kind),
        };
        Self::with_status(http_status, request_id, kind.as_str(), error.to_string())
    }

    fn with_status(
        http_status: StatusCode,
        request_id: impl Into<String>,
        kind: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            http_status,
            status: "error",
            kind: kind.to_string(),
            message: message.into(),
            meta: ResponseMeta::new(request_id.into()),
        }
    }
}

fn status_for_kind(kind: ScrapeErrorKind) -> StatusCode {
    match kind {
        ScrapeErrorKind::InvalidIdentifier => StatusCode::BAD_REQUEST,
        ScrapeErrorKind::FetchFailed => StatusCode::BAD_GATEWAY,
        ScrapeErrorKind::ExtractionFailed => StatusCode::UNPROCESSABLE_ENTITY,
        ScrapeErrorKind::PersistenceFailed => StatusCode::INTERNAL_SERVER_ERROR,
        ScrapeErrorKind::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.http_status, Json(self)).into_response()
    }
}

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-request-id"),
        ])
}

fn protected_router(auth: AuthState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/scrape", post(scrape::scrape_product))
        .route("/scrape-product", post(scrape::scrape_product))
        .layer(axum::middleware::from_fn_with_state(
            auth,
            require_bearer_auth,
        ))
}

pub fn build_app(state: AppState, auth: AuthState) -> Router {
    let public_routes = Router::new().route("/api/v1/health", get(health));

    Router::new()
        .merge(public_routes)
        .merge(protected_router(auth))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors())
                .layer(axum::middleware::from_fn(request_id)),
        )
        .with_state(state)
}

async fn health(Extension(req_id): Extension<RequestId>) -> impl IntoResponse {
    Json(ApiResponse {
        data: HealthData { status: "ok" },
        meta: ResponseMeta::new(req_id.0),
    })
}
