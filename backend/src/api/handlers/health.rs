//! Liveness and metrics endpoints.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use utoipa::{OpenApi, ToSchema};

use crate::api::SharedState;
use crate::services::source_registry::SourceInfo;

#[derive(OpenApi)]
#[openapi(
    paths(health_check, metrics),
    components(schemas(HealthResponse, SourceSummary))
)]
pub struct HealthApiDoc;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SourceSummary {
    pub name: String,
    pub base_url: String,
}

impl From<SourceInfo> for SourceSummary {
    fn from(info: SourceInfo) -> Self {
        Self {
            name: info.name,
            base_url: info.base_url,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Current catalog version; absent when storage is unreachable
    pub catalog_version: Option<String>,
    pub storage: String,
    pub cache: String,
    pub sources: Vec<SourceSummary>,
}

/// GET /health
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    operation_id = "health_check",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Storage is unreachable", body = HealthResponse),
    )
)]
pub async fn health_check(State(state): State<SharedState>) -> (StatusCode, Json<HealthResponse>) {
    let engine = &state.engine;
    let (status, catalog_version) = match engine.get_catalog_version().await {
        Ok(version) => (StatusCode::OK, Some(version.to_string())),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not read catalog version");
            (StatusCode::SERVICE_UNAVAILABLE, None)
        }
    };

    let body = HealthResponse {
        status: if status.is_success() { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        catalog_version,
        storage: engine.storage_type().to_string(),
        cache: engine.cache_type().to_string(),
        sources: engine
            .list_sources()
            .into_iter()
            .map(SourceSummary::from)
            .collect(),
    };
    (status, Json(body))
}

/// GET /metrics
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "health",
    operation_id = "metrics",
    responses(
        (status = 200, description = "Prometheus metrics", content_type = "text/plain", body = String),
        (status = 404, description = "Metrics exporter not installed"),
    )
)]
pub async fn metrics(State(state): State<SharedState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
