//! HTTP transport: one axum router translating requests into engine calls.

pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod validation;

use std::sync::Arc;

use axum::{middleware::from_fn_with_state, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::services::engine::GatewayEngine;
use middleware::auth::{admin_auth, public_auth, AuthPolicy};

/// Application state shared across handlers.
pub struct AppState {
    pub config: Config,
    pub engine: GatewayEngine,
    pub metrics_handle: Option<PrometheusHandle>,
    pub admin_auth: AuthPolicy,
    pub public_auth: AuthPolicy,
}

impl AppState {
    pub fn new(config: Config, engine: GatewayEngine) -> Self {
        let admin_auth = AuthPolicy {
            api_key: config.admin_api_key.clone(),
            api_key_header: config.admin_api_key_header.clone(),
            basic: config
                .admin_username
                .clone()
                .zip(config.admin_password.clone()),
        };
        let public_auth = AuthPolicy {
            api_key: config.public_api_key.clone(),
            api_key_header: config.admin_api_key_header.clone(),
            basic: None,
        };
        Self {
            config,
            engine,
            metrics_handle: None,
            admin_auth,
            public_auth,
        }
    }

    pub fn with_metrics_handle(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

pub type SharedState = Arc<AppState>;

/// Build the full router: public package routes under the configured
/// prefix, admin routes under `/api/v1/admin`, plus health, metrics, and
/// the OpenAPI document.
pub fn build_router(state: SharedState) -> Router {
    let public = handlers::packages::router()
        .route_layer(from_fn_with_state(state.clone(), public_auth));

    let admin = handlers::projects::router()
        .route_layer(from_fn_with_state(state.clone(), admin_auth));

    let router = Router::new()
        .merge(handlers::health::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .nest("/api/v1/admin", admin);

    // axum refuses to nest at "/"
    let router = match state.config.public_prefix.as_str() {
        "/" => router.merge(public),
        prefix => router.nest(prefix, public),
    };

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi::build_openapi())
}
