//! Public package routes: aggregate manifest, catalog version, per-project
//! versions, rewritten manifests, and proxied artifacts.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::StreamExt;
use utoipa::OpenApi;

use crate::api::SharedState;
use crate::error::{AppError, Result};

#[derive(OpenApi)]
#[openapi(
    paths(
        get_aggregate_manifest,
        get_catalog_versions,
        get_aggregate_manifest_at_version,
        get_project_versions,
        get_project_file,
    )
)]
pub struct PackagesApiDoc;

const YAML_CONTENT_TYPE: &str = "application/x-yaml";
const MANIFEST_YAML: &str = "manifest.yml";
const MANIFEST_JSON: &str = "manifest.json";

/// Upstream headers copied onto proxied artifact responses.
const FORWARDED_HEADERS: [HeaderName; 5] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CONTENT_DISPOSITION,
    header::ETAG,
    header::LAST_MODIFIED,
];

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/", get(get_aggregate_manifest))
        .route("/manifest.yml", get(get_aggregate_manifest))
        .route("/versions", get(get_catalog_versions))
        .route("/:alias/versions", get(get_project_versions))
        // single-segment key is the catalog version here
        .route("/:alias/manifest.yml", get(get_aggregate_manifest_at_version))
        .route("/:alias/:version/*filename", get(get_project_file))
}

fn yaml(body: String) -> Response {
    (
        [(header::CONTENT_TYPE, HeaderValue::from_static(YAML_CONTENT_TYPE))],
        body,
    )
        .into_response()
}

/// GET / and GET /manifest.yml
#[utoipa::path(
    get,
    path = "/manifest.yml",
    tag = "packages",
    operation_id = "get_aggregate_manifest",
    responses(
        (status = 200, description = "Aggregate manifest (YAML)", content_type = "application/x-yaml", body = String),
    )
)]
pub async fn get_aggregate_manifest(State(state): State<SharedState>) -> Result<Response> {
    let body = state
        .engine
        .get_aggregate_manifest(&state.config.public_base_url)
        .await?;
    Ok(yaml(body))
}

/// GET /versions
#[utoipa::path(
    get,
    path = "/versions",
    tag = "packages",
    operation_id = "get_catalog_versions",
    responses(
        (status = 200, description = "Current catalog version", body = Vec<String>),
    )
)]
pub async fn get_catalog_versions(State(state): State<SharedState>) -> Result<Json<Vec<String>>> {
    let version = state.engine.get_catalog_version().await?;
    Ok(Json(vec![version.to_string()]))
}

/// GET /{version}/manifest.yml
#[utoipa::path(
    get,
    path = "/{version}/manifest.yml",
    tag = "packages",
    operation_id = "get_aggregate_manifest_at_version",
    params(("version" = String, Path, description = "Catalog version")),
    responses(
        (status = 200, description = "Aggregate manifest (YAML)", content_type = "application/x-yaml", body = String),
        (status = 404, description = "Not the current catalog version", body = crate::api::openapi::ErrorResponse),
    )
)]
pub async fn get_aggregate_manifest_at_version(
    State(state): State<SharedState>,
    Path(version): Path<String>,
) -> Result<Response> {
    let current = state.engine.get_catalog_version().await?.to_string();
    if version != current {
        return Err(AppError::VersionNotFound {
            alias: "catalog".to_string(),
            version,
        });
    }
    get_aggregate_manifest(State(state)).await
}

/// GET /{alias}/versions
#[utoipa::path(
    get,
    path = "/{alias}/versions",
    tag = "packages",
    operation_id = "get_project_versions",
    params(("alias" = String, Path, description = "Project alias")),
    responses(
        (status = 200, description = "Published versions, newest first", body = Vec<String>),
        (status = 404, description = "Project not found", body = crate::api::openapi::ErrorResponse),
    )
)]
pub async fn get_project_versions(
    State(state): State<SharedState>,
    Path(alias): Path<String>,
) -> Result<Json<Vec<String>>> {
    Ok(Json(state.engine.get_versions(&alias).await?))
}

/// GET /{alias}/{version}/{filename}
///
/// `manifest.yml` and `manifest.json` return the rewritten manifest; any
/// other filename streams the artifact from the backend.
#[utoipa::path(
    get,
    path = "/{alias}/{version}/{filename}",
    tag = "packages",
    operation_id = "get_project_file",
    params(
        ("alias" = String, Path, description = "Project alias"),
        ("version" = String, Path, description = "Published version"),
        ("filename" = String, Path, description = "Artifact name, or manifest.yml / manifest.json"),
    ),
    responses(
        (status = 200, description = "Rewritten manifest or artifact bytes"),
        (status = 400, description = "Manifest references another version", body = crate::api::openapi::ErrorResponse),
        (status = 404, description = "Project, version, or file not found", body = crate::api::openapi::ErrorResponse),
        (status = 502, description = "Backend error", body = crate::api::openapi::ErrorResponse),
    )
)]
pub async fn get_project_file(
    State(state): State<SharedState>,
    Path((alias, version, filename)): Path<(String, String, String)>,
) -> Result<Response> {
    let filename = filename.trim_start_matches('/');
    let base_url = &state.config.public_base_url;

    match filename {
        MANIFEST_YAML => {
            let body = state.engine.get_manifest(&alias, &version, base_url).await?;
            Ok(yaml(body))
        }
        MANIFEST_JSON => {
            let manifest = state
                .engine
                .get_manifest_data(&alias, &version, base_url)
                .await?;
            Ok(Json(manifest).into_response())
        }
        "" => Err(AppError::Validation("filename is required".to_string())),
        _ => proxy_file(&state, &alias, &version, filename).await,
    }
}

async fn proxy_file(
    state: &SharedState,
    alias: &str,
    version: &str,
    filename: &str,
) -> Result<Response> {
    let upstream = state
        .engine
        .get_file_response(alias, version, filename)
        .await?;

    let headers = forwarded_headers(upstream.headers());
    tracing::debug!(alias = %alias, version = %version, filename = %filename, "Proxying artifact");

    let stream = upstream
        .bytes_stream()
        .map(|chunk| chunk.map_err(std::io::Error::other));

    Ok((StatusCode::OK, headers, Body::from_stream(stream)).into_response())
}

fn forwarded_headers(upstream: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for name in FORWARDED_HEADERS.iter() {
        if let Some(value) = upstream
            .get(name.as_str())
            .and_then(|v| HeaderValue::from_bytes(v.as_bytes()).ok())
        {
            headers.insert(name.clone(), value);
        }
    }
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/octet-stream"),
        );
    }
    headers
}
