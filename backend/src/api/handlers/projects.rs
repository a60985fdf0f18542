//! Project administration handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::api::validation::clamp_limit;
use crate::api::SharedState;
use crate::error::Result;
use crate::models::project::{NewProject, Project, ProjectUpdate};

#[derive(OpenApi)]
#[openapi(
    paths(
        list_projects,
        create_project,
        get_project,
        update_project,
        delete_project,
        clear_cache,
    ),
    components(schemas(
        ProjectResponse,
        ProjectListResponse,
        CreateProjectRequest,
        UpdateProjectRequest,
    ))
)]
pub struct ProjectsApiDoc;

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 1000;

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/projects", get(list_projects).post(create_project))
        .route(
            "/projects/:alias",
            get(get_project).put(update_project).delete(delete_project),
        )
        .route("/cache/clear", post(clear_cache))
}

/// Project as returned by the admin API. Tokens are write-only.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProjectResponse {
    pub alias: String,
    pub repo_url: String,
    pub description: String,
    pub source_name: String,
    /// Whether a backend token is stored for the project
    pub has_token: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Project> for ProjectResponse {
    fn from(project: Project) -> Self {
        Self {
            has_token: project.has_token(),
            alias: project.alias,
            repo_url: project.repo_url,
            description: project.description,
            source_name: project.source_name,
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProjectListResponse {
    pub items: Vec<ProjectResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListProjectsQuery {
    /// Page size (default 50, max 1000)
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProjectRequest {
    pub alias: String,
    pub repo_url: String,
    /// Backend token; stored encrypted, never returned
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub description: String,
    pub source_name: String,
}

/// Partial update. Omitted fields keep their stored value; an empty
/// `token` removes the stored token.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct UpdateProjectRequest {
    pub repo_url: Option<String>,
    pub token: Option<String>,
    pub description: Option<String>,
    pub source_name: Option<String>,
}

impl From<UpdateProjectRequest> for ProjectUpdate {
    fn from(req: UpdateProjectRequest) -> Self {
        Self {
            repo_url: req.repo_url,
            token: req.token,
            description: req.description,
            source_name: req.source_name,
        }
    }
}

/// GET /api/v1/admin/projects
#[utoipa::path(
    get,
    path = "/projects",
    context_path = "/api/v1/admin",
    tag = "projects",
    operation_id = "list_projects",
    params(ListProjectsQuery),
    responses(
        (status = 200, description = "Page of projects, newest first", body = ProjectListResponse),
        (status = 401, description = "Unauthorized", body = crate::api::openapi::ErrorResponse),
    ),
    security(("api_key" = []), ("basic_auth" = []))
)]
pub async fn list_projects(
    State(state): State<SharedState>,
    Query(query): Query<ListProjectsQuery>,
) -> Result<Json<ProjectListResponse>> {
    let limit = clamp_limit(query.limit, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);
    let (projects, total) = state.engine.list_projects(limit, offset).await?;

    Ok(Json(ProjectListResponse {
        items: projects.into_iter().map(ProjectResponse::from).collect(),
        total,
        limit,
        offset,
    }))
}

/// POST /api/v1/admin/projects
#[utoipa::path(
    post,
    path = "/projects",
    context_path = "/api/v1/admin",
    tag = "projects",
    operation_id = "create_project",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = ProjectResponse),
        (status = 400, description = "Invalid input, unknown source, or repository URL mismatch", body = crate::api::openapi::ErrorResponse),
        (status = 409, description = "Alias already exists", body = crate::api::openapi::ErrorResponse),
    ),
    security(("api_key" = []), ("basic_auth" = []))
)]
pub async fn create_project(
    State(state): State<SharedState>,
    Json(payload): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<ProjectResponse>)> {
    let project = state
        .engine
        .create_project(NewProject {
            alias: payload.alias,
            repo_url: payload.repo_url,
            token: payload.token,
            description: payload.description,
            source_name: payload.source_name,
        })
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ProjectResponse::from(project)),
    ))
}

/// GET /api/v1/admin/projects/{alias}
#[utoipa::path(
    get,
    path = "/projects/{alias}",
    context_path = "/api/v1/admin",
    tag = "projects",
    operation_id = "get_project",
    params(("alias" = String, Path, description = "Project alias")),
    responses(
        (status = 200, description = "Project", body = ProjectResponse),
        (status = 404, description = "Project not found", body = crate::api::openapi::ErrorResponse),
    ),
    security(("api_key" = []), ("basic_auth" = []))
)]
pub async fn get_project(
    State(state): State<SharedState>,
    Path(alias): Path<String>,
) -> Result<Json<ProjectResponse>> {
    let project = state.engine.get_project(&alias).await?;
    Ok(Json(project.into()))
}

/// PUT /api/v1/admin/projects/{alias}
#[utoipa::path(
    put,
    path = "/projects/{alias}",
    context_path = "/api/v1/admin",
    tag = "projects",
    operation_id = "update_project",
    params(("alias" = String, Path, description = "Project alias")),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "Updated project", body = ProjectResponse),
        (status = 400, description = "Invalid input", body = crate::api::openapi::ErrorResponse),
        (status = 404, description = "Project not found", body = crate::api::openapi::ErrorResponse),
    ),
    security(("api_key" = []), ("basic_auth" = []))
)]
pub async fn update_project(
    State(state): State<SharedState>,
    Path(alias): Path<String>,
    Json(payload): Json<UpdateProjectRequest>,
) -> Result<Json<ProjectResponse>> {
    let project = state
        .engine
        .update_project(&alias, payload.into())
        .await?;
    Ok(Json(project.into()))
}

/// DELETE /api/v1/admin/projects/{alias}
#[utoipa::path(
    delete,
    path = "/projects/{alias}",
    context_path = "/api/v1/admin",
    tag = "projects",
    operation_id = "delete_project",
    params(("alias" = String, Path, description = "Project alias")),
    responses(
        (status = 204, description = "Project deleted"),
        (status = 404, description = "Project not found", body = crate::api::openapi::ErrorResponse),
    ),
    security(("api_key" = []), ("basic_auth" = []))
)]
pub async fn delete_project(
    State(state): State<SharedState>,
    Path(alias): Path<String>,
) -> Result<StatusCode> {
    state.engine.delete_project(&alias).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/admin/cache/clear
#[utoipa::path(
    post,
    path = "/cache/clear",
    context_path = "/api/v1/admin",
    tag = "projects",
    operation_id = "clear_cache",
    responses(
        (status = 204, description = "Cache cleared"),
    ),
    security(("api_key" = []), ("basic_auth" = []))
)]
pub async fn clear_cache(State(state): State<SharedState>) -> StatusCode {
    state.engine.clear_cache().await;
    StatusCode::NO_CONTENT
}
