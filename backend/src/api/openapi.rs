//! OpenAPI specification generated from handler annotations via utoipa.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::config::DEFAULT_ADMIN_API_KEY_HEADER;

/// Top-level OpenAPI document for the package gateway.
///
/// Each handler module contributes its own paths and schemas via per-module
/// `#[derive(OpenApi)]` structs that are merged into this root document.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Package Gateway API",
        description = "Stable package manifests, versions, and artifacts proxied from GitLab and GitHub backends.",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "packages", description = "Manifests, versions, and artifacts"),
        (name = "projects", description = "Project registration and cache administration"),
        (name = "health", description = "Health and metrics"),
    ),
    components(schemas(ErrorResponse))
)]
pub struct ApiDoc;

/// Standard error response body returned by all endpoints on failure.
#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g. "PROJECT_NOT_FOUND", "VERSION_MISMATCH")
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

/// Adds the static-key and basic-auth schemes used by admin routes.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(
                    DEFAULT_ADMIN_API_KEY_HEADER,
                ))),
            );
            components.add_security_scheme(
                "basic_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Basic).build()),
            );
        }
    }
}

/// Build the merged OpenAPI document from all handler modules.
pub fn build_openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();

    doc.merge(super::handlers::packages::PackagesApiDoc::openapi());
    doc.merge(super::handlers::projects::ProjectsApiDoc::openapi());
    doc.merge(super::handlers::health::HealthApiDoc::openapi());

    doc
}
