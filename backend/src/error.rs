//! Application error types and result alias.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application result type alias
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Cache failures are recovered locally by callers; this variant only
    /// surfaces from direct cache administration.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Missing or invalid credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Version {version} not found for project {alias}")]
    VersionNotFound { alias: String, version: String },

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// Stored project names a source that is no longer registered
    #[error("Source {source_name} of project {alias} is not registered")]
    ProjectSourceMissing { alias: String, source_name: String },

    #[error("Source already registered: {0}")]
    SourceAlreadyRegistered(String),

    /// Duplicate resource (e.g., alias already taken)
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// A backend URL inside a manifest embeds a different version than the
    /// one being served.
    #[error("Version mismatch: {0}")]
    VersionMismatch(String),

    #[error("Repository URL does not match source: {0}")]
    RepoUrlMismatch(String),

    /// Non-success HTTP status returned by a package backend.
    #[error("Upstream {backend} returned HTTP {status}")]
    Upstream { backend: String, status: u16 },

    #[error("Upstream request failed: {0}")]
    UpstreamTransport(#[from] reqwest::Error),

    #[error("Manifest parse error: {0}")]
    ManifestParse(String),

    #[error("Manifest marshal error: {0}")]
    ManifestMarshal(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Build an upstream error for the named backend.
    pub fn upstream(backend: impl Into<String>, status: u16) -> Self {
        Self::Upstream {
            backend: backend.into(),
            status,
        }
    }

    /// HTTP status carried by an upstream error, if any.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            Self::UpstreamTransport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// True when a backend answered 404 for the requested resource.
    pub fn is_upstream_not_found(&self) -> bool {
        self.upstream_status() == Some(404)
    }

    /// Map error variant to HTTP status code and machine-readable error code.
    pub(crate) fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            Self::Database(_) | Self::Sqlx(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR")
            }
            Self::Migration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "MIGRATION_ERROR"),
            Self::Cache(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CACHE_ERROR"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::ProjectNotFound(_) => (StatusCode::NOT_FOUND, "PROJECT_NOT_FOUND"),
            Self::VersionNotFound { .. } => (StatusCode::NOT_FOUND, "VERSION_NOT_FOUND"),
            Self::SourceNotFound(_) => (StatusCode::BAD_REQUEST, "SOURCE_NOT_FOUND"),
            Self::ProjectSourceMissing { .. } => (StatusCode::NOT_FOUND, "SOURCE_NOT_FOUND"),
            Self::SourceAlreadyRegistered(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "SOURCE_ALREADY_REGISTERED")
            }
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::VersionMismatch(_) => (StatusCode::BAD_REQUEST, "VERSION_MISMATCH"),
            Self::RepoUrlMismatch(_) => (StatusCode::BAD_REQUEST, "REPO_URL_MISMATCH"),
            Self::Upstream { status, .. } => match *status {
                404 => (StatusCode::NOT_FOUND, "UPSTREAM_NOT_FOUND"),
                504 => (StatusCode::GATEWAY_TIMEOUT, "UPSTREAM_TIMEOUT"),
                _ => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            },
            Self::UpstreamTransport(e) if e.is_timeout() => {
                (StatusCode::GATEWAY_TIMEOUT, "UPSTREAM_TIMEOUT")
            }
            Self::UpstreamTransport(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_UNAVAILABLE"),
            Self::ManifestParse(_) => (StatusCode::INTERNAL_SERVER_ERROR, "MANIFEST_PARSE_ERROR"),
            Self::ManifestMarshal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "MANIFEST_MARSHAL_ERROR")
            }
            Self::Crypto(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CRYPTO_ERROR"),
            Self::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Self::AddrParse(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ADDR_PARSE_ERROR"),
            Self::Json(_) => (StatusCode::BAD_REQUEST, "JSON_ERROR"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Return a user-facing message. Internal details are hidden for server-side
    /// errors so SQL, keys, and backend URLs never reach clients. The full
    /// error is still logged via `tracing::error!` in `into_response`.
    pub(crate) fn user_message(&self) -> String {
        match self {
            // Server-side errors: return generic messages (details are logged)
            Self::Database(_) | Self::Sqlx(_) => "Database operation failed".to_string(),
            Self::Migration(_) => "Database migration failed".to_string(),
            Self::Cache(_) => "Cache operation failed".to_string(),
            Self::Config(_) | Self::SourceAlreadyRegistered(_) => {
                "Server configuration error".to_string()
            }
            Self::ManifestParse(_) => "Backend manifest could not be parsed".to_string(),
            Self::ManifestMarshal(_) => "Manifest could not be serialized".to_string(),
            Self::Crypto(_) => "Token encryption failure".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
            Self::Io(_) => "IO operation failed".to_string(),
            Self::AddrParse(_) => "Invalid address".to_string(),
            Self::Upstream { backend, status } => upstream_message(backend, *status),
            Self::UpstreamTransport(e) if e.is_timeout() => {
                "Package backend did not respond in time".to_string()
            }
            Self::UpstreamTransport(_) => "Package backend is unreachable".to_string(),
            // Client-facing errors: pass through their message
            Self::VersionNotFound { alias, version } => {
                format!("Version {} not found for project {}", version, alias)
            }
            Self::ProjectNotFound(alias) => format!("Project {} not found", alias),
            Self::SourceNotFound(name) => format!("Source {} is not registered", name),
            Self::ProjectSourceMissing { alias, .. } => {
                format!("Project {} is not served by any registered source", alias)
            }
            Self::Unauthorized(msg)
            | Self::Conflict(msg)
            | Self::Validation(msg)
            | Self::VersionMismatch(msg)
            | Self::RepoUrlMismatch(msg) => msg.clone(),
            Self::Json(_) => "Invalid JSON".to_string(),
        }
    }
}

fn upstream_message(backend: &str, status: u16) -> String {
    match status {
        401 | 403 => format!("Access to {} was denied; check the project token", backend),
        404 => format!("Resource not found on {}", backend),
        429 => format!("Rate limited by {}", backend),
        s if s >= 500 => format!("{} is unavailable (HTTP {})", backend, s),
        s => format!("{} returned HTTP {}", backend, s),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.user_message();

        tracing::error!(error = %self, code = code, "Request error");

        let body = Json(json!({
            "code": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Server-side errors: user_message must NOT leak internal details
    // -----------------------------------------------------------------------

    #[test]
    fn test_database_error_hides_details() {
        let err = AppError::Database("SELECT * FROM projects WHERE alias = 'x'".into());
        assert_eq!(err.user_message(), "Database operation failed");
        assert!(!err.user_message().contains("SELECT"));
    }

    #[test]
    fn test_crypto_error_hides_details() {
        let err = AppError::Crypto("aead::Error with key 0xdeadbeef".into());
        assert_eq!(err.user_message(), "Token encryption failure");
        assert!(!err.user_message().contains("deadbeef"));
    }

    #[test]
    fn test_config_error_hides_details() {
        let err = AppError::Config("TOKEN_ENCRYPTION_KEY is invalid".into());
        assert_eq!(err.user_message(), "Server configuration error");
        assert!(!err.user_message().contains("TOKEN"));
    }

    #[test]
    fn test_manifest_parse_hides_details() {
        let err = AppError::ManifestParse("line 3: mapping values are not allowed".into());
        assert!(!err.user_message().contains("line 3"));
    }

    #[test]
    fn test_upstream_message_names_backend_only() {
        let err = AppError::upstream("gitlab", 403);
        assert_eq!(
            err.user_message(),
            "Access to gitlab was denied; check the project token"
        );
    }

    // -----------------------------------------------------------------------
    // Client-facing errors: user_message passes through
    // -----------------------------------------------------------------------

    #[test]
    fn test_version_not_found_message() {
        let err = AppError::VersionNotFound {
            alias: "myproj".into(),
            version: "9.9.9".into(),
        };
        assert_eq!(err.user_message(), "Version 9.9.9 not found for project myproj");
    }

    #[test]
    fn test_version_mismatch_passes_through() {
        let err = AppError::VersionMismatch("expected 1.2.0, got 1.1.0".into());
        assert_eq!(err.user_message(), "expected 1.2.0, got 1.1.0");
    }

    #[test]
    fn test_conflict_passes_through() {
        let err = AppError::Conflict("project myproj already exists".into());
        assert_eq!(err.user_message(), "project myproj already exists");
    }

    // -----------------------------------------------------------------------
    // Upstream status helpers
    // -----------------------------------------------------------------------

    #[test]
    fn test_upstream_status_exposed() {
        assert_eq!(AppError::upstream("github", 404).upstream_status(), Some(404));
        assert!(AppError::upstream("github", 404).is_upstream_not_found());
        assert!(!AppError::upstream("github", 500).is_upstream_not_found());
        assert_eq!(AppError::Internal("x".into()).upstream_status(), None);
    }

    // -----------------------------------------------------------------------
    // HTTP status codes
    // -----------------------------------------------------------------------

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::ProjectNotFound("x".into()).status_and_code().0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::VersionNotFound {
                alias: "a".into(),
                version: "v".into()
            }
            .status_and_code()
            .0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::SourceNotFound("x".into()).status_and_code().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::ProjectSourceMissing {
                alias: "a".into(),
                source_name: "gone".into()
            }
            .status_and_code()
            .0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::VersionMismatch("x".into()).status_and_code().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::RepoUrlMismatch("x".into()).status_and_code().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Conflict("x".into()).status_and_code().0,
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::upstream("gitlab", 500).status_and_code().0,
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::upstream("gitlab", 504).status_and_code().0,
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AppError::Crypto("x".into()).status_and_code().0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
