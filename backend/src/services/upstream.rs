//! Shared HTTP plumbing for package backend clients.

use std::time::Duration;

use reqwest::{Client, Response};

use crate::error::{AppError, Result};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const ERROR_BODY_LIMIT: usize = 512;

/// Build the HTTP client used for one backend.
///
/// The read timeout applies between chunks rather than to the whole body,
/// so large artifacts keep streaming as long as the backend keeps sending.
pub fn build_http_client(read_timeout: Duration) -> Result<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(read_timeout)
        .user_agent(concat!("package-gateway/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AppError::Config(format!("failed to build HTTP client: {}", e)))
}

/// Pass through successful responses; map everything else to
/// `AppError::Upstream` carrying the backend status.
pub async fn ensure_success(backend: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        metrics::counter!("gateway_upstream_requests_total", "source" => backend.to_string(), "outcome" => "ok")
            .increment(1);
        return Ok(response);
    }

    metrics::counter!("gateway_upstream_requests_total", "source" => backend.to_string(), "outcome" => "error")
        .increment(1);

    let url = response.url().clone();
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    tracing::debug!(
        source = backend,
        status = status.as_u16(),
        url = %url.path(),
        body = %snippet,
        "Upstream request failed"
    );

    Err(AppError::upstream(backend, status.as_u16()))
}

/// Per-project token, falling back to the backend's default token.
pub fn effective_token<'a>(project_token: Option<&'a str>, default: Option<&'a str>) -> Option<&'a str> {
    project_token
        .filter(|t| !t.is_empty())
        .or(default.filter(|t| !t.is_empty()))
}
