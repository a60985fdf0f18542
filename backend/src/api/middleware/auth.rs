//! Static-key and basic-auth guards for the public and admin route groups.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::api::SharedState;
use crate::error::AppError;

/// Credentials accepted by one route group.
#[derive(Debug, Clone, Default)]
pub struct AuthPolicy {
    pub api_key: Option<String>,
    pub api_key_header: String,
    pub basic: Option<(String, String)>,
}

impl AuthPolicy {
    /// No credential configured: every request passes.
    pub fn is_open(&self) -> bool {
        self.api_key.is_none() && self.basic.is_none()
    }

    /// Check request headers against the policy. Either a matching static
    /// key or matching basic credentials is enough.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), &'static str> {
        if self.is_open() {
            return Ok(());
        }

        if let Some(expected) = &self.api_key {
            if let Some(provided) = headers
                .get(self.api_key_header.as_str())
                .and_then(|v| v.to_str().ok())
            {
                return if provided == expected {
                    Ok(())
                } else {
                    Err("invalid API key")
                };
            }
        }

        if let Some((username, password)) = &self.basic {
            if let Some((user, pass)) = basic_credentials(headers) {
                return if &user == username && &pass == password {
                    Ok(())
                } else {
                    Err("invalid credentials")
                };
            }
        }

        Err("missing credentials")
    }
}

/// Decode `Authorization: Basic base64(user:pass)`.
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

fn reject(group: &'static str, request: &Request<Body>, reason: &'static str) -> Response {
    tracing::info!(
        auth_group = group,
        method = %request.method(),
        path = %request.uri().path(),
        reason = reason,
        "Authorization failed"
    );
    AppError::Unauthorized("Unauthorized".to_string()).into_response()
}

/// Guard for `/api/v1/admin`.
pub async fn admin_auth(
    State(state): State<SharedState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match state.admin_auth.authorize(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(reason) => reject("admin", &request, reason),
    }
}

/// Guard for the public package routes.
pub async fn public_auth(
    State(state): State<SharedState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match state.public_auth.authorize(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(reason) => reject("public", &request, reason),
    }
}
