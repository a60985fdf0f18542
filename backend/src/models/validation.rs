//! Project field rules.
//!
//! Shared by the engine and the admin handlers so both apply one set of
//! rules.

use crate::error::{AppError, Result};

pub const MAX_ALIAS_LEN: usize = 255;
pub const MAX_DESCRIPTION_LEN: usize = 1000;

/// First path segments owned by fixed routes when public routes are
/// mounted at the root.
const RESERVED_ALIASES: [&str; 6] = [
    "api",
    "api-docs",
    "health",
    "metrics",
    "versions",
    "manifest.yml",
];

/// Alias: 1-255 characters, no `/`, no whitespace.
///
/// Aliases become a single path segment of every gateway URL, so a slash
/// would make the proxied URL shape ambiguous.
pub fn validate_alias(alias: &str) -> Result<()> {
    if alias.is_empty() || alias.chars().count() > MAX_ALIAS_LEN {
        return Err(AppError::Validation(format!(
            "alias must be between 1 and {} characters",
            MAX_ALIAS_LEN
        )));
    }
    if alias.contains('/') || alias.chars().any(char::is_whitespace) {
        return Err(AppError::Validation(
            "alias must not contain '/' or whitespace".to_string(),
        ));
    }
    if RESERVED_ALIASES.contains(&alias.to_lowercase().as_str()) {
        return Err(AppError::Validation(format!(
            "alias '{}' is reserved",
            alias
        )));
    }
    Ok(())
}

pub fn validate_description(description: &str) -> Result<()> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(AppError::Validation(format!(
            "description must be at most {} characters",
            MAX_DESCRIPTION_LEN
        )));
    }
    Ok(())
}

/// Repository URL must be an absolute http(s) URL with a host.
pub fn validate_repo_url(repo_url: &str) -> Result<()> {
    let parsed = reqwest::Url::parse(repo_url)
        .map_err(|_| AppError::Validation(format!("Invalid repository URL '{}'", repo_url)))?;

    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(AppError::Validation(
            "Repository URL must use http or https".to_string(),
        ));
    }
    if parsed.host_str().is_none() {
        return Err(AppError::Validation(
            "Repository URL must have a host".to_string(),
        ));
    }
    Ok(())
}
