//! Service configuration loaded from environment variables.

use std::time::Duration;

use crate::error::{AppError, Result};
use crate::services::github_client::{DEFAULT_API_URL, DEFAULT_WEB_URL};

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_REDIS_KEY_PREFIX: &str = "pkg-gateway:";
pub const DEFAULT_ADMIN_API_KEY_HEADER: &str = "X-Gateway-Key";

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: String,
    /// Gateway URL that rewritten manifests point at
    pub public_base_url: String,
    /// Mount point of the public routes
    pub public_prefix: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub redis_key_prefix: String,
    pub token_encryption_key: Option<String>,
    pub gitlab_base_url: Option<String>,
    pub gitlab_token: Option<String>,
    pub github_enabled: bool,
    pub github_token: Option<String>,
    pub github_api_url: String,
    pub github_web_url: String,
    pub upstream_timeout: Duration,
    pub aggregate_manifest_ttl: Duration,
    pub admin_api_key: Option<String>,
    pub admin_api_key_header: String,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub public_api_key: Option<String>,
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from the process environment, reading `.env`
    /// first when present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let public_base_url = var("PUBLIC_BASE_URL")
            .ok_or_else(|| AppError::Config("PUBLIC_BASE_URL not set".to_string()))?;
        let parsed = reqwest::Url::parse(&public_base_url)
            .map_err(|e| AppError::Config(format!("PUBLIC_BASE_URL is invalid: {}", e)))?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(AppError::Config(
                "PUBLIC_BASE_URL must be an absolute http(s) URL".to_string(),
            ));
        }

        let log_format = match var("LOG_FORMAT").as_deref().map(str::to_lowercase).as_deref() {
            None | Some("text") | Some("pretty") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "LOG_FORMAT must be 'json' or 'text', got '{}'",
                    other
                )))
            }
        };

        let admin_username = var("ADMIN_USERNAME");
        let admin_password = var("ADMIN_PASSWORD");
        if admin_username.is_some() != admin_password.is_some() {
            return Err(AppError::Config(
                "ADMIN_USERNAME and ADMIN_PASSWORD must be set together".to_string(),
            ));
        }

        Ok(Self {
            bind_address: var("BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            public_prefix: normalize_prefix(var("PUBLIC_PREFIX").as_deref()),
            database_url: var("DATABASE_URL"),
            database_max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 10)?,
            redis_url: var("REDIS_URL"),
            redis_key_prefix: var("REDIS_KEY_PREFIX")
                .unwrap_or_else(|| DEFAULT_REDIS_KEY_PREFIX.to_string()),
            token_encryption_key: var("TOKEN_ENCRYPTION_KEY"),
            gitlab_base_url: var("GITLAB_BASE_URL"),
            gitlab_token: var("GITLAB_TOKEN"),
            github_enabled: var("GITHUB_ENABLED")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(true),
            github_token: var("GITHUB_TOKEN"),
            github_api_url: var("GITHUB_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            github_web_url: var("GITHUB_WEB_URL").unwrap_or_else(|| DEFAULT_WEB_URL.to_string()),
            upstream_timeout: Duration::from_secs(parse_or(&var, "UPSTREAM_TIMEOUT_SECS", 30)?),
            aggregate_manifest_ttl: Duration::from_secs(parse_or(
                &var,
                "AGGREGATE_MANIFEST_TTL_SECS",
                300,
            )?),
            admin_api_key: var("ADMIN_API_KEY"),
            admin_api_key_header: var("ADMIN_API_KEY_HEADER")
                .unwrap_or_else(|| DEFAULT_ADMIN_API_KEY_HEADER.to_string()),
            admin_username,
            admin_password,
            public_api_key: var("PUBLIC_API_KEY"),
            log_format,
        })
    }

    /// Whether the admin routes have any credential configured.
    pub fn admin_auth_configured(&self) -> bool {
        self.admin_api_key.is_some() || self.admin_username.is_some()
    }
}

fn parse_or<V, T>(var: &V, key: &str, default: T) -> Result<T>
where
    V: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match var(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value '{}'", key, raw))),
    }
}

/// `"/"`, or `/segment[/segment]` without a trailing slash.
fn normalize_prefix(raw: Option<&str>) -> String {
    let trimmed = raw.unwrap_or("/").trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("PUBLIC_BASE_URL", "https://proxy.example.com/pkgs/")]).unwrap();
        assert_eq!(config.public_base_url, "https://proxy.example.com/pkgs");
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.public_prefix, "/");
        assert_eq!(config.redis_key_prefix, "pkg-gateway:");
        assert_eq!(config.admin_api_key_header, "X-Gateway-Key");
        assert!(config.github_enabled);
        assert_eq!(config.github_api_url, "https://api.github.com");
        assert_eq!(config.upstream_timeout, Duration::from_secs(30));
        assert_eq!(config.aggregate_manifest_ttl, Duration::from_secs(300));
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.database_url.is_none());
        assert!(!config.admin_auth_configured());
    }

    #[test]
    fn test_base_url_required() {
        assert!(matches!(load(&[]), Err(AppError::Config(_))));
        assert!(load(&[("PUBLIC_BASE_URL", "proxy.example.com")]).is_err());
        assert!(load(&[("PUBLIC_BASE_URL", "ftp://proxy.example.com")]).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PUBLIC_BASE_URL", "https://proxy.example.com"),
            ("PUBLIC_PREFIX", "pkgs/"),
            ("GITHUB_ENABLED", "false"),
            ("UPSTREAM_TIMEOUT_SECS", "5"),
            ("LOG_FORMAT", "JSON"),
            ("ADMIN_API_KEY", "secret"),
            ("DATABASE_URL", ""),
        ])
        .unwrap();
        assert_eq!(config.public_prefix, "/pkgs");
        assert!(!config.github_enabled);
        assert_eq!(config.upstream_timeout, Duration::from_secs(5));
        assert_eq!(config.log_format, LogFormat::Json);
        assert!(config.admin_auth_configured());
        // empty values count as unset
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let err = load(&[
            ("PUBLIC_BASE_URL", "https://proxy.example.com"),
            ("UPSTREAM_TIMEOUT_SECS", "soon"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("UPSTREAM_TIMEOUT_SECS"));
    }

    #[test]
    fn test_basic_auth_needs_both_parts() {
        assert!(load(&[
            ("PUBLIC_BASE_URL", "https://proxy.example.com"),
            ("ADMIN_USERNAME", "admin"),
        ])
        .is_err());
    }

    #[test]
    fn test_unknown_log_format() {
        assert!(load(&[
            ("PUBLIC_BASE_URL", "https://proxy.example.com"),
            ("LOG_FORMAT", "xml"),
        ])
        .is_err());
    }
}
