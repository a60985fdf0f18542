//! GitLab generic package registry client.
//!
//! Releases are published as generic packages named `release`, one package
//! version per release, with `manifest.yml` and the artifacts as package
//! files:
//!
//! ```text
//! {base}/api/v4/projects/{url-encoded path}/packages/generic/release/{version}/{filename}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, Url};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::manifest::Manifest;
use crate::models::project::Project;
use crate::services::source_registry::{ParsedFileUrl, Source};
use crate::services::upstream::{build_http_client, effective_token, ensure_success};
use crate::services::url_helpers::repo_path;

pub const DEFAULT_NAME: &str = "gitlab";

const PRIVATE_TOKEN_HEADER: &str = "PRIVATE-TOKEN";
const GENERIC_RELEASE_PATH: &str = "/packages/generic/release/";
const PACKAGE_NAME: &str = "release";
const MANIFEST_FILE: &str = "manifest.yml";
const PER_PAGE: &str = "100";
const MAX_PAGES: usize = 50;

/// GitLab client configuration.
#[derive(Debug, Clone)]
pub struct GitLabConfig {
    /// Registry name projects refer to
    pub name: String,
    /// Instance root, e.g. `https://gitlab.example.com`
    pub base_url: String,
    pub default_token: Option<String>,
    pub timeout: Duration,
}

impl GitLabConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            base_url: base_url.into(),
            default_token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GitLabPackage {
    #[serde(default)]
    version: String,
}

pub struct GitLabClient {
    name: String,
    base_url: String,
    base: Url,
    default_token: Option<String>,
    client: Client,
}

impl GitLabClient {
    pub fn new(config: GitLabConfig) -> Result<Self> {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let base = Url::parse(&base_url)
            .map_err(|e| AppError::Config(format!("invalid GitLab base URL: {}", e)))?;
        if base.host_str().is_none() {
            return Err(AppError::Config("GitLab base URL has no host".into()));
        }
        Ok(Self {
            name: config.name,
            base_url,
            base,
            default_token: config.default_token.filter(|t| !t.is_empty()),
            client: build_http_client(config.timeout)?,
        })
    }

    fn project_path(&self, project: &Project) -> Result<String> {
        repo_path(&project.repo_url).ok_or_else(|| {
            AppError::Validation(format!(
                "repository URL {} has no project path",
                project.repo_url
            ))
        })
    }

    /// `{base}/api/v4/projects/{path}/{tail...}` with the project path
    /// encoded as a single segment.
    fn project_api_url(&self, project: &Project, tail: &[&str]) -> Result<Url> {
        let path = self.project_path(project)?;
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| AppError::Config("GitLab base URL cannot carry a path".into()))?;
            segments.pop_if_empty();
            segments.extend(["api", "v4", "projects", path.as_str()]);
            segments.extend(tail);
        }
        Ok(url)
    }

    fn package_file_url(&self, project: &Project, version: &str, filename: &str) -> Result<Url> {
        self.project_api_url(
            project,
            &["packages", "generic", PACKAGE_NAME, version, filename],
        )
    }

    async fn get(&self, project: &Project, url: Url) -> Result<Response> {
        tracing::debug!(source = %self.name, url = %url, repo_url = %project.repo_url, "GitLab API request");
        let mut request = self.client.get(url);
        if let Some(token) = effective_token(project.token(), self.default_token.as_deref()) {
            request = request.header(PRIVATE_TOKEN_HEADER, token);
        }
        let response = request.send().await?;
        ensure_success(&self.name, response).await
    }
}

#[async_trait]
impl Source for GitLabClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_url(&self) -> Option<&str> {
        Some(&self.base_url)
    }

    fn parse_file_url(&self, url: &str) -> Option<ParsedFileUrl> {
        let parsed = Url::parse(url).ok()?;
        parsed.host_str()?;
        if parsed.origin() != self.base.origin() {
            return None;
        }

        let path = parsed.path();
        let idx = path.find(GENERIC_RELEASE_PATH)?;
        let rest = path[idx + GENERIC_RELEASE_PATH.len()..].trim_matches('/');
        let parts: Vec<&str> = rest.split('/').collect();
        if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
            return None;
        }

        Some(ParsedFileUrl {
            version: urlencoding::decode(parts[0]).ok()?.into_owned(),
            filename: urlencoding::decode(parts[1]).ok()?.into_owned(),
        })
    }

    async fn get_manifest(&self, project: &Project, version: &str) -> Result<Manifest> {
        let url = self.package_file_url(project, version, MANIFEST_FILE)?;
        let body = self.get(project, url).await?.bytes().await?;
        Manifest::from_yaml(&body)
    }

    async fn get_file_response(
        &self,
        project: &Project,
        version: &str,
        filename: &str,
    ) -> Result<Response> {
        let url = self.package_file_url(project, version, filename)?;
        self.get(project, url).await
    }

    async fn get_versions(&self, project: &Project) -> Result<Vec<String>> {
        let mut versions: Vec<String> = Vec::new();
        let mut page = String::from("1");

        for _ in 0..MAX_PAGES {
            let mut url = self.project_api_url(project, &["packages"])?;
            url.query_pairs_mut()
                .append_pair("package_type", "generic")
                .append_pair("package_name", PACKAGE_NAME)
                .append_pair("per_page", PER_PAGE)
                .append_pair("page", &page);

            let response = self.get(project, url).await?;
            let next_page = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);

            let packages: Vec<GitLabPackage> = response.json().await?;
            for pkg in packages {
                if !pkg.version.is_empty() && !versions.contains(&pkg.version) {
                    versions.push(pkg.version);
                }
            }

            match next_page {
                Some(next) => page = next,
                None => break,
            }
        }

        Ok(versions)
    }
}
