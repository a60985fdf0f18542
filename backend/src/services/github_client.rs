//! GitHub Releases client.
//!
//! Versions are release tags, `manifest.yml` is read from the repository at
//! the tag, and artifacts are release assets:
//!
//! ```text
//! {web}/{owner}/{repo}/releases/download/{tag}/{filename}
//! ```
//!
//! When the REST releases listing is rate limited or forbidden, tags are
//! listed over git smart-HTTP instead (see [`crate::services::git_refs`]).

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::manifest::Manifest;
use crate::models::project::Project;
use crate::services::git_refs::parse_tag_advertisement;
use crate::services::source_registry::{ParsedFileUrl, Source};
use crate::services::upstream::{build_http_client, effective_token, ensure_success};
use crate::services::url_helpers::repo_path;

pub const DEFAULT_NAME: &str = "github";
pub const DEFAULT_WEB_URL: &str = "https://github.com";
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const RELEASES_DOWNLOAD_PATH: &str = "/releases/download/";
const VERSION_PREFIX: &str = "v";
const MANIFEST_FILE: &str = "manifest.yml";
const JSON_ACCEPT: &str = "application/vnd.github+json";
const OCTET_STREAM: &str = "application/octet-stream";

/// GitHub client configuration.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub name: String,
    /// Web host used for release downloads and git smart-HTTP
    pub web_url: String,
    /// REST API host
    pub api_url: String,
    pub default_token: Option<String>,
    pub timeout: Duration,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            web_url: DEFAULT_WEB_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            default_token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    #[serde(default)]
    content: String,
    #[serde(default)]
    encoding: String,
}

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(default)]
    tag_name: String,
    #[serde(default)]
    assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
struct ReleaseAsset {
    name: String,
    url: String,
}

/// Release tag for a version, `v`-prefixed.
fn release_tag(version: &str) -> String {
    if version.is_empty() || version.starts_with(VERSION_PREFIX) {
        version.to_string()
    } else {
        format!("{}{}", VERSION_PREFIX, version)
    }
}

/// Body of a contents API response. Anything not declared as base64 is
/// taken verbatim.
fn decode_contents(contents: ContentsResponse) -> Result<Vec<u8>> {
    if contents.encoding != "base64" {
        return Ok(contents.content.into_bytes());
    }
    // GitHub wraps base64 content at 60 columns
    let compact: String = contents
        .content
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    STANDARD
        .decode(compact)
        .map_err(|e| AppError::ManifestParse(format!("invalid base64 content: {}", e)))
}

pub struct GitHubClient {
    name: String,
    web_url: String,
    web: Url,
    api: Url,
    default_token: Option<String>,
    client: Client,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let web_url = config.web_url.trim_end_matches('/').to_string();
        let web = Url::parse(&web_url)
            .map_err(|e| AppError::Config(format!("invalid GitHub web URL: {}", e)))?;
        let api = Url::parse(config.api_url.trim_end_matches('/'))
            .map_err(|e| AppError::Config(format!("invalid GitHub API URL: {}", e)))?;
        Ok(Self {
            name: config.name,
            web_url,
            web,
            api,
            default_token: config.default_token.filter(|t| !t.is_empty()),
            client: build_http_client(config.timeout)?,
        })
    }

    fn owner_repo(&self, project: &Project) -> Result<(String, String)> {
        let path = repo_path(&project.repo_url).unwrap_or_default();
        match path.split('/').collect::<Vec<_>>().as_slice() {
            [owner, repo] if !owner.is_empty() && !repo.is_empty() => {
                Ok((owner.to_string(), repo.to_string()))
            }
            _ => Err(AppError::Validation(format!(
                "repository URL {} is not of the form {}/owner/repo",
                project.repo_url, self.web_url
            ))),
        }
    }

    fn join(base: &Url, segments: &[&str]) -> Result<Url> {
        let mut url = base.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Config("GitHub base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn repo_api_url(&self, project: &Project, tail: &[&str]) -> Result<Url> {
        let (owner, repo) = self.owner_repo(project)?;
        let mut segments = vec!["repos", owner.as_str(), repo.as_str()];
        segments.extend_from_slice(tail);
        Self::join(&self.api, &segments)
    }

    fn download_url(&self, project: &Project, version: &str, filename: &str) -> Result<Url> {
        let (owner, repo) = self.owner_repo(project)?;
        let tag = release_tag(version);
        Self::join(
            &self.web,
            &[
                owner.as_str(),
                repo.as_str(),
                "releases",
                "download",
                tag.as_str(),
                filename,
            ],
        )
    }

    fn authorized(&self, project: &Project, request: RequestBuilder) -> RequestBuilder {
        match effective_token(project.token(), self.default_token.as_deref()) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn api_get(&self, project: &Project, url: Url) -> Result<Response> {
        tracing::debug!(source = %self.name, url = %url, "GitHub API request");
        let request = self
            .client
            .get(url)
            .header(header::ACCEPT, JSON_ACCEPT)
            .header("X-GitHub-Api-Version", "2022-11-28");
        let response = self.authorized(project, request).send().await?;
        ensure_success(&self.name, response).await
    }

    /// Tags from the git ref advertisement, usable when the REST API is not.
    pub async fn list_tags(&self, project: &Project) -> Result<Vec<String>> {
        let (owner, repo) = self.owner_repo(project)?;
        let git_repo = format!("{}.git", repo);
        let mut url = Self::join(&self.web, &[owner.as_str(), git_repo.as_str(), "info", "refs"])?;
        url.query_pairs_mut().append_pair("service", "git-upload-pack");

        tracing::debug!(source = %self.name, url = %url, "Listing tags over smart HTTP");
        let request = self.client.get(url);
        let response = self.authorized(project, request).send().await?;
        let body = ensure_success(&self.name, response).await?.bytes().await?;
        parse_tag_advertisement(&body)
    }

    /// Fallback download through the release-by-tag API and the asset endpoint.
    async fn get_file_from_release(
        &self,
        project: &Project,
        version: &str,
        filename: &str,
    ) -> Result<Response> {
        let url = self.repo_api_url(project, &["releases", "tags", version])?;
        let release: Release = self.api_get(project, url).await?.json().await?;

        let asset = release
            .assets
            .into_iter()
            .find(|a| a.name == filename)
            .ok_or_else(|| {
                tracing::debug!(version = %version, filename = %filename, "Release asset not found");
                AppError::upstream(self.name.clone(), StatusCode::NOT_FOUND.as_u16())
            })?;

        let request = self
            .client
            .get(&asset.url)
            .header(header::ACCEPT, OCTET_STREAM);
        let response = self.authorized(project, request).send().await?;
        ensure_success(&self.name, response).await
    }
}

#[async_trait]
impl Source for GitHubClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn base_url(&self) -> Option<&str> {
        Some(&self.web_url)
    }

    fn parse_file_url(&self, url: &str) -> Option<ParsedFileUrl> {
        let parsed = Url::parse(url).ok()?;
        parsed.host_str()?;
        if parsed.origin() != self.web.origin() {
            return None;
        }

        let path = parsed.path();
        let idx = path.find(RELEASES_DOWNLOAD_PATH)?;
        let rest = path[idx + RELEASES_DOWNLOAD_PATH.len()..].trim_matches('/');
        let parts: Vec<&str> = rest.split('/').collect();
        if parts.len() < 2 {
            return None;
        }
        let version = parts[0];
        let filename = parts[parts.len() - 1];
        if version.is_empty() || filename.is_empty() {
            return None;
        }

        Some(ParsedFileUrl {
            version: urlencoding::decode(version).ok()?.into_owned(),
            filename: urlencoding::decode(filename).ok()?.into_owned(),
        })
    }

    async fn get_manifest(&self, project: &Project, version: &str) -> Result<Manifest> {
        let mut url = self.repo_api_url(project, &["contents", MANIFEST_FILE])?;
        url.query_pairs_mut().append_pair("ref", version);

        let contents: ContentsResponse = self.api_get(project, url).await?.json().await?;
        Manifest::from_yaml(&decode_contents(contents)?)
    }

    async fn get_file_response(
        &self,
        project: &Project,
        version: &str,
        filename: &str,
    ) -> Result<Response> {
        let url = self.download_url(project, version, filename)?;
        tracing::debug!(source = %self.name, url = %url, "GitHub release download");
        let request = self
            .client
            .get(url)
            .header(header::ACCEPT, OCTET_STREAM);
        let response = self.authorized(project, request).send().await?;
        if response.status() == StatusCode::OK {
            return Ok(response);
        }

        tracing::debug!(
            status = response.status().as_u16(),
            version = %version,
            filename = %filename,
            "Direct release download failed, trying release API"
        );
        self.get_file_from_release(project, version, filename).await
    }

    async fn get_versions(&self, project: &Project) -> Result<Vec<String>> {
        let mut url = self.repo_api_url(project, &["releases"])?;
        url.query_pairs_mut().append_pair("per_page", "100");

        match self.api_get(project, url).await {
            Ok(response) => {
                let releases: Vec<Release> = response.json().await?;
                Ok(releases
                    .into_iter()
                    .map(|r| r.tag_name)
                    .filter(|t| !t.is_empty())
                    .collect())
            }
            Err(e) if matches!(e.upstream_status(), Some(403) | Some(429)) => {
                tracing::warn!(
                    source = %self.name,
                    repo_url = %project.repo_url,
                    "Releases API refused the request, listing tags over smart HTTP"
                );
                self.list_tags(project).await
            }
            Err(e) => Err(e),
        }
    }
}
