//! Manifest rewriting.
//!
//! Every URL inside a fetched manifest that points at the project's own
//! backend is re-addressed through the gateway as
//! `{base_url}/{alias}/{version}/{filename}`; URLs on any other host pass
//! through untouched. Dependency strings that name a registered project's
//! repository are re-pointed at the gateway as `{base_url}/{alias}:{package}`.
//!
//! A rewrite either succeeds for the whole manifest or fails; no partially
//! rewritten manifest is ever returned.

use std::sync::Arc;

use reqwest::Url;

use crate::error::{AppError, Result};
use crate::models::manifest::Manifest;
use crate::models::project::Project;
use crate::services::source_registry::Source;
use crate::services::url_helpers::{build_url, normalize_repo_url, source_domain};
use crate::storage::ProjectStore;

/// Inputs that stay fixed across one manifest rewrite.
#[derive(Debug, Clone)]
pub struct RewriteContext<'a> {
    pub alias: &'a str,
    /// Version being served; URLs embedding another version are rejected.
    pub version: &'a str,
    /// Public gateway base URL.
    pub base_url: &'a str,
    /// `scheme://host[:port]` of the project's repository.
    pub source_domain: Option<String>,
}

impl<'a> RewriteContext<'a> {
    pub fn for_project(project: &'a Project, version: &'a str, base_url: &'a str) -> Self {
        Self {
            alias: &project.alias,
            version,
            base_url,
            source_domain: source_domain(&project.repo_url),
        }
    }
}

/// Parsed `[source:]package[@version]` dependency string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependency {
    /// Absolute URL when the source part parsed as one.
    pub source: Option<String>,
    pub package: String,
    pub version: Option<String>,
}

/// Parse a dependency string.
///
/// The version follows the only `@`. The source is split off at the last
/// colon that is not part of a `://` scheme separator, and only when the
/// left side parses as an absolute URL (`https://` is assumed when it has no
/// scheme). Anything else is a bare package name.
pub fn parse_dependency(raw: &str) -> Dependency {
    let raw = raw.trim();
    if raw.is_empty() {
        return Dependency::default();
    }

    let parts: Vec<&str> = raw.split('@').collect();
    let spec = parts[0];
    let version = (parts.len() == 2).then(|| parts[1].to_string());

    if let Some(colon) = spec.rfind(':').filter(|&i| i > 0) {
        let scheme_end = spec.find("://");
        let outside_scheme = match scheme_end {
            None => true,
            Some(end) => colon > end + 2,
        };
        if outside_scheme {
            let before = &spec[..colon];
            let after = &spec[colon + 1..];
            let candidate = if before.contains("://") {
                before.to_string()
            } else {
                format!("https://{}", before)
            };
            if Url::parse(&candidate).is_ok() {
                return Dependency {
                    source: Some(candidate),
                    package: after.to_string(),
                    version,
                };
            }
        }
    }

    Dependency {
        source: None,
        package: spec.to_string(),
        version,
    }
}

/// Rewrites manifests in place; looks up dependency targets in storage.
pub struct ManifestTransformer {
    storage: Arc<dyn ProjectStore>,
}

impl ManifestTransformer {
    pub fn new(storage: Arc<dyn ProjectStore>) -> Self {
        Self { storage }
    }

    /// Rewrite and serialize to the wire format.
    pub async fn transform(
        &self,
        mut manifest: Manifest,
        ctx: &RewriteContext<'_>,
        source: &dyn Source,
    ) -> Result<String> {
        self.rewrite(&mut manifest, ctx, source).await?;
        manifest.to_yaml()
    }

    /// Rewrite every URL and dependency string of `manifest`.
    pub async fn rewrite(
        &self,
        manifest: &mut Manifest,
        ctx: &RewriteContext<'_>,
        source: &dyn Source,
    ) -> Result<()> {
        for reference in &mut manifest.manifests {
            reference.url = replace_url(&reference.url, ctx, source)?;
        }

        for package in &mut manifest.packages {
            for download in &mut package.downloads {
                download.url = replace_url(&download.url, ctx, source)?;
            }
            for file in &mut package.files {
                file.source = replace_url(&file.source, ctx, source)?;
            }
            if let Some(scripts) = package.scripts.as_mut() {
                for action in scripts.actions_mut() {
                    action.source = replace_url(&action.source, ctx, source)?;
                }
            }
            for dependency in &mut package.dependencies {
                *dependency = self.replace_dependency(dependency, ctx.base_url).await?;
            }
        }

        metrics::counter!("gateway_manifest_rewrites_total").increment(1);
        Ok(())
    }

    /// Re-point a dependency at the gateway when its source is the
    /// repository of a registered project; otherwise return it as authored.
    pub async fn replace_dependency(&self, raw: &str, base_url: &str) -> Result<String> {
        if raw.is_empty() || base_url.is_empty() {
            return Ok(raw.to_string());
        }

        let dependency = parse_dependency(raw);
        let Some(source) = dependency.source.filter(|s| s.contains("://")) else {
            return Ok(raw.to_string());
        };

        let repo_url = normalize_repo_url(&source);
        let Some(project) = self.storage.get_project_by_repo_url(&repo_url).await? else {
            return Ok(raw.to_string());
        };

        let spec = match &dependency.version {
            Some(version) if !version.is_empty() => {
                format!("{}:{}@{}", project.alias, dependency.package, version)
            }
            _ => format!("{}:{}", project.alias, dependency.package),
        };
        let base_query = Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("invalid base URL '{}': {}", base_url, e)))?
            .query()
            .map(str::to_string);
        let segments: Vec<&str> = spec.split('/').filter(|s| !s.is_empty()).collect();

        tracing::debug!(dependency = %raw, alias = %project.alias, "Rewriting dependency");
        build_url(base_url, &segments, base_query.as_deref())
    }
}

/// Re-address a same-backend URL through the gateway.
///
/// Empty inputs, URLs on other hosts, and URLs the source does not
/// recognize are returned unchanged. A recognized URL that embeds a version
/// other than `ctx.version` is an error.
pub fn replace_url(url: &str, ctx: &RewriteContext<'_>, source: &dyn Source) -> Result<String> {
    if ctx.base_url.is_empty() || url.is_empty() {
        return Ok(url.to_string());
    }
    let Some(domain) = ctx.source_domain.as_deref().filter(|d| !d.is_empty()) else {
        return Ok(url.to_string());
    };
    if source_domain(url).as_deref() != Some(domain) {
        return Ok(url.to_string());
    }
    let Some(parsed) = source.parse_file_url(url) else {
        return Ok(url.to_string());
    };

    if parsed.version != ctx.version {
        return Err(AppError::VersionMismatch(format!(
            "manifest for {} {} references an artifact of version {}",
            ctx.alias, ctx.version, parsed.version
        )));
    }

    let query = Url::parse(url)
        .ok()
        .and_then(|u| u.query().map(str::to_string));
    build_url(
        ctx.base_url,
        &[ctx.alias, ctx.version, parsed.filename.as_str()],
        query.as_deref(),
    )
}
