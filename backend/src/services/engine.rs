//! Gateway engine: project resolution, version gating, manifest rewriting,
//! artifact proxying, and project administration.
//!
//! Read paths share one shape: resolve the alias, confirm the version is in
//! the published version list, then delegate to the project's source. A
//! backend 404 after the version was confirmed is reported as
//! `VersionNotFound`, since the caller cannot tell the two apart.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{Cache, VERSIONS_TTL};
use crate::error::{AppError, Result};
use crate::models::catalog_version::CatalogVersion;
use crate::models::manifest::{Manifest, ManifestRef};
use crate::models::project::{NewProject, Project, ProjectUpdate};
use crate::models::validation::{validate_alias, validate_description, validate_repo_url};
use crate::services::encryption::TokenCipher;
use crate::services::resolver::ProjectResolver;
use crate::services::source_registry::{ByteStream, Source, SourceInfo, SourceRegistry};
use crate::services::transformer::{ManifestTransformer, RewriteContext};
use crate::services::url_helpers::{build_url, normalize_repo_url, same_origin};
use crate::storage::ProjectStore;

/// Default TTL of the serialized aggregate manifest.
pub const DEFAULT_AGGREGATE_TTL: Duration = Duration::from_secs(5 * 60);

const AGGREGATE_PAGE_SIZE: i64 = 100;

pub struct GatewayEngine {
    storage: Arc<dyn ProjectStore>,
    cache: Arc<dyn Cache>,
    sources: Arc<SourceRegistry>,
    cipher: Option<Arc<dyn TokenCipher>>,
    resolver: ProjectResolver,
    transformer: ManifestTransformer,
    aggregate_ttl: Duration,
}

impl GatewayEngine {
    pub fn new(
        storage: Arc<dyn ProjectStore>,
        cache: Arc<dyn Cache>,
        sources: Arc<SourceRegistry>,
    ) -> Self {
        Self {
            resolver: ProjectResolver::new(storage.clone(), cache.clone(), None),
            transformer: ManifestTransformer::new(storage.clone()),
            storage,
            cache,
            sources,
            cipher: None,
            aggregate_ttl: DEFAULT_AGGREGATE_TTL,
        }
    }

    /// Enable token encryption at rest.
    pub fn with_cipher(mut self, cipher: Arc<dyn TokenCipher>) -> Self {
        self.resolver =
            ProjectResolver::new(self.storage.clone(), self.cache.clone(), Some(cipher.clone()));
        self.cipher = Some(cipher);
        self
    }

    pub fn with_aggregate_ttl(mut self, ttl: Duration) -> Self {
        self.aggregate_ttl = ttl;
        self
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    /// Registered sources, sorted by name.
    pub fn list_sources(&self) -> Vec<SourceInfo> {
        self.sources.list()
    }

    pub fn storage_type(&self) -> &'static str {
        self.storage.store_type()
    }

    pub fn cache_type(&self) -> &'static str {
        self.cache.cache_type()
    }

    // -----------------------------------------------------------------------
    // Read paths
    // -----------------------------------------------------------------------

    async fn require_project(&self, alias: &str) -> Result<Project> {
        self.resolver
            .resolve_project(alias)
            .await?
            .ok_or_else(|| AppError::ProjectNotFound(alias.to_string()))
    }

    /// Resolve the project, check that `version` is published, and look up
    /// its source.
    async fn prepare_read(&self, alias: &str, version: &str) -> Result<(Project, Arc<dyn Source>)> {
        let project = self.require_project(alias).await?;

        let versions = self.get_versions(alias).await?;
        if !versions.iter().any(|v| v == version) {
            tracing::debug!(
                alias = %alias,
                version = %version,
                versions_count = versions.len(),
                "Requested version is not published"
            );
            return Err(version_not_found(alias, version));
        }

        let source = self.source_for(&project)?;
        Ok((project, source))
    }

    /// Backend manifest for a published version, rewritten for the gateway.
    pub async fn get_manifest_data(
        &self,
        alias: &str,
        version: &str,
        base_url: &str,
    ) -> Result<Manifest> {
        let (project, source) = self.prepare_read(alias, version).await?;

        let mut manifest = source
            .get_manifest(&project, version)
            .await
            .map_err(|e| not_found_as_version(e, alias, version))?;

        let ctx = RewriteContext::for_project(&project, version, base_url);
        if ctx.source_domain.is_none() {
            tracing::debug!(
                alias = %alias,
                repo_url = %project.repo_url,
                "Repository URL has no host; manifest URLs pass through unchanged"
            );
        }
        self.transformer
            .rewrite(&mut manifest, &ctx, source.as_ref())
            .await?;
        Ok(manifest)
    }

    /// Rewritten manifest serialized as YAML.
    pub async fn get_manifest(&self, alias: &str, version: &str, base_url: &str) -> Result<String> {
        self.get_manifest_data(alias, version, base_url)
            .await?
            .to_yaml()
    }

    /// Open an artifact download; headers are available before the body is
    /// read.
    pub async fn get_file_response(
        &self,
        alias: &str,
        version: &str,
        filename: &str,
    ) -> Result<reqwest::Response> {
        let (project, source) = self.prepare_read(alias, version).await?;
        source
            .get_file_response(&project, version, filename)
            .await
            .map_err(|e| not_found_as_version(e, alias, version))
    }

    /// Artifact body as a chunk stream.
    pub async fn get_file_stream(
        &self,
        alias: &str,
        version: &str,
        filename: &str,
    ) -> Result<ByteStream> {
        let (project, source) = self.prepare_read(alias, version).await?;
        source
            .get_file_stream(&project, version, filename)
            .await
            .map_err(|e| not_found_as_version(e, alias, version))
    }

    /// Published versions, newest first by plain string order.
    ///
    /// A backend 404 means nothing has been published yet: the result is an
    /// empty list, and it is not cached.
    pub async fn get_versions(&self, alias: &str) -> Result<Vec<String>> {
        let project = self.require_project(alias).await?;

        match self.cache.get_versions(alias).await {
            Ok(Some(versions)) => {
                metrics::counter!("gateway_cache_hits_total", "kind" => "versions").increment(1);
                return Ok(versions);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(alias = %alias, error = %e, "Versions cache read failed"),
        }
        metrics::counter!("gateway_cache_misses_total", "kind" => "versions").increment(1);

        let source = self.source_for(&project)?;
        let mut versions = match source.get_versions(&project).await {
            Ok(versions) => versions,
            Err(e) if e.is_upstream_not_found() => {
                tracing::debug!(alias = %alias, "Backend has no packages for project");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        versions.sort_unstable_by(|a, b| b.cmp(a));
        versions.dedup();

        if let Err(e) = self.cache.set_versions(alias, &versions, VERSIONS_TTL).await {
            tracing::warn!(alias = %alias, error = %e, "Versions cache write failed");
        }
        Ok(versions)
    }

    pub async fn get_catalog_version(&self) -> Result<CatalogVersion> {
        self.storage.get_catalog_version().await
    }

    /// Manifest of manifests: one reference per project, pointing at the
    /// gateway address of its latest version's manifest.
    pub async fn get_aggregate_manifest(&self, base_url: &str) -> Result<String> {
        match self.cache.get_aggregate_manifest().await {
            Ok(Some(body)) => {
                metrics::counter!("gateway_cache_hits_total", "kind" => "aggregate").increment(1);
                return Ok(body);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Aggregate manifest cache read failed"),
        }
        metrics::counter!("gateway_cache_misses_total", "kind" => "aggregate").increment(1);

        let catalog = self.storage.get_catalog_version().await?;
        let mut manifest = Manifest {
            version: catalog.to_string(),
            ..Default::default()
        };

        let mut offset = 0;
        loop {
            let (projects, total) = self
                .storage
                .list_projects(AGGREGATE_PAGE_SIZE, offset)
                .await?;
            if projects.is_empty() {
                break;
            }
            offset += projects.len() as i64;

            for project in &projects {
                let latest = match self.get_versions(&project.alias).await {
                    Ok(versions) => versions.into_iter().next(),
                    Err(e) => {
                        tracing::warn!(
                            alias = %project.alias,
                            error = %e,
                            "Skipping project in aggregate manifest"
                        );
                        continue;
                    }
                };
                let Some(latest) = latest else {
                    tracing::debug!(alias = %project.alias, "Project has no published versions");
                    continue;
                };
                let url = build_url(base_url, &[&project.alias, &latest, "manifest.yml"], None)?;
                manifest.manifests.push(ManifestRef { url });
            }

            if offset >= total {
                break;
            }
        }

        let body = manifest.to_yaml()?;
        if let Err(e) = self
            .cache
            .set_aggregate_manifest(&body, self.aggregate_ttl)
            .await
        {
            tracing::warn!(error = %e, "Aggregate manifest cache write failed");
        }
        Ok(body)
    }

    // -----------------------------------------------------------------------
    // Project administration
    // -----------------------------------------------------------------------

    pub async fn create_project(&self, input: NewProject) -> Result<Project> {
        validate_alias(&input.alias)?;
        validate_description(&input.description)?;
        let repo_url = normalize_repo_url(&input.repo_url);
        self.validate_source(&input.source_name, &repo_url)?;

        let mut project = Project::new(input.alias, repo_url, input.source_name);
        project.description = input.description;
        project.encrypted_token = self.seal_token(input.token.as_deref())?;

        let created = self.storage.create_project(&project).await?;
        tracing::info!(
            alias = %created.alias,
            source = %created.source_name,
            repo_url = %created.repo_url,
            "Project created"
        );

        self.after_mutation(&created.alias).await;
        Ok(created)
    }

    pub async fn get_project(&self, alias: &str) -> Result<Project> {
        self.storage
            .get_project(alias)
            .await?
            .ok_or_else(|| AppError::ProjectNotFound(alias.to_string()))
    }

    /// Merge `update` into the stored project.
    ///
    /// A token of `Some("")` clears the stored token; `None` keeps it.
    pub async fn update_project(&self, alias: &str, update: ProjectUpdate) -> Result<Project> {
        if update.is_empty() {
            return Err(AppError::Validation("no fields to update".to_string()));
        }
        let mut project = self
            .storage
            .get_project(alias)
            .await?
            .ok_or_else(|| AppError::ProjectNotFound(alias.to_string()))?;

        if let Some(repo_url) = update.repo_url {
            project.repo_url = normalize_repo_url(&repo_url);
        }
        if let Some(source_name) = update.source_name {
            project.source_name = source_name;
        }
        if let Some(description) = update.description {
            validate_description(&description)?;
            project.description = description;
        }
        if let Some(token) = update.token {
            project.encrypted_token = self.seal_token(Some(&token))?;
        }
        project.token = None;
        self.validate_source(&project.source_name, &project.repo_url)?;

        let updated = self.storage.update_project(alias, &project).await?;
        tracing::info!(alias = %alias, "Project updated");

        self.after_mutation(alias).await;
        Ok(updated)
    }

    pub async fn delete_project(&self, alias: &str) -> Result<()> {
        self.storage.delete_project(alias).await?;
        tracing::info!(alias = %alias, "Project deleted");
        self.after_mutation(alias).await;
        Ok(())
    }

    /// Page of projects, newest first.
    pub async fn list_projects(&self, limit: i64, offset: i64) -> Result<(Vec<Project>, i64)> {
        self.storage.list_projects(limit, offset).await
    }

    /// Drop every cached project, version list, and the aggregate manifest.
    pub async fn clear_cache(&self) {
        self.resolver.clear().await;
        tracing::info!("Cache cleared");
    }

    async fn after_mutation(&self, alias: &str) {
        self.resolver.invalidate(alias).await;
        if let Err(e) = self.cache.delete_aggregate_manifest().await {
            tracing::warn!(error = %e, "Aggregate manifest invalidation failed");
        }
    }

    /// Source serving a stored project. A source that disappeared from the
    /// registry since the project was saved reads as not-found.
    fn source_for(&self, project: &Project) -> Result<Arc<dyn Source>> {
        self.sources.get(&project.source_name).map_err(|e| match e {
            AppError::SourceNotFound(source_name) => {
                tracing::warn!(
                    alias = %project.alias,
                    source = %source_name,
                    "Project refers to an unregistered source"
                );
                AppError::ProjectSourceMissing {
                    alias: project.alias.clone(),
                    source_name,
                }
            }
            other => other,
        })
    }

    fn validate_source(&self, source_name: &str, repo_url: &str) -> Result<()> {
        validate_repo_url(repo_url)?;
        let source = self.sources.get(source_name)?;
        if let Some(base_url) = source.base_url() {
            if !same_origin(repo_url, base_url) {
                return Err(AppError::RepoUrlMismatch(format!(
                    "repository URL {} is not served by source {} ({})",
                    repo_url, source_name, base_url
                )));
            }
        }
        Ok(())
    }

    /// Encrypt a plaintext token for storage. Empty tokens mean "no token".
    fn seal_token(&self, token: Option<&str>) -> Result<Option<String>> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        let cipher = self.cipher.as_ref().ok_or_else(|| {
            AppError::Config(
                "a project token was supplied but TOKEN_ENCRYPTION_KEY is not configured".into(),
            )
        })?;
        cipher.encrypt_string(token).map(Some)
    }
}

fn version_not_found(alias: &str, version: &str) -> AppError {
    AppError::VersionNotFound {
        alias: alias.to_string(),
        version: version.to_string(),
    }
}

fn not_found_as_version(err: AppError, alias: &str, version: &str) -> AppError {
    if err.is_upstream_not_found() {
        tracing::debug!(
            alias = %alias,
            version = %version,
            "Backend returned 404 for a published version"
        );
        version_not_found(alias, version)
    } else {
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // 404 remapping
    // -----------------------------------------------------------------------

    #[test]
    fn test_upstream_404_becomes_version_not_found() {
        let err = not_found_as_version(AppError::upstream("gitlab", 404), "p", "1.0.0");
        assert!(matches!(
            err,
            AppError::VersionNotFound { alias, version } if alias == "p" && version == "1.0.0"
        ));
    }

    #[test]
    fn test_other_upstream_statuses_propagate() {
        let err = not_found_as_version(AppError::upstream("gitlab", 500), "p", "1.0.0");
        assert_eq!(err.upstream_status(), Some(500));
    }
}
