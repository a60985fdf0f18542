//! Abstraction over package backends (GitLab, GitHub, ...).
//!
//! The `Source` trait provides a uniform interface for the engine and the
//! manifest transformer to fetch manifests, versions, and artifacts from
//! different hosting providers. `SourceRegistry` maps a project's
//! `source_name` to the client that serves it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;

use crate::error::{AppError, Result};
use crate::models::manifest::Manifest;
use crate::models::project::Project;

/// Byte stream of an artifact body.
pub type ByteStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Name and public base URL of a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub name: String,
    pub base_url: String,
}

/// Version and filename embedded in a backend download URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFileUrl {
    pub version: String,
    pub filename: String,
}

/// Trait for package backend clients.
///
/// `parse_file_url` must be the exact inverse of the download URLs the
/// backend itself embeds in manifests; the transformer relies on it to
/// recognize same-backend artifacts.
#[async_trait]
pub trait Source: Send + Sync {
    /// Registry name, matched against `Project::source_name`
    fn name(&self) -> &str;

    /// Public web base URL of the backend, when the client knows one.
    ///
    /// Repository URLs of projects served by this source are expected to
    /// share its scheme and host.
    fn base_url(&self) -> Option<&str> {
        None
    }

    fn info(&self) -> SourceInfo {
        SourceInfo {
            name: self.name().to_string(),
            base_url: self.base_url().unwrap_or_default().to_string(),
        }
    }

    /// Recognize a download URL produced by this backend.
    fn parse_file_url(&self, url: &str) -> Option<ParsedFileUrl>;

    /// Fetch and parse the manifest published for `version`.
    async fn get_manifest(&self, project: &Project, version: &str) -> Result<Manifest>;

    /// Open an artifact download. The response status is already known to
    /// be successful; the body is not yet read.
    async fn get_file_response(
        &self,
        project: &Project,
        version: &str,
        filename: &str,
    ) -> Result<reqwest::Response>;

    /// Artifact body as a stream of chunks.
    async fn get_file_stream(
        &self,
        project: &Project,
        version: &str,
        filename: &str,
    ) -> Result<ByteStream> {
        let response = self.get_file_response(project, version, filename).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other))
            .boxed())
    }

    /// Published versions, in backend order.
    async fn get_versions(&self, project: &Project) -> Result<Vec<String>>;
}

/// Name → source table, built at startup and read-mostly afterwards.
#[derive(Default)]
pub struct SourceRegistry {
    sources: RwLock<HashMap<String, Arc<dyn Source>>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source under its own name; duplicate names are rejected.
    pub fn register(&self, source: Arc<dyn Source>) -> Result<()> {
        let name = source.name().to_string();
        let mut sources = self
            .sources
            .write()
            .map_err(|_| AppError::Internal("source registry lock poisoned".into()))?;
        if sources.contains_key(&name) {
            return Err(AppError::SourceAlreadyRegistered(name));
        }
        tracing::info!(source = %name, base_url = ?source.base_url(), "Registered package source");
        sources.insert(name, source);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Source>> {
        let sources = self
            .sources
            .read()
            .map_err(|_| AppError::Internal("source registry lock poisoned".into()))?;
        sources
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::SourceNotFound(name.to_string()))
    }

    /// Info for every registered source, sorted by name.
    pub fn list(&self) -> Vec<SourceInfo> {
        let mut infos: Vec<SourceInfo> = match self.sources.read() {
            Ok(sources) => sources.values().map(|s| s.info()).collect(),
            Err(_) => Vec::new(),
        };
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NamedSource(&'static str);

    #[async_trait]
    impl Source for NamedSource {
        fn name(&self) -> &str {
            self.0
        }

        fn parse_file_url(&self, _url: &str) -> Option<ParsedFileUrl> {
            None
        }

        async fn get_manifest(&self, _project: &Project, _version: &str) -> Result<Manifest> {
            Ok(Manifest::default())
        }

        async fn get_file_response(
            &self,
            _project: &Project,
            _version: &str,
            _filename: &str,
        ) -> Result<reqwest::Response> {
            Err(AppError::upstream(self.0, 404))
        }

        async fn get_versions(&self, _project: &Project) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    #[test]
    fn test_register_and_get() {
        let registry = SourceRegistry::new();
        registry.register(Arc::new(NamedSource("gitlab"))).unwrap();
        assert_eq!(registry.get("gitlab").unwrap().name(), "gitlab");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = SourceRegistry::new();
        registry.register(Arc::new(NamedSource("gitlab"))).unwrap();
        let err = registry.register(Arc::new(NamedSource("gitlab"))).unwrap_err();
        assert!(matches!(err, AppError::SourceAlreadyRegistered(name) if name == "gitlab"));
    }

    #[test]
    fn test_missing_source_is_typed_error() {
        let registry = SourceRegistry::new();
        assert!(matches!(
            registry.get("nope"),
            Err(AppError::SourceNotFound(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_info_without_base_url_capability() {
        let source = NamedSource("custom");
        assert_eq!(source.base_url(), None);
        assert_eq!(
            source.info(),
            SourceInfo {
                name: "custom".into(),
                base_url: String::new()
            }
        );
    }

    #[test]
    fn test_list_sorted() {
        let registry = SourceRegistry::new();
        registry.register(Arc::new(NamedSource("gitlab"))).unwrap();
        registry.register(Arc::new(NamedSource("github"))).unwrap();
        let names: Vec<String> = registry.list().into_iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["github", "gitlab"]);
    }
}
