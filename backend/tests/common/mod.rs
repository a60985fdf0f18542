//! Shared fixtures for integration tests: an in-memory package source and
//! engine builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http;

use package_gateway_backend::cache::MemoryCache;
use package_gateway_backend::error::{AppError, Result};
use package_gateway_backend::models::manifest::{Manifest, Package, PlatformDownload};
use package_gateway_backend::models::project::Project;
use package_gateway_backend::services::encryption::AesGcmCipher;
use package_gateway_backend::services::engine::GatewayEngine;
use package_gateway_backend::services::gitlab_client::{GitLabClient, GitLabConfig};
use package_gateway_backend::services::source_registry::{ParsedFileUrl, Source, SourceRegistry};
use package_gateway_backend::storage::MemoryProjectStore;

pub const GITLAB: &str = "https://gitlab.example.com";
pub const BASE_URL: &str = "https://proxy.example.com/pkgs";

/// Backend download URL in GitLab generic-package shape.
pub fn gitlab_file_url(version: &str, filename: &str) -> String {
    format!(
        "{}/api/v4/projects/42/packages/generic/release/{}/{}",
        GITLAB, version, filename
    )
}

/// Manifest with a single package downloading `urls`.
pub fn manifest_with_downloads(version: &str, urls: &[&str]) -> Manifest {
    Manifest {
        version: version.to_string(),
        packages: vec![Package {
            name: "app".to_string(),
            downloads: urls
                .iter()
                .map(|u| PlatformDownload {
                    os: "linux".to_string(),
                    arch: "amd64".to_string(),
                    url: u.to_string(),
                })
                .collect(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// In-memory source serving per-alias versions, manifests, and files.
///
/// URL recognition is delegated to a real GitLab client so that rewriting
/// is exercised against the genuine download-URL shape.
pub struct StubSource {
    parser: GitLabClient,
    versions: Mutex<HashMap<String, Vec<String>>>,
    versions_status: Mutex<Option<u16>>,
    manifests: Mutex<HashMap<(String, String), Manifest>>,
    files: Mutex<HashMap<(String, String, String), Vec<u8>>>,
    tokens_seen: Mutex<Vec<Option<String>>>,
    pub version_calls: AtomicUsize,
    pub manifest_calls: AtomicUsize,
}

impl StubSource {
    pub fn new() -> Self {
        Self {
            parser: GitLabClient::new(GitLabConfig::new(GITLAB)).expect("gitlab parser"),
            versions: Mutex::new(HashMap::new()),
            versions_status: Mutex::new(None),
            manifests: Mutex::new(HashMap::new()),
            files: Mutex::new(HashMap::new()),
            tokens_seen: Mutex::new(Vec::new()),
            version_calls: AtomicUsize::new(0),
            manifest_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_versions(&self, alias: &str, versions: &[&str]) {
        self.versions.lock().unwrap().insert(
            alias.to_string(),
            versions.iter().map(|v| v.to_string()).collect(),
        );
    }

    /// Make every version listing fail with `status`.
    pub fn fail_versions(&self, status: u16) {
        *self.versions_status.lock().unwrap() = Some(status);
    }

    pub fn set_manifest(&self, alias: &str, version: &str, manifest: Manifest) {
        self.manifests
            .lock()
            .unwrap()
            .insert((alias.to_string(), version.to_string()), manifest);
    }

    pub fn set_file(&self, alias: &str, version: &str, filename: &str, body: &[u8]) {
        self.files.lock().unwrap().insert(
            (alias.to_string(), version.to_string(), filename.to_string()),
            body.to_vec(),
        );
    }

    pub fn tokens_seen(&self) -> Vec<Option<String>> {
        self.tokens_seen.lock().unwrap().clone()
    }

    fn record_token(&self, project: &Project) {
        self.tokens_seen
            .lock()
            .unwrap()
            .push(project.token().map(str::to_string));
    }
}

#[async_trait]
impl Source for StubSource {
    fn name(&self) -> &str {
        "gitlab"
    }

    fn base_url(&self) -> Option<&str> {
        Some(GITLAB)
    }

    fn parse_file_url(&self, url: &str) -> Option<ParsedFileUrl> {
        self.parser.parse_file_url(url)
    }

    async fn get_manifest(&self, project: &Project, version: &str) -> Result<Manifest> {
        self.manifest_calls.fetch_add(1, Ordering::SeqCst);
        self.record_token(project);
        self.manifests
            .lock()
            .unwrap()
            .get(&(project.alias.clone(), version.to_string()))
            .cloned()
            .ok_or_else(|| AppError::upstream("gitlab", 404))
    }

    async fn get_file_response(
        &self,
        project: &Project,
        version: &str,
        filename: &str,
    ) -> Result<reqwest::Response> {
        self.record_token(project);
        let body = self
            .files
            .lock()
            .unwrap()
            .get(&(
                project.alias.clone(),
                version.to_string(),
                filename.to_string(),
            ))
            .cloned()
            .ok_or_else(|| AppError::upstream("gitlab", 404))?;
        let response = http::Response::builder()
            .status(200)
            .header("content-type", "application/gzip")
            .header("etag", "\"stub-etag\"")
            .header("x-internal", "hidden")
            .body(body)
            .expect("response");
        Ok(reqwest::Response::from(response))
    }

    async fn get_versions(&self, project: &Project) -> Result<Vec<String>> {
        self.version_calls.fetch_add(1, Ordering::SeqCst);
        self.record_token(project);
        if let Some(status) = *self.versions_status.lock().unwrap() {
            return Err(AppError::upstream("gitlab", status));
        }
        Ok(self
            .versions
            .lock()
            .unwrap()
            .get(&project.alias)
            .cloned()
            .unwrap_or_default())
    }
}

/// Engine wired to in-memory storage and cache plus a stub source.
pub struct Harness {
    pub engine: GatewayEngine,
    pub source: Arc<StubSource>,
    pub storage: Arc<MemoryProjectStore>,
    pub cache: Arc<MemoryCache>,
}

pub fn harness() -> Harness {
    let source = Arc::new(StubSource::new());
    let storage = Arc::new(MemoryProjectStore::new());
    let cache = Arc::new(MemoryCache::new());
    let registry = SourceRegistry::new();
    registry.register(source.clone()).expect("register stub");

    let cipher = AesGcmCipher::from_passphrase("integration-tests").expect("cipher");
    let engine = GatewayEngine::new(storage.clone(), cache.clone(), Arc::new(registry))
        .with_cipher(Arc::new(cipher));

    Harness {
        engine,
        source,
        storage,
        cache,
    }
}
