//! In-process cache backed by tokio `RwLock`-guarded maps.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;

use super::Cache;
use crate::error::Result;
use crate::models::project::Project;

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    expires_at: Instant,
}

impl<T: Clone> Entry<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    /// Expired entries read as absent; they are overwritten or cleared later.
    fn live(&self) -> Option<T> {
        (Instant::now() < self.expires_at).then(|| self.value.clone())
    }
}

/// Single-node cache. Expiry is lazy.
#[derive(Default)]
pub struct MemoryCache {
    projects: RwLock<HashMap<String, Entry<Project>>>,
    versions: RwLock<HashMap<String, Entry<Vec<String>>>>,
    aggregate: RwLock<Option<Entry<String>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get_project(&self, alias: &str) -> Result<Option<Project>> {
        Ok(self.projects.read().await.get(alias).and_then(Entry::live))
    }

    async fn set_project(&self, alias: &str, project: &Project, ttl: Duration) -> Result<()> {
        self.projects
            .write()
            .await
            .insert(alias.to_string(), Entry::new(project.clone(), ttl));
        Ok(())
    }

    async fn delete_project(&self, alias: &str) -> Result<()> {
        self.projects.write().await.remove(alias);
        self.versions.write().await.remove(alias);
        Ok(())
    }

    async fn get_versions(&self, alias: &str) -> Result<Option<Vec<String>>> {
        Ok(self.versions.read().await.get(alias).and_then(Entry::live))
    }

    async fn set_versions(&self, alias: &str, versions: &[String], ttl: Duration) -> Result<()> {
        self.versions
            .write()
            .await
            .insert(alias.to_string(), Entry::new(versions.to_vec(), ttl));
        Ok(())
    }

    async fn get_aggregate_manifest(&self) -> Result<Option<String>> {
        Ok(self.aggregate.read().await.as_ref().and_then(Entry::live))
    }

    async fn set_aggregate_manifest(&self, manifest: &str, ttl: Duration) -> Result<()> {
        *self.aggregate.write().await = Some(Entry::new(manifest.to_string(), ttl));
        Ok(())
    }

    async fn delete_aggregate_manifest(&self) -> Result<()> {
        *self.aggregate.write().await = None;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.projects.write().await.clear();
        self.versions.write().await.clear();
        *self.aggregate.write().await = None;
        Ok(())
    }

    fn cache_type(&self) -> &'static str {
        "memory"
    }
}
