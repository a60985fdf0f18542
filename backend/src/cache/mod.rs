//! Disposable cache for resolved projects, version lists, and the aggregate
//! manifest.
//!
//! The cache never owns truth: every failure is recovered by callers by
//! falling through to storage or the backend.

pub mod memory;
pub mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::project::Project;

pub use memory::MemoryCache;
pub use redis_cache::{RedisCache, RedisCacheConfig};

/// TTL for resolved projects.
pub const PROJECT_TTL: Duration = Duration::from_secs(60 * 60);

/// TTL for backend version lists.
pub const VERSIONS_TTL: Duration = Duration::from_secs(5 * 60);

/// TTL-based key/value cache contract.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Resolved project with a plaintext token.
    async fn get_project(&self, alias: &str) -> Result<Option<Project>>;

    async fn set_project(&self, alias: &str, project: &Project, ttl: Duration) -> Result<()>;

    /// Remove the project entry and its version list.
    async fn delete_project(&self, alias: &str) -> Result<()>;

    async fn get_versions(&self, alias: &str) -> Result<Option<Vec<String>>>;

    async fn set_versions(&self, alias: &str, versions: &[String], ttl: Duration) -> Result<()>;

    async fn get_aggregate_manifest(&self) -> Result<Option<String>>;

    async fn set_aggregate_manifest(&self, manifest: &str, ttl: Duration) -> Result<()>;

    async fn delete_aggregate_manifest(&self) -> Result<()>;

    /// Drop every entry.
    async fn clear(&self) -> Result<()>;

    /// Human-readable backend name
    fn cache_type(&self) -> &'static str;
}
