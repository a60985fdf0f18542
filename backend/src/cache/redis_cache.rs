//! Redis-backed cache shared by every gateway replica.
//!
//! Values are JSON-encoded; TTLs are applied with `SET .. EX`.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};

use super::Cache;
use crate::error::{AppError, Result};
use crate::models::project::Project;

const SCAN_BATCH: usize = 200;

/// Connection settings for [`RedisCache`].
#[derive(Debug, Clone)]
pub struct RedisCacheConfig {
    pub url: String,
    /// Namespace prepended to every key.
    pub key_prefix: String,
}

pub struct RedisCache {
    conn: ConnectionManager,
    prefix: String,
}

fn cache_err(e: redis::RedisError) -> AppError {
    AppError::Cache(e.to_string())
}

/// Seconds for `EX`; Redis rejects zero.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl RedisCache {
    pub async fn connect(config: RedisCacheConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| AppError::Config(format!("invalid REDIS_URL: {}", e)))?;
        let conn = ConnectionManager::new(client).await.map_err(cache_err)?;
        tracing::info!(prefix = %config.key_prefix, "Connected to Redis cache");
        Ok(Self {
            conn,
            prefix: config.key_prefix,
        })
    }

    fn project_key(&self, alias: &str) -> String {
        format!("{}project:{}", self.prefix, alias)
    }

    fn versions_key(&self, alias: &str) -> String {
        format!("{}versions:{}", self.prefix, alias)
    }

    fn aggregate_key(&self) -> String {
        format!("{}aggregate_manifest", self.prefix)
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await.map_err(cache_err)?;
        raw.map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| AppError::Cache(format!("corrupt entry {}: {}", key, e)))
    }

    async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let payload =
            serde_json::to_string(value).map_err(|e| AppError::Cache(e.to_string()))?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, payload, ttl_secs(ttl))
            .await
            .map_err(cache_err)
    }

    async fn delete_keys(&self, keys: Vec<String>) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(keys).await.map_err(cache_err)
    }

    /// Every key under this cache's prefix, via cursor-based `SCAN`.
    async fn scan_prefixed_keys(&self) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}*", self.prefix);
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await
                .map_err(cache_err)?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(keys)
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get_project(&self, alias: &str) -> Result<Option<Project>> {
        self.get_json(&self.project_key(alias)).await
    }

    async fn set_project(&self, alias: &str, project: &Project, ttl: Duration) -> Result<()> {
        self.set_json(&self.project_key(alias), project, ttl).await
    }

    async fn delete_project(&self, alias: &str) -> Result<()> {
        self.delete_keys(vec![self.project_key(alias), self.versions_key(alias)])
            .await
    }

    async fn get_versions(&self, alias: &str) -> Result<Option<Vec<String>>> {
        self.get_json(&self.versions_key(alias)).await
    }

    async fn set_versions(&self, alias: &str, versions: &[String], ttl: Duration) -> Result<()> {
        self.set_json(&self.versions_key(alias), versions, ttl).await
    }

    async fn get_aggregate_manifest(&self) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(self.aggregate_key()).await.map_err(cache_err)
    }

    async fn set_aggregate_manifest(&self, manifest: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(self.aggregate_key(), manifest, ttl_secs(ttl))
            .await
            .map_err(cache_err)
    }

    async fn delete_aggregate_manifest(&self) -> Result<()> {
        self.delete_keys(vec![self.aggregate_key()]).await
    }

    async fn clear(&self) -> Result<()> {
        let keys = self.scan_prefixed_keys().await?;
        tracing::debug!(count = keys.len(), "Clearing Redis cache keys");
        self.delete_keys(keys).await
    }

    fn cache_type(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_secs_never_zero() {
        assert_eq!(ttl_secs(Duration::from_millis(10)), 1);
        assert_eq!(ttl_secs(Duration::from_secs(300)), 300);
    }

    // Requires a running Redis; run with:
    //   REDIS_URL=redis://127.0.0.1:6379 cargo test -- --ignored redis
    #[tokio::test]
    #[ignore]
    async fn test_redis_project_and_clear() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let cache = RedisCache::connect(RedisCacheConfig {
            url,
            key_prefix: format!("pkg-gateway-test-{}:", uuid::Uuid::new_v4()),
        })
        .await
        .unwrap();

        let project = Project::new("p", "https://gitlab.example.com/org/p", "gitlab");
        cache
            .set_project("p", &project, Duration::from_secs(30))
            .await
            .unwrap();
        cache
            .set_versions("p", &["1.0.0".to_string()], Duration::from_secs(30))
            .await
            .unwrap();
        assert_eq!(cache.get_project("p").await.unwrap().unwrap().alias, "p");

        cache.clear().await.unwrap();
        assert!(cache.get_project("p").await.unwrap().is_none());
        assert!(cache.get_versions("p").await.unwrap().is_none());
    }
}
