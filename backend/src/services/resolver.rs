//! Alias → project resolution, cache first.

use std::sync::Arc;

use crate::cache::{Cache, PROJECT_TTL};
use crate::error::{AppError, Result};
use crate::models::project::Project;
use crate::services::encryption::TokenCipher;
use crate::storage::ProjectStore;

/// Turns an alias into a project carrying a plaintext token.
///
/// Cached entries already hold the decrypted token. Storage hits are
/// decrypted and cached before being returned; a decryption failure is
/// returned to the caller and nothing is cached.
pub struct ProjectResolver {
    storage: Arc<dyn ProjectStore>,
    cache: Arc<dyn Cache>,
    cipher: Option<Arc<dyn TokenCipher>>,
}

impl ProjectResolver {
    pub fn new(
        storage: Arc<dyn ProjectStore>,
        cache: Arc<dyn Cache>,
        cipher: Option<Arc<dyn TokenCipher>>,
    ) -> Self {
        Self {
            storage,
            cache,
            cipher,
        }
    }

    pub async fn resolve_project(&self, alias: &str) -> Result<Option<Project>> {
        match self.cache.get_project(alias).await {
            Ok(Some(project)) => {
                metrics::counter!("gateway_cache_hits_total", "kind" => "project").increment(1);
                return Ok(Some(project));
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(alias = %alias, error = %e, "Project cache read failed");
            }
        }
        metrics::counter!("gateway_cache_misses_total", "kind" => "project").increment(1);

        let Some(mut project) = self.storage.get_project(alias).await? else {
            return Ok(None);
        };

        if let Some(sealed) = project.encrypted_token.take().filter(|t| !t.is_empty()) {
            let cipher = self.cipher.as_ref().ok_or_else(|| {
                AppError::Crypto(format!(
                    "project {} has an encrypted token but no encryption key is configured",
                    alias
                ))
            })?;
            let token = cipher.decrypt_string(&sealed).map_err(|e| {
                AppError::Crypto(format!("failed to decrypt token of project {}: {}", alias, e))
            })?;
            project.token = Some(token);
        }

        if let Err(e) = self.cache.set_project(alias, &project, PROJECT_TTL).await {
            tracing::warn!(alias = %alias, error = %e, "Project cache write failed");
        }

        Ok(Some(project))
    }

    /// Drop the cached project and version list for `alias`. Best-effort.
    pub async fn invalidate(&self, alias: &str) {
        if let Err(e) = self.cache.delete_project(alias).await {
            tracing::warn!(alias = %alias, error = %e, "Cache invalidation failed");
        }
    }

    /// Drop every cached entry. Best-effort.
    pub async fn clear(&self) {
        if let Err(e) = self.cache.clear().await {
            tracing::warn!(error = %e, "Cache clear failed");
        }
    }
}
