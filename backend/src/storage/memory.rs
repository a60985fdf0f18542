//! In-process project store.
//!
//! Projects and the catalog version live under one lock, so a mutation and
//! its catalog bump are observed together or not at all.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::ProjectStore;
use crate::error::{AppError, Result};
use crate::models::catalog_version::{CatalogBump, CatalogVersion};
use crate::models::project::Project;

#[derive(Default)]
struct State {
    projects: HashMap<String, Project>,
    catalog: CatalogVersion,
}

#[derive(Default)]
pub struct MemoryProjectStore {
    state: RwLock<State>,
}

impl MemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn get_project(&self, alias: &str) -> Result<Option<Project>> {
        Ok(self.state.read().await.projects.get(alias).cloned())
    }

    async fn get_project_by_repo_url(&self, repo_url: &str) -> Result<Option<Project>> {
        let state = self.state.read().await;
        Ok(state
            .projects
            .values()
            .find(|p| p.repo_url == repo_url)
            .cloned())
    }

    async fn create_project(&self, project: &Project) -> Result<Project> {
        let mut state = self.state.write().await;
        if state.projects.contains_key(&project.alias) {
            return Err(AppError::Conflict(format!(
                "project {} already exists",
                project.alias
            )));
        }
        let now = Utc::now();
        let stored = Project {
            token: None,
            created_at: now,
            updated_at: now,
            ..project.clone()
        };
        state.projects.insert(stored.alias.clone(), stored.clone());
        state.catalog = state.catalog.bumped(CatalogBump::Minor);
        Ok(stored)
    }

    async fn update_project(&self, alias: &str, project: &Project) -> Result<Project> {
        let mut state = self.state.write().await;
        let existing = state
            .projects
            .get_mut(alias)
            .ok_or_else(|| AppError::ProjectNotFound(alias.to_string()))?;
        existing.repo_url = project.repo_url.clone();
        existing.encrypted_token = project.encrypted_token.clone();
        existing.description = project.description.clone();
        existing.source_name = project.source_name.clone();
        existing.updated_at = Utc::now();
        let updated = existing.clone();
        state.catalog = state.catalog.bumped(CatalogBump::Patch);
        Ok(updated)
    }

    async fn delete_project(&self, alias: &str) -> Result<()> {
        let mut state = self.state.write().await;
        if state.projects.remove(alias).is_none() {
            return Err(AppError::ProjectNotFound(alias.to_string()));
        }
        state.catalog = state.catalog.bumped(CatalogBump::Major);
        Ok(())
    }

    async fn list_projects(&self, limit: i64, offset: i64) -> Result<(Vec<Project>, i64)> {
        let state = self.state.read().await;
        let mut all: Vec<Project> = state.projects.values().cloned().collect();
        all.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.alias.cmp(&b.alias))
        });
        let total = all.len() as i64;
        let page = all
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect();
        Ok((page, total))
    }

    async fn get_catalog_version(&self) -> Result<CatalogVersion> {
        Ok(self.state.read().await.catalog)
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}
