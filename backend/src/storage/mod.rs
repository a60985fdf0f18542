//! Persistence for projects and the catalog version.
//!
//! Every mutating call bumps the catalog version inside the same atomic unit
//! as the project write (create → minor, update → patch, delete → major). A
//! failed mutation leaves the catalog version untouched.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::catalog_version::CatalogVersion;
use crate::models::project::Project;

pub use memory::MemoryProjectStore;
pub use postgres::PgProjectStore;

/// Storage contract consumed by the resolver, engine, and transformer.
///
/// Projects cross this boundary with `token` empty and the secret, if any,
/// in `encrypted_token`.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get_project(&self, alias: &str) -> Result<Option<Project>>;

    /// Exact match on the normalized repository URL.
    async fn get_project_by_repo_url(&self, repo_url: &str) -> Result<Option<Project>>;

    /// Insert a new project; a taken alias yields `AppError::Conflict`.
    async fn create_project(&self, project: &Project) -> Result<Project>;

    /// Replace the mutable fields of an existing project.
    async fn update_project(&self, alias: &str, project: &Project) -> Result<Project>;

    async fn delete_project(&self, alias: &str) -> Result<()>;

    /// Page of projects, newest first, with the total count.
    async fn list_projects(&self, limit: i64, offset: i64) -> Result<(Vec<Project>, i64)>;

    async fn get_catalog_version(&self) -> Result<CatalogVersion>;

    /// Human-readable backend name
    fn store_type(&self) -> &'static str;
}
