//! PostgreSQL project store (sqlx).
//!
//! Each mutation and its catalog-version bump run in a single transaction;
//! the bump itself is a single-row upsert so a missing row is created on the
//! fly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use super::ProjectStore;
use crate::error::{AppError, Result};
use crate::models::catalog_version::{CatalogBump, CatalogVersion};
use crate::models::project::Project;

#[derive(Debug, sqlx::FromRow)]
struct ProjectRow {
    alias: String,
    repo_url: String,
    encrypted_token: Option<String>,
    description: String,
    source_name: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            alias: row.alias,
            repo_url: row.repo_url,
            token: None,
            encrypted_token: row.encrypted_token,
            description: row.description,
            source_name: row.source_name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CatalogRow {
    major: i32,
    minor: i32,
    patch: i32,
}

fn bump_sql(bump: CatalogBump) -> &'static str {
    match bump {
        CatalogBump::Minor => {
            r#"
            INSERT INTO catalog_version (id, major, minor, patch) VALUES (1, 1, 1, 0)
            ON CONFLICT (id) DO UPDATE
                SET minor = catalog_version.minor + 1, patch = 0
            "#
        }
        CatalogBump::Patch => {
            r#"
            INSERT INTO catalog_version (id, major, minor, patch) VALUES (1, 1, 0, 1)
            ON CONFLICT (id) DO UPDATE
                SET patch = catalog_version.patch + 1
            "#
        }
        CatalogBump::Major => {
            r#"
            INSERT INTO catalog_version (id, major, minor, patch) VALUES (1, 2, 0, 0)
            ON CONFLICT (id) DO UPDATE
                SET major = catalog_version.major + 1, minor = 0, patch = 0
            "#
        }
    }
}

async fn bump_catalog(tx: &mut Transaction<'_, Postgres>, bump: CatalogBump) -> Result<()> {
    sqlx::query(bump_sql(bump))
        .execute(&mut **tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
    Ok(())
}

pub struct PgProjectStore {
    db: PgPool,
}

impl PgProjectStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(db))
    }

    /// Apply the embedded migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for PgProjectStore {
    async fn get_project(&self, alias: &str) -> Result<Option<Project>> {
        let row: Option<ProjectRow> = sqlx::query_as(
            r#"
            SELECT alias, repo_url, encrypted_token, description, source_name,
                   created_at, updated_at
            FROM projects
            WHERE alias = $1
            "#,
        )
        .bind(alias)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.map(Project::from))
    }

    async fn get_project_by_repo_url(&self, repo_url: &str) -> Result<Option<Project>> {
        let row: Option<ProjectRow> = sqlx::query_as(
            r#"
            SELECT alias, repo_url, encrypted_token, description, source_name,
                   created_at, updated_at
            FROM projects
            WHERE repo_url = $1
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(repo_url)
        .fetch_optional(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row.map(Project::from))
    }

    async fn create_project(&self, project: &Project) -> Result<Project> {
        let mut tx = self.db.begin().await?;

        let row: ProjectRow = sqlx::query_as(
            r#"
            INSERT INTO projects (alias, repo_url, encrypted_token, description, source_name)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING alias, repo_url, encrypted_token, description, source_name,
                      created_at, updated_at
            "#,
        )
        .bind(&project.alias)
        .bind(&project.repo_url)
        .bind(&project.encrypted_token)
        .bind(&project.description)
        .bind(&project.source_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict(format!("project {} already exists", project.alias))
            }
            other => AppError::Database(other.to_string()),
        })?;

        bump_catalog(&mut tx, CatalogBump::Minor).await?;
        tx.commit().await?;

        Ok(row.into())
    }

    async fn update_project(&self, alias: &str, project: &Project) -> Result<Project> {
        let mut tx = self.db.begin().await?;

        let row: Option<ProjectRow> = sqlx::query_as(
            r#"
            UPDATE projects
            SET repo_url = $2, encrypted_token = $3, description = $4,
                source_name = $5, updated_at = NOW()
            WHERE alias = $1
            RETURNING alias, repo_url, encrypted_token, description, source_name,
                      created_at, updated_at
            "#,
        )
        .bind(alias)
        .bind(&project.repo_url)
        .bind(&project.encrypted_token)
        .bind(&project.description)
        .bind(&project.source_name)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let row = row.ok_or_else(|| AppError::ProjectNotFound(alias.to_string()))?;

        bump_catalog(&mut tx, CatalogBump::Patch).await?;
        tx.commit().await?;

        Ok(row.into())
    }

    async fn delete_project(&self, alias: &str) -> Result<()> {
        let mut tx = self.db.begin().await?;

        let result = sqlx::query("DELETE FROM projects WHERE alias = $1")
            .bind(alias)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(AppError::ProjectNotFound(alias.to_string()));
        }

        bump_catalog(&mut tx, CatalogBump::Major).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn list_projects(&self, limit: i64, offset: i64) -> Result<(Vec<Project>, i64)> {
        let rows: Vec<ProjectRow> = sqlx::query_as(
            r#"
            SELECT alias, repo_url, encrypted_token, description, source_name,
                   created_at, updated_at
            FROM projects
            ORDER BY created_at DESC, alias
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM projects")
            .fetch_one(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok((rows.into_iter().map(Project::from).collect(), total))
    }

    async fn get_catalog_version(&self) -> Result<CatalogVersion> {
        let row: Option<CatalogRow> =
            sqlx::query_as("SELECT major, minor, patch FROM catalog_version WHERE id = 1")
                .fetch_optional(&self.db)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(row
            .map(|r| CatalogVersion {
                major: r.major,
                minor: r.minor,
                patch: r.patch,
            })
            .unwrap_or_default())
    }

    fn store_type(&self) -> &'static str {
        "postgres"
    }
}
