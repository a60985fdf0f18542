//! Package gateway server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use package_gateway_backend::api::{build_router, AppState};
use package_gateway_backend::cache::{Cache, MemoryCache, RedisCache, RedisCacheConfig};
use package_gateway_backend::config::{Config, LogFormat};
use package_gateway_backend::services::encryption::{mask_sensitive, AesGcmCipher};
use package_gateway_backend::services::engine::GatewayEngine;
use package_gateway_backend::services::github_client::{GitHubClient, GitHubConfig};
use package_gateway_backend::services::gitlab_client::{GitLabClient, GitLabConfig};
use package_gateway_backend::services::source_registry::SourceRegistry;
use package_gateway_backend::storage::{MemoryProjectStore, PgProjectStore, ProjectStore};

#[derive(Parser)]
#[command(name = "package-gateway")]
#[command(author, version, about = "Package gateway for GitLab and GitHub release packages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Print a fresh base64 AES-256 key for TOKEN_ENCRYPTION_KEY
    GenerateKey,

    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::GenerateKey => {
            println!("{}", AesGcmCipher::generate_key());
            Ok(())
        }
        Commands::Migrate => {
            let config = Config::from_env()?;
            init_tracing(config.log_format);
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set to run migrations")?;
            let store = PgProjectStore::connect(database_url, 2).await?;
            store.migrate().await?;
            tracing::info!("Migrations applied");
            Ok(())
        }
        Commands::Serve => serve().await,
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let metrics_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    let storage = build_storage(&config).await?;
    let cache = build_cache(&config).await?;
    let sources = Arc::new(build_sources(&config)?);

    let mut engine = GatewayEngine::new(storage, cache, sources)
        .with_aggregate_ttl(config.aggregate_manifest_ttl);
    match config.token_encryption_key.as_deref() {
        Some(key) => {
            engine = engine.with_cipher(Arc::new(AesGcmCipher::from_config_value(key)?));
        }
        None => tracing::warn!(
            "TOKEN_ENCRYPTION_KEY not set; projects with tokens cannot be created"
        ),
    }
    if !config.admin_auth_configured() {
        tracing::warn!("No admin credentials configured; admin API is unauthenticated");
    }

    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!(
        address = %addr,
        public_base_url = %config.public_base_url,
        public_prefix = %config.public_prefix,
        storage = engine.storage_type(),
        cache = engine.cache_type(),
        "Starting package gateway"
    );

    let state = Arc::new(AppState::new(config, engine).with_metrics_handle(metrics_handle));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn build_storage(config: &Config) -> Result<Arc<dyn ProjectStore>> {
    match config.database_url.as_deref() {
        Some(url) => {
            let store = PgProjectStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; projects are kept in memory only");
            Ok(Arc::new(MemoryProjectStore::new()))
        }
    }
}

async fn build_cache(config: &Config) -> Result<Arc<dyn Cache>> {
    match config.redis_url.as_deref() {
        Some(url) => {
            let cache = RedisCache::connect(RedisCacheConfig {
                url: url.to_string(),
                key_prefix: config.redis_key_prefix.clone(),
            })
            .await?;
            Ok(Arc::new(cache))
        }
        None => Ok(Arc::new(MemoryCache::new())),
    }
}

fn build_sources(config: &Config) -> Result<SourceRegistry> {
    let registry = SourceRegistry::new();

    if let Some(base_url) = config.gitlab_base_url.as_deref() {
        let mut gitlab = GitLabConfig::new(base_url);
        gitlab.default_token = config.gitlab_token.clone();
        gitlab.timeout = config.upstream_timeout;
        if let Some(token) = gitlab.default_token.as_deref() {
            tracing::info!(token = %mask_sensitive(token), "GitLab default token configured");
        }
        registry.register(Arc::new(GitLabClient::new(gitlab)?))?;
    }

    if config.github_enabled {
        let github = GitHubConfig {
            web_url: config.github_web_url.clone(),
            api_url: config.github_api_url.clone(),
            default_token: config.github_token.clone(),
            timeout: config.upstream_timeout,
            ..Default::default()
        };
        if let Some(token) = github.default_token.as_deref() {
            tracing::info!(token = %mask_sensitive(token), "GitHub default token configured");
        }
        registry.register(Arc::new(GitHubClient::new(github)?))?;
    }

    if registry.list().is_empty() {
        tracing::warn!("No package sources configured; every project read will fail");
    }
    Ok(registry)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
