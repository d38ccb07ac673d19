//! MDP Engine - Main entry point

use anyhow::Result;
use mdp_common::logging::{init_logging, LogConfig};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

use mdp_engine::auth::PgCredentialResolver;
use mdp_engine::bronze::PgBronzeStore;
use mdp_engine::config::EngineConfig;
use mdp_engine::http::RetryingInvoker;
use mdp_engine::pipeline::PipelineOrchestrator;
use mdp_engine::scheduler::{JobScheduler, SchedulerContext};
use mdp_engine::silver::PgSilverStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with configuration from environment, falling back
    // to sensible engine defaults.
    let log_config = LogConfig::from_env().unwrap_or_else(|_| LogConfig {
        log_file_prefix: "mdp-engine".to_string(),
        filter_directives: Some("mdp_engine=debug,sqlx=info".to_string()),
        ..LogConfig::default()
    });

    init_logging(&log_config)?;

    info!("Starting MDP Engine");

    // Load configuration
    let config = EngineConfig::load()?;
    info!(
        worker_count = config.scheduler.worker_count,
        "Configuration loaded"
    );

    // Initialize database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .connect(&config.database.url)
        .await?;

    info!("Database connection pool established");

    // Run migrations
    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

    info!("Database migrations completed");

    // Wire the per-partition pipeline
    let invoker = RetryingInvoker::from_config(&config)?;
    let orchestrator = PipelineOrchestrator::new(
        Arc::new(PgBronzeStore::new(db_pool.clone())),
        Arc::new(PgSilverStore::new(db_pool.clone())),
        Arc::new(PgCredentialResolver::new(db_pool.clone())),
        invoker,
    );

    // Report targets are registered here by the deployment binary; the
    // engine itself ships none.
    let context = Arc::new(SchedulerContext::new(orchestrator, &config.scheduler));
    let shutdown = context.shutdown.clone();

    let scheduler = JobScheduler::new(config.scheduler.clone(), db_pool, context);
    let worker_handle = scheduler.start().await?;

    info!("MDP Engine started, waiting for jobs");

    signal::ctrl_c().await?;
    info!("Shutdown signal received, cancelling in-flight runs");
    shutdown.cancel();

    worker_handle.abort();
    info!("MDP Engine stopped");

    Ok(())
}
