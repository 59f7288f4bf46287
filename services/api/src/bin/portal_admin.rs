//! services/api/src/bin/portal_admin.rs

use api_lib::{
    adapters::{LocalObjectStorage, PgDatabase, PgIdentityProvider},
    cli::{self, Backend, Cli},
    config::Config,
    error::ApiError,
};
use chrono::Duration;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    let args = Cli::parse();

    // --- 1. Load Configuration & Set Up Logging (to stderr; stdout carries JSON) ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // --- 2. Connect to the Backend ---
    let db_pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&config.database_url)
        .await?;
    let backend = Backend {
        db: Arc::new(PgDatabase::new(db_pool.clone())),
        identity: Arc::new(PgIdentityProvider::new(
            db_pool,
            Duration::days(config.session_ttl_days),
        )),
        storage: Arc::new(LocalObjectStorage::new(
            config.storage_root.clone(),
            config.public_base_url.clone(),
        )),
    };

    // --- 3. Run the Command ---
    let mut stdout = std::io::stdout().lock();
    cli::run(args, backend, &mut stdout)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}
