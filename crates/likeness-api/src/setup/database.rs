//! Postgres pool and schema migrations.

use anyhow::{Context, Result};
use likeness_core::Config;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Identity, media item and usage log tables plus the `identity_changes` notify trigger.
static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

/// Connects the pool and brings the schema up to date.
pub async fn setup_database(config: &Config) -> Result<PgPool> {
    let max_connections = config.db_max_connections();
    tracing::info!(max_connections, "Connecting to database");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(config.db_timeout_seconds()))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(config.database_url())
        .await
        .context("Failed to connect to database")?;

    MIGRATOR
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!(
        migrations = MIGRATOR.iter().count(),
        "Database ready"
    );

    Ok(pool)
}
