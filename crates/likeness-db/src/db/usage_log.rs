//! API usage log repository

use anyhow::{Context, Result};
use sqlx::PgPool;

use likeness_core::models::ApiUsageLog;

#[derive(Clone)]
pub struct UsageLogRepository {
    pool: PgPool,
}

impl UsageLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[tracing::instrument(skip(self, log), fields(db.table = "api_usage_logs", db.operation = "insert", api = %log.api))]
    pub async fn insert(&self, log: &ApiUsageLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO api_usage_logs (session_id, api, endpoint, units, cost_usd, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&log.session_id)
        .bind(&log.api)
        .bind(&log.endpoint)
        .bind(log.units)
        .bind(log.cost_usd)
        .bind(log.timestamp)
        .execute(&self.pool)
        .await
        .context("Failed to record API usage")?;
        Ok(())
    }
}
