use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Billable third-party call recorded against a client session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ApiUsageLog {
    pub session_id: String,
    pub api: String,
    pub endpoint: String,
    pub units: i32,
    pub cost_usd: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl ApiUsageLog {
    pub fn new(
        session_id: impl Into<String>,
        api: impl Into<String>,
        endpoint: impl Into<String>,
        units: i32,
        unit_cost_usd: Decimal,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            api: api.into(),
            endpoint: endpoint.into(),
            units,
            cost_usd: unit_cost_usd * Decimal::from(units),
            timestamp: Utc::now(),
        }
    }
}
