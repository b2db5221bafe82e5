//! Token usage accounting.

use std::sync::Arc;

use serde::Serialize;

use brainbox_core::error::Result;
use brainbox_core::types::{TenantId, Timestamp, TokenUsage};

use crate::db::Database;
use crate::row::sql_err;

/// Aggregate usage for a tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    pub calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

pub struct UsageRepository {
    db: Arc<Database>,
}

impl UsageRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn record(&self, tenant: &TenantId, usage: &TokenUsage) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO token_usage
                    (tenant_id, provider, model, input_tokens, output_tokens, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    tenant.as_str(),
                    usage.provider,
                    usage.model,
                    usage.input_tokens as i64,
                    usage.output_tokens as i64,
                    Timestamp::now().0,
                ],
            )
            .map_err(sql_err("Failed to record token usage"))?;
            Ok(())
        })
    }

    pub fn totals(&self, tenant: &TenantId) -> Result<UsageTotals> {
        self.db.with_conn(|conn| {
            let (calls, input, output): (i64, i64, i64) = conn
                .query_row(
                    "SELECT COUNT(*), COALESCE(SUM(input_tokens), 0), COALESCE(SUM(output_tokens), 0)
                     FROM token_usage WHERE tenant_id = ?1",
                    rusqlite::params![tenant.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .map_err(sql_err("Usage totals"))?;
            Ok(UsageTotals {
                calls: calls as u64,
                input_tokens: input as u64,
                output_tokens: output as u64,
            })
        })
    }
}
