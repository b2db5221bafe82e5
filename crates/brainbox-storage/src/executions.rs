//! Workflow execution history and idempotency claims.
//!
//! A run first claims its idempotency key; only the caller whose claim
//! inserted a row goes on to propose actions and record an execution. A run
//! that cannot be recorded releases its claim so the occurrence can be
//! delivered again.

use std::sync::Arc;

use rusqlite::OptionalExtension;
use uuid::Uuid;

use brainbox_core::error::Result;
use brainbox_core::types::{TenantId, Timestamp};
use brainbox_core::workflows::WorkflowExecution;

use crate::db::Database;
use crate::row::{self, sql_err};
use crate::workflows;

const EXECUTION_COLUMNS: &str = "id, tenant_id, workflow_id, status, trigger_snapshot,
     executed_actions, error_message, idempotency_key, timestamp";

pub struct ExecutionRepository {
    db: Arc<Database>,
}

impl ExecutionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Claim an idempotency key. Returns false if it was already claimed.
    pub fn claim(&self, tenant: &TenantId, key: &str) -> Result<bool> {
        self.db.with_conn(|conn| {
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO idempotency_claims (tenant_id, key, claimed_at)
                     VALUES (?1, ?2, ?3)",
                    rusqlite::params![tenant.as_str(), key, Timestamp::now().0],
                )
                .map_err(sql_err("Failed to claim idempotency key"))?;
            Ok(inserted > 0)
        })
    }

    /// Give up a claim taken by [`claim`](Self::claim). Returns false if
    /// there was none.
    pub fn release(&self, tenant: &TenantId, key: &str) -> Result<bool> {
        self.db.with_conn(|conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM idempotency_claims WHERE tenant_id = ?1 AND key = ?2",
                    rusqlite::params![tenant.as_str(), key],
                )
                .map_err(sql_err("Failed to release idempotency key"))?;
            Ok(deleted > 0)
        })
    }

    /// Record an execution and count it against its workflow, in one
    /// transaction. A second row with the same idempotency key is ignored
    /// and leaves the counter alone; returns whether this row was stored.
    pub fn record(&self, execution: &WorkflowExecution) -> Result<bool> {
        let trigger_snapshot = serde_json::to_string(&execution.trigger_snapshot)?;
        let executed_actions = serde_json::to_string(&execution.executed_actions)?;
        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(sql_err("Failed to begin execution transaction"))?;
            let inserted = tx
                .execute(
                    "INSERT OR IGNORE INTO workflow_executions
                        (id, tenant_id, workflow_id, status, trigger_snapshot, executed_actions,
                         error_message, idempotency_key, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    rusqlite::params![
                        execution.id.to_string(),
                        execution.tenant_id.as_str(),
                        execution.workflow_id.to_string(),
                        execution.status.to_string(),
                        trigger_snapshot,
                        executed_actions,
                        execution.error_message,
                        execution.idempotency_key,
                        execution.timestamp.0,
                    ],
                )
                .map_err(sql_err("Failed to record workflow execution"))?;
            if inserted > 0 {
                workflows::record_run(&tx, &execution.tenant_id, execution.workflow_id)?;
            }
            tx.commit().map_err(sql_err("Failed to commit workflow execution"))?;
            Ok(inserted > 0)
        })
    }

    pub fn find_by_key(&self, tenant: &TenantId, key: &str) -> Result<Option<WorkflowExecution>> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM workflow_executions WHERE tenant_id = ?1 AND idempotency_key = ?2",
                EXECUTION_COLUMNS
            );
            conn.query_row(&sql, rusqlite::params![tenant.as_str(), key], |row| {
                Ok(row_to_execution(row))
            })
            .optional()
            .map_err(sql_err("Failed to load workflow execution"))?
            .transpose()
        })
    }

    /// Executions of one workflow, newest first.
    pub fn list_for_workflow(
        &self,
        tenant: &TenantId,
        workflow_id: Uuid,
        limit: u32,
    ) -> Result<Vec<WorkflowExecution>> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM workflow_executions
                 WHERE tenant_id = ?1 AND workflow_id = ?2
                 ORDER BY timestamp DESC, rowid DESC
                 LIMIT ?3",
                EXECUTION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(sql_err("Executions query prepare"))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![tenant.as_str(), workflow_id.to_string(), limit],
                    |row| Ok(row_to_execution(row)),
                )
                .map_err(sql_err("Executions query"))?;
            row::collect(rows)
        })
    }

    pub fn count(&self, tenant: &TenantId) -> Result<u64> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM workflow_executions WHERE tenant_id = ?1",
                    rusqlite::params![tenant.as_str()],
                    |row| row.get(0),
                )
                .map_err(sql_err("Executions count"))?;
            Ok(count as u64)
        })
    }
}

fn row_to_execution(row: &rusqlite::Row<'_>) -> Result<WorkflowExecution> {
    Ok(WorkflowExecution {
        id: row::uuid(row, 0)?,
        tenant_id: TenantId(row::get(row, 1)?),
        workflow_id: row::uuid(row, 2)?,
        status: row::parsed(row, 3)?,
        trigger_snapshot: row::json(row, 4)?,
        executed_actions: row::json(row, 5)?,
        error_message: row::get(row, 6)?,
        idempotency_key: row::get(row, 7)?,
        timestamp: row::timestamp(row, 8)?,
    })
}
