//! Append-only classification audit log.

use std::sync::Arc;

use brainbox_core::error::Result;
use brainbox_core::types::{AuditRecord, TenantId};

use crate::db::Database;
use crate::row::{self, sql_err};

pub struct AuditRepository {
    db: Arc<Database>,
}

impl AuditRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append one record. There is no update or delete.
    pub fn append(&self, record: &AuditRecord) -> Result<()> {
        let parsed = record
            .parsed_result
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO audit_log
                    (id, tenant_id, input_text, provider, model, prompt, raw_response,
                     parsed_result, status, error_message, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    record.id.to_string(),
                    record.tenant_id.as_str(),
                    record.input_text,
                    record.provider,
                    record.model,
                    record.prompt,
                    record.raw_response,
                    parsed,
                    record.status.to_string(),
                    record.error_message,
                    record.timestamp.0,
                ],
            )
            .map_err(sql_err("Failed to append audit record"))?;
            Ok(())
        })
    }

    /// Most recent records first.
    pub fn recent(&self, tenant: &TenantId, limit: u32) -> Result<Vec<AuditRecord>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, tenant_id, input_text, provider, model, prompt, raw_response,
                            parsed_result, status, error_message, timestamp
                     FROM audit_log
                     WHERE tenant_id = ?1
                     ORDER BY timestamp DESC, rowid DESC
                     LIMIT ?2",
                )
                .map_err(sql_err("Audit query prepare"))?;
            let rows = stmt
                .query_map(rusqlite::params![tenant.as_str(), limit], |row| {
                    Ok(row_to_audit(row))
                })
                .map_err(sql_err("Audit query"))?;
            row::collect(rows)
        })
    }

    pub fn count(&self, tenant: &TenantId) -> Result<u64> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM audit_log WHERE tenant_id = ?1",
                    rusqlite::params![tenant.as_str()],
                    |row| row.get(0),
                )
                .map_err(sql_err("Audit count"))?;
            Ok(count as u64)
        })
    }
}

fn row_to_audit(row: &rusqlite::Row<'_>) -> Result<AuditRecord> {
    Ok(AuditRecord {
        id: row::uuid(row, 0)?,
        tenant_id: TenantId(row::get(row, 1)?),
        input_text: row::get(row, 2)?,
        provider: row::get(row, 3)?,
        model: row::get(row, 4)?,
        prompt: row::get(row, 5)?,
        raw_response: row::get(row, 6)?,
        parsed_result: row::opt_json(row, 7)?,
        status: row::parsed(row, 8)?,
        error_message: row::get(row, 9)?,
        timestamp: row::timestamp(row, 10)?,
    })
}
