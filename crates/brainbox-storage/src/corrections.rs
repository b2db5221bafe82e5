//! Append-only correction store.
//!
//! Corrections are never merged or deduplicated; identical rows coexist.

use std::sync::Arc;

use rusqlite::Connection;
use uuid::Uuid;

use brainbox_core::error::Result;
use brainbox_core::types::{Correction, TenantId, Timestamp};

use crate::db::Database;
use crate::row::{self, sql_err};

const CORRECTION_COLUMNS: &str =
    "id, tenant_id, source_log_id, original_category, corrected_category, message_text, created_at";

pub struct CorrectionRepository {
    db: Arc<Database>,
}

impl CorrectionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn record(
        &self,
        tenant: &TenantId,
        source_log_id: Option<Uuid>,
        original_category: &str,
        corrected_category: &str,
        message_text: &str,
    ) -> Result<Correction> {
        self.db.with_conn(|conn| {
            insert(
                conn,
                tenant,
                source_log_id,
                original_category,
                corrected_category,
                message_text,
            )
        })
    }

    /// Up to `limit` corrections from the last `days_back` days, newest first.
    pub fn recent(&self, tenant: &TenantId, limit: u32, days_back: u32) -> Result<Vec<Correction>> {
        let cutoff = Timestamp::days_ago(days_back);
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM corrections
                 WHERE tenant_id = ?1 AND created_at >= ?2
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3",
                CORRECTION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(sql_err("Corrections query prepare"))?;
            let rows = stmt
                .query_map(rusqlite::params![tenant.as_str(), cutoff.0, limit], |row| {
                    Ok(row_to_correction(row))
                })
                .map_err(sql_err("Corrections query"))?;
            row::collect(rows)
        })
    }

    /// Corrections that moved captures into `category`, newest first.
    pub fn by_corrected_category(
        &self,
        tenant: &TenantId,
        category: &str,
        limit: u32,
    ) -> Result<Vec<Correction>> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM corrections
                 WHERE tenant_id = ?1 AND corrected_category = ?2
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3",
                CORRECTION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(sql_err("Corrections query prepare"))?;
            let rows = stmt
                .query_map(rusqlite::params![tenant.as_str(), category, limit], |row| {
                    Ok(row_to_correction(row))
                })
                .map_err(sql_err("Corrections query"))?;
            row::collect(rows)
        })
    }
}

pub(crate) fn insert(
    conn: &Connection,
    tenant: &TenantId,
    source_log_id: Option<Uuid>,
    original_category: &str,
    corrected_category: &str,
    message_text: &str,
) -> Result<Correction> {
    let correction = Correction {
        id: Uuid::new_v4(),
        tenant_id: tenant.clone(),
        source_log_id,
        original_category: original_category.to_string(),
        corrected_category: corrected_category.to_string(),
        message_text: message_text.to_string(),
        created_at: Timestamp::now(),
    };
    conn.execute(
        "INSERT INTO corrections
            (id, tenant_id, source_log_id, original_category, corrected_category,
             message_text, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            correction.id.to_string(),
            tenant.as_str(),
            source_log_id.map(|id| id.to_string()),
            correction.original_category,
            correction.corrected_category,
            correction.message_text,
            correction.created_at.0,
        ],
    )
    .map_err(sql_err("Failed to record correction"))?;
    Ok(correction)
}

fn row_to_correction(row: &rusqlite::Row<'_>) -> Result<Correction> {
    Ok(Correction {
        id: row::uuid(row, 0)?,
        tenant_id: TenantId(row::get(row, 1)?),
        source_log_id: row::opt_uuid(row, 2)?,
        original_category: row::get(row, 3)?,
        corrected_category: row::get(row, 4)?,
        message_text: row::get(row, 5)?,
        created_at: row::timestamp(row, 6)?,
    })
}
