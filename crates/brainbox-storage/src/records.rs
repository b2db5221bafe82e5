//! Category record repository.

use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use brainbox_core::error::Result;
use brainbox_core::types::{CategoryRecord, Fields, NewRecord, TenantId, Timestamp};

use crate::db::Database;
use crate::row::{self, sql_err};

const RECORD_COLUMNS: &str =
    "id, tenant_id, category, name, status, fields, capture_id, archived, created_at, updated_at";

/// Repository for filed category records.
pub struct RecordRepository {
    db: Arc<Database>,
}

impl RecordRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create a record with a fresh id.
    pub fn create(&self, tenant: &TenantId, new: &NewRecord) -> Result<CategoryRecord> {
        self.create_with_id(tenant, Uuid::new_v4(), new)
    }

    /// Create a record with a caller-chosen id.
    ///
    /// Action handlers use the action id so that a create can be undone
    /// without first knowing what it produced.
    pub fn create_with_id(
        &self,
        tenant: &TenantId,
        id: Uuid,
        new: &NewRecord,
    ) -> Result<CategoryRecord> {
        let record = build(tenant, id, new);
        self.put(&record)?;
        Ok(record)
    }

    /// Insert or fully replace a record. Used by create and by snapshot
    /// restoration.
    pub fn put(&self, record: &CategoryRecord) -> Result<()> {
        self.db.with_conn(|conn| insert(conn, record))
    }

    pub fn get(&self, tenant: &TenantId, id: Uuid) -> Result<Option<CategoryRecord>> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM records WHERE tenant_id = ?1 AND id = ?2",
                RECORD_COLUMNS
            );
            let result = conn
                .query_row(&sql, rusqlite::params![tenant.as_str(), id.to_string()], |row| {
                    Ok(row_to_record(row))
                })
                .optional()
                .map_err(sql_err("Failed to load record"))?;
            result.transpose()
        })
    }

    /// Merge `fields` into the record's fields. Returns the updated record,
    /// or `None` if it does not exist.
    pub fn update_fields(
        &self,
        tenant: &TenantId,
        id: Uuid,
        name: Option<&str>,
        fields: &Fields,
    ) -> Result<Option<CategoryRecord>> {
        let Some(mut record) = self.get(tenant, id)? else {
            return Ok(None);
        };
        for (key, value) in fields {
            record.fields.insert(key.clone(), value.clone());
        }
        if let Some(name) = name {
            record.name = name.to_string();
        }
        record.updated_at = Timestamp::now();
        self.put(&record)?;
        Ok(Some(record))
    }

    /// Returns false if the record does not exist.
    pub fn set_status(&self, tenant: &TenantId, id: Uuid, status: &str) -> Result<bool> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE records SET status = ?3, updated_at = ?4
                     WHERE tenant_id = ?1 AND id = ?2",
                    rusqlite::params![tenant.as_str(), id.to_string(), status, Timestamp::now().0],
                )
                .map_err(sql_err("Failed to set record status"))?;
            Ok(changed > 0)
        })
    }

    /// Returns false if the record does not exist.
    pub fn set_archived(&self, tenant: &TenantId, id: Uuid, archived: bool) -> Result<bool> {
        self.db.with_conn(|conn| set_archived(conn, tenant, id, archived))
    }

    pub fn delete(&self, tenant: &TenantId, id: Uuid) -> Result<bool> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "DELETE FROM records WHERE tenant_id = ?1 AND id = ?2",
                    rusqlite::params![tenant.as_str(), id.to_string()],
                )
                .map_err(sql_err("Failed to delete record"))?;
            Ok(changed > 0)
        })
    }

    /// Non-archived records in a category, newest first.
    pub fn list_by_category(
        &self,
        tenant: &TenantId,
        category: &str,
        limit: u32,
    ) -> Result<Vec<CategoryRecord>> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM records
                 WHERE tenant_id = ?1 AND category = ?2 AND archived = 0
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3",
                RECORD_COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(sql_err("Records query prepare"))?;
            let rows = stmt
                .query_map(rusqlite::params![tenant.as_str(), category, limit], |row| {
                    Ok(row_to_record(row))
                })
                .map_err(sql_err("Records query"))?;
            row::collect(rows)
        })
    }

    pub fn count(&self, tenant: &TenantId) -> Result<u64> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM records WHERE tenant_id = ?1",
                    rusqlite::params![tenant.as_str()],
                    |row| row.get(0),
                )
                .map_err(sql_err("Records count"))?;
            Ok(count as u64)
        })
    }
}

/// A fresh, unarchived record built from `new`.
pub(crate) fn build(tenant: &TenantId, id: Uuid, new: &NewRecord) -> CategoryRecord {
    let now = Timestamp::now();
    CategoryRecord {
        id,
        tenant_id: tenant.clone(),
        category: new.category.clone(),
        name: new.name.clone(),
        status: new.status.clone(),
        fields: new.fields.clone(),
        capture_id: new.capture_id,
        archived: false,
        created_at: now,
        updated_at: now,
    }
}

pub(crate) fn insert(conn: &Connection, record: &CategoryRecord) -> Result<()> {
    let fields = serde_json::to_string(&record.fields)?;
    conn.execute(
        "INSERT OR REPLACE INTO records
            (id, tenant_id, category, name, status, fields, capture_id, archived, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        rusqlite::params![
            record.id.to_string(),
            record.tenant_id.as_str(),
            record.category,
            record.name,
            record.status,
            fields,
            record.capture_id.map(|id| id.to_string()),
            record.archived as i32,
            record.created_at.0,
            record.updated_at.0,
        ],
    )
    .map_err(sql_err("Failed to save record"))?;
    Ok(())
}

pub(crate) fn set_archived(
    conn: &Connection,
    tenant: &TenantId,
    id: Uuid,
    archived: bool,
) -> Result<bool> {
    let changed = conn
        .execute(
            "UPDATE records SET archived = ?3, updated_at = ?4
             WHERE tenant_id = ?1 AND id = ?2",
            rusqlite::params![tenant.as_str(), id.to_string(), archived as i32, Timestamp::now().0],
        )
        .map_err(sql_err("Failed to archive record"))?;
    Ok(changed > 0)
}

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<CategoryRecord> {
    let archived: i32 = row::get(row, 7)?;
    Ok(CategoryRecord {
        id: row::uuid(row, 0)?,
        tenant_id: TenantId(row::get(row, 1)?),
        category: row::get(row, 2)?,
        name: row::get(row, 3)?,
        status: row::get(row, 4)?,
        fields: row::json(row, 5)?,
        capture_id: row::opt_uuid(row, 6)?,
        archived: archived != 0,
        created_at: row::timestamp(row, 8)?,
        updated_at: row::timestamp(row, 9)?,
    })
}
