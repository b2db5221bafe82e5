//! Capture log repository.
//!
//! Review entries reference themselves through `destination_ref`. The id
//! only exists once the row is inserted, so [`CaptureLogRepository::record_review`]
//! inserts first and then patches the reference, inside one transaction.
//!
//! Filing and fixing also write a category record (and, for a fix, a
//! correction). Those rows commit together with the log entry or not at all.

use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use brainbox_core::error::Result;
use brainbox_core::types::{
    CaptureLogEntry, CaptureStatus, CategoryRecord, Correction, NewRecord, TenantId, Timestamp,
    NEEDS_REVIEW,
};

use crate::db::Database;
use crate::row::{self, sql_err};
use crate::{corrections, records};

const ENTRY_COLUMNS: &str =
    "id, tenant_id, original_text, filed_category, destination_ref, confidence, status, created_at";

pub struct CaptureLogRepository {
    db: Arc<Database>,
}

impl CaptureLogRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Create the category record for a filed capture and log the capture
    /// against it.
    pub fn file_capture(
        &self,
        tenant: &TenantId,
        text: &str,
        new: &NewRecord,
        confidence: f64,
    ) -> Result<(CategoryRecord, CaptureLogEntry)> {
        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(sql_err("Failed to begin capture transaction"))?;
            let record = records::build(tenant, Uuid::new_v4(), new);
            records::insert(&tx, &record)?;
            let id = insert_entry(
                &tx,
                tenant,
                text,
                &record.category,
                Some(record.id),
                confidence,
                CaptureStatus::Filed,
            )?;
            let entry = load(&tx, tenant, id)?;
            tx.commit().map_err(sql_err("Failed to commit capture"))?;
            Ok((record, entry))
        })
    }

    /// Log a capture that needs review.
    ///
    /// Step one inserts the entry without a destination; step two points
    /// `destination_ref` at the entry's own id.
    pub fn record_review(
        &self,
        tenant: &TenantId,
        text: &str,
        confidence: f64,
    ) -> Result<CaptureLogEntry> {
        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(sql_err("Failed to begin capture transaction"))?;
            let id = insert_entry(
                &tx,
                tenant,
                text,
                NEEDS_REVIEW,
                None,
                confidence,
                CaptureStatus::NeedsReview,
            )?;
            set_destination(&tx, tenant, id, id)?;
            let entry = load(&tx, tenant, id)?;
            tx.commit().map_err(sql_err("Failed to commit capture"))?;
            Ok(entry)
        })
    }

    /// Move an entry to `Fixed`, pointing it at the record it now lives in.
    ///
    /// Guarded on the entry not already being fixed; returns false when no
    /// row matched.
    pub fn mark_fixed(
        &self,
        tenant: &TenantId,
        id: Uuid,
        category: &str,
        destination: Uuid,
    ) -> Result<bool> {
        self.db.with_conn(|conn| mark_fixed(conn, tenant, id, category, destination))
    }

    /// Refile `entry` as a new record built from `new`.
    ///
    /// Creates the record, moves the entry to `Fixed`, archives the record
    /// the entry was filed as (if any) and appends the correction. Returns
    /// `None`, with nothing written, when the entry was already fixed.
    pub fn apply_fix(
        &self,
        entry: &CaptureLogEntry,
        new: &NewRecord,
    ) -> Result<Option<(CategoryRecord, Correction)>> {
        let tenant = &entry.tenant_id;
        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(sql_err("Failed to begin fix transaction"))?;
            let record = records::build(tenant, Uuid::new_v4(), new);
            records::insert(&tx, &record)?;
            if !mark_fixed(&tx, tenant, entry.id, &record.category, record.id)? {
                return Ok(None);
            }
            if entry.status == CaptureStatus::Filed {
                if let Some(previous) = entry.destination_ref {
                    records::set_archived(&tx, tenant, previous, true)?;
                }
            }
            let correction = corrections::insert(
                &tx,
                tenant,
                Some(entry.id),
                &entry.filed_category,
                &record.category,
                &entry.original_text,
            )?;
            tx.commit().map_err(sql_err("Failed to commit fix"))?;
            Ok(Some((record, correction)))
        })
    }

    pub fn get(&self, tenant: &TenantId, id: Uuid) -> Result<Option<CaptureLogEntry>> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM capture_log WHERE tenant_id = ?1 AND id = ?2",
                ENTRY_COLUMNS
            );
            conn.query_row(&sql, rusqlite::params![tenant.as_str(), id.to_string()], |row| {
                Ok(row_to_entry(row))
            })
            .optional()
            .map_err(sql_err("Failed to load capture"))?
            .transpose()
        })
    }

    /// Entries newest first, optionally filtered by status.
    pub fn list(
        &self,
        tenant: &TenantId,
        status: Option<CaptureStatus>,
        limit: u32,
    ) -> Result<Vec<CaptureLogEntry>> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM capture_log
                 WHERE tenant_id = ?1 AND (?2 IS NULL OR status = ?2)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3",
                ENTRY_COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(sql_err("Capture query prepare"))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![tenant.as_str(), status.map(|s| s.to_string()), limit],
                    |row| Ok(row_to_entry(row)),
                )
                .map_err(sql_err("Capture query"))?;
            row::collect(rows)
        })
    }

    pub fn count(&self, tenant: &TenantId) -> Result<u64> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM capture_log WHERE tenant_id = ?1",
                    rusqlite::params![tenant.as_str()],
                    |row| row.get(0),
                )
                .map_err(sql_err("Capture count"))?;
            Ok(count as u64)
        })
    }
}

fn insert_entry(
    conn: &Connection,
    tenant: &TenantId,
    text: &str,
    category: &str,
    destination: Option<Uuid>,
    confidence: f64,
    status: CaptureStatus,
) -> Result<Uuid> {
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO capture_log
            (id, tenant_id, original_text, filed_category, destination_ref, confidence, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            id.to_string(),
            tenant.as_str(),
            text,
            category,
            destination.map(|d| d.to_string()),
            confidence,
            status.to_string(),
            Timestamp::now().0,
        ],
    )
    .map_err(sql_err("Failed to insert capture"))?;
    Ok(id)
}

fn mark_fixed(
    conn: &Connection,
    tenant: &TenantId,
    id: Uuid,
    category: &str,
    destination: Uuid,
) -> Result<bool> {
    let changed = conn
        .execute(
            "UPDATE capture_log
             SET status = 'fixed', filed_category = ?3, destination_ref = ?4
             WHERE tenant_id = ?1 AND id = ?2 AND status != 'fixed'",
            rusqlite::params![tenant.as_str(), id.to_string(), category, destination.to_string()],
        )
        .map_err(sql_err("Failed to fix capture"))?;
    Ok(changed > 0)
}

fn set_destination(conn: &Connection, tenant: &TenantId, id: Uuid, destination: Uuid) -> Result<()> {
    conn.execute(
        "UPDATE capture_log SET destination_ref = ?3 WHERE tenant_id = ?1 AND id = ?2",
        rusqlite::params![tenant.as_str(), id.to_string(), destination.to_string()],
    )
    .map_err(sql_err("Failed to link capture destination"))?;
    Ok(())
}

fn load(conn: &Connection, tenant: &TenantId, id: Uuid) -> Result<CaptureLogEntry> {
    let sql = format!(
        "SELECT {} FROM capture_log WHERE tenant_id = ?1 AND id = ?2",
        ENTRY_COLUMNS
    );
    conn.query_row(&sql, rusqlite::params![tenant.as_str(), id.to_string()], |row| {
        Ok(row_to_entry(row))
    })
    .map_err(sql_err("Failed to reload capture"))?
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<CaptureLogEntry> {
    Ok(CaptureLogEntry {
        id: row::uuid(row, 0)?,
        tenant_id: TenantId(row::get(row, 1)?),
        original_text: row::get(row, 2)?,
        filed_category: row::get(row, 3)?,
        destination_ref: row::opt_uuid(row, 4)?,
        confidence: row::get(row, 5)?,
        status: row::parsed(row, 6)?,
        created_at: row::timestamp(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RecordRepository;

    fn make_repo() -> CaptureLogRepository {
        CaptureLogRepository::new(Arc::new(Database::in_memory().unwrap()))
    }

    #[test]
    fn test_review_entry_references_itself() {
        let repo = make_repo();
        let tenant = TenantId::from("t1");
        let entry = repo.record_review(&tenant, "hi", 0.9).unwrap();

        assert_eq!(entry.status, CaptureStatus::NeedsReview);
        assert_eq!(entry.filed_category, NEEDS_REVIEW);
        assert_eq!(entry.destination_ref, Some(entry.id));
    }

    fn idea(name: &str) -> NewRecord {
        NewRecord {
            category: "ideas".into(),
            name: name.into(),
            ..NewRecord::default()
        }
    }

    fn fail_inserts_into(db: &Database, table: &str) {
        db.with_conn(|conn| {
            conn.execute_batch(&format!(
                "CREATE TRIGGER fail_{table} BEFORE INSERT ON {table}
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;"
            ))
            .map_err(sql_err("trigger"))
        })
        .unwrap();
    }

    #[test]
    fn test_filed_entry_points_at_record() {
        let repo = make_repo();
        let tenant = TenantId::from("t1");
        let new = NewRecord {
            category: "people".into(),
            name: "Ana".into(),
            ..NewRecord::default()
        };
        let (record, entry) = repo.file_capture(&tenant, "call Ana", &new, 0.92).unwrap();

        assert_eq!(entry.status, CaptureStatus::Filed);
        assert_eq!(entry.filed_category, "people");
        assert_eq!(entry.destination_ref, Some(record.id));
        assert!((entry.confidence - 0.92).abs() < f64::EPSILON);
        assert_eq!(record.tenant_id, tenant);
    }

    #[test]
    fn test_filing_keeps_no_record_when_log_insert_fails() {
        let db = Arc::new(Database::in_memory().unwrap());
        let repo = CaptureLogRepository::new(db.clone());
        let records = RecordRepository::new(db.clone());
        let tenant = TenantId::from("t1");
        fail_inserts_into(&db, "capture_log");

        let err = repo
            .file_capture(&tenant, "solar powered kettle", &idea("Kettle"), 0.95)
            .unwrap_err();
        assert!(err.to_string().contains("disk full"));
        assert_eq!(records.count(&tenant).unwrap(), 0);
        assert_eq!(repo.count(&tenant).unwrap(), 0);
    }

    #[test]
    fn test_apply_fix_writes_record_entry_and_correction() {
        let db = Arc::new(Database::in_memory().unwrap());
        let repo = CaptureLogRepository::new(db.clone());
        let records = RecordRepository::new(db.clone());
        let tenant = TenantId::from("t1");
        let (filed, entry) = repo
            .file_capture(&tenant, "learn the cello", &idea("Cello"), 0.9)
            .unwrap();

        let new = NewRecord {
            category: "projects".into(),
            ..idea("Cello")
        };
        let (record, correction) = repo.apply_fix(&entry, &new).unwrap().unwrap();

        let fixed = repo.get(&tenant, entry.id).unwrap().unwrap();
        assert_eq!(fixed.status, CaptureStatus::Fixed);
        assert_eq!(fixed.filed_category, "projects");
        assert_eq!(fixed.destination_ref, Some(record.id));
        assert!(records.get(&tenant, filed.id).unwrap().unwrap().archived);
        assert_eq!(correction.original_category, "ideas");
        assert_eq!(correction.corrected_category, "projects");
        assert_eq!(correction.source_log_id, Some(entry.id));

        assert!(repo.apply_fix(&entry, &new).unwrap().is_none());
        assert_eq!(records.count(&tenant).unwrap(), 2);
    }

    #[test]
    fn test_apply_fix_rolls_back_when_correction_fails() {
        let db = Arc::new(Database::in_memory().unwrap());
        let repo = CaptureLogRepository::new(db.clone());
        let records = RecordRepository::new(db.clone());
        let tenant = TenantId::from("t1");
        let (filed, entry) = repo
            .file_capture(&tenant, "learn the cello", &idea("Cello"), 0.9)
            .unwrap();
        fail_inserts_into(&db, "corrections");

        let new = NewRecord {
            category: "projects".into(),
            ..idea("Cello")
        };
        assert!(repo.apply_fix(&entry, &new).is_err());

        let unchanged = repo.get(&tenant, entry.id).unwrap().unwrap();
        assert_eq!(unchanged.status, CaptureStatus::Filed);
        assert_eq!(unchanged.destination_ref, Some(filed.id));
        assert!(!records.get(&tenant, filed.id).unwrap().unwrap().archived);
        assert_eq!(records.count(&tenant).unwrap(), 1);
    }

    #[test]
    fn test_mark_fixed_only_once() {
        let repo = make_repo();
        let tenant = TenantId::from("t1");
        let entry = repo.record_review(&tenant, "buy milk", 0.3).unwrap();
        let record_id = Uuid::new_v4();

        assert!(repo.mark_fixed(&tenant, entry.id, "admin", record_id).unwrap());
        assert!(!repo.mark_fixed(&tenant, entry.id, "ideas", Uuid::new_v4()).unwrap());

        let fixed = repo.get(&tenant, entry.id).unwrap().unwrap();
        assert_eq!(fixed.status, CaptureStatus::Fixed);
        assert_eq!(fixed.filed_category, "admin");
        assert_eq!(fixed.destination_ref, Some(record_id));
    }

    #[test]
    fn test_list_filters_and_orders() {
        let repo = make_repo();
        let tenant = TenantId::from("t1");
        let first = repo.record_review(&tenant, "one", 0.1).unwrap();
        repo.file_capture(&tenant, "two", &idea("Two"), 0.9).unwrap();
        let third = repo.record_review(&tenant, "three", 0.2).unwrap();

        let all = repo.list(&tenant, None, 10).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, third.id);

        let review = repo
            .list(&tenant, Some(CaptureStatus::NeedsReview), 10)
            .unwrap();
        let ids: Vec<Uuid> = review.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![third.id, first.id]);

        assert_eq!(repo.list(&tenant, None, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_entries_are_tenant_scoped() {
        let repo = make_repo();
        let entry = repo.record_review(&TenantId::from("t1"), "x", 0.0).unwrap();
        let other = TenantId::from("t2");
        assert!(repo.get(&other, entry.id).unwrap().is_none());
        assert_eq!(repo.count(&other).unwrap(), 0);
        assert!(!repo.mark_fixed(&other, entry.id, "ideas", Uuid::new_v4()).unwrap());
    }
}
