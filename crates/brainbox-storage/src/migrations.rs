//! Database schema migrations.
//!
//! All timestamps are Unix milliseconds. Every table except
//! `schema_migrations` carries a `tenant_id` column and every index leads
//! with it.

use rusqlite::Connection;
use tracing::info;

use brainbox_core::error::{BrainboxError, Result};

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| BrainboxError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| BrainboxError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Filed category records.
        CREATE TABLE IF NOT EXISTS records (
            id          TEXT PRIMARY KEY NOT NULL,
            tenant_id   TEXT NOT NULL,
            category    TEXT NOT NULL,
            name        TEXT NOT NULL,
            status      TEXT,
            fields      TEXT NOT NULL DEFAULT '{}',
            capture_id  TEXT,
            archived    INTEGER NOT NULL DEFAULT 0,
            created_at  INTEGER NOT NULL,
            updated_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_records_category
            ON records (tenant_id, category, created_at DESC);

        -- One row per capture.
        CREATE TABLE IF NOT EXISTS capture_log (
            id              TEXT PRIMARY KEY NOT NULL,
            tenant_id       TEXT NOT NULL,
            original_text   TEXT NOT NULL,
            filed_category  TEXT NOT NULL,
            destination_ref TEXT,
            confidence      REAL NOT NULL DEFAULT 0.0,
            status          TEXT NOT NULL
                            CHECK (status IN ('filed', 'needs_review', 'fixed')),
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_capture_log_created
            ON capture_log (tenant_id, created_at DESC);

        CREATE INDEX IF NOT EXISTS idx_capture_log_status
            ON capture_log (tenant_id, status, created_at DESC);

        -- Append-only classification audit trail.
        CREATE TABLE IF NOT EXISTS audit_log (
            id              TEXT PRIMARY KEY NOT NULL,
            tenant_id       TEXT NOT NULL,
            input_text      TEXT NOT NULL,
            provider        TEXT NOT NULL,
            model           TEXT NOT NULL,
            prompt          TEXT NOT NULL,
            raw_response    TEXT NOT NULL DEFAULT '',
            parsed_result   TEXT,
            status          TEXT NOT NULL CHECK (status IN ('success', 'error')),
            error_message   TEXT,
            timestamp       INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp
            ON audit_log (tenant_id, timestamp DESC);

        -- Append-only user corrections.
        CREATE TABLE IF NOT EXISTS corrections (
            id                  TEXT PRIMARY KEY NOT NULL,
            tenant_id           TEXT NOT NULL,
            source_log_id       TEXT,
            original_category   TEXT NOT NULL,
            corrected_category  TEXT NOT NULL,
            message_text        TEXT NOT NULL,
            created_at          INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_corrections_created
            ON corrections (tenant_id, created_at DESC);

        CREATE INDEX IF NOT EXISTS idx_corrections_category
            ON corrections (tenant_id, corrected_category, created_at DESC);

        -- Provider token accounting.
        CREATE TABLE IF NOT EXISTS token_usage (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_id       TEXT NOT NULL,
            provider        TEXT NOT NULL,
            model           TEXT NOT NULL,
            input_tokens    INTEGER NOT NULL DEFAULT 0,
            output_tokens   INTEGER NOT NULL DEFAULT 0,
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_token_usage_tenant
            ON token_usage (tenant_id, created_at DESC);

        -- Per-tenant settings, stored as JSON.
        CREATE TABLE IF NOT EXISTS tenant_settings (
            tenant_id   TEXT PRIMARY KEY NOT NULL,
            settings    TEXT NOT NULL,
            updated_at  INTEGER NOT NULL
        );

        -- Governed actions.
        CREATE TABLE IF NOT EXISTS actions (
            id                  TEXT PRIMARY KEY NOT NULL,
            tenant_id           TEXT NOT NULL,
            kind                TEXT NOT NULL,
            target_type         TEXT,
            target_id           TEXT,
            parameters          TEXT NOT NULL DEFAULT '{}',
            status              TEXT NOT NULL
                                CHECK (status IN ('pending', 'approved', 'rejected',
                                                  'executing', 'executed', 'failed')),
            requires_approval   INTEGER NOT NULL DEFAULT 1,
            source              TEXT,
            approved_by         TEXT,
            approved_at         INTEGER,
            rejection_reason    TEXT,
            rollback_snapshot   TEXT,
            snapshot_at         INTEGER,
            executed_at         INTEGER,
            result              TEXT,
            error_message       TEXT,
            created_at          INTEGER NOT NULL,
            updated_at          INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_actions_status
            ON actions (tenant_id, status, created_at DESC);

        -- Workflow definitions.
        CREATE TABLE IF NOT EXISTS workflows (
            id                  TEXT PRIMARY KEY NOT NULL,
            tenant_id           TEXT NOT NULL,
            name                TEXT NOT NULL,
            description         TEXT,
            trigger_type        TEXT NOT NULL CHECK (trigger_type IN ('event', 'schedule')),
            trigger             TEXT NOT NULL,
            actions             TEXT NOT NULL,
            priority            INTEGER NOT NULL DEFAULT 0,
            enabled             INTEGER NOT NULL DEFAULT 1,
            execution_count     INTEGER NOT NULL DEFAULT 0,
            last_executed_at    INTEGER,
            created_at          INTEGER NOT NULL,
            updated_at          INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_workflows_match
            ON workflows (tenant_id, enabled, trigger_type, priority DESC, created_at DESC);

        -- One row per (workflow, trigger occurrence).
        CREATE TABLE IF NOT EXISTS workflow_executions (
            id                  TEXT PRIMARY KEY NOT NULL,
            tenant_id           TEXT NOT NULL,
            workflow_id         TEXT NOT NULL,
            status              TEXT NOT NULL CHECK (status IN ('success', 'failed', 'skipped')),
            trigger_snapshot    TEXT NOT NULL DEFAULT '{}',
            executed_actions    TEXT NOT NULL DEFAULT '[]',
            error_message       TEXT,
            idempotency_key     TEXT,
            timestamp           INTEGER NOT NULL,
            UNIQUE (tenant_id, idempotency_key)
        );

        CREATE INDEX IF NOT EXISTS idx_workflow_executions_workflow
            ON workflow_executions (tenant_id, workflow_id, timestamp DESC);

        -- Idempotency keys claimed before any action is proposed.
        CREATE TABLE IF NOT EXISTS idempotency_claims (
            tenant_id   TEXT NOT NULL,
            key         TEXT NOT NULL,
            claimed_at  INTEGER NOT NULL,
            PRIMARY KEY (tenant_id, key)
        );

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| BrainboxError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_names(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<String>, _>>()
            .unwrap()
    }

    #[test]
    fn test_migrations_create_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let tables = table_names(&conn);
        for expected in [
            "actions",
            "audit_log",
            "capture_log",
            "corrections",
            "idempotency_claims",
            "records",
            "schema_migrations",
            "tenant_settings",
            "token_usage",
            "workflow_executions",
            "workflows",
        ] {
            assert!(tables.iter().any(|t| t == expected), "missing table {}", expected);
        }
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, 1);
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_capture_status_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO capture_log (id, tenant_id, original_text, filed_category, status, created_at)
             VALUES ('x', 't', 'text', 'ideas', 'lost', 0)",
            [],
        );
        assert!(result.is_err());
    }
}
