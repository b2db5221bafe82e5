//! Per-tenant settings persistence.

use std::sync::Arc;

use rusqlite::OptionalExtension;

use brainbox_core::config::TenantSettings;
use brainbox_core::error::Result;
use brainbox_core::types::{TenantId, Timestamp};

use crate::db::Database;
use crate::row::sql_err;

pub struct SettingsRepository {
    db: Arc<Database>,
}

impl SettingsRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Stored settings, or `None` if the tenant never saved any.
    pub fn get(&self, tenant: &TenantId) -> Result<Option<TenantSettings>> {
        let raw: Option<String> = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT settings FROM tenant_settings WHERE tenant_id = ?1",
                rusqlite::params![tenant.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_err("Failed to load tenant settings"))
        })?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn save(&self, tenant: &TenantId, settings: &TenantSettings) -> Result<()> {
        let raw = serde_json::to_string(settings)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tenant_settings (tenant_id, settings, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (tenant_id) DO UPDATE
                 SET settings = excluded.settings, updated_at = excluded.updated_at",
                rusqlite::params![tenant.as_str(), raw, Timestamp::now().0],
            )
            .map_err(sql_err("Failed to save tenant settings"))?;
            Ok(())
        })
    }
}
