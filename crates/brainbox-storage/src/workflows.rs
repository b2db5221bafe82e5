//! Workflow definition repository.

use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

use brainbox_core::error::Result;
use brainbox_core::types::{TenantId, Timestamp};
use brainbox_core::workflows::{NewWorkflow, Workflow, WorkflowUpdate};

use crate::db::Database;
use crate::row::{self, sql_err};

const WORKFLOW_COLUMNS: &str = "id, tenant_id, name, description, trigger, actions, priority,
     enabled, execution_count, last_executed_at, created_at, updated_at";

/// Matching order: highest priority first, then most recently created.
const MATCH_ORDER: &str = "ORDER BY priority DESC, created_at DESC, rowid DESC";

pub struct WorkflowRepository {
    db: Arc<Database>,
}

impl WorkflowRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn insert(&self, tenant: &TenantId, new: &NewWorkflow) -> Result<Workflow> {
        let now = Timestamp::now();
        let workflow = Workflow {
            id: Uuid::new_v4(),
            tenant_id: tenant.clone(),
            name: new.name.clone(),
            description: new.description.clone(),
            trigger: new.trigger.clone(),
            actions: new.actions.clone(),
            priority: new.priority,
            enabled: new.enabled,
            execution_count: 0,
            last_executed_at: None,
            created_at: now,
            updated_at: now,
        };
        let trigger = serde_json::to_string(&workflow.trigger)?;
        let actions = serde_json::to_string(&workflow.actions)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO workflows
                    (id, tenant_id, name, description, trigger_type, trigger, actions,
                     priority, enabled, execution_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 0, ?10, ?10)",
                rusqlite::params![
                    workflow.id.to_string(),
                    tenant.as_str(),
                    workflow.name,
                    workflow.description,
                    workflow.trigger.type_name(),
                    trigger,
                    actions,
                    workflow.priority,
                    workflow.enabled as i32,
                    now.0,
                ],
            )
            .map_err(sql_err("Failed to insert workflow"))?;
            Ok(())
        })?;
        Ok(workflow)
    }

    pub fn get(&self, tenant: &TenantId, id: Uuid) -> Result<Option<Workflow>> {
        self.db.with_conn(|conn| load(conn, tenant, id))
    }

    /// All workflows for a tenant in matching order.
    pub fn list(&self, tenant: &TenantId) -> Result<Vec<Workflow>> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM workflows WHERE tenant_id = ?1 {}",
                WORKFLOW_COLUMNS, MATCH_ORDER
            );
            let mut stmt = conn.prepare(&sql).map_err(sql_err("Workflows query prepare"))?;
            let rows = stmt
                .query_map(rusqlite::params![tenant.as_str()], |row| {
                    Ok(row_to_workflow(row))
                })
                .map_err(sql_err("Workflows query"))?;
            row::collect(rows)
        })
    }

    /// Enabled workflows with the given trigger type, in matching order.
    pub fn list_enabled(&self, tenant: &TenantId, trigger_type: &str) -> Result<Vec<Workflow>> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM workflows
                 WHERE tenant_id = ?1 AND enabled = 1 AND trigger_type = ?2 {}",
                WORKFLOW_COLUMNS, MATCH_ORDER
            );
            let mut stmt = conn.prepare(&sql).map_err(sql_err("Workflows query prepare"))?;
            let rows = stmt
                .query_map(rusqlite::params![tenant.as_str(), trigger_type], |row| {
                    Ok(row_to_workflow(row))
                })
                .map_err(sql_err("Workflows query"))?;
            row::collect(rows)
        })
    }

    /// Tenants with at least one enabled schedule workflow.
    pub fn tenants_with_schedules(&self) -> Result<Vec<TenantId>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT DISTINCT tenant_id FROM workflows
                     WHERE enabled = 1 AND trigger_type = 'schedule'
                     ORDER BY tenant_id",
                )
                .map_err(sql_err("Schedule tenants prepare"))?;
            let rows = stmt
                .query_map([], |row| Ok(row::get::<String>(row, 0).map(TenantId)))
                .map_err(sql_err("Schedule tenants query"))?;
            row::collect(rows)
        })
    }

    /// Apply a partial update. Returns `None` if the workflow does not exist.
    pub fn update(
        &self,
        tenant: &TenantId,
        id: Uuid,
        update: &WorkflowUpdate,
    ) -> Result<Option<Workflow>> {
        self.db.with_conn(|conn| {
            let Some(mut workflow) = load(conn, tenant, id)? else {
                return Ok(None);
            };
            if let Some(name) = &update.name {
                workflow.name = name.clone();
            }
            if let Some(description) = &update.description {
                workflow.description = Some(description.clone());
            }
            if let Some(trigger) = &update.trigger {
                workflow.trigger = trigger.clone();
            }
            if let Some(actions) = &update.actions {
                workflow.actions = actions.clone();
            }
            if let Some(priority) = update.priority {
                workflow.priority = priority;
            }
            workflow.updated_at = Timestamp::now();

            conn.execute(
                "UPDATE workflows
                 SET name = ?3, description = ?4, trigger_type = ?5, trigger = ?6,
                     actions = ?7, priority = ?8, updated_at = ?9
                 WHERE tenant_id = ?1 AND id = ?2",
                rusqlite::params![
                    tenant.as_str(),
                    id.to_string(),
                    workflow.name,
                    workflow.description,
                    workflow.trigger.type_name(),
                    serde_json::to_string(&workflow.trigger)?,
                    serde_json::to_string(&workflow.actions)?,
                    workflow.priority,
                    workflow.updated_at.0,
                ],
            )
            .map_err(sql_err("Failed to update workflow"))?;
            Ok(Some(workflow))
        })
    }

    /// Returns false if the workflow does not exist.
    pub fn set_enabled(&self, tenant: &TenantId, id: Uuid, enabled: bool) -> Result<bool> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE workflows SET enabled = ?3, updated_at = ?4
                     WHERE tenant_id = ?1 AND id = ?2",
                    rusqlite::params![
                        tenant.as_str(),
                        id.to_string(),
                        enabled as i32,
                        Timestamp::now().0
                    ],
                )
                .map_err(sql_err("Failed to toggle workflow"))?;
            Ok(changed > 0)
        })
    }

    pub fn delete(&self, tenant: &TenantId, id: Uuid) -> Result<bool> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "DELETE FROM workflows WHERE tenant_id = ?1 AND id = ?2",
                    rusqlite::params![tenant.as_str(), id.to_string()],
                )
                .map_err(sql_err("Failed to delete workflow"))?;
            Ok(changed > 0)
        })
    }
}

/// Bump the execution counter and last-executed timestamp in one
/// statement, so concurrent runs never lose an increment.
pub(crate) fn record_run(conn: &Connection, tenant: &TenantId, id: Uuid) -> Result<()> {
    conn.execute(
        "UPDATE workflows
         SET execution_count = execution_count + 1, last_executed_at = ?3
         WHERE tenant_id = ?1 AND id = ?2",
        rusqlite::params![tenant.as_str(), id.to_string(), Timestamp::now().0],
    )
    .map_err(sql_err("Failed to record workflow run"))?;
    Ok(())
}

fn load(conn: &Connection, tenant: &TenantId, id: Uuid) -> Result<Option<Workflow>> {
    let sql = format!(
        "SELECT {} FROM workflows WHERE tenant_id = ?1 AND id = ?2",
        WORKFLOW_COLUMNS
    );
    conn.query_row(&sql, rusqlite::params![tenant.as_str(), id.to_string()], |row| {
        Ok(row_to_workflow(row))
    })
    .optional()
    .map_err(sql_err("Failed to load workflow"))?
    .transpose()
}

fn row_to_workflow(row: &rusqlite::Row<'_>) -> Result<Workflow> {
    let enabled: i32 = row::get(row, 7)?;
    let execution_count: i64 = row::get(row, 8)?;
    Ok(Workflow {
        id: row::uuid(row, 0)?,
        tenant_id: TenantId(row::get(row, 1)?),
        name: row::get(row, 2)?,
        description: row::get(row, 3)?,
        trigger: row::json(row, 4)?,
        actions: row::json(row, 5)?,
        priority: row::get(row, 6)?,
        enabled: enabled != 0,
        execution_count: execution_count.max(0) as u64,
        last_executed_at: row::opt_timestamp(row, 9)?,
        created_at: row::timestamp(row, 10)?,
        updated_at: row::timestamp(row, 11)?,
    })
}
