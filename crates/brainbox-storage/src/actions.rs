//! Action persistence with guarded status transitions.
//!
//! Every transition is a single `UPDATE ... WHERE status = <expected>`.
//! Zero affected rows means another caller already moved the action on,
//! which is reported as [`Transition::NoOp`] rather than an error.

use std::sync::Arc;

use rusqlite::OptionalExtension;
use uuid::Uuid;

use brainbox_core::actions::{Action, ActionStatus, NewAction, Transition};
use brainbox_core::error::Result;
use brainbox_core::types::{TenantId, Timestamp};

use crate::db::Database;
use crate::row::{self, sql_err};

const ACTION_COLUMNS: &str = "id, tenant_id, kind, target_type, target_id, parameters, status,
     requires_approval, source, approved_by, approved_at, rejection_reason,
     rollback_snapshot, snapshot_at, executed_at, result, error_message,
     created_at, updated_at";

pub struct ActionRepository {
    db: Arc<Database>,
}

impl ActionRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a new action in `pending`.
    pub fn insert(&self, tenant: &TenantId, new: &NewAction) -> Result<Action> {
        let now = Timestamp::now();
        let action = Action {
            id: Uuid::new_v4(),
            tenant_id: tenant.clone(),
            kind: new.kind,
            target_type: new.target_type.clone(),
            target_id: new.target_id.clone(),
            parameters: new.parameters.clone(),
            status: ActionStatus::Pending,
            requires_approval: new.requires_approval,
            source: new.source.clone(),
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            rollback_snapshot: None,
            snapshot_at: None,
            executed_at: None,
            result: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        let parameters = serde_json::to_string(&action.parameters)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO actions
                    (id, tenant_id, kind, target_type, target_id, parameters, status,
                     requires_approval, source, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    action.id.to_string(),
                    tenant.as_str(),
                    action.kind.to_string(),
                    action.target_type,
                    action.target_id,
                    parameters,
                    action.status.to_string(),
                    action.requires_approval as i32,
                    action.source,
                    now.0,
                    now.0,
                ],
            )
            .map_err(sql_err("Failed to insert action"))?;
            Ok(())
        })?;
        Ok(action)
    }

    pub fn get(&self, tenant: &TenantId, id: Uuid) -> Result<Option<Action>> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM actions WHERE tenant_id = ?1 AND id = ?2",
                ACTION_COLUMNS
            );
            conn.query_row(&sql, rusqlite::params![tenant.as_str(), id.to_string()], |row| {
                Ok(row_to_action(row))
            })
            .optional()
            .map_err(sql_err("Failed to load action"))?
            .transpose()
        })
    }

    /// Actions newest first, optionally filtered by status.
    pub fn list(
        &self,
        tenant: &TenantId,
        status: Option<ActionStatus>,
        limit: u32,
    ) -> Result<Vec<Action>> {
        self.db.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM actions
                 WHERE tenant_id = ?1 AND (?2 IS NULL OR status = ?2)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3",
                ACTION_COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(sql_err("Actions query prepare"))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![tenant.as_str(), status.map(|s| s.to_string()), limit],
                    |row| Ok(row_to_action(row)),
                )
                .map_err(sql_err("Actions query"))?;
            row::collect(rows)
        })
    }

    /// `pending -> approved`.
    pub fn approve(&self, tenant: &TenantId, id: Uuid, approver: &str) -> Result<Transition> {
        let now = Timestamp::now().0;
        self.guarded(
            "UPDATE actions
             SET status = 'approved', approved_by = ?3, approved_at = ?4, updated_at = ?4
             WHERE tenant_id = ?1 AND id = ?2 AND status = 'pending'",
            rusqlite::params![tenant.as_str(), id.to_string(), approver, now],
        )
    }

    /// `pending -> rejected`.
    pub fn reject(&self, tenant: &TenantId, id: Uuid, reason: &str) -> Result<Transition> {
        let now = Timestamp::now().0;
        self.guarded(
            "UPDATE actions
             SET status = 'rejected', rejection_reason = ?3, updated_at = ?4
             WHERE tenant_id = ?1 AND id = ?2 AND status = 'pending'",
            rusqlite::params![tenant.as_str(), id.to_string(), reason, now],
        )
    }

    /// `approved -> executing`, persisting the rollback snapshot in the same
    /// statement.
    pub fn begin_execution(
        &self,
        tenant: &TenantId,
        id: Uuid,
        snapshot: Option<&serde_json::Value>,
    ) -> Result<Transition> {
        let now = Timestamp::now().0;
        let snapshot = snapshot.map(serde_json::to_string).transpose()?;
        let snapshot_at = snapshot.as_ref().map(|_| now);
        self.guarded(
            "UPDATE actions
             SET status = 'executing', rollback_snapshot = ?3, snapshot_at = ?4, updated_at = ?5
             WHERE tenant_id = ?1 AND id = ?2 AND status = 'approved'",
            rusqlite::params![tenant.as_str(), id.to_string(), snapshot, snapshot_at, now],
        )
    }

    /// `executing -> executed`.
    ///
    /// `executed_at` is kept strictly after `snapshot_at` even when both
    /// land in the same millisecond.
    pub fn complete_execution(
        &self,
        tenant: &TenantId,
        id: Uuid,
        result: &serde_json::Value,
    ) -> Result<Transition> {
        let now = Timestamp::now().0;
        let result = serde_json::to_string(result)?;
        self.guarded(
            "UPDATE actions
             SET status = 'executed', result = ?3,
                 executed_at = MAX(?4, COALESCE(snapshot_at + 1, ?4)),
                 updated_at = ?4
             WHERE tenant_id = ?1 AND id = ?2 AND status = 'executing'",
            rusqlite::params![tenant.as_str(), id.to_string(), result, now],
        )
    }

    /// `executing -> failed`. The rollback snapshot is left in place.
    pub fn fail_execution(&self, tenant: &TenantId, id: Uuid, error: &str) -> Result<Transition> {
        let now = Timestamp::now().0;
        self.guarded(
            "UPDATE actions
             SET status = 'failed', error_message = ?3, updated_at = ?4
             WHERE tenant_id = ?1 AND id = ?2 AND status = 'executing'",
            rusqlite::params![tenant.as_str(), id.to_string(), error, now],
        )
    }

    fn guarded(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Transition> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(sql, params)
                .map_err(sql_err("Failed to transition action"))?;
            Ok(if changed == 0 {
                Transition::NoOp
            } else {
                Transition::Applied
            })
        })
    }
}

fn row_to_action(row: &rusqlite::Row<'_>) -> Result<Action> {
    let requires_approval: i32 = row::get(row, 7)?;
    Ok(Action {
        id: row::uuid(row, 0)?,
        tenant_id: TenantId(row::get(row, 1)?),
        kind: row::parsed(row, 2)?,
        target_type: row::get(row, 3)?,
        target_id: row::get(row, 4)?,
        parameters: row::json(row, 5)?,
        status: row::parsed(row, 6)?,
        requires_approval: requires_approval != 0,
        source: row::get(row, 8)?,
        approved_by: row::get(row, 9)?,
        approved_at: row::opt_timestamp(row, 10)?,
        rejection_reason: row::get(row, 11)?,
        rollback_snapshot: row::opt_json(row, 12)?,
        snapshot_at: row::opt_timestamp(row, 13)?,
        executed_at: row::opt_timestamp(row, 14)?,
        result: row::opt_json(row, 15)?,
        error_message: row::get(row, 16)?,
        created_at: row::timestamp(row, 17)?,
        updated_at: row::timestamp(row, 18)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use brainbox_core::actions::ActionKind;
    use serde_json::json;

    fn make_repo() -> ActionRepository {
        ActionRepository::new(Arc::new(Database::in_memory().unwrap()))
    }

    fn propose(repo: &ActionRepository, tenant: &TenantId) -> Action {
        repo.insert(
            tenant,
            &NewAction::new(ActionKind::SetStatus, json!({"status": "done"}))
                .targeting("record", "r1"),
        )
        .unwrap()
    }

    #[test]
    fn test_insert_starts_pending() {
        let repo = make_repo();
        let tenant = TenantId::from("t1");
        let action = propose(&repo, &tenant);

        let loaded = repo.get(&tenant, action.id).unwrap().unwrap();
        assert_eq!(loaded, action);
        assert_eq!(loaded.status, ActionStatus::Pending);
        assert!(loaded.requires_approval);
    }

    #[test]
    fn test_second_approve_is_noop() {
        let repo = make_repo();
        let tenant = TenantId::from("t1");
        let action = propose(&repo, &tenant);

        assert_eq!(repo.approve(&tenant, action.id, "ana").unwrap(), Transition::Applied);
        let first = repo.get(&tenant, action.id).unwrap().unwrap();

        assert_eq!(repo.approve(&tenant, action.id, "bo").unwrap(), Transition::NoOp);
        let second = repo.get(&tenant, action.id).unwrap().unwrap();

        assert_eq!(second.approved_at, first.approved_at);
        assert_eq!(second.approved_by.as_deref(), Some("ana"));
    }

    #[test]
    fn test_reject_after_approve_is_noop() {
        let repo = make_repo();
        let tenant = TenantId::from("t1");
        let action = propose(&repo, &tenant);
        repo.approve(&tenant, action.id, "ana").unwrap();

        assert_eq!(repo.reject(&tenant, action.id, "nope").unwrap(), Transition::NoOp);
        let loaded = repo.get(&tenant, action.id).unwrap().unwrap();
        assert_eq!(loaded.status, ActionStatus::Approved);
        assert!(loaded.rejection_reason.is_none());
    }

    #[test]
    fn test_execution_path_orders_timestamps() {
        let repo = make_repo();
        let tenant = TenantId::from("t1");
        let action = propose(&repo, &tenant);
        repo.approve(&tenant, action.id, "ana").unwrap();

        let snapshot = json!({"status": "active"});
        assert!(repo
            .begin_execution(&tenant, action.id, Some(&snapshot))
            .unwrap()
            .applied());
        assert!(repo
            .complete_execution(&tenant, action.id, &json!({"ok": true}))
            .unwrap()
            .applied());

        let done = repo.get(&tenant, action.id).unwrap().unwrap();
        assert_eq!(done.status, ActionStatus::Executed);
        assert_eq!(done.rollback_snapshot, Some(snapshot));
        assert!(done.snapshot_at.unwrap() < done.executed_at.unwrap());
    }

    #[test]
    fn test_begin_requires_approved() {
        let repo = make_repo();
        let tenant = TenantId::from("t1");
        let action = propose(&repo, &tenant);
        assert_eq!(
            repo.begin_execution(&tenant, action.id, None).unwrap(),
            Transition::NoOp
        );
    }

    #[test]
    fn test_fail_keeps_snapshot() {
        let repo = make_repo();
        let tenant = TenantId::from("t1");
        let action = propose(&repo, &tenant);
        repo.approve(&tenant, action.id, "ana").unwrap();
        repo.begin_execution(&tenant, action.id, Some(&json!({"status": "active"})))
            .unwrap();

        assert!(repo.fail_execution(&tenant, action.id, "boom").unwrap().applied());
        assert_eq!(
            repo.complete_execution(&tenant, action.id, &json!({})).unwrap(),
            Transition::NoOp
        );

        let failed = repo.get(&tenant, action.id).unwrap().unwrap();
        assert_eq!(failed.status, ActionStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("boom"));
        assert!(failed.rollback_snapshot.is_some());
    }

    #[test]
    fn test_transitions_are_tenant_scoped() {
        let repo = make_repo();
        let action = propose(&repo, &TenantId::from("t1"));
        assert_eq!(
            repo.approve(&TenantId::from("t2"), action.id, "x").unwrap(),
            Transition::NoOp
        );
    }

    #[test]
    fn test_list_filters_by_status() {
        let repo = make_repo();
        let tenant = TenantId::from("t1");
        let a = propose(&repo, &tenant);
        let b = propose(&repo, &tenant);
        repo.approve(&tenant, a.id, "ana").unwrap();

        let pending = repo.list(&tenant, Some(ActionStatus::Pending), 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);
        assert_eq!(repo.list(&tenant, None, 10).unwrap().len(), 2);
    }
}
