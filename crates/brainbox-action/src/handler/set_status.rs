//! Set-status action handler.

use std::sync::Arc;

use async_trait::async_trait;

use brainbox_core::actions::{Action, ActionKind};
use brainbox_core::workflows::{ItemEvent, ItemSignal};
use brainbox_storage::{Database, RecordRepository};

use crate::error::ActionError;
use crate::handler::{
    load_target, param_str, record_snapshot, record_values, restore_record_snapshot,
    target_id, ActionHandler, ActionResult,
};

pub struct SetStatusHandler {
    records: RecordRepository,
}

impl SetStatusHandler {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            records: RecordRepository::new(db),
        }
    }
}

#[async_trait]
impl ActionHandler for SetStatusHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::SetStatus
    }

    async fn snapshot(&self, action: &Action) -> Result<Option<serde_json::Value>, ActionError> {
        let record = load_target(&self.records, action)?;
        Ok(Some(record_snapshot(Some(&record))?))
    }

    async fn execute(&self, action: &Action) -> Result<ActionResult, ActionError> {
        let status = param_str(action, "status")
            .ok_or_else(|| ActionError::Validation("set_status needs a status".into()))?;
        let before = load_target(&self.records, action)?;
        if !self.records.set_status(&action.tenant_id, before.id, status)? {
            return Err(ActionError::HandlerFailed(format!(
                "Record {} not found",
                before.id
            )));
        }
        let mut after = before.clone();
        after.status = Some(status.to_string());

        tracing::info!(
            action_id = %action.id,
            record_id = %before.id,
            from = before.status.as_deref().unwrap_or("-"),
            to = status,
            "Record status changed"
        );

        let change = ItemSignal::new(ItemEvent::StatusChanged, &after.category, after.id.to_string())
            .with_values(record_values(&after), record_values(&before))
            .with_occurrence(format!("action:{}", action.id));
        Ok(ActionResult {
            message: format!("Set \"{}\" to {}", after.name, status),
            output: serde_json::json!({ "record_id": after.id, "status": status }),
            change: Some(change),
        })
    }

    async fn restore(
        &self,
        action: &Action,
        snapshot: &serde_json::Value,
    ) -> Result<(), ActionError> {
        restore_record_snapshot(&self.records, action, target_id(action)?, snapshot)
    }

    fn describe(&self, action: &Action) -> String {
        format!(
            "Set status of {} to {}",
            action.target_id.as_deref().unwrap_or("<no target>"),
            param_str(action, "status").unwrap_or("<no status>")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::test_support::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_status_and_roll_back() {
        let db = db();
        let record = seed(&db);
        let handler = SetStatusHandler::new(db.clone());
        let action = action(ActionKind::SetStatus, Some(record.id), json!({"status": "done"}));

        let snapshot = handler.snapshot(&action).await.unwrap().unwrap();
        let result = handler.execute(&action).await.unwrap();
        let change = result.change.unwrap();
        assert_eq!(change.event, ItemEvent::StatusChanged);
        assert_eq!(change.old_values["status"], "active");
        assert_eq!(change.new_values["status"], "done");

        let records = RecordRepository::new(db);
        assert_eq!(
            records.get(&record.tenant_id, record.id).unwrap().unwrap().status.as_deref(),
            Some("done")
        );

        handler.restore(&action, &snapshot).await.unwrap();
        assert_eq!(
            records.get(&record.tenant_id, record.id).unwrap().unwrap().status.as_deref(),
            Some("active")
        );
    }

    #[tokio::test]
    async fn test_missing_status_parameter() {
        let db = db();
        let record = seed(&db);
        let handler = SetStatusHandler::new(db);
        let action = action(ActionKind::SetStatus, Some(record.id), json!({"status": " "}));
        assert!(matches!(
            handler.execute(&action).await.unwrap_err(),
            ActionError::Validation(_)
        ));
    }
}
