//! Update-record action handler: merges fields and optionally renames.

use std::sync::Arc;

use async_trait::async_trait;

use brainbox_core::actions::{Action, ActionKind};
use brainbox_core::types::Fields;
use brainbox_core::workflows::{ItemEvent, ItemSignal};
use brainbox_storage::{Database, RecordRepository};

use crate::error::ActionError;
use crate::handler::{
    load_target, param_str, record_snapshot, record_values, restore_record_snapshot,
    target_id, ActionHandler, ActionResult,
};

pub struct UpdateRecordHandler {
    records: RecordRepository,
}

impl UpdateRecordHandler {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            records: RecordRepository::new(db),
        }
    }
}

#[async_trait]
impl ActionHandler for UpdateRecordHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::UpdateRecord
    }

    async fn snapshot(&self, action: &Action) -> Result<Option<serde_json::Value>, ActionError> {
        let record = load_target(&self.records, action)?;
        Ok(Some(record_snapshot(Some(&record))?))
    }

    async fn execute(&self, action: &Action) -> Result<ActionResult, ActionError> {
        let before = load_target(&self.records, action)?;
        let fields: Fields = action
            .parameters
            .get("fields")
            .and_then(|f| f.as_object())
            .cloned()
            .unwrap_or_default();
        let name = param_str(action, "name");
        if fields.is_empty() && name.is_none() {
            return Err(ActionError::Validation(
                "update_record needs fields or a name".into(),
            ));
        }

        let after = self
            .records
            .update_fields(&action.tenant_id, before.id, name, &fields)?
            .ok_or_else(|| ActionError::HandlerFailed(format!("Record {} not found", before.id)))?;

        tracing::info!(action_id = %action.id, record_id = %after.id, changed = fields.len(), "Record updated");

        let change = ItemSignal::new(ItemEvent::Updated, &after.category, after.id.to_string())
            .with_values(record_values(&after), record_values(&before))
            .with_occurrence(format!("action:{}", action.id));
        Ok(ActionResult {
            message: format!("Updated \"{}\"", after.name),
            output: serde_json::json!({ "record_id": after.id }),
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
        let keys: Vec<&str> = action
            .parameters
            .get("fields")
            .and_then(|f| f.as_object())
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default();
        format!(
            "Update record {} ({})",
            action.target_id.as_deref().unwrap_or("<no target>"),
            if keys.is_empty() { "name".to_string() } else { keys.join(", ") }
        )
    }
}
