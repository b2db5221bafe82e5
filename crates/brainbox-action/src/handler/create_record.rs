//! Create-record action handler.
//!
//! The new record takes the action's id, so rolling back only needs to
//! delete that id.

use std::sync::Arc;

use async_trait::async_trait;

use brainbox_core::actions::{Action, ActionKind};
use brainbox_core::types::{Fields, NewRecord};
use brainbox_core::workflows::{ItemEvent, ItemSignal};
use brainbox_storage::{Database, RecordRepository};

use crate::error::ActionError;
use crate::handler::{
    param_str, record_snapshot, record_values, restore_record_snapshot, ActionHandler,
    ActionResult,
};

pub struct CreateRecordHandler {
    records: RecordRepository,
}

impl CreateRecordHandler {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            records: RecordRepository::new(db),
        }
    }
}

fn new_record(action: &Action) -> Result<NewRecord, ActionError> {
    let category = param_str(action, "category")
        .ok_or_else(|| ActionError::Validation("create_record needs a category".into()))?;
    let fields: Fields = match action.parameters.get("fields") {
        Some(serde_json::Value::Object(map)) => map.clone(),
        Some(serde_json::Value::Null) | None => Fields::new(),
        Some(_) => {
            return Err(ActionError::Validation(
                "create_record fields must be an object".into(),
            ))
        }
    };
    Ok(NewRecord {
        category: category.to_lowercase(),
        name: param_str(action, "name").unwrap_or("Untitled").to_string(),
        status: param_str(action, "status").map(str::to_string),
        fields,
        capture_id: None,
    })
}

#[async_trait]
impl ActionHandler for CreateRecordHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::CreateRecord
    }

    async fn snapshot(&self, action: &Action) -> Result<Option<serde_json::Value>, ActionError> {
        let existing = self.records.get(&action.tenant_id, action.id)?;
        Ok(Some(record_snapshot(existing.as_ref())?))
    }

    async fn execute(&self, action: &Action) -> Result<ActionResult, ActionError> {
        let new = new_record(action)?;
        let record = self
            .records
            .create_with_id(&action.tenant_id, action.id, &new)?;

        tracing::info!(action_id = %action.id, record_id = %record.id, category = %record.category, "Record created");

        let change = ItemSignal::new(ItemEvent::Created, &record.category, record.id.to_string())
            .with_values(record_values(&record), Fields::new())
            .with_occurrence(format!("action:{}", action.id));
        Ok(ActionResult {
            message: format!("Created {} \"{}\"", record.category, record.name),
            output: serde_json::json!({ "record_id": record.id }),
            change: Some(change),
        })
    }

    async fn restore(
        &self,
        action: &Action,
        snapshot: &serde_json::Value,
    ) -> Result<(), ActionError> {
        restore_record_snapshot(&self.records, action, action.id, snapshot)
    }

    fn describe(&self, action: &Action) -> String {
        format!(
            "Create {} record \"{}\"",
            param_str(action, "category").unwrap_or("<no category>"),
            param_str(action, "name").unwrap_or("Untitled")
        )
    }
}
