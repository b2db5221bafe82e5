//! Archive-record action handler.

use std::sync::Arc;

use async_trait::async_trait;

use brainbox_core::actions::{Action, ActionKind};
use brainbox_core::workflows::{ItemEvent, ItemSignal};
use brainbox_storage::{Database, RecordRepository};

use crate::error::ActionError;
use crate::handler::{
    load_target, record_snapshot, record_values, restore_record_snapshot, target_id,
    ActionHandler, ActionResult,
};

pub struct ArchiveRecordHandler {
    records: RecordRepository,
}

impl ArchiveRecordHandler {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            records: RecordRepository::new(db),
        }
    }
}

#[async_trait]
impl ActionHandler for ArchiveRecordHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::ArchiveRecord
    }

    async fn snapshot(&self, action: &Action) -> Result<Option<serde_json::Value>, ActionError> {
        let record = load_target(&self.records, action)?;
        Ok(Some(record_snapshot(Some(&record))?))
    }

    async fn execute(&self, action: &Action) -> Result<ActionResult, ActionError> {
        let before = load_target(&self.records, action)?;
        self.records.set_archived(&action.tenant_id, before.id, true)?;
        let mut after = before.clone();
        after.archived = true;

        tracing::info!(action_id = %action.id, record_id = %before.id, "Record archived");

        let change = ItemSignal::new(ItemEvent::Updated, &after.category, after.id.to_string())
            .with_values(record_values(&after), record_values(&before))
            .with_occurrence(format!("action:{}", action.id));
        Ok(ActionResult {
            message: format!("Archived \"{}\"", after.name),
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
        format!(
            "Archive record {}",
            action.target_id.as_deref().unwrap_or("<no target>")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::test_support::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_archive_and_roll_back() {
        let db = db();
        let record = seed(&db);
        let handler = ArchiveRecordHandler::new(db.clone());
        let action = action(ActionKind::ArchiveRecord, Some(record.id), json!({}));

        let snapshot = handler.snapshot(&action).await.unwrap().unwrap();
        handler.execute(&action).await.unwrap();
        let records = RecordRepository::new(db);
        assert!(records.get(&record.tenant_id, record.id).unwrap().unwrap().archived);
        assert!(records
            .list_by_category(&record.tenant_id, "projects", 10)
            .unwrap()
            .is_empty());

        handler.restore(&action, &snapshot).await.unwrap();
        assert!(!records.get(&record.tenant_id, record.id).unwrap().unwrap().archived);
    }
}
