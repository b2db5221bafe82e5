//! Action handler registry and trait definition.
//!
//! Defines the `ActionHandler` async trait and provides the handler
//! registry for dispatching actions to the correct implementation.

pub mod archive_record;
pub mod create_record;
pub mod notify;
pub mod set_status;
pub mod update_record;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use brainbox_core::actions::{Action, ActionKind};
use brainbox_core::types::{CategoryRecord, Fields};
use brainbox_core::workflows::ItemSignal;
use brainbox_storage::{Database, RecordRepository};

use crate::error::ActionError;

pub use archive_record::ArchiveRecordHandler;
pub use create_record::CreateRecordHandler;
pub use notify::NotifyHandler;
pub use set_status::SetStatusHandler;
pub use update_record::UpdateRecordHandler;

/// What a handler reports after executing an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub message: String,
    #[serde(default)]
    pub output: serde_json::Value,
    /// Item change the host may dispatch to the workflow engine.
    #[serde(default)]
    pub change: Option<ItemSignal>,
}

impl ActionResult {
    /// Payload stored on the action when it completes.
    pub fn to_stored(&self) -> serde_json::Value {
        serde_json::json!({
            "message": self.message,
            "output": self.output,
        })
    }
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn kind(&self) -> ActionKind;

    /// Capture the state `execute` is about to change. `None` for kinds
    /// without rollback.
    async fn snapshot(&self, action: &Action) -> Result<Option<serde_json::Value>, ActionError>;

    async fn execute(&self, action: &Action) -> Result<ActionResult, ActionError>;

    /// Put back the state captured by `snapshot`.
    async fn restore(&self, action: &Action, snapshot: &serde_json::Value)
        -> Result<(), ActionError>;

    fn describe(&self, action: &Action) -> String;
}

/// Handlers keyed by the kind they execute.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: HashMap<ActionKind, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in handler over `db`.
    pub fn with_defaults(db: Arc<Database>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CreateRecordHandler::new(db.clone())));
        registry.register(Arc::new(UpdateRecordHandler::new(db.clone())));
        registry.register(Arc::new(SetStatusHandler::new(db.clone())));
        registry.register(Arc::new(ArchiveRecordHandler::new(db)));
        registry.register(Arc::new(NotifyHandler));
        registry
    }

    /// Register a handler, replacing any previous one for the same kind.
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn get(&self, kind: ActionKind) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&kind).cloned()
    }

    pub fn describe(&self, action: &Action) -> String {
        match self.handlers.get(&action.kind) {
            Some(handler) => handler.describe(action),
            None => format!("{} (no handler)", action.kind),
        }
    }
}

// =============================================================================
// Shared helpers for record handlers
// =============================================================================

/// Snapshot shape used by every record handler: `{"record": <record|null>}`.
pub(crate) fn record_snapshot(record: Option<&CategoryRecord>) -> Result<serde_json::Value, ActionError> {
    let record = match record {
        Some(r) => serde_json::to_value(r)
            .map_err(|e| ActionError::HandlerFailed(format!("Snapshot failed: {}", e)))?,
        None => serde_json::Value::Null,
    };
    Ok(serde_json::json!({ "record": record }))
}

/// Restore a `{"record": ...}` snapshot: re-save the record, or delete the
/// record `id` when the snapshot says it did not exist.
pub(crate) fn restore_record_snapshot(
    records: &RecordRepository,
    action: &Action,
    id: Uuid,
    snapshot: &serde_json::Value,
) -> Result<(), ActionError> {
    match snapshot.get("record") {
        Some(serde_json::Value::Null) => {
            records.delete(&action.tenant_id, id)?;
            Ok(())
        }
        Some(value) => {
            let record: CategoryRecord = serde_json::from_value(value.clone())
                .map_err(|e| ActionError::Validation(format!("Unreadable snapshot: {}", e)))?;
            if record.tenant_id != action.tenant_id || record.id != id {
                return Err(ActionError::Validation(
                    "Snapshot does not belong to this action's target".into(),
                ));
            }
            records.put(&record)?;
            Ok(())
        }
        None => Err(ActionError::Validation(
            "Snapshot has no record entry".into(),
        )),
    }
}

/// The record id an action targets.
pub(crate) fn target_id(action: &Action) -> Result<Uuid, ActionError> {
    let raw = action
        .target_id
        .as_deref()
        .ok_or_else(|| ActionError::Validation(format!("{} action has no target", action.kind)))?;
    Uuid::parse_str(raw.trim())
        .map_err(|_| ActionError::Validation(format!("Target '{}' is not a record id", raw)))
}

/// Load the target record, failing the handler when it is missing.
pub(crate) fn load_target(
    records: &RecordRepository,
    action: &Action,
) -> Result<CategoryRecord, ActionError> {
    let id = target_id(action)?;
    records
        .get(&action.tenant_id, id)?
        .ok_or_else(|| ActionError::HandlerFailed(format!("Record {} not found", id)))
}

/// Values of a record as seen by workflow conditions.
pub(crate) fn record_values(record: &CategoryRecord) -> Fields {
    record.values()
}

pub(crate) fn param_str<'a>(action: &'a Action, key: &str) -> Option<&'a str> {
    action
        .parameters
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
