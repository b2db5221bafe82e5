//! Notify action handler.
//!
//! Emits the notification through the log; there is nothing to roll back.

use async_trait::async_trait;

use brainbox_core::actions::{Action, ActionKind};

use crate::error::ActionError;
use crate::handler::{param_str, ActionHandler, ActionResult};

pub struct NotifyHandler;

#[async_trait]
impl ActionHandler for NotifyHandler {
    fn kind(&self) -> ActionKind {
        ActionKind::Notify
    }

    async fn snapshot(&self, _action: &Action) -> Result<Option<serde_json::Value>, ActionError> {
        Ok(None)
    }

    async fn execute(&self, action: &Action) -> Result<ActionResult, ActionError> {
        let title = param_str(action, "title").ok_or_else(|| {
            ActionError::Validation("Notification title must not be empty".to_string())
        })?;
        let body = param_str(action, "body").unwrap_or("");

        tracing::info!(tenant_id = %action.tenant_id, title = %title, body = %body, "Notification");

        Ok(ActionResult {
            message: format!("Notified: {}", title),
            output: serde_json::json!({ "title": title, "body": body }),
            change: None,
        })
    }

    async fn restore(
        &self,
        _action: &Action,
        _snapshot: &serde_json::Value,
    ) -> Result<(), ActionError> {
        Err(ActionError::Validation(
            "Notifications cannot be rolled back".into(),
        ))
    }

    fn describe(&self, action: &Action) -> String {
        format!("Notify: {}", param_str(action, "title").unwrap_or("<no title>"))
    }
}
