//! Drives an approved action through its handler.
//!
//! The governor only manages transitions; the executor is the caller that
//! captures the snapshot, performs the mutation, and reports the outcome.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use brainbox_core::actions::{ActionStatus, Transition};
use brainbox_core::types::TenantId;

use crate::error::ActionError;
use crate::governor::ActionGovernor;
use crate::handler::{ActionRegistry, ActionResult};
use crate::state_machine::validate_transition;

/// Approver recorded when an action that needs no approval is executed.
pub const SYSTEM_APPROVER: &str = "system";

pub struct ActionExecutor {
    governor: Arc<ActionGovernor>,
    registry: Arc<ActionRegistry>,
}

impl ActionExecutor {
    pub fn new(governor: Arc<ActionGovernor>, registry: Arc<ActionRegistry>) -> Self {
        Self { governor, registry }
    }

    /// Execute one action.
    ///
    /// A pending action that does not require approval is approved by
    /// [`SYSTEM_APPROVER`] first. Returns `Ok(None)` when another caller
    /// started executing it in the meantime. Handler failures move the
    /// action to `failed` and are returned as the error.
    pub async fn execute(
        &self,
        tenant: &TenantId,
        id: Uuid,
    ) -> Result<Option<ActionResult>, ActionError> {
        let mut action = self.governor.get(tenant, id)?;
        if action.status == ActionStatus::Pending && !action.requires_approval {
            self.governor.approve(tenant, id, SYSTEM_APPROVER)?;
            action = self.governor.get(tenant, id)?;
        }
        validate_transition(action.status, ActionStatus::Executing)?;

        let handler = self
            .registry
            .get(action.kind)
            .ok_or(ActionError::UnregisteredHandler(action.kind))?;

        let snapshot = handler.snapshot(&action).await?;
        if self
            .governor
            .begin_execution(tenant, id, snapshot.as_ref())?
            == Transition::NoOp
        {
            debug!(tenant_id = %tenant, action_id = %id, "Action already claimed by another executor");
            return Ok(None);
        }

        match handler.execute(&action).await {
            Ok(result) => {
                self.governor
                    .complete_execution(tenant, id, &result.to_stored())?;
                info!(tenant_id = %tenant, action_id = %id, message = %result.message, "Action executed");
                Ok(Some(result))
            }
            Err(e) => {
                warn!(tenant_id = %tenant, action_id = %id, error = %e, "Action failed");
                self.governor.fail_execution(tenant, id, &e.to_string())?;
                Err(e)
            }
        }
    }

    /// Re-apply the stored rollback snapshot of an executed or failed
    /// action. The action's status is left as is.
    pub async fn restore(&self, tenant: &TenantId, id: Uuid) -> Result<(), ActionError> {
        let action = self.governor.get(tenant, id)?;
        if !matches!(action.status, ActionStatus::Executed | ActionStatus::Failed) {
            return Err(ActionError::Validation(format!(
                "Only executed or failed actions can be restored; {} is {}",
                id, action.status
            )));
        }
        let snapshot = action.rollback_snapshot.as_ref().ok_or_else(|| {
            ActionError::Validation(format!("Action {} has no rollback snapshot", id))
        })?;
        let handler = self
            .registry
            .get(action.kind)
            .ok_or(ActionError::UnregisteredHandler(action.kind))?;

        handler.restore(&action, snapshot).await?;
        info!(tenant_id = %tenant, action_id = %id, kind = %action.kind, "Action rolled back");
        Ok(())
    }

    pub fn governor(&self) -> &Arc<ActionGovernor> {
        &self.governor
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }
}
