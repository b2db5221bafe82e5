//! The action governor.
//!
//! Owns every status change of an [`Action`]. Each change is a guarded
//! update keyed on the expected pre-state; when nothing matches, the call
//! returns [`Transition::NoOp`] instead of failing, so repeated or racing
//! approvals are harmless.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use brainbox_core::actions::{Action, ActionKind, ActionStatus, NewAction, Transition};
use brainbox_core::types::TenantId;
use brainbox_storage::{ActionRepository, Database};

use crate::error::ActionError;
use crate::state_machine::validate_transition;

pub struct ActionGovernor {
    repo: ActionRepository,
}

impl ActionGovernor {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            repo: ActionRepository::new(db),
        }
    }

    /// Insert a proposal in `pending`.
    pub fn propose(&self, tenant: &TenantId, new: &NewAction) -> Result<Action, ActionError> {
        validate_proposal(new)?;
        let action = self.repo.insert(tenant, new)?;
        info!(
            tenant_id = %tenant,
            action_id = %action.id,
            kind = %action.kind,
            requires_approval = action.requires_approval,
            source = action.source.as_deref().unwrap_or("-"),
            "Action proposed"
        );
        Ok(action)
    }

    /// `pending -> approved`, recording who approved and when.
    pub fn approve(
        &self,
        tenant: &TenantId,
        id: Uuid,
        approver: &str,
    ) -> Result<Transition, ActionError> {
        if approver.trim().is_empty() {
            return Err(ActionError::Validation("Approver must not be blank".into()));
        }
        let outcome = self.repo.approve(tenant, id, approver)?;
        self.settle(tenant, id, ActionStatus::Approved, outcome)
    }

    /// `pending -> rejected`, recording the reason.
    pub fn reject(
        &self,
        tenant: &TenantId,
        id: Uuid,
        reason: &str,
    ) -> Result<Transition, ActionError> {
        let outcome = self.repo.reject(tenant, id, reason)?;
        self.settle(tenant, id, ActionStatus::Rejected, outcome)
    }

    /// `approved -> executing`, persisting the pre-mutation snapshot first.
    ///
    /// Kinds that support rollback must supply a snapshot; the mutation
    /// itself happens only after this returns `Applied`.
    pub fn begin_execution(
        &self,
        tenant: &TenantId,
        id: Uuid,
        snapshot: Option<&serde_json::Value>,
    ) -> Result<Transition, ActionError> {
        let action = self.get(tenant, id)?;
        if action.kind.supports_rollback() && snapshot.is_none() {
            return Err(ActionError::Validation(format!(
                "{} actions need a rollback snapshot before execution",
                action.kind
            )));
        }
        let outcome = self.repo.begin_execution(tenant, id, snapshot)?;
        self.settle(tenant, id, ActionStatus::Executing, outcome)
    }

    /// `executing -> executed`, storing the result payload.
    pub fn complete_execution(
        &self,
        tenant: &TenantId,
        id: Uuid,
        result: &serde_json::Value,
    ) -> Result<Transition, ActionError> {
        let outcome = self.repo.complete_execution(tenant, id, result)?;
        self.settle(tenant, id, ActionStatus::Executed, outcome)
    }

    /// `executing -> failed`. No retry; the snapshot stays for restoration.
    pub fn fail_execution(
        &self,
        tenant: &TenantId,
        id: Uuid,
        error: &str,
    ) -> Result<Transition, ActionError> {
        let outcome = self.repo.fail_execution(tenant, id, error)?;
        self.settle(tenant, id, ActionStatus::Failed, outcome)
    }

    pub fn get(&self, tenant: &TenantId, id: Uuid) -> Result<Action, ActionError> {
        self.repo.get(tenant, id)?.ok_or(ActionError::NotFound(id))
    }

    pub fn list(
        &self,
        tenant: &TenantId,
        status: Option<ActionStatus>,
        limit: u32,
    ) -> Result<Vec<Action>, ActionError> {
        Ok(self.repo.list(tenant, status, limit)?)
    }

    /// Log the outcome. A no-op on a missing action is `NotFound`.
    fn settle(
        &self,
        tenant: &TenantId,
        id: Uuid,
        to: ActionStatus,
        outcome: Transition,
    ) -> Result<Transition, ActionError> {
        match outcome {
            Transition::Applied => {
                info!(tenant_id = %tenant, action_id = %id, status = %to, "Action transitioned");
            }
            Transition::NoOp => {
                let current = self.get(tenant, id)?;
                debug!(
                    tenant_id = %tenant,
                    action_id = %id,
                    current = %current.status,
                    target = %to,
                    allowed = validate_transition(current.status, to).is_ok(),
                    "Guarded transition matched nothing"
                );
            }
        }
        Ok(outcome)
    }
}

fn validate_proposal(new: &NewAction) -> Result<(), ActionError> {
    if !(new.parameters.is_object() || new.parameters.is_null()) {
        return Err(ActionError::Validation(
            "Action parameters must be an object".into(),
        ));
    }
    let needs_target = matches!(
        new.kind,
        ActionKind::UpdateRecord | ActionKind::SetStatus | ActionKind::ArchiveRecord
    );
    let has_target = new
        .target_id
        .as_deref()
        .is_some_and(|t| !t.trim().is_empty());
    if needs_target && !has_target {
        return Err(ActionError::Validation(format!(
            "{} actions need a target_id",
            new.kind
        )));
    }
    Ok(())
}
