//! The workflow engine.
//!
//! For each signal the engine selects the tenant's enabled workflows whose
//! trigger matches, in priority order, and turns each one's action
//! templates into proposals for the [`ActionGovernor`]. Every workflow run
//! is keyed by `(workflow id, signal occurrence)`; a key that was already
//! claimed is skipped without writing a second execution row. A run whose
//! execution row cannot be written gives its claim back.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use brainbox_action::ActionGovernor;
use brainbox_core::types::{TenantId, Timestamp};
use brainbox_core::workflows::{
    ExecutionStatus, ItemSignal, Signal, Trigger, Workflow, WorkflowExecution,
};
use brainbox_storage::{Database, ExecutionRepository, WorkflowRepository};

use crate::condition::all_match;
use crate::error::WorkflowError;
use crate::schedule::tick_matches;
use crate::template::render;

/// What happened to one matching workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowOutcome {
    pub workflow_id: Uuid,
    pub name: String,
    pub status: ExecutionStatus,
    /// Actions proposed for this run, in declared order.
    pub action_ids: Vec<Uuid>,
    pub error: Option<String>,
}

/// Outcomes for every matching workflow, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineReport {
    pub outcomes: Vec<WorkflowOutcome>,
}

impl EngineReport {
    pub fn count(&self, status: ExecutionStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn proposed(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.outcomes.iter().flat_map(|o| o.action_ids.iter().copied())
    }
}

pub struct WorkflowEngine {
    workflows: WorkflowRepository,
    executions: ExecutionRepository,
    governor: Arc<ActionGovernor>,
}

impl WorkflowEngine {
    pub fn new(db: Arc<Database>, governor: Arc<ActionGovernor>) -> Self {
        Self {
            workflows: WorkflowRepository::new(db.clone()),
            executions: ExecutionRepository::new(db),
            governor,
        }
    }

    /// Evaluate one signal for one tenant.
    ///
    /// A failure inside one workflow is recorded on that workflow's
    /// outcome and does not stop the remaining ones. Only a failure to
    /// load the candidate workflows is returned as an error.
    pub fn on_signal(&self, tenant: &TenantId, signal: &Signal) -> Result<EngineReport, WorkflowError> {
        let matching = self.matching(tenant, signal)?;
        if matching.is_empty() {
            debug!(tenant_id = %tenant, occurrence = %signal.occurrence(), "No workflows matched");
            return Ok(EngineReport::default());
        }

        let occurrence = signal.occurrence();
        let trigger_snapshot = serde_json::to_value(signal).unwrap_or(serde_json::Value::Null);
        let mut report = EngineReport::default();
        for workflow in &matching {
            let outcome = match self.run_workflow(tenant, workflow, signal, &occurrence, &trigger_snapshot) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        tenant_id = %tenant,
                        workflow_id = %workflow.id,
                        error = %e,
                        "Workflow run could not be recorded"
                    );
                    WorkflowOutcome {
                        workflow_id: workflow.id,
                        name: workflow.name.clone(),
                        status: ExecutionStatus::Failed,
                        action_ids: Vec::new(),
                        error: Some(e.to_string()),
                    }
                }
            };
            report.outcomes.push(outcome);
        }
        Ok(report)
    }

    /// Enabled workflows whose trigger matches, highest priority first,
    /// newest first among equal priorities.
    pub fn matching(&self, tenant: &TenantId, signal: &Signal) -> Result<Vec<Workflow>, WorkflowError> {
        let workflows = match signal {
            Signal::Item(item) => self
                .workflows
                .list_enabled(tenant, "event")?
                .into_iter()
                .filter(|w| event_matches(&w.trigger, item))
                .collect(),
            Signal::Tick(tick) => self
                .workflows
                .list_enabled(tenant, "schedule")?
                .into_iter()
                .filter(|w| tick_matches(&w.trigger, tick))
                .collect(),
            Signal::Manual { workflow_id, .. } => self
                .workflows
                .get(tenant, *workflow_id)?
                .filter(|w| w.enabled && w.trigger.is_schedule())
                .into_iter()
                .collect(),
        };
        Ok(workflows)
    }

    fn run_workflow(
        &self,
        tenant: &TenantId,
        workflow: &Workflow,
        signal: &Signal,
        occurrence: &str,
        trigger_snapshot: &serde_json::Value,
    ) -> Result<WorkflowOutcome, WorkflowError> {
        let key = idempotency_key(workflow.id, occurrence);
        if !self.executions.claim(tenant, &key)? {
            debug!(
                tenant_id = %tenant,
                workflow_id = %workflow.id,
                idempotency_key = %key,
                "Occurrence already handled, skipping"
            );
            return Ok(WorkflowOutcome {
                workflow_id: workflow.id,
                name: workflow.name.clone(),
                status: ExecutionStatus::Skipped,
                action_ids: Vec::new(),
                error: None,
            });
        }

        let item = match signal {
            Signal::Item(item) => Some(item),
            _ => None,
        };
        let mut action_ids = Vec::new();
        let mut proposed = Vec::new();
        let mut error = None;
        for (index, template) in workflow.actions.iter().enumerate() {
            let new = render(template, workflow, item);
            match self.governor.propose(tenant, &new) {
                Ok(action) => {
                    proposed.push(serde_json::json!({
                        "action_id": action.id,
                        "action_type": action.kind,
                        "requires_approval": action.requires_approval,
                    }));
                    action_ids.push(action.id);
                }
                Err(e) => {
                    warn!(
                        tenant_id = %tenant,
                        workflow_id = %workflow.id,
                        action_index = index,
                        error = %e,
                        "Workflow action proposal failed"
                    );
                    error = Some(format!("Action #{}: {}", index + 1, e));
                    break;
                }
            }
        }

        let status = if error.is_some() {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Success
        };
        let recorded = self.executions.record(&WorkflowExecution {
            id: Uuid::new_v4(),
            tenant_id: tenant.clone(),
            workflow_id: workflow.id,
            status,
            trigger_snapshot: trigger_snapshot.clone(),
            executed_actions: serde_json::Value::Array(proposed),
            error_message: error.clone(),
            idempotency_key: Some(key.clone()),
            timestamp: Timestamp::now(),
        });
        if let Err(e) = recorded {
            self.abandon(tenant, workflow.id, &key, &action_ids);
            return Err(e.into());
        }

        info!(
            tenant_id = %tenant,
            workflow_id = %workflow.id,
            status = %status,
            actions = action_ids.len(),
            "Workflow executed"
        );
        Ok(WorkflowOutcome {
            workflow_id: workflow.id,
            name: workflow.name.clone(),
            status,
            action_ids,
            error,
        })
    }

    /// Undo a run that could not be recorded: reject what it proposed and
    /// release its claim so a redelivery runs it again.
    fn abandon(&self, tenant: &TenantId, workflow_id: Uuid, key: &str, action_ids: &[Uuid]) {
        for id in action_ids {
            if let Err(e) = self
                .governor
                .reject(tenant, *id, "Workflow run could not be recorded")
            {
                warn!(tenant_id = %tenant, action_id = %id, error = %e, "Failed to withdraw proposal");
            }
        }
        if let Err(e) = self.executions.release(tenant, key) {
            warn!(
                tenant_id = %tenant,
                workflow_id = %workflow_id,
                idempotency_key = %key,
                error = %e,
                "Failed to release idempotency key"
            );
        }
    }
}

pub fn idempotency_key(workflow_id: Uuid, occurrence: &str) -> String {
    format!("{}:{}", workflow_id, occurrence)
}

fn event_matches(trigger: &Trigger, item: &ItemSignal) -> bool {
    match trigger {
        Trigger::Event {
            event,
            item_type,
            conditions,
        } => {
            *event == item.event
                && item_type.as_deref().is_none_or(|t| t == item.item_type)
                && all_match(conditions, item)
        }
        Trigger::Schedule { .. } => false,
    }
}
