//! Workflow configuration operations and manual runs.

use std::path::Path;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use brainbox_core::error::BrainboxError;
use brainbox_core::types::TenantId;
use brainbox_core::workflows::{
    NewWorkflow, Signal, Workflow, WorkflowExecution, WorkflowUpdate,
};
use brainbox_storage::{Database, ExecutionRepository, WorkflowRepository};

use crate::engine::{WorkflowEngine, WorkflowOutcome};
use crate::error::WorkflowError;
use crate::validate::{validate_definition, validate_new};

pub struct WorkflowService {
    workflows: WorkflowRepository,
    executions: ExecutionRepository,
    engine: Arc<WorkflowEngine>,
}

impl WorkflowService {
    pub fn new(db: Arc<Database>, engine: Arc<WorkflowEngine>) -> Self {
        Self {
            workflows: WorkflowRepository::new(db.clone()),
            executions: ExecutionRepository::new(db),
            engine,
        }
    }

    pub fn create(&self, tenant: &TenantId, new: &NewWorkflow) -> Result<Workflow, WorkflowError> {
        validate_new(new)?;
        let workflow = self.workflows.insert(tenant, new)?;
        info!(
            tenant_id = %tenant,
            workflow_id = %workflow.id,
            trigger = workflow.trigger.type_name(),
            "Workflow created"
        );
        Ok(workflow)
    }

    /// Apply a partial update. The merged definition is validated as a
    /// whole before anything is written.
    pub fn update(
        &self,
        tenant: &TenantId,
        id: Uuid,
        update: &WorkflowUpdate,
    ) -> Result<Workflow, WorkflowError> {
        let current = self.get(tenant, id)?;
        validate_definition(
            update.name.as_deref().unwrap_or(&current.name),
            update.trigger.as_ref().unwrap_or(&current.trigger),
            update.actions.as_deref().unwrap_or(&current.actions),
        )?;
        let workflow = self
            .workflows
            .update(tenant, id, update)?
            .ok_or(WorkflowError::NotFound(id))?;
        info!(tenant_id = %tenant, workflow_id = %id, "Workflow updated");
        Ok(workflow)
    }

    pub fn enable(&self, tenant: &TenantId, id: Uuid) -> Result<(), WorkflowError> {
        self.set_enabled(tenant, id, true)
    }

    pub fn disable(&self, tenant: &TenantId, id: Uuid) -> Result<(), WorkflowError> {
        self.set_enabled(tenant, id, false)
    }

    fn set_enabled(&self, tenant: &TenantId, id: Uuid, enabled: bool) -> Result<(), WorkflowError> {
        if !self.workflows.set_enabled(tenant, id, enabled)? {
            return Err(WorkflowError::NotFound(id));
        }
        info!(tenant_id = %tenant, workflow_id = %id, enabled, "Workflow toggled");
        Ok(())
    }

    pub fn get(&self, tenant: &TenantId, id: Uuid) -> Result<Workflow, WorkflowError> {
        self.workflows
            .get(tenant, id)?
            .ok_or(WorkflowError::NotFound(id))
    }

    pub fn list(&self, tenant: &TenantId) -> Result<Vec<Workflow>, WorkflowError> {
        Ok(self.workflows.list(tenant)?)
    }

    /// Delete the definition. Its execution history is kept.
    pub fn delete(&self, tenant: &TenantId, id: Uuid) -> Result<(), WorkflowError> {
        if !self.workflows.delete(tenant, id)? {
            return Err(WorkflowError::NotFound(id));
        }
        info!(tenant_id = %tenant, workflow_id = %id, "Workflow deleted");
        Ok(())
    }

    pub fn executions(
        &self,
        tenant: &TenantId,
        id: Uuid,
        limit: u32,
    ) -> Result<Vec<WorkflowExecution>, WorkflowError> {
        Ok(self.executions.list_for_workflow(tenant, id, limit)?)
    }

    /// Run a schedule workflow now, outside its schedule. Every call is a
    /// distinct occurrence.
    pub fn run_now(&self, tenant: &TenantId, id: Uuid) -> Result<WorkflowOutcome, WorkflowError> {
        let workflow = self.get(tenant, id)?;
        if !workflow.trigger.is_schedule() {
            return Err(WorkflowError::Validation(format!(
                "Only schedule workflows can be run manually; '{}' is {}-triggered",
                workflow.name,
                workflow.trigger.type_name()
            )));
        }
        if !workflow.enabled {
            return Err(WorkflowError::Disabled(id));
        }
        let signal = Signal::Manual {
            workflow_id: id,
            run_id: Uuid::new_v4(),
        };
        self.engine
            .on_signal(tenant, &signal)?
            .outcomes
            .into_iter()
            .next()
            .ok_or(WorkflowError::Disabled(id))
    }
}

/// Read a workflow definition from a `.toml` or `.json` file.
pub fn load_definition(path: &Path) -> Result<NewWorkflow, WorkflowError> {
    let contents = std::fs::read_to_string(path).map_err(BrainboxError::from)?;
    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
    let definition: NewWorkflow = if is_toml {
        toml::from_str(&contents).map_err(|e| {
            WorkflowError::Validation(format!("{}: {}", path.display(), e.message()))
        })?
    } else {
        serde_json::from_str(&contents)
            .map_err(|e| WorkflowError::Validation(format!("{}: {}", path.display(), e)))?
    };
    validate_new(&definition)?;
    Ok(definition)
}
