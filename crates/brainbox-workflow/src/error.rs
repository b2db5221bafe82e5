//! Error types for workflow definitions and the engine.

use brainbox_action::ActionError;
use brainbox_core::error::BrainboxError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Workflow not found: {0}")]
    NotFound(Uuid),
    #[error("Invalid workflow: {0}")]
    Validation(String),
    #[error("Workflow is disabled: {0}")]
    Disabled(Uuid),
    #[error("Action error: {0}")]
    Action(#[from] ActionError),
    #[error("Storage error: {0}")]
    Storage(#[from] BrainboxError),
}
