//! Error types for the action governor and handlers.

use brainbox_core::actions::{ActionKind, ActionStatus};
use brainbox_core::error::BrainboxError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Action not found: {0}")]
    NotFound(Uuid),
    #[error("Invalid state transition: {0} -> {1}")]
    InvalidTransition(ActionStatus, ActionStatus),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Action type not registered: {0}")]
    UnregisteredHandler(ActionKind),
    #[error("Action handler failed: {0}")]
    HandlerFailed(String),
    #[error("Storage error: {0}")]
    Storage(#[from] BrainboxError),
}
