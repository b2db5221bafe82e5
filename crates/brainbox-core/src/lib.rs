//! Shared configuration, errors, and domain types for brainbox.
//!
//! Every persisted entity is tenant-scoped; the types here carry a
//! [`TenantId`] and are shared by the storage, classification, action, and
//! workflow crates.

pub mod actions;
pub mod config;
pub mod error;
pub mod types;
pub mod workflows;

pub use actions::{Action, ActionKind, ActionStatus, NewAction, Transition};
pub use config::{
    BrainboxConfig, CaptureConfig, CategorySettings, GeneralConfig, LearningSettings,
    ProviderConfig, ProviderKind, SchedulerConfig, TenantSettings,
};
pub use error::{BrainboxError, Result};
pub use types::*;
pub use workflows::{
    ActionTemplate, Condition, ConditionOperator, ExecutionStatus, Frequency, ItemEvent,
    ItemSignal, NewWorkflow, ScheduleTick, Signal, Trigger, Workflow, WorkflowExecution,
    WorkflowUpdate,
};
