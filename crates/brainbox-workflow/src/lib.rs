//! Declarative workflows for brainbox.
//!
//! Workflows pair a trigger (an item event or a schedule) with an ordered
//! list of action templates. The [`WorkflowEngine`] matches signals against
//! enabled workflows and proposes their actions to the action governor
//! exactly once per occurrence.

pub mod condition;
pub mod engine;
pub mod error;
pub mod schedule;
pub mod scheduler;
pub mod service;
pub mod template;
pub mod validate;

pub use engine::{EngineReport, WorkflowEngine, WorkflowOutcome};
pub use error::WorkflowError;
pub use scheduler::Scheduler;
pub use service::{load_definition, WorkflowService};
