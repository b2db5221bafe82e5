//! Action governance for brainbox.
//!
//! Any subsystem proposes an action; the [`ActionGovernor`] gates it behind
//! approval with guarded transitions, and the [`ActionExecutor`] runs it
//! through a registered [`ActionHandler`] after capturing a rollback
//! snapshot.

pub mod error;
pub mod executor;
pub mod governor;
pub mod handler;
pub mod state_machine;

pub use error::ActionError;
pub use executor::{ActionExecutor, SYSTEM_APPROVER};
pub use governor::ActionGovernor;
pub use handler::{ActionHandler, ActionRegistry, ActionResult};
