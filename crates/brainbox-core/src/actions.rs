//! Proposed mutations and their lifecycle states.
//!
//! Any subsystem may propose an [`Action`]; the governor in
//! `brainbox-action` owns the transitions between [`ActionStatus`] values.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{TenantId, Timestamp};

/// Kinds of mutation an action can perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreateRecord,
    UpdateRecord,
    SetStatus,
    ArchiveRecord,
    Notify,
}

impl ActionKind {
    /// Whether the action mutates state that can be captured and restored.
    pub fn supports_rollback(&self) -> bool {
        !matches!(self, ActionKind::Notify)
    }

    pub fn all() -> [ActionKind; 5] {
        [
            ActionKind::CreateRecord,
            ActionKind::UpdateRecord,
            ActionKind::SetStatus,
            ActionKind::ArchiveRecord,
            ActionKind::Notify,
        ]
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::CreateRecord => write!(f, "create_record"),
            ActionKind::UpdateRecord => write!(f, "update_record"),
            ActionKind::SetStatus => write!(f, "set_status"),
            ActionKind::ArchiveRecord => write!(f, "archive_record"),
            ActionKind::Notify => write!(f, "notify"),
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_record" => Ok(ActionKind::CreateRecord),
            "update_record" => Ok(ActionKind::UpdateRecord),
            "set_status" => Ok(ActionKind::SetStatus),
            "archive_record" => Ok(ActionKind::ArchiveRecord),
            "notify" => Ok(ActionKind::Notify),
            _ => Err(format!("Unknown action type: {}", s)),
        }
    }
}

/// Action lifecycle states.
///
/// pending -> approved -> executing -> executed, with pending -> rejected and
/// executing -> failed as the other terminal exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Approved,
    Rejected,
    Executing,
    Executed,
    Failed,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Rejected | ActionStatus::Executed | ActionStatus::Failed
        )
    }

    pub fn all() -> [ActionStatus; 6] {
        [
            ActionStatus::Pending,
            ActionStatus::Approved,
            ActionStatus::Rejected,
            ActionStatus::Executing,
            ActionStatus::Executed,
            ActionStatus::Failed,
        ]
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStatus::Pending => write!(f, "pending"),
            ActionStatus::Approved => write!(f, "approved"),
            ActionStatus::Rejected => write!(f, "rejected"),
            ActionStatus::Executing => write!(f, "executing"),
            ActionStatus::Executed => write!(f, "executed"),
            ActionStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for ActionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActionStatus::Pending),
            "approved" => Ok(ActionStatus::Approved),
            "rejected" => Ok(ActionStatus::Rejected),
            "executing" => Ok(ActionStatus::Executing),
            "executed" => Ok(ActionStatus::Executed),
            "failed" => Ok(ActionStatus::Failed),
            _ => Err(format!("Unknown action status: {}", s)),
        }
    }
}

/// Outcome of a guarded status transition.
///
/// `NoOp` means the stored status no longer matched the expected pre-state,
/// typically because a concurrent caller already moved the action on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    NoOp,
}

impl Transition {
    pub fn applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

/// A proposed mutation and everything recorded about its lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub kind: ActionKind,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub parameters: serde_json::Value,
    pub status: ActionStatus,
    pub requires_approval: bool,
    /// Subsystem that proposed the action (e.g. `workflow:<id>`, `cli`).
    pub source: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<Timestamp>,
    pub rejection_reason: Option<String>,
    pub rollback_snapshot: Option<serde_json::Value>,
    pub snapshot_at: Option<Timestamp>,
    pub executed_at: Option<Timestamp>,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Input for proposing an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAction {
    pub kind: ActionKind,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub parameters: serde_json::Value,
    pub requires_approval: bool,
    pub source: Option<String>,
}

impl NewAction {
    pub fn new(kind: ActionKind, parameters: serde_json::Value) -> Self {
        Self {
            kind,
            target_type: None,
            target_id: None,
            parameters,
            requires_approval: true,
            source: None,
        }
    }

    pub fn targeting(mut self, target_type: &str, target_id: impl Into<String>) -> Self {
        self.target_type = Some(target_type.to_string());
        self.target_id = Some(target_id.into());
        self
    }

    pub fn without_approval(mut self) -> Self {
        self.requires_approval = false;
        self
    }

    pub fn from_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}
