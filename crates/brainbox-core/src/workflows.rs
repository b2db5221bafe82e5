//! Declarative workflow definitions, executions, and the signals that
//! trigger them.

use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::actions::ActionKind;
use crate::types::{Fields, TenantId, Timestamp};

// =============================================================================
// Enums
// =============================================================================

/// Item lifecycle events that event triggers listen for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemEvent {
    Created,
    Updated,
    Deleted,
    StatusChanged,
}

impl fmt::Display for ItemEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemEvent::Created => write!(f, "created"),
            ItemEvent::Updated => write!(f, "updated"),
            ItemEvent::Deleted => write!(f, "deleted"),
            ItemEvent::StatusChanged => write!(f, "status_changed"),
        }
    }
}

/// Schedule frequencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn all() -> [Frequency; 4] {
        [
            Frequency::Hourly,
            Frequency::Daily,
            Frequency::Weekly,
            Frequency::Monthly,
        ]
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Hourly => write!(f, "hourly"),
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
            Frequency::Monthly => write!(f, "monthly"),
        }
    }
}

/// Comparison applied by a trigger condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    In,
    GreaterThan,
    LessThan,
    Exists,
    NotExists,
}

/// Outcome recorded for one workflow per trigger occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Success => write!(f, "success"),
            ExecutionStatus::Failed => write!(f, "failed"),
            ExecutionStatus::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for ExecutionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ExecutionStatus::Success),
            "failed" => Ok(ExecutionStatus::Failed),
            "skipped" => Ok(ExecutionStatus::Skipped),
            _ => Err(format!("Unknown execution status: {}", s)),
        }
    }
}

// =============================================================================
// Definitions
// =============================================================================

/// `field operator value` check against a signal payload.
///
/// Field paths read the item's new values; an `old.` prefix reads the
/// previous values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: serde_json::Value,
}

/// What a workflow listens for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    Event {
        event: ItemEvent,
        #[serde(default)]
        item_type: Option<String>,
        #[serde(default)]
        conditions: Vec<Condition>,
    },
    Schedule {
        frequency: Frequency,
        /// Local wall-clock time, `HH:MM`.
        time: String,
        /// ISO weekday, 1 = Monday .. 7 = Sunday. Weekly only.
        #[serde(default)]
        day_of_week: Option<u32>,
        /// 1..=31. Monthly only.
        #[serde(default)]
        day_of_month: Option<u32>,
        #[serde(default)]
        conditions: Vec<Condition>,
    },
}

impl Trigger {
    pub fn is_schedule(&self) -> bool {
        matches!(self, Trigger::Schedule { .. })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Trigger::Event { .. } => "event",
            Trigger::Schedule { .. } => "schedule",
        }
    }
}

/// Declared action a workflow turns into a concrete proposal.
///
/// String values in `target_id` and `parameters` may contain `{{item.id}}`,
/// `{{item.type}}` and `{{item.<field>}}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTemplate {
    pub action_type: ActionKind,
    #[serde(default)]
    pub target_type: Option<String>,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default = "default_requires_approval")]
    pub requires_approval: bool,
}

fn default_requires_approval() -> bool {
    true
}

fn default_enabled() -> bool {
    true
}

/// A stored automation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub name: String,
    pub description: Option<String>,
    pub trigger: Trigger,
    pub actions: Vec<ActionTemplate>,
    pub priority: i32,
    pub enabled: bool,
    pub execution_count: u64,
    pub last_executed_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Input for creating a workflow; also the on-disk definition format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWorkflow {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub trigger: Trigger,
    pub actions: Vec<ActionTemplate>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Partial update of a workflow definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub trigger: Option<Trigger>,
    #[serde(default)]
    pub actions: Option<Vec<ActionTemplate>>,
    #[serde(default)]
    pub priority: Option<i32>,
}

/// One execution outcome per (workflow, trigger occurrence).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub workflow_id: Uuid,
    pub status: ExecutionStatus,
    pub trigger_snapshot: serde_json::Value,
    pub executed_actions: serde_json::Value,
    pub error_message: Option<String>,
    pub idempotency_key: Option<String>,
    pub timestamp: Timestamp,
}

// =============================================================================
// Signals
// =============================================================================

/// An item lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemSignal {
    pub event: ItemEvent,
    pub item_type: String,
    pub item_id: String,
    #[serde(default)]
    pub new_values: Fields,
    #[serde(default)]
    pub old_values: Fields,
    pub occurred_at: Timestamp,
    /// Caller-supplied identity of this occurrence, used for idempotency.
    #[serde(default)]
    pub occurrence_id: Option<String>,
}

impl ItemSignal {
    pub fn new(event: ItemEvent, item_type: &str, item_id: impl Into<String>) -> Self {
        Self {
            event,
            item_type: item_type.to_string(),
            item_id: item_id.into(),
            new_values: Fields::new(),
            old_values: Fields::new(),
            occurred_at: Timestamp::now(),
            occurrence_id: None,
        }
    }

    pub fn with_values(mut self, new_values: Fields, old_values: Fields) -> Self {
        self.new_values = new_values;
        self.old_values = old_values;
        self
    }

    pub fn with_occurrence(mut self, occurrence_id: impl Into<String>) -> Self {
        self.occurrence_id = Some(occurrence_id.into());
        self
    }
}

/// A schedule tick for one frequency at one wall-clock minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleTick {
    pub frequency: Frequency,
    pub time_of_day: NaiveTime,
    pub date: NaiveDate,
}

/// Anything the workflow engine reacts to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    Item(ItemSignal),
    Tick(ScheduleTick),
    /// Explicit "run now" of one schedule workflow.
    Manual { workflow_id: Uuid, run_id: Uuid },
}

impl Signal {
    /// Identity of this occurrence; combined with the workflow id to form
    /// the idempotency key.
    pub fn occurrence(&self) -> String {
        match self {
            Signal::Item(item) => match &item.occurrence_id {
                Some(id) => id.clone(),
                None => format!(
                    "{}:{}:{}:{}",
                    item.event, item.item_type, item.item_id, item.occurred_at.0
                ),
            },
            Signal::Tick(tick) => format!(
                "tick:{}:{}T{}",
                tick.frequency,
                tick.date.format("%Y-%m-%d"),
                tick.time_of_day.format("%H:%M")
            ),
            Signal::Manual { run_id, .. } => format!("manual:{}", run_id),
        }
    }
}
