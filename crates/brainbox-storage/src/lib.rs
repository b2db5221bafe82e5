//! SQLite persistence for brainbox.
//!
//! One WAL-mode database holds every table; each repository wraps the
//! shared [`Database`] and scopes every statement by tenant.

pub mod actions;
pub mod audit;
pub mod capture_log;
pub mod corrections;
pub mod db;
pub mod executions;
pub mod migrations;
pub mod records;
mod row;
pub mod settings;
pub mod usage;
pub mod workflows;

pub use actions::ActionRepository;
pub use audit::AuditRepository;
pub use capture_log::CaptureLogRepository;
pub use corrections::CorrectionRepository;
pub use db::Database;
pub use executions::ExecutionRepository;
pub use records::RecordRepository;
pub use settings::SettingsRepository;
pub use usage::{UsageRepository, UsageTotals};
pub use workflows::WorkflowRepository;
