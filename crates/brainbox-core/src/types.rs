use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Free-form field map extracted by the classifier and stored on records.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Category label used for captures that were not filed.
pub const NEEDS_REVIEW: &str = "needs_review";

// =============================================================================
// Newtype Wrappers
// =============================================================================

/// Tenant identifier. Every row and query is scoped to exactly one tenant.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unix timestamp in milliseconds (UTC).
///
/// Millisecond resolution keeps recency ordering of append-only rows
/// meaningful when several are written within the same second.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.0).unwrap_or_default()
    }

    /// Timestamp `days` days before now.
    pub fn days_ago(days: u32) -> Self {
        Self(Self::now().0 - i64::from(days) * 86_400_000)
    }

    pub fn age_days(&self) -> u32 {
        let elapsed = Timestamp::now().0 - self.0;
        (elapsed / 86_400_000).max(0) as u32
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}

// =============================================================================
// Capture Log
// =============================================================================

/// Filing outcome of a single capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStatus {
    Filed,
    NeedsReview,
    Fixed,
}

impl fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureStatus::Filed => write!(f, "filed"),
            CaptureStatus::NeedsReview => write!(f, "needs_review"),
            CaptureStatus::Fixed => write!(f, "fixed"),
        }
    }
}

impl std::str::FromStr for CaptureStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "filed" => Ok(CaptureStatus::Filed),
            "needs_review" => Ok(CaptureStatus::NeedsReview),
            "fixed" => Ok(CaptureStatus::Fixed),
            _ => Err(format!("Unknown capture status: {}", s)),
        }
    }
}

/// One row per incoming capture.
///
/// `destination_ref` points at the filed record, or at this entry itself for
/// review items. The self-reference can only be written after the entry's
/// id exists, so review entries are created in two steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureLogEntry {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub original_text: String,
    pub filed_category: String,
    pub destination_ref: Option<Uuid>,
    pub confidence: f64,
    pub status: CaptureStatus,
    pub created_at: Timestamp,
}

// =============================================================================
// Category Records
// =============================================================================

/// A filed record in one of the tenant's categories.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub category: String,
    pub name: String,
    pub status: Option<String>,
    pub fields: Fields,
    pub capture_id: Option<Uuid>,
    pub archived: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl CategoryRecord {
    /// Flat view used by workflow conditions and templates: the extra
    /// fields plus `name`, `category`, `archived` and `status`.
    pub fn values(&self) -> Fields {
        let mut values = self.fields.clone();
        values.insert("name".into(), self.name.clone().into());
        values.insert("category".into(), self.category.clone().into());
        values.insert("archived".into(), self.archived.into());
        if let Some(status) = &self.status {
            values.insert("status".into(), status.clone().into());
        }
        values
    }
}

/// Input for creating a category record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRecord {
    pub category: String,
    pub name: String,
    pub status: Option<String>,
    pub fields: Fields,
    pub capture_id: Option<Uuid>,
}

// =============================================================================
// Classification & Audit
// =============================================================================

/// Parsed, validated classifier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: String,
    #[serde(default)]
    pub fields: Fields,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

/// Outcome of a classification attempt as recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Error,
}

impl fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditStatus::Success => write!(f, "success"),
            AuditStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for AuditStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(AuditStatus::Success),
            "error" => Ok(AuditStatus::Error),
            _ => Err(format!("Unknown audit status: {}", s)),
        }
    }
}

/// Immutable record of one classification attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub input_text: String,
    pub provider: String,
    pub model: String,
    pub prompt: String,
    pub raw_response: String,
    pub parsed_result: Option<ClassificationResult>,
    pub status: AuditStatus,
    pub error_message: Option<String>,
    pub timestamp: Timestamp,
}

// =============================================================================
// Learning
// =============================================================================

/// A human override of a prior filing decision. Never updated or merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub source_log_id: Option<Uuid>,
    pub original_category: String,
    pub corrected_category: String,
    pub message_text: String,
    pub created_at: Timestamp,
}

// =============================================================================
// Usage Accounting
// =============================================================================

/// Token usage reported by a text-generation provider for one call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub provider: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}
