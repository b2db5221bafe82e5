//! Collaborators consulted by the classifier and router.
//!
//! Each is a small trait so hosts (and tests) can swap the backing store.

use std::sync::Arc;

use async_trait::async_trait;

use brainbox_core::config::TenantSettings;
use brainbox_core::error::Result;
use brainbox_core::types::{AuditRecord, TenantId, TokenUsage};
use brainbox_storage::{AuditRepository, SettingsRepository, UsageRepository};

/// Tenant settings: enabled categories, defaults, threshold, learning.
pub trait SettingsSource: Send + Sync {
    fn settings(&self, tenant: &TenantId) -> Result<TenantSettings>;
}

/// Settings saved per tenant, falling back to the configured defaults.
pub struct StoredSettings {
    repo: SettingsRepository,
    defaults: TenantSettings,
}

impl StoredSettings {
    pub fn new(repo: SettingsRepository, defaults: TenantSettings) -> Self {
        Self { repo, defaults }
    }
}

impl SettingsSource for StoredSettings {
    fn settings(&self, tenant: &TenantId) -> Result<TenantSettings> {
        Ok(self
            .repo
            .get(tenant)?
            .unwrap_or_else(|| self.defaults.clone()))
    }
}

/// Fixed settings for every tenant.
impl SettingsSource for TenantSettings {
    fn settings(&self, _tenant: &TenantId) -> Result<TenantSettings> {
        Ok(self.clone())
    }
}

/// Token accounting sink. Callers log and drop failures.
pub trait UsageRecorder: Send + Sync {
    fn record(&self, tenant: &TenantId, usage: &TokenUsage) -> Result<()>;
}

impl UsageRecorder for UsageRepository {
    fn record(&self, tenant: &TenantId, usage: &TokenUsage) -> Result<()> {
        UsageRepository::record(self, tenant, usage)
    }
}

/// Destination of classification audit records. Callers log and drop
/// failures.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: &AuditRecord) -> Result<()>;
}

impl AuditSink for AuditRepository {
    fn append(&self, record: &AuditRecord) -> Result<()> {
        AuditRepository::append(self, record)
    }
}

/// Optional calendar lookup used to enrich the prompt.
#[async_trait]
pub trait CalendarContext: Send + Sync {
    /// One-line summary of the meeting the tenant is in right now, if any.
    async fn current_meeting_summary(&self, tenant: &TenantId) -> Result<Option<String>>;
}

/// No calendar integration.
pub struct NoCalendar;

#[async_trait]
impl CalendarContext for NoCalendar {
    async fn current_meeting_summary(&self, _tenant: &TenantId) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Everything the classifier needs besides the provider.
#[derive(Clone)]
pub struct ClassifierContext {
    pub settings: Arc<dyn SettingsSource>,
    pub audit: Arc<dyn AuditSink>,
    pub usage: Arc<dyn UsageRecorder>,
    pub calendar: Arc<dyn CalendarContext>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use brainbox_storage::Database;

    #[test]
    fn test_stored_settings_fall_back_to_defaults() {
        let db = Arc::new(Database::in_memory().unwrap());
        let mut defaults = TenantSettings::default();
        defaults.confidence_threshold = 0.7;
        let source = StoredSettings::new(SettingsRepository::new(db.clone()), defaults.clone());

        let tenant = TenantId::from("t1");
        assert_eq!(source.settings(&tenant).unwrap(), defaults);

        let mut custom = defaults.clone();
        custom.confidence_threshold = 0.9;
        SettingsRepository::new(db).save(&tenant, &custom).unwrap();
        assert_eq!(source.settings(&tenant).unwrap(), custom);
        assert_eq!(source.settings(&TenantId::from("t2")).unwrap(), defaults);
    }

    #[tokio::test]
    async fn test_no_calendar() {
        assert!(NoCalendar
            .current_meeting_summary(&TenantId::from("t1"))
            .await
            .unwrap()
            .is_none());
    }
}
