//! In-process doubles shared by the classifier and router tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use brainbox_core::config::{CaptureConfig, TenantSettings};
use brainbox_core::error::{BrainboxError, Result};
use brainbox_core::types::{AuditRecord, TenantId, TokenUsage};
use brainbox_storage::{
    AuditRepository, CaptureLogRepository, CorrectionRepository, Database, RecordRepository,
    SettingsRepository, UsageRepository,
};

use crate::classifier::Classifier;
use crate::context::{
    AuditSink, CalendarContext, ClassifierContext, NoCalendar, SettingsSource, StoredSettings,
};
use crate::error::ProviderError;
use crate::provider::{Generation, Prompt, TextGenerator};
use crate::router::CaptureRouter;

/// Returns the same outcome on every call and keeps the prompts it saw.
pub struct ScriptedGenerator {
    outcome: std::result::Result<String, ProviderError>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedGenerator {
    pub fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            outcome: Ok(text.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(error: ProviderError) -> Arc<Self> {
        Arc::new(Self {
            outcome: Err(error),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn last_prompt(&self) -> Option<Prompt> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-1"
    }

    async fn generate(&self, prompt: &Prompt) -> std::result::Result<Generation, ProviderError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        self.outcome.clone().map(|text| Generation {
            text,
            usage: TokenUsage {
                provider: "scripted".into(),
                model: "scripted-1".into(),
                input_tokens: 100,
                output_tokens: 20,
            },
        })
    }
}

struct BrokenAudit;

impl AuditSink for BrokenAudit {
    fn append(&self, _record: &AuditRecord) -> Result<()> {
        Err(BrainboxError::Storage("audit table is locked".into()))
    }
}

struct FixedMeeting(String);

#[async_trait]
impl CalendarContext for FixedMeeting {
    async fn current_meeting_summary(&self, _tenant: &TenantId) -> Result<Option<String>> {
        Ok(Some(self.0.clone()))
    }
}

/// A tenant, an in-memory database, and a scripted provider.
pub struct Harness {
    pub tenant: TenantId,
    pub db: Arc<Database>,
    pub generator: Arc<ScriptedGenerator>,
    pub audit: AuditRepository,
    pub usage: UsageRepository,
    pub corrections: CorrectionRepository,
    pub records: RecordRepository,
    pub capture_log: CaptureLogRepository,
    settings: Arc<StoredSettings>,
    audit_sink: Arc<dyn AuditSink>,
    calendar: Arc<dyn CalendarContext>,
}

impl Harness {
    pub fn new(generator: Arc<ScriptedGenerator>) -> Self {
        let db = Arc::new(Database::in_memory().unwrap());
        Self {
            tenant: TenantId::from("tenant-a"),
            generator,
            audit: AuditRepository::new(db.clone()),
            usage: UsageRepository::new(db.clone()),
            corrections: CorrectionRepository::new(db.clone()),
            records: RecordRepository::new(db.clone()),
            capture_log: CaptureLogRepository::new(db.clone()),
            settings: Arc::new(StoredSettings::new(
                SettingsRepository::new(db.clone()),
                TenantSettings::default(),
            )),
            audit_sink: Arc::new(AuditRepository::new(db.clone())),
            calendar: Arc::new(NoCalendar),
            db,
        }
    }

    pub fn with_broken_audit(mut self) -> Self {
        self.audit_sink = Arc::new(BrokenAudit);
        self
    }

    pub fn with_meeting(mut self, summary: &str) -> Self {
        self.calendar = Arc::new(FixedMeeting(summary.to_string()));
        self
    }

    pub fn classifier(&self) -> Classifier {
        Classifier::new(
            self.generator.clone(),
            CorrectionRepository::new(self.db.clone()),
            ClassifierContext {
                settings: self.settings.clone(),
                audit: self.audit_sink.clone(),
                usage: Arc::new(UsageRepository::new(self.db.clone())),
                calendar: self.calendar.clone(),
            },
        )
    }

    pub fn router(&self) -> CaptureRouter {
        CaptureRouter::new(
            Arc::new(self.classifier()),
            self.db.clone(),
            &CaptureConfig::default(),
        )
        .unwrap()
    }

    /// Make every insert into `table` fail from now on.
    pub fn fail_inserts_into(&self, table: &str) {
        self.db
            .with_conn(|conn| {
                conn.execute_batch(&format!(
                    "CREATE TRIGGER fail_{table} BEFORE INSERT ON {table}
                     BEGIN SELECT RAISE(ABORT, 'disk full'); END;"
                ))
                .map_err(|e| BrainboxError::Storage(e.to_string()))
            })
            .unwrap();
    }

    fn update_settings(&self, change: impl FnOnce(&mut TenantSettings)) {
        let mut settings = self.settings.settings(&self.tenant).unwrap();
        change(&mut settings);
        SettingsRepository::new(self.db.clone())
            .save(&self.tenant, &settings)
            .unwrap();
    }

    pub fn set_threshold(&self, threshold: f64) {
        self.update_settings(|s| s.confidence_threshold = threshold);
    }

    pub fn set_learning(&self, enabled: bool, max_examples: u32, days_back: u32) {
        self.update_settings(|s| {
            s.learning.enabled = enabled;
            s.learning.max_examples = max_examples;
            s.learning.days_back = days_back;
        });
    }

    pub fn disable_category(&self, category: &str) {
        self.update_settings(|s| {
            if let Some(c) = s.categories.get_mut(category) {
                c.enabled = false;
            }
        });
    }
}
