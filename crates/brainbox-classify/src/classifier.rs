//! The classifier: prompt, provider call, parse, audit.

use std::sync::Arc;

use chrono::Local;
use tracing::{debug, info, warn};
use uuid::Uuid;

use brainbox_core::config::TenantSettings;
use brainbox_core::types::{
    AuditRecord, AuditStatus, ClassificationResult, Correction, TenantId, Timestamp,
};
use brainbox_storage::CorrectionRepository;

use crate::context::ClassifierContext;
use crate::error::ClassifyError;
use crate::parser::parse_classification;
use crate::prompt::{build_prompt, PromptInputs};
use crate::provider::{Prompt, TextGenerator};

pub struct Classifier {
    provider: Arc<dyn TextGenerator>,
    corrections: CorrectionRepository,
    ctx: ClassifierContext,
}

impl Classifier {
    pub fn new(
        provider: Arc<dyn TextGenerator>,
        corrections: CorrectionRepository,
        ctx: ClassifierContext,
    ) -> Self {
        Self {
            provider,
            corrections,
            ctx,
        }
    }

    pub fn context(&self) -> &ClassifierContext {
        &self.ctx
    }

    /// Classify `text` for `tenant`.
    ///
    /// Exactly one audit record is written per call, whatever the outcome.
    /// Audit and usage writes are best effort and never change the result.
    pub async fn classify(
        &self,
        tenant: &TenantId,
        text: &str,
    ) -> Result<ClassificationResult, ClassifyError> {
        let settings = match self.ctx.settings.settings(tenant) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(tenant_id = %tenant, error = %e, "Failed to load tenant settings");
                self.audit(tenant, text, "", "", Err(e.to_string().as_str()));
                return Err(e.into());
            }
        };
        let prompt = self.prompt_for(tenant, text, &settings).await;
        let rendered = prompt.render();

        let generation = match self.provider.generate(&prompt).await {
            Ok(generation) => generation,
            Err(e) => {
                warn!(tenant_id = %tenant, provider = self.provider.name(), error = %e, "Classification provider call failed");
                self.audit(tenant, text, &rendered, "", Err(e.to_string().as_str()));
                return Err(e.into());
            }
        };

        if let Err(e) = self.ctx.usage.record(tenant, &generation.usage) {
            warn!(tenant_id = %tenant, error = %e, "Failed to record token usage");
        }

        match parse_classification(&generation.text, &settings.enabled_categories()) {
            Ok(result) => {
                self.audit(tenant, text, &rendered, &generation.text, Ok(&result));
                info!(
                    tenant_id = %tenant,
                    category = %result.category,
                    confidence = result.confidence,
                    "Classified capture"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(tenant_id = %tenant, error = %e, "Classifier output rejected");
                self.audit(tenant, text, &rendered, &generation.text, Err(e.to_string().as_str()));
                Err(e)
            }
        }
    }

    /// Build the prompt `classify` would send right now.
    pub async fn prompt_for(&self, tenant: &TenantId, text: &str, settings: &TenantSettings) -> Prompt {
        let categories = settings.enabled_categories();
        let corrections = self.examples(tenant, settings);
        let calendar = match self.ctx.calendar.current_meeting_summary(tenant).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(tenant_id = %tenant, error = %e, "Calendar lookup failed");
                None
            }
        };

        build_prompt(&PromptInputs {
            text,
            categories: &categories,
            today: Local::now().date_naive(),
            calendar: calendar.as_deref(),
            corrections: &corrections,
        })
    }

    fn examples(&self, tenant: &TenantId, settings: &TenantSettings) -> Vec<Correction> {
        let learning = &settings.learning;
        if !learning.enabled || learning.max_examples == 0 {
            return Vec::new();
        }
        match self
            .corrections
            .recent(tenant, learning.max_examples, learning.days_back)
        {
            Ok(corrections) => {
                debug!(tenant_id = %tenant, count = corrections.len(), "Loaded correction examples");
                corrections
            }
            Err(e) => {
                warn!(tenant_id = %tenant, error = %e, "Failed to load corrections");
                Vec::new()
            }
        }
    }

    fn audit(
        &self,
        tenant: &TenantId,
        text: &str,
        prompt: &str,
        raw_response: &str,
        outcome: std::result::Result<&ClassificationResult, &str>,
    ) {
        let (parsed_result, status, error_message) = match outcome {
            Ok(result) => (Some(result.clone()), AuditStatus::Success, None),
            Err(message) => (None, AuditStatus::Error, Some(message.to_string())),
        };
        let record = AuditRecord {
            id: Uuid::new_v4(),
            tenant_id: tenant.clone(),
            input_text: text.to_string(),
            provider: self.provider.name().to_string(),
            model: self.provider.model().to_string(),
            prompt: prompt.to_string(),
            raw_response: raw_response.to_string(),
            parsed_result,
            status,
            error_message,
            timestamp: Timestamp::now(),
        };
        if let Err(e) = self.ctx.audit.append(&record) {
            warn!(tenant_id = %tenant, error = %e, "Failed to write audit record");
        }
    }
}
