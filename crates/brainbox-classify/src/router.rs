//! Capture routing: file the capture or flag it for review.
//!
//! Every call to [`CaptureRouter::route`] leaves exactly one capture log
//! entry behind, including when classification fails.

use std::sync::Arc;

use chrono::Local;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use brainbox_core::config::CaptureConfig;
use brainbox_core::error::BrainboxError;
use brainbox_core::types::{CaptureLogEntry, CaptureStatus, ClassificationResult, TenantId};
use brainbox_storage::{CaptureLogRepository, Database};

use crate::classifier::Classifier;
use crate::error::ClassifyError;
use crate::normalize::{build_record, record_from_text};

/// Result of routing one capture.
#[derive(Debug, Clone, Serialize)]
pub struct RouteOutcome {
    pub status: CaptureStatus,
    pub capture_id: Uuid,
    /// The category record created, when filed.
    pub record_id: Option<Uuid>,
    pub message: String,
    pub classification: ClassificationResult,
}

/// Result of moving a capture into a category by hand.
#[derive(Debug, Clone, Serialize)]
pub struct FixOutcome {
    pub capture_id: Uuid,
    pub record_id: Uuid,
    pub previous_category: String,
    pub category: String,
    pub correction_id: Uuid,
}

/// Model-independent ambiguity checks.
pub struct AmbiguityCheck {
    min_length: usize,
    greeting: Option<Regex>,
    hedges: Vec<String>,
}

impl AmbiguityCheck {
    pub fn from_config(config: &CaptureConfig) -> Result<Self, BrainboxError> {
        let alternatives = config
            .greetings
            .iter()
            .map(|g| regex::escape(g.trim()))
            .filter(|g| !g.is_empty())
            .collect::<Vec<_>>();
        let greeting = if alternatives.is_empty() {
            None
        } else {
            let pattern = format!(r"^(?:{})[!.?,\s]*$", alternatives.join("|"));
            let regex = RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| BrainboxError::Config(format!("Invalid greeting pattern: {}", e)))?;
            Some(regex)
        };
        Ok(Self {
            min_length: config.min_length,
            greeting,
            hedges: config.hedge_phrases.iter().map(|h| h.to_lowercase()).collect(),
        })
    }

    /// Too short, or nothing but a greeting.
    pub fn input_is_ambiguous(&self, text: &str) -> bool {
        let trimmed = text.trim();
        trimmed.chars().count() < self.min_length
            || self.greeting.as_ref().is_some_and(|g| g.is_match(trimmed))
    }

    /// The classifier's own reasoning admits it could not tell.
    pub fn reasoning_is_hedged(&self, reasoning: &str) -> bool {
        let lower = reasoning.to_lowercase();
        self.hedges.iter().any(|h| lower.contains(h.as_str()))
    }
}

/// File iff not ambiguous and confidence reaches the threshold.
pub fn decide(ambiguous: bool, confidence: f64, threshold: f64) -> CaptureStatus {
    if !ambiguous && confidence >= threshold {
        CaptureStatus::Filed
    } else {
        CaptureStatus::NeedsReview
    }
}

pub struct CaptureRouter {
    classifier: Arc<Classifier>,
    capture_log: CaptureLogRepository,
    ambiguity: AmbiguityCheck,
    needs_review_message: String,
}

impl CaptureRouter {
    pub fn new(
        classifier: Arc<Classifier>,
        db: Arc<Database>,
        config: &CaptureConfig,
    ) -> Result<Self, ClassifyError> {
        Ok(Self {
            classifier,
            capture_log: CaptureLogRepository::new(db),
            ambiguity: AmbiguityCheck::from_config(config)?,
            needs_review_message: config.needs_review_message.clone(),
        })
    }

    pub async fn route(&self, tenant: &TenantId, text: &str) -> Result<RouteOutcome, ClassifyError> {
        let ambiguous_input = self.ambiguity.input_is_ambiguous(text);

        let classification = match self.classifier.classify(tenant, text).await {
            Ok(classification) => classification,
            Err(e) => {
                match self.capture_log.record_review(tenant, text, 0.0) {
                    Ok(entry) => {
                        warn!(tenant_id = %tenant, capture_id = %entry.id, error = %e, "Capture could not be classified")
                    }
                    Err(log_err) => {
                        warn!(tenant_id = %tenant, error = %log_err, "Failed to log unclassified capture")
                    }
                }
                return Err(e);
            }
        };

        let settings = self.classifier.context().settings.settings(tenant)?;
        let hedged = self.ambiguity.reasoning_is_hedged(&classification.reasoning);
        let status = decide(
            ambiguous_input || hedged,
            classification.confidence,
            settings.confidence_threshold,
        );

        match status {
            CaptureStatus::Filed => {
                let new = build_record(&classification, &settings, None, Local::now().date_naive());
                let (record, entry) = self.capture_log.file_capture(
                    tenant,
                    text,
                    &new,
                    classification.confidence,
                )?;
                info!(
                    tenant_id = %tenant,
                    capture_id = %entry.id,
                    record_id = %record.id,
                    category = %record.category,
                    "Capture filed"
                );
                Ok(RouteOutcome {
                    status,
                    capture_id: entry.id,
                    record_id: Some(record.id),
                    message: format!(
                        "Filed \"{}\" under {} ({:.0}% confident)",
                        record.name,
                        record.category,
                        classification.confidence * 100.0
                    ),
                    classification,
                })
            }
            _ => {
                let entry = self
                    .capture_log
                    .record_review(tenant, text, classification.confidence)?;
                info!(
                    tenant_id = %tenant,
                    capture_id = %entry.id,
                    ambiguous_input,
                    hedged,
                    confidence = classification.confidence,
                    "Capture needs review"
                );
                Ok(RouteOutcome {
                    status,
                    capture_id: entry.id,
                    record_id: None,
                    message: self.needs_review_message.clone(),
                    classification,
                })
            }
        }
    }

    /// Move a capture into `category`, archiving any record it was filed as
    /// and recording the correction.
    pub fn fix(
        &self,
        tenant: &TenantId,
        capture_id: Uuid,
        category: &str,
    ) -> Result<FixOutcome, ClassifyError> {
        let entry = self
            .capture_log
            .get(tenant, capture_id)?
            .ok_or(ClassifyError::NotFound(capture_id))?;
        if entry.status == CaptureStatus::Fixed {
            return Err(ClassifyError::Validation(format!(
                "Capture {} has already been fixed",
                capture_id
            )));
        }

        let category = category.trim().to_lowercase();
        let settings = self.classifier.context().settings.settings(tenant)?;
        if !settings.is_enabled(&category) {
            return Err(ClassifyError::Validation(format!(
                "Category '{}' is not enabled",
                category
            )));
        }

        let new = record_from_text(&category, &entry.original_text, &settings, entry.id);
        let Some((record, correction)) = self.capture_log.apply_fix(&entry, &new)? else {
            return Err(ClassifyError::Validation(format!(
                "Capture {} has already been fixed",
                capture_id
            )));
        };
        info!(
            tenant_id = %tenant,
            capture_id = %entry.id,
            from = %entry.filed_category,
            to = %category,
            "Capture fixed"
        );

        Ok(FixOutcome {
            capture_id: entry.id,
            record_id: record.id,
            previous_category: entry.filed_category,
            category,
            correction_id: correction.id,
        })
    }

    pub fn list(
        &self,
        tenant: &TenantId,
        status: Option<CaptureStatus>,
        limit: u32,
    ) -> Result<Vec<CaptureLogEntry>, ClassifyError> {
        Ok(self.capture_log.list(tenant, status, limit)?)
    }

    pub fn get(&self, tenant: &TenantId, capture_id: Uuid) -> Result<CaptureLogEntry, ClassifyError> {
        self.capture_log
            .get(tenant, capture_id)?
            .ok_or(ClassifyError::NotFound(capture_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::testing::{Harness, ScriptedGenerator};
    use brainbox_core::types::{AuditStatus, NEEDS_REVIEW};

    fn reply(category: &str, confidence: f64, reasoning: &str) -> String {
        serde_json::json!({
            "category": category,
            "fields": {"name": "Weekly review", "due_date": "2020-01-01"},
            "confidence": confidence,
            "reasoning": reasoning,
        })
        .to_string()
    }

    // =========================================================================
    // Decision
    // =========================================================================

    #[test]
    fn test_decide_is_exhaustive() {
        for threshold in [0.0, 0.3, 0.6, 1.0] {
            for step in 0..=20 {
                let confidence = step as f64 / 20.0;
                for ambiguous in [false, true] {
                    let expected = if confidence >= threshold && !ambiguous {
                        CaptureStatus::Filed
                    } else {
                        CaptureStatus::NeedsReview
                    };
                    assert_eq!(decide(ambiguous, confidence, threshold), expected);
                }
            }
        }
    }

    #[test]
    fn test_ambiguity_heuristic() {
        let check = AmbiguityCheck::from_config(&CaptureConfig::default()).unwrap();
        assert!(check.input_is_ambiguous("hi"));
        assert!(check.input_is_ambiguous("   ok  "));
        assert!(check.input_is_ambiguous("Hello!"));
        assert!(check.input_is_ambiguous("thank you."));
        assert!(!check.input_is_ambiguous("hello Ana, call me tomorrow"));
        assert!(!check.input_is_ambiguous("buy milk"));
        assert!(check.reasoning_is_hedged("This is UNCLEAR"));
        assert!(check.reasoning_is_hedged("Looks like a greeting"));
        assert!(!check.reasoning_is_hedged("Clearly a project"));
    }

    #[test]
    fn test_empty_greeting_list_matches_nothing() {
        let config = CaptureConfig {
            greetings: vec![],
            ..CaptureConfig::default()
        };
        let check = AmbiguityCheck::from_config(&config).unwrap();
        assert!(!check.input_is_ambiguous("hello"));
    }

    // =========================================================================
    // Routing
    // =========================================================================

    #[tokio::test]
    async fn test_confident_capture_is_filed() {
        let h = Harness::new(ScriptedGenerator::replying(&reply("projects", 0.92, "a project")));
        h.set_threshold(0.7);
        let outcome = h.router().route(&h.tenant, "weekly review of the garden project").await.unwrap();

        assert_eq!(outcome.status, CaptureStatus::Filed);
        let record_id = outcome.record_id.unwrap();
        let record = h.records.get(&h.tenant, record_id).unwrap().unwrap();
        assert_eq!(record.category, "projects");
        assert_eq!(record.name, "Weekly review");
        assert_eq!(record.status.as_deref(), Some("active"));
        assert!(!record.fields.contains_key("due_date"));

        assert_eq!(h.records.count(&h.tenant).unwrap(), 1);
        let entries = h.capture_log.list(&h.tenant, None, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, CaptureStatus::Filed);
        assert_eq!(entries[0].destination_ref, Some(record_id));
        let audits = h.audit.recent(&h.tenant, 10).unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].status, AuditStatus::Success);
    }

    #[tokio::test]
    async fn test_low_confidence_needs_review() {
        let h = Harness::new(ScriptedGenerator::replying(&reply("ideas", 0.4, "maybe an idea")));
        h.set_threshold(0.7);
        let outcome = h.router().route(&h.tenant, "something about boats").await.unwrap();

        assert_eq!(outcome.status, CaptureStatus::NeedsReview);
        assert!(outcome.record_id.is_none());
        assert_eq!(outcome.message, CaptureConfig::default().needs_review_message);
        assert_eq!(h.records.count(&h.tenant).unwrap(), 0);

        let entry = h.capture_log.get(&h.tenant, outcome.capture_id).unwrap().unwrap();
        assert_eq!(entry.status, CaptureStatus::NeedsReview);
        assert_eq!(entry.filed_category, NEEDS_REVIEW);
        assert_eq!(entry.destination_ref, Some(entry.id));
    }

    #[tokio::test]
    async fn test_threshold_is_inclusive() {
        let h = Harness::new(ScriptedGenerator::replying(&reply("ideas", 0.7, "an idea")));
        h.set_threshold(0.7);
        let outcome = h.router().route(&h.tenant, "solar powered kettle").await.unwrap();
        assert_eq!(outcome.status, CaptureStatus::Filed);
    }

    #[tokio::test]
    async fn test_short_input_needs_review_despite_confidence() {
        let h = Harness::new(ScriptedGenerator::replying(&reply("people", 1.0, "a person")));
        let outcome = h.router().route(&h.tenant, "hi").await.unwrap();
        assert_eq!(outcome.status, CaptureStatus::NeedsReview);
        assert_eq!(h.records.count(&h.tenant).unwrap(), 0);
        assert_eq!(h.audit.count(&h.tenant).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_hedged_reasoning_needs_review() {
        let h = Harness::new(ScriptedGenerator::replying(&reply(
            "ideas",
            0.95,
            "The intent is ambiguous",
        )));
        let outcome = h.router().route(&h.tenant, "purple elephants on tuesday").await.unwrap();
        assert_eq!(outcome.status, CaptureStatus::NeedsReview);
    }

    #[tokio::test]
    async fn test_provider_failure_still_logs_capture() {
        let h = Harness::new(ScriptedGenerator::failing(ProviderError::Transient("503".into())));
        let err = h.router().route(&h.tenant, "call the dentist").await.unwrap_err();
        assert!(matches!(err, ClassifyError::Provider(_)));

        assert_eq!(h.records.count(&h.tenant).unwrap(), 0);
        let entries = h.capture_log.list(&h.tenant, None, 10).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, CaptureStatus::NeedsReview);
        let audits = h.audit.recent(&h.tenant, 10).unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].status, AuditStatus::Error);
    }

    #[tokio::test]
    async fn test_failed_log_write_leaves_no_record() {
        let h = Harness::new(ScriptedGenerator::replying(&reply("ideas", 0.95, "an idea")));
        h.fail_inserts_into("capture_log");

        let err = h.router().route(&h.tenant, "solar powered kettle").await.unwrap_err();
        assert!(matches!(err, ClassifyError::Storage(_)));
        assert_eq!(h.records.count(&h.tenant).unwrap(), 0);
        assert_eq!(h.capture_log.count(&h.tenant).unwrap(), 0);
    }

    // =========================================================================
    // Fix
    // =========================================================================

    #[tokio::test]
    async fn test_fix_review_capture() {
        let h = Harness::new(ScriptedGenerator::replying(&reply("ideas", 0.2, "weak")));
        let routed = h.router().route(&h.tenant, "Pay rent\nbefore friday").await.unwrap();

        let fixed = h.router().fix(&h.tenant, routed.capture_id, "Admin").unwrap();
        assert_eq!(fixed.previous_category, NEEDS_REVIEW);
        assert_eq!(fixed.category, "admin");

        let record = h.records.get(&h.tenant, fixed.record_id).unwrap().unwrap();
        assert_eq!(record.name, "Pay rent");
        assert_eq!(record.status.as_deref(), Some("todo"));

        let entry = h.capture_log.get(&h.tenant, routed.capture_id).unwrap().unwrap();
        assert_eq!(entry.status, CaptureStatus::Fixed);
        assert_eq!(entry.destination_ref, Some(fixed.record_id));

        let corrections = h.corrections.recent(&h.tenant, 10, 30).unwrap();
        assert_eq!(corrections.len(), 1);
        assert_eq!(corrections[0].original_category, NEEDS_REVIEW);
        assert_eq!(corrections[0].source_log_id, Some(routed.capture_id));
    }

    #[tokio::test]
    async fn test_fix_filed_capture_archives_previous_record() {
        let h = Harness::new(ScriptedGenerator::replying(&reply("ideas", 0.9, "an idea")));
        let routed = h.router().route(&h.tenant, "learn the cello").await.unwrap();
        let original = routed.record_id.unwrap();

        let fixed = h.router().fix(&h.tenant, routed.capture_id, "projects").unwrap();
        assert_eq!(fixed.previous_category, "ideas");
        assert!(h.records.get(&h.tenant, original).unwrap().unwrap().archived);
        assert!(h.records.list_by_category(&h.tenant, "ideas", 10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fix_rejects_unknown_category_and_repeat() {
        let h = Harness::new(ScriptedGenerator::replying(&reply("ideas", 0.2, "weak")));
        let routed = h.router().route(&h.tenant, "learn the cello").await.unwrap();

        let err = h.router().fix(&h.tenant, routed.capture_id, "recipes").unwrap_err();
        assert!(matches!(err, ClassifyError::Validation(_)));

        h.router().fix(&h.tenant, routed.capture_id, "ideas").unwrap();
        let err = h.router().fix(&h.tenant, routed.capture_id, "admin").unwrap_err();
        assert!(matches!(err, ClassifyError::Validation(_)));
        assert_eq!(h.corrections.recent(&h.tenant, 10, 30).unwrap().len(), 1);

        let missing = Uuid::new_v4();
        assert!(matches!(
            h.router().fix(&h.tenant, missing, "ideas").unwrap_err(),
            ClassifyError::NotFound(id) if id == missing
        ));
    }

    #[tokio::test]
    async fn test_failed_correction_write_undoes_fix() {
        let h = Harness::new(ScriptedGenerator::replying(&reply("ideas", 0.9, "an idea")));
        let routed = h.router().route(&h.tenant, "learn the cello").await.unwrap();
        let original = routed.record_id.unwrap();
        h.fail_inserts_into("corrections");

        let err = h.router().fix(&h.tenant, routed.capture_id, "projects").unwrap_err();
        assert!(matches!(err, ClassifyError::Storage(_)));

        let entry = h.capture_log.get(&h.tenant, routed.capture_id).unwrap().unwrap();
        assert_eq!(entry.status, CaptureStatus::Filed);
        assert_eq!(entry.destination_ref, Some(original));
        assert!(!h.records.get(&h.tenant, original).unwrap().unwrap().archived);
        assert_eq!(h.records.count(&h.tenant).unwrap(), 1);
        assert!(h.corrections.recent(&h.tenant, 10, 30).unwrap().is_empty());
    }
}
