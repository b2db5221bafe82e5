//! Service composition shared by every subcommand.

use std::sync::Arc;

use tracing::{debug, info, warn};

use brainbox_action::{ActionExecutor, ActionGovernor, ActionRegistry};
use brainbox_classify::{
    build_provider, CaptureRouter, Classifier, ClassifierContext, ClassifyError, NoCalendar,
    StoredSettings, TextGenerator, Unconfigured,
};
use brainbox_core::config::{BrainboxConfig, ProviderConfig, TenantSettings};
use brainbox_core::error::BrainboxError;
use brainbox_core::types::TenantId;
use brainbox_core::workflows::{ItemSignal, Signal};
use brainbox_storage::{
    AuditRepository, CorrectionRepository, Database, RecordRepository, SettingsRepository,
    UsageRepository,
};
use brainbox_workflow::{EngineReport, Scheduler, WorkflowEngine, WorkflowService};

pub struct Services {
    db: Arc<Database>,
    pub router: CaptureRouter,
    pub records: RecordRepository,
    pub corrections: CorrectionRepository,
    pub settings: SettingsRepository,
    pub usage: UsageRepository,
    pub executor: ActionExecutor,
    pub engine: Arc<WorkflowEngine>,
    pub workflows: WorkflowService,
    tenant_defaults: TenantSettings,
}

impl Services {
    pub fn build(
        config: &BrainboxConfig,
        db: Arc<Database>,
        provider: Arc<dyn TextGenerator>,
    ) -> Result<Self, ClassifyError> {
        let ctx = ClassifierContext {
            settings: Arc::new(StoredSettings::new(
                SettingsRepository::new(db.clone()),
                config.tenant_defaults.clone(),
            )),
            audit: Arc::new(AuditRepository::new(db.clone())),
            usage: Arc::new(UsageRepository::new(db.clone())),
            calendar: Arc::new(NoCalendar),
        };
        let classifier = Arc::new(Classifier::new(
            provider,
            CorrectionRepository::new(db.clone()),
            ctx,
        ));
        let router = CaptureRouter::new(classifier, db.clone(), &config.capture)?;

        let governor = Arc::new(ActionGovernor::new(db.clone()));
        let executor = ActionExecutor::new(
            governor.clone(),
            Arc::new(ActionRegistry::with_defaults(db.clone())),
        );
        let engine = Arc::new(WorkflowEngine::new(db.clone(), governor));
        let workflows = WorkflowService::new(db.clone(), engine.clone());

        Ok(Self {
            router,
            records: RecordRepository::new(db.clone()),
            corrections: CorrectionRepository::new(db.clone()),
            settings: SettingsRepository::new(db.clone()),
            usage: UsageRepository::new(db.clone()),
            executor,
            engine,
            workflows,
            tenant_defaults: config.tenant_defaults.clone(),
            db,
        })
    }

    pub fn governor(&self) -> &Arc<ActionGovernor> {
        self.executor.governor()
    }

    /// The tenant's saved settings, or the configured defaults.
    pub fn tenant_settings(&self, tenant: &TenantId) -> Result<TenantSettings, BrainboxError> {
        Ok(self
            .settings
            .get(tenant)?
            .unwrap_or_else(|| self.tenant_defaults.clone()))
    }

    /// Hand an item change to the workflow engine. Failures are logged and
    /// the triggering command still succeeds.
    pub fn dispatch(&self, tenant: &TenantId, item: ItemSignal) -> EngineReport {
        let item_id = item.item_id.clone();
        match self.engine.on_signal(tenant, &Signal::Item(item)) {
            Ok(report) => {
                if !report.outcomes.is_empty() {
                    info!(
                        tenant_id = %tenant,
                        item_id = %item_id,
                        workflows = report.outcomes.len(),
                        proposed = report.proposed().count(),
                        "Item signal dispatched"
                    );
                }
                report
            }
            Err(e) => {
                warn!(tenant_id = %tenant, item_id = %item_id, error = %e, "Item signal dispatch failed");
                EngineReport::default()
            }
        }
    }

    pub fn scheduler(&self, config: &BrainboxConfig) -> Scheduler {
        Scheduler::new(self.db.clone(), self.engine.clone(), &config.scheduler)
    }
}

/// The configured provider, or a stand-in that reports why it is missing so
/// commands that never classify keep working.
pub fn provider_or_unconfigured(config: &ProviderConfig) -> Arc<dyn TextGenerator> {
    match build_provider(config) {
        Ok(provider) => provider,
        Err(e) => {
            debug!(error = %e, "Text generation provider unavailable");
            Arc::new(Unconfigured::new(e.to_string()))
        }
    }
}
