//! Schedule tick loop.
//!
//! Wakes on a fixed interval and, once per new local wall-clock minute,
//! delivers one tick per frequency to every tenant that has enabled
//! schedule workflows.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime, Timelike};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use brainbox_core::config::SchedulerConfig;
use brainbox_core::types::TenantId;
use brainbox_core::workflows::Signal;
use brainbox_storage::{Database, WorkflowRepository};

use crate::engine::{EngineReport, WorkflowEngine};
use crate::error::WorkflowError;
use crate::schedule::ticks_for;

pub struct Scheduler {
    engine: Arc<WorkflowEngine>,
    workflows: WorkflowRepository,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl Scheduler {
    pub fn new(db: Arc<Database>, engine: Arc<WorkflowEngine>, config: &SchedulerConfig) -> Self {
        Self {
            engine,
            workflows: WorkflowRepository::new(db),
            interval: Duration::from_secs(config.tick_interval_secs.max(1)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Run until [`Scheduler::shutdown`] is called.
    pub async fn run(&self) {
        info!(interval_secs = self.interval.as_secs(), "Scheduler started");
        let mut last_minute: Option<NaiveDateTime> = None;
        loop {
            let minute = current_minute();
            if last_minute != Some(minute) {
                last_minute = Some(minute);
                if let Err(e) = self.tick(minute) {
                    warn!(error = %e, "Schedule tick failed");
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown.notified() => {
                    info!("Scheduler stopped");
                    return;
                }
            }
        }
    }

    /// Deliver the ticks for `minute` to every tenant with schedules.
    pub fn tick(&self, minute: NaiveDateTime) -> Result<Vec<(TenantId, EngineReport)>, WorkflowError> {
        let tenants = self.workflows.tenants_with_schedules()?;
        let mut reports = Vec::new();
        for tenant in tenants {
            let mut combined = EngineReport::default();
            for tick in ticks_for(minute) {
                match self.engine.on_signal(&tenant, &Signal::Tick(tick)) {
                    Ok(report) => combined.outcomes.extend(report.outcomes),
                    Err(e) => warn!(tenant_id = %tenant, error = %e, "Tick evaluation failed"),
                }
            }
            if !combined.outcomes.is_empty() {
                debug!(tenant_id = %tenant, runs = combined.outcomes.len(), "Schedule tick fired");
            }
            reports.push((tenant, combined));
        }
        Ok(reports)
    }

    /// Signal the loop to stop. Takes effect even if `run` has not started.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

fn current_minute() -> NaiveDateTime {
    let now = Local::now().naive_local();
    now.date()
        .and_hms_opt(now.hour(), now.minute(), 0)
        .unwrap_or(now)
}
