//! Subcommand handlers. Each returns the text to print.

use std::error::Error;
use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use brainbox_core::actions::Transition;
use brainbox_core::config::BrainboxConfig;
use brainbox_core::types::{CaptureStatus, Fields, TenantId};
use brainbox_core::workflows::{ItemEvent, ItemSignal};
use brainbox_workflow::{load_definition, EngineReport, WorkflowOutcome};

use crate::app::Services;
use crate::cli::{ActionsCommand, Command, SettingsCommand, WorkflowsCommand};
use crate::settings;

pub type CommandResult = Result<String, Box<dyn Error>>;

pub struct Output {
    pub json: bool,
}

impl Output {
    fn render<T: Serialize>(&self, value: &T, text: impl FnOnce(&T) -> String) -> CommandResult {
        if self.json {
            Ok(serde_json::to_string_pretty(value)?)
        } else {
            Ok(text(value))
        }
    }
}

pub async fn run(
    services: &Services,
    config: &BrainboxConfig,
    tenant: &TenantId,
    command: Command,
    out: &Output,
) -> CommandResult {
    match command {
        Command::Capture { text } => capture(services, tenant, &text.join(" "), out).await,
        Command::Fix {
            capture_id,
            category,
        } => {
            let fixed = services.router.fix(tenant, capture_id, &category)?;
            let report = dispatch_created(
                services,
                tenant,
                fixed.record_id,
                format!("fix:{}", fixed.capture_id),
            )?;
            let value = json!({ "fix": fixed, "workflows": report });
            out.render(&value, |_| {
                format!(
                    "Moved capture {} from {} to {} (record {}){}",
                    fixed.capture_id,
                    fixed.previous_category,
                    fixed.category,
                    fixed.record_id,
                    describe_report(&report)
                )
            })
        }
        Command::Captures { review, limit } => {
            let status = review.then_some(CaptureStatus::NeedsReview);
            let entries = services.router.list(tenant, status, limit)?;
            out.render(&entries, |entries| {
                table(entries.iter().map(|e| {
                    format!(
                        "{}  {:<12}  {:<8}  {:.2}  {}",
                        e.id,
                        e.status,
                        e.filed_category,
                        e.confidence,
                        first_line(&e.original_text)
                    )
                }))
            })
        }
        Command::Corrections { category, limit } => {
            let corrections = match category {
                Some(category) => services.corrections.by_corrected_category(
                    tenant,
                    &category.trim().to_lowercase(),
                    limit,
                )?,
                None => {
                    let days_back = services.tenant_settings(tenant)?.learning.days_back;
                    services.corrections.recent(tenant, limit, days_back)?
                }
            };
            out.render(&corrections, |corrections| {
                table(corrections.iter().map(|c| {
                    format!(
                        "{}  {} -> {}  {}",
                        c.created_at,
                        c.original_category,
                        c.corrected_category,
                        first_line(&c.message_text)
                    )
                }))
            })
        }
        Command::Actions(command) => actions(services, tenant, command, out).await,
        Command::Workflows(command) => workflows(services, tenant, command, out),
        Command::Settings(command) => settings_command(services, tenant, command, out),
        Command::Usage => {
            let totals = services.usage.totals(tenant)?;
            out.render(&totals, |t| {
                format!(
                    "{} calls, {} input tokens, {} output tokens",
                    t.calls, t.input_tokens, t.output_tokens
                )
            })
        }
        Command::Scheduler => {
            let scheduler = Arc::new(services.scheduler(config));
            let runner = scheduler.clone();
            let handle = tokio::spawn(async move { runner.run().await });
            tokio::signal::ctrl_c().await?;
            info!("Interrupt received, stopping scheduler");
            scheduler.shutdown();
            handle.await?;
            Ok(String::new())
        }
    }
}

async fn capture(services: &Services, tenant: &TenantId, text: &str, out: &Output) -> CommandResult {
    let outcome = services.router.route(tenant, text).await?;

    let report = match outcome.record_id {
        Some(record_id) => dispatch_created(
            services,
            tenant,
            record_id,
            format!("capture:{}", outcome.capture_id),
        )?,
        None => EngineReport::default(),
    };

    let value = json!({ "capture": outcome, "workflows": report });
    out.render(&value, |_| {
        let mut text = format!("{}\ncapture {}", outcome.message, outcome.capture_id);
        if let Some(record_id) = outcome.record_id {
            let _ = write!(text, "\nrecord {}", record_id);
        }
        text.push_str(&describe_report(&report));
        text
    })
}

/// Tell the workflow engine a record now exists.
fn dispatch_created(
    services: &Services,
    tenant: &TenantId,
    record_id: Uuid,
    occurrence: String,
) -> Result<EngineReport, Box<dyn Error>> {
    let Some(record) = services.records.get(tenant, record_id)? else {
        return Ok(EngineReport::default());
    };
    let signal = ItemSignal::new(ItemEvent::Created, &record.category, record.id.to_string())
        .with_values(record.values(), Fields::new())
        .with_occurrence(occurrence);
    Ok(services.dispatch(tenant, signal))
}

async fn actions(
    services: &Services,
    tenant: &TenantId,
    command: ActionsCommand,
    out: &Output,
) -> CommandResult {
    let governor = services.governor();
    match command {
        ActionsCommand::List { status, limit } => {
            let actions = governor.list(tenant, status, limit)?;
            let registry = services.executor.registry();
            out.render(&actions, |actions| {
                table(actions.iter().map(|a| {
                    format!(
                        "{}  {:<9}  {}  [{}]",
                        a.id,
                        a.status,
                        registry.describe(a),
                        a.source.as_deref().unwrap_or("-")
                    )
                }))
            })
        }
        ActionsCommand::Approve { id, approver } => {
            let outcome = governor.approve(tenant, id, &approver)?;
            transition_message(services, tenant, id, outcome, "Approved", out)
        }
        ActionsCommand::Reject { id, reason } => {
            let outcome = governor.reject(tenant, id, &reason)?;
            transition_message(services, tenant, id, outcome, "Rejected", out)
        }
        ActionsCommand::Run { id } => {
            let Some(result) = services.executor.execute(tenant, id).await? else {
                return out.render(&json!({ "action_id": id, "executed": false }), |_| {
                    format!("Action {} is already being executed", id)
                });
            };
            let report = match result.change.clone() {
                Some(change) => services.dispatch(tenant, change),
                None => EngineReport::default(),
            };
            let value = json!({
                "action_id": id,
                "executed": true,
                "message": result.message,
                "output": result.output,
                "workflows": report,
            });
            out.render(&value, |_| {
                format!("{}{}", result.message, describe_report(&report))
            })
        }
        ActionsCommand::Restore { id } => {
            services.executor.restore(tenant, id).await?;
            out.render(&json!({ "action_id": id, "restored": true }), |_| {
                format!("Restored the target of action {}", id)
            })
        }
    }
}

fn transition_message(
    services: &Services,
    tenant: &TenantId,
    id: Uuid,
    outcome: Transition,
    verb: &str,
    out: &Output,
) -> CommandResult {
    let action = services.governor().get(tenant, id)?;
    out.render(&action, |action| match outcome {
        Transition::Applied => format!("{} action {}", verb, action.id),
        Transition::NoOp => format!("No change: action {} is {}", action.id, action.status),
    })
}

fn workflows(
    services: &Services,
    tenant: &TenantId,
    command: WorkflowsCommand,
    out: &Output,
) -> CommandResult {
    let svc = &services.workflows;
    match command {
        WorkflowsCommand::Add { file } => {
            let definition = load_definition(&file)?;
            let workflow = svc.create(tenant, &definition)?;
            out.render(&workflow, |w| format!("Created workflow {} ({})", w.id, w.name))
        }
        WorkflowsCommand::List => {
            let workflows = svc.list(tenant)?;
            out.render(&workflows, |workflows| {
                table(workflows.iter().map(|w| {
                    format!(
                        "{}  {:<3}  p{:<3}  {:<8}  runs={:<4}  {}",
                        w.id,
                        if w.enabled { "on" } else { "off" },
                        w.priority,
                        w.trigger.type_name(),
                        w.execution_count,
                        w.name
                    )
                }))
            })
        }
        WorkflowsCommand::Enable { id } => {
            svc.enable(tenant, id)?;
            out.render(&json!({ "workflow_id": id, "enabled": true }), |_| {
                format!("Enabled workflow {}", id)
            })
        }
        WorkflowsCommand::Disable { id } => {
            svc.disable(tenant, id)?;
            out.render(&json!({ "workflow_id": id, "enabled": false }), |_| {
                format!("Disabled workflow {}", id)
            })
        }
        WorkflowsCommand::Remove { id } => {
            svc.delete(tenant, id)?;
            out.render(&json!({ "workflow_id": id, "deleted": true }), |_| {
                format!("Removed workflow {}", id)
            })
        }
        WorkflowsCommand::Run { id } => {
            let outcome = svc.run_now(tenant, id)?;
            out.render(&outcome, describe_outcome)
        }
        WorkflowsCommand::History { id, limit } => {
            let executions = svc.executions(tenant, id, limit)?;
            out.render(&executions, |executions| {
                table(executions.iter().map(|e| {
                    format!(
                        "{}  {:<7}  {} action(s)  {}",
                        e.timestamp,
                        e.status,
                        e.executed_actions.as_array().map_or(0, Vec::len),
                        e.error_message.as_deref().unwrap_or("")
                    )
                }))
            })
        }
    }
}

fn settings_command(
    services: &Services,
    tenant: &TenantId,
    command: SettingsCommand,
    out: &Output,
) -> CommandResult {
    match command {
        SettingsCommand::Show => {
            let current = services.tenant_settings(tenant)?;
            Ok(serde_json::to_string_pretty(&current)?)
        }
        SettingsCommand::Set { key, value } => {
            let mut current = services.tenant_settings(tenant)?;
            settings::apply(&mut current, &key, &value)?;
            services.settings.save(tenant, &current)?;
            info!(tenant_id = %tenant, key = %key, "Tenant setting changed");
            out.render(&current, |_| format!("Set {} = {}", key, value))
        }
    }
}

fn describe_outcome(outcome: &WorkflowOutcome) -> String {
    let mut text = format!("{} {}: {}", outcome.status, outcome.workflow_id, outcome.name);
    for id in &outcome.action_ids {
        let _ = write!(text, "\n  proposed action {}", id);
    }
    if let Some(error) = &outcome.error {
        let _ = write!(text, "\n  error: {}", error);
    }
    text
}

fn describe_report(report: &EngineReport) -> String {
    report
        .outcomes
        .iter()
        .map(|o| format!("\nworkflow {}", describe_outcome(o)))
        .collect()
}

fn table(rows: impl Iterator<Item = String>) -> String {
    let rows: Vec<String> = rows.collect();
    if rows.is_empty() {
        "Nothing to show".to_string()
    } else {
        rows.join("\n")
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use brainbox_classify::Unconfigured;
    use brainbox_core::actions::ActionStatus;
    use brainbox_storage::Database;
    use std::path::PathBuf;

    // =========================================================================
    // Helpers
    // =========================================================================

    struct Harness {
        services: Services,
        config: BrainboxConfig,
        tenant: TenantId,
        dir: tempfile::TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let config = BrainboxConfig::default();
            let db = Arc::new(Database::in_memory().unwrap());
            let services = Services::build(
                &config,
                db,
                Arc::new(Unconfigured::new("no provider in tests")),
            )
            .unwrap();
            Self {
                services,
                config,
                tenant: TenantId::from("t1"),
                dir: tempfile::tempdir().unwrap(),
            }
        }

        async fn run(&self, command: Command) -> CommandResult {
            run(
                &self.services,
                &self.config,
                &self.tenant,
                command,
                &Output { json: false },
            )
            .await
        }

        async fn run_json(&self, command: Command) -> serde_json::Value {
            let out = run(
                &self.services,
                &self.config,
                &self.tenant,
                command,
                &Output { json: true },
            )
            .await
            .unwrap();
            serde_json::from_str(&out).unwrap()
        }

        fn write(&self, name: &str, contents: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, contents).unwrap();
            path
        }
    }

    const ON_CREATE: &str = r#"
name = "check new projects"

[trigger]
type = "event"
event = "created"
item_type = "projects"

[[actions]]
action_type = "set_status"
target_id = "{{item.id}}"
parameters = { status = "review" }
"#;

    const DAILY: &str = r#"
name = "morning nudge"

[trigger]
type = "schedule"
frequency = "daily"
time = "08:00"

[[actions]]
action_type = "notify"
parameters = { title = "Look at your inbox" }
"#;

    // =========================================================================
    // Capture and fix
    // =========================================================================

    #[tokio::test]
    async fn test_capture_without_provider_lands_in_review_and_can_be_fixed() {
        let h = Harness::new();
        let err = h
            .run(Command::Capture {
                text: vec!["Garden shed rebuild".into()],
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no provider in tests"));

        let listed = h.run_json(Command::Captures { review: true, limit: 10 }).await;
        let entries = listed.as_array().unwrap();
        assert_eq!(entries.len(), 1);
        let capture_id: Uuid = entries[0]["id"].as_str().unwrap().parse().unwrap();

        let path = h.write("on-create.toml", ON_CREATE);
        h.run(Command::Workflows(WorkflowsCommand::Add { file: path }))
            .await
            .unwrap();

        let text = h
            .run(Command::Fix {
                capture_id,
                category: "Projects".into(),
            })
            .await
            .unwrap();
        assert!(text.contains("from needs_review to projects"));
        assert!(text.contains("check new projects"), "the new record triggers workflows: {}", text);

        let pending = h
            .run_json(Command::Actions(ActionsCommand::List {
                status: Some(ActionStatus::Pending),
                limit: 10,
            }))
            .await;
        assert_eq!(pending[0]["kind"], "set_status");
        assert_eq!(pending[0]["parameters"]["status"], "review");

        let corrections = h
            .run_json(Command::Corrections {
                category: Some("projects".into()),
                limit: 10,
            })
            .await;
        assert_eq!(corrections.as_array().unwrap().len(), 1);
        assert!(h
            .run(Command::Captures { review: true, limit: 10 })
            .await
            .unwrap()
            .contains("Nothing to show"));
    }

    #[tokio::test]
    async fn test_fix_rejects_disabled_category() {
        let h = Harness::new();
        h.run(Command::Settings(SettingsCommand::Set {
            key: "categories.ideas.enabled".into(),
            value: "false".into(),
        }))
        .await
        .unwrap();
        let _ = h
            .run(Command::Capture {
                text: vec!["maybe a podcast".into()],
            })
            .await;
        let entries = h.run_json(Command::Captures { review: false, limit: 10 }).await;
        let capture_id: Uuid = entries[0]["id"].as_str().unwrap().parse().unwrap();

        let err = h
            .run(Command::Fix {
                capture_id,
                category: "ideas".into(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not enabled"));
    }

    // =========================================================================
    // Workflows and actions
    // =========================================================================

    #[tokio::test]
    async fn test_workflow_run_proposes_and_action_runs() {
        let h = Harness::new();
        let path = h.write("daily.toml", DAILY);
        let created = h
            .run_json(Command::Workflows(WorkflowsCommand::Add { file: path }))
            .await;
        let workflow_id: Uuid = created["id"].as_str().unwrap().parse().unwrap();

        let outcome = h
            .run_json(Command::Workflows(WorkflowsCommand::Run { id: workflow_id }))
            .await;
        assert_eq!(outcome["status"], "success");
        let action_id: Uuid = outcome["action_ids"][0].as_str().unwrap().parse().unwrap();

        let pending = h
            .run(Command::Actions(ActionsCommand::List {
                status: Some(ActionStatus::Pending),
                limit: 10,
            }))
            .await
            .unwrap();
        assert!(pending.contains(&action_id.to_string()));
        assert!(pending.contains(&format!("workflow:{}", workflow_id)));

        let approved = h
            .run(Command::Actions(ActionsCommand::Approve {
                id: action_id,
                approver: "ana".into(),
            }))
            .await
            .unwrap();
        assert_eq!(approved, format!("Approved action {}", action_id));
        let again = h
            .run(Command::Actions(ActionsCommand::Approve {
                id: action_id,
                approver: "ana".into(),
            }))
            .await
            .unwrap();
        assert_eq!(again, format!("No change: action {} is approved", action_id));

        let ran = h
            .run_json(Command::Actions(ActionsCommand::Run { id: action_id }))
            .await;
        assert_eq!(ran["executed"], true);

        let history = h
            .run_json(Command::Workflows(WorkflowsCommand::History {
                id: workflow_id,
                limit: 10,
            }))
            .await;
        assert_eq!(history.as_array().unwrap().len(), 1);

        let restore = h
            .run(Command::Actions(ActionsCommand::Restore { id: action_id }))
            .await;
        assert!(restore.is_err(), "notifications cannot be restored");
    }

    #[tokio::test]
    async fn test_workflow_toggle_and_remove() {
        let h = Harness::new();
        let path = h.write("daily.json", r#"{"name":"x","trigger":{"type":"schedule","frequency":"hourly","time":"00:15"},"actions":[{"action_type":"notify"}]}"#);
        let created = h
            .run_json(Command::Workflows(WorkflowsCommand::Add { file: path }))
            .await;
        let id: Uuid = created["id"].as_str().unwrap().parse().unwrap();

        h.run(Command::Workflows(WorkflowsCommand::Disable { id }))
            .await
            .unwrap();
        assert!(h
            .run(Command::Workflows(WorkflowsCommand::List))
            .await
            .unwrap()
            .contains(" off "));
        assert!(h
            .run(Command::Workflows(WorkflowsCommand::Run { id }))
            .await
            .is_err());

        h.run(Command::Workflows(WorkflowsCommand::Remove { id }))
            .await
            .unwrap();
        assert_eq!(
            h.run(Command::Workflows(WorkflowsCommand::List)).await.unwrap(),
            "Nothing to show"
        );
    }

    // =========================================================================
    // Settings and usage
    // =========================================================================

    #[tokio::test]
    async fn test_settings_persist_per_tenant() {
        let h = Harness::new();
        h.run(Command::Settings(SettingsCommand::Set {
            key: "confidence_threshold".into(),
            value: "0.9".into(),
        }))
        .await
        .unwrap();
        let shown = h.run_json(Command::Settings(SettingsCommand::Show)).await;
        assert_eq!(shown["confidence_threshold"], 0.9);

        let other = TenantId::from("t2");
        assert_eq!(
            h.services.tenant_settings(&other).unwrap().confidence_threshold,
            h.config.tenant_defaults.confidence_threshold
        );

        assert!(h
            .run(Command::Settings(SettingsCommand::Set {
                key: "nope".into(),
                value: "1".into(),
            }))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_usage_starts_empty() {
        let h = Harness::new();
        assert_eq!(
            h.run(Command::Usage).await.unwrap(),
            "0 calls, 0 input tokens, 0 output tokens"
        );
    }
}
