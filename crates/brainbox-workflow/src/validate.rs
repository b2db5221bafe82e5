//! Structural checks applied before a workflow definition is stored.

use chrono::NaiveTime;

use brainbox_core::actions::ActionKind;
use brainbox_core::workflows::{
    ActionTemplate, Condition, ConditionOperator, Frequency, NewWorkflow, Trigger,
};

use crate::error::WorkflowError;

/// Parse a strict `HH:MM` wall-clock time.
pub fn parse_time(time: &str) -> Result<NaiveTime, WorkflowError> {
    let bytes = time.as_bytes();
    if bytes.len() != 5 || bytes[2] != b':' {
        return Err(WorkflowError::Validation(format!(
            "Time '{}' must be HH:MM",
            time
        )));
    }
    NaiveTime::parse_from_str(time, "%H:%M")
        .map_err(|_| WorkflowError::Validation(format!("Time '{}' is not a valid time", time)))
}

pub fn validate_new(workflow: &NewWorkflow) -> Result<(), WorkflowError> {
    validate_definition(&workflow.name, &workflow.trigger, &workflow.actions)
}

/// Validate a complete definition: name, trigger and action list.
pub fn validate_definition(
    name: &str,
    trigger: &Trigger,
    actions: &[ActionTemplate],
) -> Result<(), WorkflowError> {
    if name.trim().is_empty() {
        return Err(WorkflowError::Validation("Workflow name must not be blank".into()));
    }
    validate_trigger(trigger)?;
    if actions.is_empty() {
        return Err(WorkflowError::Validation(
            "Workflow needs at least one action".into(),
        ));
    }
    for (index, template) in actions.iter().enumerate() {
        validate_template(template)
            .map_err(|e| WorkflowError::Validation(format!("Action #{}: {}", index + 1, reason(e))))?;
    }
    Ok(())
}

pub fn validate_trigger(trigger: &Trigger) -> Result<(), WorkflowError> {
    match trigger {
        Trigger::Event {
            item_type,
            conditions,
            ..
        } => {
            if item_type.as_deref().is_some_and(|t| t.trim().is_empty()) {
                return Err(WorkflowError::Validation(
                    "Item type must not be blank when given".into(),
                ));
            }
            conditions.iter().try_for_each(validate_condition)
        }
        Trigger::Schedule {
            frequency,
            time,
            day_of_week,
            day_of_month,
            conditions,
        } => {
            parse_time(time)?;
            if !conditions.is_empty() {
                return Err(WorkflowError::Validation(
                    "Schedule triggers do not take conditions".into(),
                ));
            }
            if let Some(day) = day_of_week {
                if *frequency != Frequency::Weekly {
                    return Err(WorkflowError::Validation(format!(
                        "day_of_week only applies to weekly schedules, not {}",
                        frequency
                    )));
                }
                if !(1..=7).contains(day) {
                    return Err(WorkflowError::Validation(format!(
                        "day_of_week must be 1..=7, got {}",
                        day
                    )));
                }
            }
            if let Some(day) = day_of_month {
                if *frequency != Frequency::Monthly {
                    return Err(WorkflowError::Validation(format!(
                        "day_of_month only applies to monthly schedules, not {}",
                        frequency
                    )));
                }
                if !(1..=31).contains(day) {
                    return Err(WorkflowError::Validation(format!(
                        "day_of_month must be 1..=31, got {}",
                        day
                    )));
                }
            }
            Ok(())
        }
    }
}

fn validate_condition(condition: &Condition) -> Result<(), WorkflowError> {
    let field = condition.field.trim();
    if field.is_empty() || field == "old." {
        return Err(WorkflowError::Validation(
            "Condition field must not be blank".into(),
        ));
    }
    match condition.operator {
        ConditionOperator::In if !condition.value.is_array() => Err(WorkflowError::Validation(
            format!("Condition on '{}': 'in' needs a list value", field),
        )),
        ConditionOperator::GreaterThan | ConditionOperator::LessThan
            if !(condition.value.is_number() || condition.value.is_string()) =>
        {
            Err(WorkflowError::Validation(format!(
                "Condition on '{}': ordering needs a number or string value",
                field
            )))
        }
        _ => Ok(()),
    }
}

fn validate_template(template: &ActionTemplate) -> Result<(), WorkflowError> {
    if !(template.parameters.is_object() || template.parameters.is_null()) {
        return Err(WorkflowError::Validation(
            "parameters must be an object".into(),
        ));
    }
    let needs_target = matches!(
        template.action_type,
        ActionKind::UpdateRecord | ActionKind::SetStatus | ActionKind::ArchiveRecord
    );
    let has_target = template
        .target_id
        .as_deref()
        .is_some_and(|t| !t.trim().is_empty());
    if needs_target && !has_target {
        return Err(WorkflowError::Validation(format!(
            "{} needs a target_id",
            template.action_type
        )));
    }
    Ok(())
}

fn reason(err: WorkflowError) -> String {
    match err {
        WorkflowError::Validation(msg) => msg,
        other => other.to_string(),
    }
}
