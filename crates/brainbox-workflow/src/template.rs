//! Turning action templates into concrete proposals.
//!
//! Strings may reference the triggering item as `{{item.id}}`,
//! `{{item.type}}` or `{{item.<field>}}`. A string that is exactly one
//! placeholder takes the referenced JSON value as is; embedded placeholders
//! are spliced in as text. Unknown references render empty.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use brainbox_core::actions::NewAction;
use brainbox_core::workflows::{ActionTemplate, ItemSignal, Workflow};

use crate::condition::lookup;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*item\.([A-Za-z0-9_.]+)\s*\}\}").unwrap());

/// Source tag recorded on actions proposed by a workflow.
pub fn source_for(workflow: &Workflow) -> String {
    format!("workflow:{}", workflow.id)
}

pub fn render(template: &ActionTemplate, workflow: &Workflow, item: Option<&ItemSignal>) -> NewAction {
    let parameters = match render_value(&template.parameters, item) {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    let target_id = template
        .target_id
        .as_deref()
        .map(|t| render_text(t, item))
        .filter(|t| !t.trim().is_empty());
    NewAction {
        kind: template.action_type,
        target_type: template.target_type.clone().or_else(|| {
            target_id.as_ref().map(|_| "record".to_string())
        }),
        target_id,
        parameters,
        requires_approval: template.requires_approval,
        source: Some(source_for(workflow)),
    }
}

fn render_value(value: &Value, item: Option<&ItemSignal>) -> Value {
    match value {
        Value::String(text) => {
            if let Some(caps) = PLACEHOLDER_RE.captures(text) {
                if caps.get(0).is_some_and(|m| m.as_str() == text.as_str()) {
                    return resolve(&caps[1], item).unwrap_or(Value::Null);
                }
            }
            Value::String(render_text(text, item))
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, item)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, item)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn render_text(text: &str, item: Option<&ItemSignal>) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &Captures<'_>| match resolve(&caps[1], item) {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => String::new(),
        })
        .into_owned()
}

fn resolve(path: &str, item: Option<&ItemSignal>) -> Option<Value> {
    let item = item?;
    match path {
        "id" => Some(Value::String(item.item_id.clone())),
        "type" => Some(Value::String(item.item_type.clone())),
        _ => lookup(path, &item.new_values, &item.old_values).cloned(),
    }
}
