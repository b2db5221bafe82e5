//! Condition evaluation against an item signal's values.
//!
//! A field path is looked up in the item's new values, or in its previous
//! values when prefixed with `old.`. Dotted paths walk into nested objects.
//! A missing field behaves as JSON `null`.

use std::cmp::Ordering;

use serde_json::Value;

use brainbox_core::types::Fields;
use brainbox_core::workflows::{Condition, ConditionOperator, ItemSignal};

const OLD_PREFIX: &str = "old.";

/// True when every condition holds. An empty list always matches.
pub fn all_match(conditions: &[Condition], item: &ItemSignal) -> bool {
    conditions
        .iter()
        .all(|c| evaluate(c, &item.new_values, &item.old_values))
}

pub fn evaluate(condition: &Condition, new_values: &Fields, old_values: &Fields) -> bool {
    let actual = lookup(&condition.field, new_values, old_values);
    let expected = &condition.value;
    match condition.operator {
        ConditionOperator::Equals => actual.is_some_and(|a| loosely_equal(a, expected)),
        ConditionOperator::NotEquals => !actual.is_some_and(|a| loosely_equal(a, expected)),
        ConditionOperator::Contains => actual.is_some_and(|a| contains(a, expected)),
        ConditionOperator::In => match (actual, expected) {
            (Some(a), Value::Array(options)) => options.iter().any(|o| loosely_equal(a, o)),
            _ => false,
        },
        ConditionOperator::GreaterThan => {
            actual.and_then(|a| compare(a, expected)) == Some(Ordering::Greater)
        }
        ConditionOperator::LessThan => {
            actual.and_then(|a| compare(a, expected)) == Some(Ordering::Less)
        }
        ConditionOperator::Exists => actual.is_some(),
        ConditionOperator::NotExists => actual.is_none(),
    }
}

/// Resolve a field path; `None` for missing or null values.
pub fn lookup<'a>(path: &str, new_values: &'a Fields, old_values: &'a Fields) -> Option<&'a Value> {
    let (values, path) = match path.strip_prefix(OLD_PREFIX) {
        Some(rest) => (old_values, rest),
        None => (new_values, path),
    };
    let mut segments = path.split('.');
    let mut current = values.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    (!current.is_null()).then_some(current)
}

/// Equality that lets `"3"` match `3` and ignores integer/float encoding.
fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::String(haystack) => match expected {
            Value::String(needle) => haystack.to_lowercase().contains(&needle.to_lowercase()),
            other => haystack.contains(&other.to_string()),
        },
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, expected)),
        Value::Object(map) => expected.as_str().is_some_and(|key| map.contains_key(key)),
        _ => false,
    }
}

/// Numbers compare numerically, strings lexically (so ISO dates order
/// correctly). Mixed or non-scalar operands do not compare.
fn compare(actual: &Value, expected: &Value) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (as_number(actual), as_number(expected)) {
        return a.partial_cmp(&b);
    }
    match (actual, expected) {
        (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brainbox_core::workflows::ItemEvent;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("fields must be an object"),
        }
    }

    fn cond(field: &str, operator: ConditionOperator, value: Value) -> Condition {
        Condition {
            field: field.into(),
            operator,
            value,
        }
    }

    fn check(condition: Condition) -> bool {
        let new = fields(json!({
            "status": "done",
            "name": "Quarterly Taxes",
            "priority": 3,
            "estimate": "2.5",
            "due_date": "2026-04-15",
            "tags": ["finance", "urgent"],
            "owner": {"name": "Ana"},
            "notes": null,
        }));
        let old = fields(json!({"status": "todo", "priority": 1}));
        evaluate(&condition, &new, &old)
    }

    // =====================================================================
    // Lookup
    // =====================================================================

    #[test]
    fn test_lookup_paths() {
        let new = fields(json!({"owner": {"name": "Ana"}, "tags": ["a", "b"], "gone": null}));
        let old = fields(json!({"owner": {"name": "Bo"}}));
        assert_eq!(lookup("owner.name", &new, &old), Some(&json!("Ana")));
        assert_eq!(lookup("old.owner.name", &new, &old), Some(&json!("Bo")));
        assert_eq!(lookup("tags.1", &new, &old), Some(&json!("b")));
        assert_eq!(lookup("tags.x", &new, &old), None);
        assert_eq!(lookup("gone", &new, &old), None);
        assert_eq!(lookup("missing.deeper", &new, &old), None);
    }

    // =====================================================================
    // Operators
    // =====================================================================

    #[test]
    fn test_equals_and_not_equals() {
        assert!(check(cond("status", ConditionOperator::Equals, json!("done"))));
        assert!(check(cond("old.status", ConditionOperator::Equals, json!("todo"))));
        assert!(check(cond("priority", ConditionOperator::Equals, json!(3.0))));
        assert!(check(cond("priority", ConditionOperator::Equals, json!("3"))));
        assert!(!check(cond("status", ConditionOperator::Equals, json!("Done"))));
        assert!(!check(cond("missing", ConditionOperator::Equals, Value::Null)));

        assert!(check(cond("status", ConditionOperator::NotEquals, json!("todo"))));
        assert!(check(cond("missing", ConditionOperator::NotEquals, json!("x"))));
        assert!(!check(cond("old.status", ConditionOperator::NotEquals, json!("todo"))));
    }

    #[test]
    fn test_contains() {
        assert!(check(cond("name", ConditionOperator::Contains, json!("taxes"))));
        assert!(check(cond("tags", ConditionOperator::Contains, json!("urgent"))));
        assert!(check(cond("owner", ConditionOperator::Contains, json!("name"))));
        assert!(!check(cond("tags", ConditionOperator::Contains, json!("home"))));
        assert!(!check(cond("priority", ConditionOperator::Contains, json!(3))));
    }

    #[test]
    fn test_in() {
        assert!(check(cond("status", ConditionOperator::In, json!(["done", "archived"]))));
        assert!(check(cond("priority", ConditionOperator::In, json!([1, 2, 3]))));
        assert!(!check(cond("status", ConditionOperator::In, json!(["todo"]))));
        assert!(!check(cond("status", ConditionOperator::In, json!("done"))));
    }

    #[test]
    fn test_ordering() {
        assert!(check(cond("priority", ConditionOperator::GreaterThan, json!(2))));
        assert!(check(cond("estimate", ConditionOperator::GreaterThan, json!(2))));
        assert!(check(cond("old.priority", ConditionOperator::LessThan, json!(2))));
        assert!(check(cond("due_date", ConditionOperator::LessThan, json!("2026-05-01"))));
        assert!(!check(cond("priority", ConditionOperator::GreaterThan, json!(3))));
        assert!(!check(cond("status", ConditionOperator::GreaterThan, json!(1))));
        assert!(!check(cond("missing", ConditionOperator::LessThan, json!(1))));
    }

    #[test]
    fn test_exists() {
        assert!(check(cond("owner.name", ConditionOperator::Exists, Value::Null)));
        assert!(!check(cond("notes", ConditionOperator::Exists, Value::Null)));
        assert!(check(cond("notes", ConditionOperator::NotExists, Value::Null)));
        assert!(check(cond("old.name", ConditionOperator::NotExists, Value::Null)));
    }

    #[test]
    fn test_all_match_is_a_conjunction() {
        let item = ItemSignal::new(ItemEvent::StatusChanged, "admin", "a1").with_values(
            fields(json!({"status": "done"})),
            fields(json!({"status": "todo"})),
        );
        let both = vec![
            cond("status", ConditionOperator::Equals, json!("done")),
            cond("old.status", ConditionOperator::Equals, json!("todo")),
        ];
        assert!(all_match(&both, &item));
        assert!(all_match(&[], &item));

        let one_fails = vec![
            cond("status", ConditionOperator::Equals, json!("done")),
            cond("old.status", ConditionOperator::Equals, json!("waiting")),
        ];
        assert!(!all_match(&one_fails, &item));
    }
}
