//! Turning extracted fields into a record that is safe to store.

use chrono::{DateTime, Duration, NaiveDate};

use brainbox_core::config::TenantSettings;
use brainbox_core::types::{ClassificationResult, Fields, NewRecord};
use uuid::Uuid;

/// Name stored when the classifier extracted none.
pub const UNTITLED: &str = "Untitled";

const MAX_PAST_DAYS: i64 = 365;
const MAX_FUTURE_DAYS: i64 = 3650;

/// Build the record for a filed capture: fields with tenant defaults under
/// them, a non-blank name, and only plausible dates.
pub fn build_record(
    result: &ClassificationResult,
    settings: &TenantSettings,
    capture_id: Option<Uuid>,
    today: NaiveDate,
) -> NewRecord {
    let mut fields = settings.defaults_for(&result.category);
    for (key, value) in &result.fields {
        if is_blank(value) && fields.contains_key(key) {
            continue;
        }
        fields.insert(key.clone(), value.clone());
    }
    normalize_dates(&mut fields, today);

    let name = fields
        .remove("name")
        .and_then(|v| v.as_str().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());

    let status = fields
        .remove("status")
        .and_then(|v| v.as_str().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty());

    NewRecord {
        category: result.category.clone(),
        name,
        status,
        fields,
        capture_id,
    }
}

/// Record for a capture moved by hand: named after the first line of text.
pub fn record_from_text(
    category: &str,
    text: &str,
    settings: &TenantSettings,
    capture_id: Uuid,
) -> NewRecord {
    let mut fields = settings.defaults_for(category);
    let status = fields
        .remove("status")
        .and_then(|v| v.as_str().map(str::to_string));
    let name = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or(UNTITLED)
        .to_string();
    fields.insert("notes".into(), serde_json::Value::String(text.to_string()));
    NewRecord {
        category: category.to_string(),
        name,
        status,
        fields,
        capture_id: Some(capture_id),
    }
}

fn is_blank(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Every `*date` field is rewritten as `YYYY-MM-DD` or dropped.
fn normalize_dates(fields: &mut Fields, today: NaiveDate) {
    let date_keys: Vec<String> = fields
        .keys()
        .filter(|k| k.to_lowercase().ends_with("date"))
        .cloned()
        .collect();
    for key in date_keys {
        let normalized = fields
            .get(&key)
            .and_then(|v| v.as_str())
            .and_then(parse_date)
            .filter(|d| is_plausible(*d, today));
        match normalized {
            Some(date) => {
                fields.insert(key, date.format("%Y-%m-%d").to_string().into());
            }
            None => {
                fields.remove(&key);
            }
        }
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .or_else(|| NaiveDate::parse_from_str(raw, "%m/%d/%Y").ok())
}

/// No more than a year back and ten years ahead.
pub fn is_plausible(date: NaiveDate, today: NaiveDate) -> bool {
    date >= today - Duration::days(MAX_PAST_DAYS) && date <= today + Duration::days(MAX_FUTURE_DAYS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 6).unwrap()
    }

    fn result(category: &str, fields: serde_json::Value) -> ClassificationResult {
        ClassificationResult {
            category: category.into(),
            fields: fields.as_object().cloned().unwrap_or_default(),
            confidence: 0.9,
            reasoning: String::new(),
        }
    }

    #[test]
    fn test_blank_name_becomes_untitled() {
        let settings = TenantSettings::default();
        for fields in [json!({}), json!({"name": "   "}), json!({"name": null})] {
            let record = build_record(&result("ideas", fields), &settings, None, today());
            assert_eq!(record.name, UNTITLED);
        }
    }

    #[test]
    fn test_defaults_fill_unset_status() {
        let settings = TenantSettings::default();
        let record = build_record(
            &result("projects", json!({"name": "Garden"})),
            &settings,
            None,
            today(),
        );
        assert_eq!(record.status.as_deref(), Some("active"));

        let record = build_record(
            &result("projects", json!({"name": "Garden", "status": ""})),
            &settings,
            None,
            today(),
        );
        assert_eq!(record.status.as_deref(), Some("active"));

        let record = build_record(
            &result("projects", json!({"name": "Garden", "status": "blocked"})),
            &settings,
            None,
            today(),
        );
        assert_eq!(record.status.as_deref(), Some("blocked"));
    }

    #[test]
    fn test_dates_normalized_or_discarded() {
        let settings = TenantSettings::default();
        let record = build_record(
            &result(
                "admin",
                json!({
                    "name": "Taxes",
                    "due_date": "04/15/2026",
                    "start_date": "2026-03-10T09:00:00Z",
                    "old_date": "2020-01-01",
                    "far_date": "2040-01-01",
                    "bad_date": "someday",
                }),
            ),
            &settings,
            None,
            today(),
        );
        assert_eq!(record.fields["due_date"], "2026-04-15");
        assert_eq!(record.fields["start_date"], "2026-03-10");
        assert!(!record.fields.contains_key("old_date"));
        assert!(!record.fields.contains_key("far_date"));
        assert!(!record.fields.contains_key("bad_date"));
    }

    #[test]
    fn test_plausibility_window_edges() {
        let t = today();
        assert!(is_plausible(t - Duration::days(365), t));
        assert!(!is_plausible(t - Duration::days(366), t));
        assert!(is_plausible(t + Duration::days(3650), t));
        assert!(!is_plausible(t + Duration::days(3651), t));
    }

    #[test]
    fn test_record_from_text_uses_first_line() {
        let settings = TenantSettings::default();
        let id = Uuid::new_v4();
        let record = record_from_text("admin", "\n  Pay rent \nbefore friday", &settings, id);
        assert_eq!(record.name, "Pay rent");
        assert_eq!(record.status.as_deref(), Some("todo"));
        assert_eq!(record.capture_id, Some(id));
        assert_eq!(record.fields["notes"], "\n  Pay rent \nbefore friday");
    }
}
