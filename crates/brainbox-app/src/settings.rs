//! `settings set` key handling.

use serde_json::Value;

use brainbox_core::config::{CategorySettings, TenantSettings};

/// Apply `key = value` to `settings`.
///
/// Keys: `confidence_threshold`, `learning.enabled`, `learning.max_examples`,
/// `learning.days_back`, `categories.<name>.enabled` and
/// `categories.<name>.defaults.<field>`. Enabling an unknown category adds
/// it. An empty default value removes that default.
pub fn apply(settings: &mut TenantSettings, key: &str, value: &str) -> Result<(), String> {
    let value = value.trim();
    let parts: Vec<&str> = key.trim().split('.').collect();
    match parts.as_slice() {
        ["confidence_threshold"] => {
            let threshold: f64 = parse(key, value)?;
            if !(0.0..=1.0).contains(&threshold) {
                return Err(format!("{} must be between 0 and 1", key));
            }
            settings.confidence_threshold = threshold;
        }
        ["learning", "enabled"] => settings.learning.enabled = parse(key, value)?,
        ["learning", "max_examples"] => settings.learning.max_examples = parse(key, value)?,
        ["learning", "days_back"] => settings.learning.days_back = parse(key, value)?,
        ["categories", name, "enabled"] => {
            let enabled: bool = parse(key, value)?;
            let name = category_name(name)?;
            settings
                .categories
                .entry(name)
                .or_insert_with(CategorySettings::default)
                .enabled = enabled;
        }
        ["categories", name, "defaults", field] if !field.is_empty() => {
            let name = category_name(name)?;
            let category = settings
                .categories
                .get_mut(&name)
                .ok_or_else(|| format!("Unknown category '{}'", name))?;
            if value.is_empty() {
                category.defaults.remove(*field);
            } else {
                // Numbers and booleans keep their type; anything else is text.
                let parsed = serde_json::from_str::<Value>(value)
                    .ok()
                    .filter(|v| !v.is_object() && !v.is_array())
                    .unwrap_or_else(|| Value::String(value.to_string()));
                category.defaults.insert(field.to_string(), parsed);
            }
        }
        _ => return Err(format!("Unknown setting '{}'", key)),
    }
    Ok(())
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, String> {
    value
        .parse()
        .map_err(|_| format!("Invalid value '{}' for {}", value, key))
}

fn category_name(name: &str) -> Result<String, String> {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return Err("Category name must not be blank".into());
    }
    Ok(name)
}
