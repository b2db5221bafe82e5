//! Classifier output parsing.
//!
//! One step with a fixed contract: strip optional code fences, parse JSON,
//! check the shape, validate the category, clamp confidence. Shape problems
//! are `Parse` errors; a category outside the enabled set is a
//! `Validation` error.

use std::collections::BTreeSet;

use brainbox_core::types::{ClassificationResult, Fields};

use crate::error::ClassifyError;

/// Confidence used when the provider omits it or reports it out of range.
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Strip a surrounding markdown code fence, with or without a language tag.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

pub fn parse_classification(
    raw: &str,
    enabled: &BTreeSet<String>,
) -> Result<ClassificationResult, ClassifyError> {
    let body = strip_code_fences(raw);
    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ClassifyError::Parse(format!("Response is not JSON: {}", e)))?;
    let object = value
        .as_object()
        .ok_or_else(|| ClassifyError::Parse("Response is not a JSON object".to_string()))?;

    let category = object
        .get("category")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ClassifyError::Parse("Missing string field 'category'".to_string()))?;

    if !enabled.contains(&category) {
        return Err(ClassifyError::Validation(format!(
            "Category '{}' is not enabled",
            category
        )));
    }

    let fields: Fields = match object.get("fields") {
        None | Some(serde_json::Value::Null) => Fields::new(),
        Some(serde_json::Value::Object(map)) => map.clone(),
        Some(_) => {
            return Err(ClassifyError::Parse(
                "Field 'fields' must be an object".to_string(),
            ))
        }
    };

    let confidence = clamp_confidence(object.get("confidence").and_then(|c| c.as_f64()));

    let reasoning = object
        .get("reasoning")
        .and_then(|r| r.as_str())
        .unwrap_or_default()
        .to_string();

    Ok(ClassificationResult {
        category,
        fields,
        confidence,
        reasoning,
    })
}

/// In-range values pass through; anything else becomes the fallback.
pub fn clamp_confidence(raw: Option<f64>) -> f64 {
    match raw {
        Some(c) if (0.0..=1.0).contains(&c) => c,
        _ => FALLBACK_CONFIDENCE,
    }
}
