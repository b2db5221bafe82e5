//! Classifier prompt assembly.
//!
//! The prompt has four parts: fixed instructions naming the enabled
//! categories and their fields, today's date, an optional one-line calendar
//! context, and recent corrections as labelled examples.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use brainbox_core::types::Correction;

use crate::provider::Prompt;

/// Header of the corrections section; absent when there are no examples.
pub const CORRECTIONS_HEADER: &str = "Recent corrections from this user";

/// Fields the classifier should extract for each built-in category.
fn category_fields(category: &str) -> &'static str {
    match category {
        "people" => "name, context (how you know them), follow_ups",
        "projects" => "name, status (active|waiting|blocked|someday|done), next_action, notes",
        "ideas" => "name, one_liner, notes",
        "admin" => "name, due_date (YYYY-MM-DD), status (todo|done), notes",
        _ => "name, plus any fields that clearly apply",
    }
}

pub struct PromptInputs<'a> {
    pub text: &'a str,
    pub categories: &'a BTreeSet<String>,
    pub today: NaiveDate,
    pub calendar: Option<&'a str>,
    /// Already filtered and ordered newest first; empty when learning is off.
    pub corrections: &'a [Correction],
}

pub fn build_prompt(inputs: &PromptInputs<'_>) -> Prompt {
    Prompt {
        system: system_instructions(inputs.categories),
        user: user_message(inputs),
    }
}

fn system_instructions(categories: &BTreeSet<String>) -> String {
    let mut out = String::from(
        "You file short personal notes into exactly one category.\n\nCategories:\n",
    );
    for category in categories {
        out.push_str(&format!("- {}: {}\n", category, category_fields(category)));
    }
    out.push_str(
        "\nRules:\n\
         - Pick the single best category from the list above. Never invent one.\n\
         - Extract only fields that are stated or clearly implied.\n\
         - Resolve relative dates (\"tomorrow\", \"next Friday\") against today's date \
           and write them as YYYY-MM-DD.\n\
         - confidence is your probability in [0, 1] that the category is right.\n\
         - If the note is a greeting, a test, or too vague to file, say so in reasoning \
           and give a low confidence.\n\n\
         Respond with JSON only, no prose and no code fences:\n\
         {\"category\": \"...\", \"fields\": {...}, \"confidence\": 0.0, \"reasoning\": \"...\"}",
    );
    out
}

fn user_message(inputs: &PromptInputs<'_>) -> String {
    let mut out = format!(
        "Today's date: {} ({}).\n",
        inputs.today.format("%Y-%m-%d"),
        inputs.today.format("%A")
    );
    if let Some(meeting) = inputs.calendar {
        out.push_str(&format!("The user is currently in a meeting: {}.\n", meeting));
    }
    if !inputs.corrections.is_empty() {
        out.push_str(&format!("\n{} (most recent first):\n", CORRECTIONS_HEADER));
        for correction in inputs.corrections {
            out.push_str(&format!(
                "- Note: {:?}\n  Filed as: {}\n  Correct category: {}\n",
                correction.message_text,
                correction.original_category,
                correction.corrected_category
            ));
        }
    }
    out.push_str(&format!("\nNote to file:\n{}", inputs.text));
    out
}
