//! Classification and capture routing.
//!
//! Raw text goes through the [`Classifier`] (prompt, provider call, parse,
//! audit) and then the [`CaptureRouter`], which files it as a category
//! record or flags it for review.

pub mod classifier;
pub mod context;
pub mod error;
pub mod normalize;
pub mod parser;
pub mod prompt;
pub mod provider;
pub mod router;

#[cfg(test)]
mod testing;

pub use classifier::Classifier;
pub use context::{
    AuditSink, CalendarContext, ClassifierContext, NoCalendar, SettingsSource, StoredSettings,
    UsageRecorder,
};
pub use error::{ClassifyError, ProviderError};
pub use provider::{build_provider, Generation, Prompt, TextGenerator, Unconfigured};
pub use router::{CaptureRouter, FixOutcome, RouteOutcome};
