//! Domain error types
//!
//! This module defines the error hierarchy for the pipeline. All errors are
//! domain-specific and don't expose third-party types. Per-document and
//! per-entry problems are deliberately *not* represented here: those are
//! recovered locally (skip + log) and surfaced through [`SkipReason`];
//! only startup/configuration defects are allowed to abort.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main pipeline error type
///
/// This is the primary error type used throughout the crate. Every variant
/// represents a deployment or configuration defect, never a bad document.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Orchestrator self-check failures (missing or duplicate transformer)
    #[error("Pipeline validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

/// Reason a single bundle entry produced no record
///
/// Skips are part of the normal data path: one malformed entry must never
/// abort its type or the pipeline. Collecting the reason (instead of
/// silently dropping the entry) keeps skips visible to logs and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason", content = "detail")]
pub enum SkipReason {
    /// The entry is missing its mandatory identifying field
    MissingField(String),
    /// A "no known allergies" style negation suppressed record creation
    NegatedEntry(String),
    /// Free text did not yield anything usable for this type
    UnparsableValue(String),
}

impl SkipReason {
    /// Short machine-readable label for logging
    pub fn label(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "missing_field",
            Self::NegatedEntry(_) => "negated_entry",
            Self::UnparsableValue(_) => "unparsable_value",
        }
    }
}

/// Skipped entry with enough context to reproduce
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedEntry {
    /// Resource type the entry belonged to
    pub resource_type: String,

    /// Index of the entry within its source list
    pub index: usize,

    /// Why the entry was skipped
    pub reason: SkipReason,
}

impl SkippedEntry {
    /// Creates a new skipped-entry marker
    pub fn new(resource_type: impl Into<String>, index: usize, reason: SkipReason) -> Self {
        Self {
            resource_type: resource_type.into(),
            index,
            reason,
        }
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for PipelineError {
    fn from(err: toml::de::Error) -> Self {
        PipelineError::Configuration(format!("TOML parse error: {err}"))
    }
}
