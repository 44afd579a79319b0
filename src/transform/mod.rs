//! Resource transformers
//!
//! Eleven independent units, one per output record type. Each consumes the
//! extraction bundle and produces zero or more [`StandardizedRecord`]s,
//! following one template:
//!
//! 1. Refuse (empty outcome) when the bundle has no patient id.
//! 2. Structured key present → build each entry; entries missing their
//!    mandatory identifying field are skipped, not failed. Legacy fields
//!    are not consulted for that type, even when the structured list is
//!    empty.
//! 3. Otherwise, legacy fields whose label matches the type's keyword set
//!    are parsed heuristically.
//! 4. Embedded dates resolve through [`DateExtractor`], tagging which of
//!    override/structured/extracted/unknown applied.
//! 5. Controlled vocabularies map through closed-enum tables with an
//!    explicit default arm; unrecognized input degrades, never fails.
//!
//! A failure building one entry is recorded as a skip and logged; it never
//! aborts the type and never reaches the orchestrator.

pub mod allergy;
pub mod care_plan;
pub mod condition;
pub mod diagnostic_report;
pub mod encounter;
pub mod medication;
pub mod observation;
pub mod organization;
pub mod practitioner;
pub mod procedure;
pub mod service_request;

pub use allergy::AllergyTransformer;
pub use care_plan::CarePlanTransformer;
pub use condition::ConditionTransformer;
pub use diagnostic_report::DiagnosticReportTransformer;
pub use encounter::EncounterTransformer;
pub use medication::MedicationTransformer;
pub use observation::ObservationTransformer;
pub use organization::OrganizationTransformer;
pub use practitioner::PractitionerTransformer;
pub use procedure::ProcedureTransformer;
pub use service_request::ServiceRequestTransformer;

use crate::dates::DateExtractor;
use crate::domain::{
    DateOrigin, ExtractionBundle, ResourceType, SkipReason, SkippedEntry, StandardizedRecord,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Keywords that mark a procedure-labeled legacy value as diagnostic; such
/// entries are reclassified to DiagnosticReport instead of Procedure
pub(crate) const DIAGNOSTIC_KEYWORDS: &[&str] = &[
    "x-ray", "xray", "mri", "ct scan", "ct-scan", "ultrasound", "echocardiogram", "ekg", "ecg",
    "imaging", "radiograph", "mammogram", "pet scan", "doppler",
];

/// Outcome of one entry build: a record, or a visible skip
#[derive(Debug)]
pub enum EntryOutcome {
    Built(StandardizedRecord),
    Skipped(SkipReason),
}

/// Batch result of one transformer run
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TransformOutcome {
    /// Records produced
    pub records: Vec<StandardizedRecord>,

    /// Entries that produced no record, with reasons
    pub skipped: Vec<SkippedEntry>,
}

impl TransformOutcome {
    /// Empty outcome
    pub fn empty() -> Self {
        Self::default()
    }

    /// Folds one entry outcome in, logging skips
    pub fn absorb(&mut self, resource_type: ResourceType, index: usize, outcome: EntryOutcome) {
        match outcome {
            EntryOutcome::Built(record) => self.records.push(record),
            EntryOutcome::Skipped(reason) => {
                debug!(
                    resource_type = %resource_type,
                    index,
                    reason = reason.label(),
                    "Skipped entry"
                );
                self.skipped
                    .push(SkippedEntry::new(resource_type.name(), index, reason));
            }
        }
    }
}

/// One transformation unit: extraction bundle in, standardized records out
///
/// Implementations are stateless between calls and safe to share across
/// threads; each call reads only from the immutable input bundle.
pub trait ResourceTransformer: Send + Sync {
    /// The record type this unit produces
    fn resource_type(&self) -> ResourceType;

    /// Transforms one bundle into records of this unit's type
    fn transform(&self, bundle: &ExtractionBundle) -> TransformOutcome;
}

/// Returns the patient id or logs the refusal
pub(crate) fn require_patient<'a>(
    bundle: &'a ExtractionBundle,
    resource_type: ResourceType,
) -> Option<&'a str> {
    match bundle.patient_id() {
        Some(id) => Some(id),
        None => {
            warn!(
                resource_type = %resource_type,
                "Bundle has no patient id; producing no records"
            );
            None
        }
    }
}

/// A clinical date resolved for one record
#[derive(Debug, Clone)]
pub(crate) struct ResolvedDate {
    /// ISO `YYYY-MM-DD`, when a plausible date was found
    pub iso: Option<String>,
    /// Which source supplied it
    pub origin: DateOrigin,
}

impl ResolvedDate {
    fn unknown() -> Self {
        Self {
            iso: None,
            origin: DateOrigin::Unknown,
        }
    }
}

/// Resolves a record's clinical date from its possible sources, in priority
/// order: manual override, structured field, free text. Implausible values
/// are treated as absent and resolution falls through to the next source.
pub(crate) fn resolve_date(
    dates: &DateExtractor,
    override_value: Option<&str>,
    structured_value: Option<&str>,
    free_text: Option<&str>,
    context_window: usize,
) -> ResolvedDate {
    if let Some(value) = override_value {
        if let Some(iso) = dates.standardize(value) {
            return ResolvedDate {
                iso: Some(iso),
                origin: DateOrigin::ManualOverride,
            };
        }
    }
    if let Some(value) = structured_value {
        if let Some(iso) = dates.standardize(value) {
            return ResolvedDate {
                iso: Some(iso),
                origin: DateOrigin::Structured,
            };
        }
    }
    if let Some(text) = free_text {
        if let Some(candidate) = dates.best_date(text, context_window) {
            return ResolvedDate {
                iso: Some(DateExtractor::standardize_date(candidate.date)),
                origin: DateOrigin::ExtractedFromText,
            };
        }
    }
    ResolvedDate::unknown()
}

/// Truncates text to a bounded provenance excerpt at a char boundary
pub(crate) fn bounded_excerpt(text: &str, max_len: usize) -> String {
    let trimmed = text.trim();
    if trimmed.len() <= max_len {
        return trimmed.to_string();
    }
    let mut cut = max_len;
    while cut > 0 && !trimmed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &trimmed[..cut])
}

/// Clamps an upstream confidence into [0, 1]
pub(crate) fn clamp_confidence(confidence: Option<f64>) -> Option<f64> {
    confidence.map(|c| c.clamp(0.0, 1.0))
}

/// Splits a legacy value into list items on common delimiters
pub(crate) fn split_list_items(value: &str) -> Vec<&str> {
    value
        .split(['\n', ';', ','])
        .map(|item| {
            item.trim()
                .trim_start_matches(|c: char| {
                    c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*' | '•')
                })
                .trim()
        })
        .filter(|item| !item.is_empty())
        .collect()
}

/// Whether a value matches any keyword (case-insensitive substring)
pub(crate) fn contains_keyword(value: &str, keywords: &[&str]) -> bool {
    let value = value.to_lowercase();
    keywords.iter().any(|kw| value.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Provenance, RecordOrigin};
    use serde_json::json;

    fn extractor() -> DateExtractor {
        DateExtractor::new(true).unwrap()
    }

    #[test]
    fn test_resolve_date_priority() {
        let dates = extractor();
        let resolved = resolve_date(
            &dates,
            Some("2021-01-01"),
            Some("2022-02-02"),
            Some("seen 2023-03-03"),
            40,
        );
        assert_eq!(resolved.iso.as_deref(), Some("2021-01-01"));
        assert_eq!(resolved.origin, DateOrigin::ManualOverride);

        let resolved = resolve_date(&dates, None, Some("2022-02-02"), None, 40);
        assert_eq!(resolved.origin, DateOrigin::Structured);

        let resolved = resolve_date(&dates, None, None, Some("seen 2023-03-03"), 40);
        assert_eq!(resolved.iso.as_deref(), Some("2023-03-03"));
        assert_eq!(resolved.origin, DateOrigin::ExtractedFromText);

        let resolved = resolve_date(&dates, None, None, Some("no dates here"), 40);
        assert!(resolved.iso.is_none());
        assert_eq!(resolved.origin, DateOrigin::Unknown);
    }

    #[test]
    fn test_resolve_date_falls_through_implausible() {
        let dates = extractor();
        // Structured value out of the plausibility window; text still wins
        let resolved = resolve_date(&dates, None, Some("1850-01-01"), Some("on 2023-05-15"), 40);
        assert_eq!(resolved.iso.as_deref(), Some("2023-05-15"));
        assert_eq!(resolved.origin, DateOrigin::ExtractedFromText);
    }

    #[test]
    fn test_bounded_excerpt() {
        assert_eq!(bounded_excerpt("  short  ", 20), "short");
        let long = "a".repeat(50);
        let excerpt = bounded_excerpt(&long, 10);
        assert_eq!(excerpt, format!("{}...", "a".repeat(10)));
    }

    #[test]
    fn test_split_list_items() {
        let items = split_list_items("1. Hypertension; 2. Type 2 Diabetes\nAsthma, ");
        assert_eq!(items, vec!["Hypertension", "Type 2 Diabetes", "Asthma"]);
    }

    #[test]
    fn test_outcome_absorb_collects_skips() {
        let mut outcome = TransformOutcome::empty();
        outcome.absorb(
            ResourceType::Condition,
            0,
            EntryOutcome::Skipped(SkipReason::MissingField("name".to_string())),
        );
        outcome.absorb(
            ResourceType::Condition,
            1,
            EntryOutcome::Built(StandardizedRecord::new(
                ResourceType::Condition,
                "p1",
                json!({}),
                Provenance::new(RecordOrigin::Structured),
            )),
        );
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].reason.label(), "missing_field");
    }

    #[test]
    fn test_clamp_confidence() {
        assert_eq!(clamp_confidence(Some(1.7)), Some(1.0));
        assert_eq!(clamp_confidence(Some(-0.2)), Some(0.0));
        assert_eq!(clamp_confidence(None), None);
    }
}
