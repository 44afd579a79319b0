//! Allergy transformer
//!
//! Negated entries ("NKDA", "no known allergies") produce no record but are
//! surfaced as explicit skips so the absence is visible downstream.

use super::{
    bounded_excerpt, clamp_confidence, require_patient, split_list_items, EntryOutcome,
    ResourceTransformer, TransformOutcome,
};
use crate::domain::{
    AllergyEntry, EntityInput, ExtractionBundle, LegacyField, Provenance, RecordOrigin,
    ResourceType, SkipReason, StandardizedRecord,
};
use serde_json::{json, Value};

pub(crate) const LEGACY_KEYWORDS: &[&str] = &["allerg"];

const NEGATION_MARKERS: &[&str] = &[
    "nkda",
    "nka",
    "no known allergies",
    "no known drug allergies",
    "none known",
    "denies allergies",
];

/// Allergy transformer
pub struct AllergyTransformer {
    context_window: usize,
}

impl AllergyTransformer {
    /// Creates the transformer
    pub fn new(context_window: usize) -> Self {
        Self { context_window }
    }

    fn build_structured(&self, patient_id: &str, entry: &AllergyEntry) -> EntryOutcome {
        let Some(allergen) = entry
            .allergen
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
        else {
            return EntryOutcome::Skipped(SkipReason::MissingField("allergen".to_string()));
        };
        if is_negated(allergen) {
            return EntryOutcome::Skipped(SkipReason::NegatedEntry(allergen.to_string()));
        }

        let body = allergy_body(
            allergen,
            entry.reaction.as_deref(),
            map_severity(entry.severity.as_deref()),
            map_status(entry.status.as_deref()),
        );

        let provenance = Provenance::new(RecordOrigin::Structured)
            .with_confidence(clamp_confidence(entry.confidence));

        EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::AllergyIntolerance,
            patient_id,
            body,
            provenance,
        ))
    }

    fn build_legacy(&self, patient_id: &str, field: &LegacyField, item: &str) -> EntryOutcome {
        if is_negated(item) {
            return EntryOutcome::Skipped(SkipReason::NegatedEntry(item.to_string()));
        }
        if !item.chars().any(|c| c.is_alphabetic()) {
            return EntryOutcome::Skipped(SkipReason::UnparsableValue(item.to_string()));
        }

        // "Penicillin - rash" and "Penicillin (rash)" carry the reaction
        let (allergen, reaction) = split_reaction(item);
        let body = allergy_body(allergen, reaction, None, "active");

        let provenance = Provenance::new(RecordOrigin::Legacy)
            .with_confidence(clamp_confidence(field.confidence))
            .with_excerpt(bounded_excerpt(&field.value, self.context_window));

        EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::AllergyIntolerance,
            patient_id,
            body,
            provenance,
        ))
    }
}

impl ResourceTransformer for AllergyTransformer {
    fn resource_type(&self) -> ResourceType {
        ResourceType::AllergyIntolerance
    }

    fn transform(&self, bundle: &ExtractionBundle) -> TransformOutcome {
        let mut outcome = TransformOutcome::empty();
        let Some(patient_id) = require_patient(bundle, self.resource_type()) else {
            return outcome;
        };

        let structured = bundle
            .structured
            .as_ref()
            .and_then(|s| s.allergies.as_deref());

        match EntityInput::resolve(structured, bundle, LEGACY_KEYWORDS) {
            EntityInput::Structured(entries) => {
                for (index, entry) in entries.iter().enumerate() {
                    let built = self.build_structured(patient_id, entry);
                    outcome.absorb(self.resource_type(), index, built);
                }
            }
            EntityInput::Legacy(fields) => {
                let mut index = 0;
                for field in fields {
                    for item in split_list_items(&field.value) {
                        let built = self.build_legacy(patient_id, field, item);
                        outcome.absorb(self.resource_type(), index, built);
                        index += 1;
                    }
                }
            }
            EntityInput::Absent => {}
        }
        outcome
    }
}

fn allergy_body(
    allergen: &str,
    reaction: Option<&str>,
    severity: Option<&'static str>,
    status: &str,
) -> Value {
    let mut body = json!({
        "clinicalStatus": {
            "coding": [{
                "system": "http://terminology.hl7.org/CodeSystem/allergyintolerance-clinical",
                "code": status,
            }]
        },
        "code": { "text": allergen },
    });

    if let Some(reaction) = reaction.map(str::trim).filter(|r| !r.is_empty()) {
        let mut block = json!({ "manifestation": [{ "text": reaction }] });
        if let Some(severity) = severity {
            block["severity"] = json!(severity);
        }
        body["reaction"] = json!([block]);
    } else if let Some(severity) = severity {
        body["reaction"] = json!([{ "severity": severity }]);
    }
    body
}

fn is_negated(value: &str) -> bool {
    let value = value.trim().to_lowercase();
    NEGATION_MARKERS
        .iter()
        .any(|marker| value == *marker || value.starts_with(marker))
}

/// Splits "Penicillin - rash" / "Penicillin (rash)" into allergen + reaction
fn split_reaction(item: &str) -> (&str, Option<&str>) {
    if let Some((allergen, rest)) = item.split_once(" - ") {
        return (allergen.trim(), Some(rest.trim()));
    }
    if let Some(open) = item.find('(') {
        let close = item.rfind(')').unwrap_or(item.len());
        if close > open + 1 {
            return (item[..open].trim(), Some(item[open + 1..close].trim()));
        }
    }
    (item.trim(), None)
}

/// Reaction severity vocabulary; unrecognized input carries no severity
fn map_severity(raw: Option<&str>) -> Option<&'static str> {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("mild") => Some("mild"),
        Some("moderate") => Some("moderate"),
        Some("severe" | "anaphylaxis" | "anaphylactic") => Some("severe"),
        _ => None,
    }
}

/// Clinical status vocabulary; unrecognized input defaults to "active"
fn map_status(raw: Option<&str>) -> &'static str {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("active" | "current") => "active",
        Some("inactive") => "inactive",
        Some("resolved") => "resolved",
        _ => "active",
    }
}
