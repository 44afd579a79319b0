//! Medication transformer
//!
//! Converts extracted medications into MedicationStatement records. The
//! legacy path splits free text like `"Metformin 500mg PO BID"` into
//! name/dosage/route/schedule using ordered regex families: dose first
//! (it anchors where the name ends), then route, then schedule.

use super::{
    bounded_excerpt, clamp_confidence, require_patient, resolve_date, split_list_items,
    EntryOutcome, ResourceTransformer, TransformOutcome,
};
use crate::dates::DateExtractor;
use crate::domain::{
    EntityInput, ExtractionBundle, LegacyField, MedicationEntry, Provenance, RecordOrigin,
    ResourceType, SkipReason, StandardizedRecord,
};
use anyhow::{Context, Result};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;

pub(crate) const LEGACY_KEYWORDS: &[&str] = &["medication", "drug", "prescription", "rx"];

/// Constituent parts recovered from one free-text medication line
#[derive(Debug, Default, PartialEq)]
struct MedicationParts {
    name: String,
    dosage: Option<String>,
    route: Option<String>,
    schedule: Option<String>,
}

/// Medication transformer
pub struct MedicationTransformer {
    dates: Arc<DateExtractor>,
    context_window: usize,
    dose: Regex,
    route: Regex,
    schedule: Regex,
}

impl MedicationTransformer {
    /// Creates the transformer around a shared date extractor
    pub fn new(dates: Arc<DateExtractor>, context_window: usize) -> Result<Self> {
        let dose = Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(mg|mcg|g|ml|units?|iu|meq)\b")
            .context("Invalid dose pattern")?;
        let route = Regex::new(
            r"(?i)\b(po|oral(?:ly)?|iv|intravenous|im|intramuscular|subq|sq|sc|subcutaneous|topical|inhaled|sublingual|pr|rectal)\b",
        )
        .context("Invalid route pattern")?;
        let schedule = Regex::new(
            r"(?i)\b(once daily|twice daily|three times daily|every other day|at bedtime|as needed|daily|nightly|weekly|monthly|bid|tid|qid|qd|qhs|qam|prn|q\d+h)\b",
        )
        .context("Invalid schedule pattern")?;
        Ok(Self {
            dates,
            context_window,
            dose,
            route,
            schedule,
        })
    }

    fn build_structured(&self, patient_id: &str, entry: &MedicationEntry) -> EntryOutcome {
        let Some(name) = entry.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
            return EntryOutcome::Skipped(SkipReason::MissingField("name".to_string()));
        };

        let resolved = resolve_date(
            &self.dates,
            entry.date_override.as_deref(),
            entry.start_date.as_deref(),
            entry.instructions.as_deref(),
            self.context_window,
        );

        let body = medication_body(
            name,
            map_status(entry.status.as_deref()),
            entry.dosage.as_deref(),
            entry.route.as_deref(),
            entry.frequency.as_deref(),
            resolved.iso.as_deref(),
        );

        let mut provenance = Provenance::new(RecordOrigin::Structured)
            .with_confidence(clamp_confidence(entry.confidence))
            .with_date_origin(resolved.origin);
        if let Some(instructions) = entry.instructions.as_deref() {
            provenance =
                provenance.with_excerpt(bounded_excerpt(instructions, self.context_window));
        }

        EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::MedicationStatement,
            patient_id,
            body,
            provenance,
        ))
    }

    fn build_legacy(&self, patient_id: &str, field: &LegacyField, item: &str) -> EntryOutcome {
        let Some(parts) = self.parse_medication_text(item) else {
            return EntryOutcome::Skipped(SkipReason::UnparsableValue(item.to_string()));
        };

        let resolved = resolve_date(&self.dates, None, None, Some(item), self.context_window);
        let body = medication_body(
            &parts.name,
            "active",
            parts.dosage.as_deref(),
            parts.route.as_deref(),
            parts.schedule.as_deref(),
            resolved.iso.as_deref(),
        );

        let provenance = Provenance::new(RecordOrigin::Legacy)
            .with_confidence(clamp_confidence(field.confidence))
            .with_excerpt(bounded_excerpt(&field.value, self.context_window))
            .with_date_origin(resolved.origin);

        EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::MedicationStatement,
            patient_id,
            body,
            provenance,
        ))
    }

    /// Splits one free-text medication line into its constituent parts
    ///
    /// The name is whatever precedes the first dose/route/schedule hit;
    /// a line with no recognizable name yields `None`.
    fn parse_medication_text(&self, text: &str) -> Option<MedicationParts> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let dose_match = self.dose.find(text);
        let route_match = self.route.find(text);
        let schedule_match = self.schedule.find(text);

        let name_end = [&dose_match, &route_match, &schedule_match]
            .iter()
            .filter_map(|m| m.as_ref().map(|m| m.start()))
            .min()
            .unwrap_or(text.len());

        let name = text[..name_end]
            .trim()
            .trim_end_matches([',', ':', '-'])
            .trim()
            .to_string();
        if name.is_empty() || !name.chars().any(|c| c.is_alphabetic()) {
            return None;
        }

        Some(MedicationParts {
            name,
            dosage: dose_match.map(|m| m.as_str().to_string()),
            route: route_match.map(|m| normalize_route(m.as_str())),
            schedule: schedule_match.map(|m| m.as_str().to_lowercase()),
        })
    }
}

impl ResourceTransformer for MedicationTransformer {
    fn resource_type(&self) -> ResourceType {
        ResourceType::MedicationStatement
    }

    fn transform(&self, bundle: &ExtractionBundle) -> TransformOutcome {
        let mut outcome = TransformOutcome::empty();
        let Some(patient_id) = require_patient(bundle, self.resource_type()) else {
            return outcome;
        };

        let structured = bundle
            .structured
            .as_ref()
            .and_then(|s| s.medications.as_deref());

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

fn medication_body(
    name: &str,
    status: &str,
    dosage: Option<&str>,
    route: Option<&str>,
    schedule: Option<&str>,
    effective: Option<&str>,
) -> Value {
    let mut body = json!({
        "status": status,
        "medicationCodeableConcept": { "text": name },
    });

    let mut dose_block = serde_json::Map::new();
    if let Some(dosage) = dosage {
        dose_block.insert("text".to_string(), json!(dosage));
    }
    if let Some(route) = route {
        dose_block.insert("route".to_string(), json!({ "text": route }));
    }
    if let Some(schedule) = schedule {
        dose_block.insert("timing".to_string(), json!({ "code": { "text": schedule } }));
    }
    if !dose_block.is_empty() {
        body["dosage"] = json!([Value::Object(dose_block)]);
    }
    if let Some(effective) = effective {
        body["effectiveDateTime"] = json!(effective);
    }
    body
}

/// Maps a free-form status to the closed medication-status vocabulary;
/// unrecognized input defaults to "active"
fn map_status(raw: Option<&str>) -> &'static str {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("active" | "current" | "taking") => "active",
        Some("completed" | "finished") => "completed",
        Some("stopped" | "discontinued" | "dc" | "d/c") => "stopped",
        Some("on-hold" | "on hold" | "held") => "on-hold",
        Some("intended" | "planned") => "intended",
        _ => "active",
    }
}

fn normalize_route(raw: &str) -> String {
    match raw.to_lowercase().as_str() {
        "po" | "oral" | "orally" => "oral".to_string(),
        "iv" | "intravenous" => "intravenous".to_string(),
        "im" | "intramuscular" => "intramuscular".to_string(),
        "subq" | "sq" | "sc" | "subcutaneous" => "subcutaneous".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StructuredSection;

    fn transformer() -> MedicationTransformer {
        MedicationTransformer::new(Arc::new(DateExtractor::new(true).unwrap()), 40).unwrap()
    }

    #[test]
    fn test_parse_medication_text_full_line() {
        let parts = transformer()
            .parse_medication_text("Metformin 500mg PO BID")
            .unwrap();
        assert_eq!(parts.name, "Metformin");
        assert_eq!(parts.dosage.as_deref(), Some("500mg"));
        assert_eq!(parts.route.as_deref(), Some("oral"));
        assert_eq!(parts.schedule.as_deref(), Some("bid"));
    }

    #[test]
    fn test_parse_medication_text_name_only() {
        let parts = transformer().parse_medication_text("Lisinopril").unwrap();
        assert_eq!(parts.name, "Lisinopril");
        assert!(parts.dosage.is_none());
        assert!(parts.route.is_none());
    }

    #[test]
    fn test_parse_medication_text_unparsable() {
        assert!(transformer().parse_medication_text("  ").is_none());
        assert!(transformer().parse_medication_text("500 12").is_none());
    }

    #[test]
    fn test_structured_medication() {
        let bundle = ExtractionBundle {
            patient_id: Some("p1".to_string()),
            structured: Some(StructuredSection {
                medications: Some(vec![MedicationEntry {
                    name: Some("Atorvastatin".to_string()),
                    dosage: Some("40mg".to_string()),
                    route: Some("oral".to_string()),
                    frequency: Some("nightly".to_string()),
                    status: Some("discontinued".to_string()),
                    start_date: Some("2022-11-01".to_string()),
                    confidence: Some(0.9),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let outcome = transformer().transform(&bundle);
        assert_eq!(outcome.records.len(), 1);
        let record = &outcome.records[0];
        assert_eq!(record.body["status"], "stopped");
        assert_eq!(record.body["medicationCodeableConcept"]["text"], "Atorvastatin");
        assert_eq!(record.body["dosage"][0]["text"], "40mg");
        assert_eq!(record.body["effectiveDateTime"], "2022-11-01");
        assert_eq!(record.provenance.origin, RecordOrigin::Structured);
    }

    #[test]
    fn test_legacy_medication_list() {
        let bundle = ExtractionBundle {
            patient_id: Some("p1".to_string()),
            legacy_fields: Some(vec![LegacyField::new(
                "Current Medications",
                "Metformin 500mg PO BID; Lisinopril 10mg daily",
            )]),
            ..Default::default()
        };
        let outcome = transformer().transform(&bundle);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(
            outcome.records[0].body["medicationCodeableConcept"]["text"],
            "Metformin"
        );
        assert_eq!(
            outcome.records[1].body["dosage"][0]["timing"]["code"]["text"],
            "daily"
        );
        assert_eq!(outcome.records[0].provenance.origin, RecordOrigin::Legacy);
    }

    #[test]
    fn test_unknown_status_degrades_to_active() {
        assert_eq!(map_status(Some("???")), "active");
        assert_eq!(map_status(None), "active");
    }
}
