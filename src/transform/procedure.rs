//! Procedure transformer
//!
//! Legacy procedure-labeled values that describe diagnostic studies (x-ray,
//! MRI, ...) are not converted here; the diagnostic-report transformer
//! reclassifies them. Skipping them as unparsable would double-report.

use super::{
    bounded_excerpt, clamp_confidence, contains_keyword, require_patient, resolve_date,
    split_list_items, EntryOutcome, ResourceTransformer, TransformOutcome, DIAGNOSTIC_KEYWORDS,
};
use crate::dates::DateExtractor;
use crate::domain::{
    EntityInput, ExtractionBundle, LegacyField, ProcedureEntry, Provenance, RecordOrigin,
    ResourceType, SkipReason, StandardizedRecord,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub(crate) const LEGACY_KEYWORDS: &[&str] = &["procedure", "surgery", "surgical", "operation"];

const CPT_SYSTEM: &str = "http://www.ama-assn.org/go/cpt";

/// Procedure transformer
pub struct ProcedureTransformer {
    dates: Arc<DateExtractor>,
    context_window: usize,
}

impl ProcedureTransformer {
    /// Creates the transformer around a shared date extractor
    pub fn new(dates: Arc<DateExtractor>, context_window: usize) -> Self {
        Self {
            dates,
            context_window,
        }
    }

    fn build_structured(&self, patient_id: &str, entry: &ProcedureEntry) -> EntryOutcome {
        let Some(name) = entry.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
            return EntryOutcome::Skipped(SkipReason::MissingField("name".to_string()));
        };

        let resolved = resolve_date(
            &self.dates,
            entry.date_override.as_deref(),
            entry.performed_date.as_deref(),
            entry.notes.as_deref(),
            self.context_window,
        );

        let body = procedure_body(
            name,
            map_status(entry.status.as_deref()),
            entry.cpt_code.as_deref(),
            entry.provider.as_deref(),
            resolved.iso.as_deref(),
            entry.notes.as_deref(),
        );

        let mut provenance = Provenance::new(RecordOrigin::Structured)
            .with_confidence(clamp_confidence(entry.confidence))
            .with_date_origin(resolved.origin);
        if let Some(notes) = entry.notes.as_deref() {
            provenance = provenance.with_excerpt(bounded_excerpt(notes, self.context_window));
        }

        EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::Procedure,
            patient_id,
            body,
            provenance,
        ))
    }

    fn build_legacy(&self, patient_id: &str, field: &LegacyField, item: &str) -> EntryOutcome {
        if contains_keyword(item, DIAGNOSTIC_KEYWORDS) {
            // Reclassified by the diagnostic-report transformer
            return EntryOutcome::Skipped(SkipReason::UnparsableValue(format!(
                "diagnostic study: {item}"
            )));
        }
        if !item.chars().any(|c| c.is_alphabetic()) {
            return EntryOutcome::Skipped(SkipReason::UnparsableValue(item.to_string()));
        }

        let resolved = resolve_date(&self.dates, None, None, Some(item), self.context_window);
        let body = procedure_body(item, "completed", None, None, resolved.iso.as_deref(), None);

        let provenance = Provenance::new(RecordOrigin::Legacy)
            .with_confidence(clamp_confidence(field.confidence))
            .with_excerpt(bounded_excerpt(&field.value, self.context_window))
            .with_date_origin(resolved.origin);

        EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::Procedure,
            patient_id,
            body,
            provenance,
        ))
    }
}

impl ResourceTransformer for ProcedureTransformer {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Procedure
    }

    fn transform(&self, bundle: &ExtractionBundle) -> TransformOutcome {
        let mut outcome = TransformOutcome::empty();
        let Some(patient_id) = require_patient(bundle, self.resource_type()) else {
            return outcome;
        };

        let structured = bundle
            .structured
            .as_ref()
            .and_then(|s| s.procedures.as_deref());

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

fn procedure_body(
    name: &str,
    status: &str,
    cpt_code: Option<&str>,
    provider: Option<&str>,
    performed: Option<&str>,
    notes: Option<&str>,
) -> Value {
    let mut code = json!({ "text": name });
    if let Some(cpt) = cpt_code.map(str::trim).filter(|c| !c.is_empty()) {
        code["coding"] = json!([{ "system": CPT_SYSTEM, "code": cpt }]);
    }

    let mut body = json!({
        "status": status,
        "code": code,
    });
    if let Some(performed) = performed {
        body["performedDateTime"] = json!(performed);
    }
    if let Some(provider) = provider.map(str::trim).filter(|p| !p.is_empty()) {
        body["performer"] = json!([{ "actor": { "display": provider } }]);
    }
    if let Some(notes) = notes.map(str::trim).filter(|n| !n.is_empty()) {
        body["note"] = json!([{ "text": notes }]);
    }
    body
}

/// Procedure status vocabulary; unrecognized input defaults to "completed"
fn map_status(raw: Option<&str>) -> &'static str {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("completed" | "done" | "performed") => "completed",
        Some("in-progress" | "in progress" | "ongoing") => "in-progress",
        Some("scheduled" | "planned" | "preparation") => "preparation",
        Some("not-done" | "not done" | "cancelled" | "canceled") => "not-done",
        _ => "completed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StructuredSection;

    fn transformer() -> ProcedureTransformer {
        ProcedureTransformer::new(Arc::new(DateExtractor::new(true).unwrap()), 40)
    }

    #[test]
    fn test_structured_procedure_with_cpt() {
        let bundle = ExtractionBundle {
            patient_id: Some("p1".to_string()),
            structured: Some(StructuredSection {
                procedures: Some(vec![ProcedureEntry {
                    name: Some("Appendectomy".to_string()),
                    status: Some("done".to_string()),
                    performed_date: Some("2023-04-02".to_string()),
                    cpt_code: Some("44950".to_string()),
                    provider: Some("Dr. Chen".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let outcome = transformer().transform(&bundle);
        assert_eq!(outcome.records.len(), 1);
        let record = &outcome.records[0];
        assert_eq!(record.body["status"], "completed");
        assert_eq!(record.body["code"]["coding"][0]["code"], "44950");
        assert_eq!(record.body["performedDateTime"], "2023-04-02");
        assert_eq!(record.body["performer"][0]["actor"]["display"], "Dr. Chen");
    }

    #[test]
    fn test_legacy_diagnostic_study_is_skipped() {
        let bundle = ExtractionBundle {
            patient_id: Some("p1".to_string()),
            legacy_fields: Some(vec![LegacyField::new(
                "Procedures",
                "Chest x-ray; Knee arthroscopy",
            )]),
            ..Default::default()
        };
        let outcome = transformer().transform(&bundle);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].body["code"]["text"], "Knee arthroscopy");
        assert_eq!(outcome.skipped.len(), 1);
    }

    #[test]
    fn test_missing_name_skips() {
        let bundle = ExtractionBundle {
            patient_id: Some("p1".to_string()),
            structured: Some(StructuredSection {
                procedures: Some(vec![ProcedureEntry {
                    status: Some("completed".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let outcome = transformer().transform(&bundle);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.skipped[0].reason.label(), "missing_field");
    }
}
