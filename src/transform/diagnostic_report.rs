//! Diagnostic report transformer
//!
//! Legacy-only: reports come from diagnostic-labeled fields, plus
//! procedure-labeled values that describe imaging or other diagnostic
//! studies (which the procedure transformer deliberately leaves behind).

use super::{
    bounded_excerpt, clamp_confidence, contains_keyword, require_patient, resolve_date,
    split_list_items, EntryOutcome, ResourceTransformer, TransformOutcome, DIAGNOSTIC_KEYWORDS,
};
use crate::dates::DateExtractor;
use crate::domain::{
    ExtractionBundle, LegacyField, Provenance, RecordOrigin, ResourceType, SkipReason,
    StandardizedRecord,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub(crate) const REPORT_LABELS: &[&str] =
    &["imaging", "radiology", "diagnostic", "study", "studies"];
const PROCEDURE_LABELS: &[&str] = &["procedure", "surgery", "surgical", "operation"];

/// Diagnostic report transformer
pub struct DiagnosticReportTransformer {
    dates: Arc<DateExtractor>,
    context_window: usize,
}

impl DiagnosticReportTransformer {
    /// Creates the transformer around a shared date extractor
    pub fn new(dates: Arc<DateExtractor>, context_window: usize) -> Self {
        Self {
            dates,
            context_window,
        }
    }

    fn build_legacy(&self, patient_id: &str, field: &LegacyField, item: &str) -> EntryOutcome {
        if !item.chars().any(|c| c.is_alphabetic()) {
            return EntryOutcome::Skipped(SkipReason::UnparsableValue(item.to_string()));
        }

        // "CT chest: no acute findings" keeps the conclusion separate
        let (name, conclusion) = match item.split_once(':') {
            Some((name, rest)) if !rest.trim().is_empty() => (name.trim(), Some(rest.trim())),
            _ => (item, None),
        };

        let resolved = resolve_date(&self.dates, None, None, Some(item), self.context_window);
        let body = report_body(name, conclusion, resolved.iso.as_deref());

        let provenance = Provenance::new(RecordOrigin::Legacy)
            .with_confidence(clamp_confidence(field.confidence))
            .with_excerpt(bounded_excerpt(&field.value, self.context_window))
            .with_date_origin(resolved.origin);

        EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::DiagnosticReport,
            patient_id,
            body,
            provenance,
        ))
    }
}

impl ResourceTransformer for DiagnosticReportTransformer {
    fn resource_type(&self) -> ResourceType {
        ResourceType::DiagnosticReport
    }

    fn transform(&self, bundle: &ExtractionBundle) -> TransformOutcome {
        let mut outcome = TransformOutcome::empty();
        let Some(patient_id) = require_patient(bundle, self.resource_type()) else {
            return outcome;
        };

        let mut index = 0;
        for field in bundle.legacy_fields_matching(REPORT_LABELS) {
            for item in split_list_items(&field.value) {
                let built = self.build_legacy(patient_id, field, item);
                outcome.absorb(self.resource_type(), index, built);
                index += 1;
            }
        }

        // Reclassified diagnostic studies out of procedure-labeled fields
        for field in bundle.legacy_fields_matching(PROCEDURE_LABELS) {
            for item in split_list_items(&field.value) {
                if !contains_keyword(item, DIAGNOSTIC_KEYWORDS) {
                    continue;
                }
                let built = self.build_legacy(patient_id, field, item);
                outcome.absorb(self.resource_type(), index, built);
                index += 1;
            }
        }
        outcome
    }
}

fn report_body(name: &str, conclusion: Option<&str>, effective: Option<&str>) -> Value {
    let mut body = json!({
        "status": "final",
        "code": { "text": name },
    });
    if let Some(conclusion) = conclusion {
        body["conclusion"] = json!(conclusion);
    }
    if let Some(effective) = effective {
        body["effectiveDateTime"] = json!(effective);
    }
    body
}
