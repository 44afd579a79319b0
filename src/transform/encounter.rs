//! Encounter transformer
//!
//! At most one encounter record per bundle. A structured encounter entry
//! wins outright; otherwise the class is inferred from the document type
//! and the participant/location/reason are scavenged from legacy labels.

use super::{
    bounded_excerpt, clamp_confidence, require_patient, resolve_date, EntryOutcome,
    ResourceTransformer, TransformOutcome,
};
use crate::dates::DateExtractor;
use crate::domain::{
    EncounterEntry, ExtractionBundle, Provenance, RecordOrigin, ResourceType, SkipReason,
    StandardizedRecord,
};
use serde_json::{json, Value};
use std::sync::Arc;

const CLASS_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/v3-ActCode";

const PROVIDER_LABELS: &[&str] = &["provider", "physician", "attending", "seen by"];
const LOCATION_LABELS: &[&str] = &["location", "facility", "department", "unit"];
const REASON_LABELS: &[&str] = &["reason", "chief complaint", "presenting"];

/// Encounter transformer
pub struct EncounterTransformer {
    dates: Arc<DateExtractor>,
    context_window: usize,
}

impl EncounterTransformer {
    /// Creates the transformer around a shared date extractor
    pub fn new(dates: Arc<DateExtractor>, context_window: usize) -> Self {
        Self {
            dates,
            context_window,
        }
    }

    fn build_structured(&self, patient_id: &str, entry: &EncounterEntry) -> EntryOutcome {
        let Some(class) = entry
            .encounter_class
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
        else {
            return EntryOutcome::Skipped(SkipReason::MissingField("encounter_class".to_string()));
        };

        let resolved = resolve_date(
            &self.dates,
            entry.date_override.as_deref(),
            entry.date.as_deref(),
            entry.reason.as_deref(),
            self.context_window,
        );

        let body = encounter_body(
            map_class(class),
            entry.provider.as_deref(),
            entry.location.as_deref(),
            entry.reason.as_deref(),
            resolved.iso.as_deref(),
        );

        let provenance = Provenance::new(RecordOrigin::Structured)
            .with_confidence(clamp_confidence(entry.confidence))
            .with_date_origin(resolved.origin);

        EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::Encounter,
            patient_id,
            body,
            provenance,
        ))
    }

    /// Infers an encounter from the document type and stray legacy labels
    fn build_inferred(&self, patient_id: &str, bundle: &ExtractionBundle) -> Option<EntryOutcome> {
        let document_type = bundle.document_type.as_deref()?.trim();
        if document_type.is_empty() {
            return None;
        }
        let class = infer_class(document_type)?;

        let provider = first_legacy_value(bundle, PROVIDER_LABELS);
        let location = first_legacy_value(bundle, LOCATION_LABELS);
        let reason = first_legacy_value(bundle, REASON_LABELS);

        let resolved = resolve_date(
            &self.dates,
            None,
            None,
            reason.as_deref(),
            self.context_window,
        );

        let body = encounter_body(
            class,
            provider.as_deref(),
            location.as_deref(),
            reason.as_deref(),
            resolved.iso.as_deref(),
        );

        let provenance = Provenance::new(RecordOrigin::Legacy)
            .with_excerpt(bounded_excerpt(document_type, self.context_window))
            .with_date_origin(resolved.origin);

        Some(EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::Encounter,
            patient_id,
            body,
            provenance,
        )))
    }
}

impl ResourceTransformer for EncounterTransformer {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Encounter
    }

    fn transform(&self, bundle: &ExtractionBundle) -> TransformOutcome {
        let mut outcome = TransformOutcome::empty();
        let Some(patient_id) = require_patient(bundle, self.resource_type()) else {
            return outcome;
        };

        let structured = bundle
            .structured
            .as_ref()
            .and_then(|s| s.encounter.as_ref());

        if let Some(entry) = structured {
            let built = self.build_structured(patient_id, entry);
            outcome.absorb(self.resource_type(), 0, built);
        } else if let Some(built) = self.build_inferred(patient_id, bundle) {
            outcome.absorb(self.resource_type(), 0, built);
        }
        outcome
    }
}

fn encounter_body(
    class: &str,
    provider: Option<&str>,
    location: Option<&str>,
    reason: Option<&str>,
    when: Option<&str>,
) -> Value {
    let mut body = json!({
        "status": "finished",
        "class": { "system": CLASS_SYSTEM, "code": class },
    });
    if let Some(when) = when {
        body["period"] = json!({ "start": when });
    }
    if let Some(provider) = provider.map(str::trim).filter(|p| !p.is_empty()) {
        body["participant"] = json!([{ "individual": { "display": provider } }]);
    }
    if let Some(location) = location.map(str::trim).filter(|l| !l.is_empty()) {
        body["location"] = json!([{ "location": { "display": location } }]);
    }
    if let Some(reason) = reason.map(str::trim).filter(|r| !r.is_empty()) {
        body["reasonCode"] = json!([{ "text": reason }]);
    }
    body
}

/// Encounter class vocabulary; unrecognized input defaults to ambulatory
fn map_class(raw: &str) -> &'static str {
    match raw.trim().to_lowercase().as_str() {
        "inpatient" | "admission" | "hospitalization" => "IMP",
        "ambulatory" | "outpatient" | "office" | "office visit" => "AMB",
        "emergency" | "ed" | "er" => "EMER",
        "virtual" | "telehealth" | "telemedicine" => "VR",
        "home" | "home health" => "HH",
        _ => "AMB",
    }
}

/// Maps a document type to an encounter class; `None` means no encounter
/// should be inferred at all
fn infer_class(document_type: &str) -> Option<&'static str> {
    let document_type = document_type.to_lowercase();
    if document_type.contains("discharge") || document_type.contains("admission") {
        return Some("IMP");
    }
    if document_type.contains("emergency") || document_type.contains("ed note") {
        return Some("EMER");
    }
    if document_type.contains("telehealth") || document_type.contains("virtual") {
        return Some("VR");
    }
    if document_type.contains("visit")
        || document_type.contains("clinic")
        || document_type.contains("progress")
        || document_type.contains("consult")
        || document_type.contains("office")
    {
        return Some("AMB");
    }
    None
}

fn first_legacy_value(bundle: &ExtractionBundle, labels: &[&str]) -> Option<String> {
    bundle
        .legacy_fields_matching(labels)
        .first()
        .map(|field| field.value.trim().to_string())
        .filter(|v| !v.is_empty())
}
