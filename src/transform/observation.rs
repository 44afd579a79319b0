//! Observation transformer
//!
//! Handles two structured sub-types: point-in-time vital measurements and
//! lab results with reference ranges. Values are coerced to numbers where
//! possible, falling back to a text value. Common vital names map to a
//! fixed code table; everything else keeps its free-text name.

use super::{
    bounded_excerpt, clamp_confidence, require_patient, resolve_date, split_list_items,
    EntryOutcome, ResourceTransformer, TransformOutcome,
};
use crate::dates::DateExtractor;
use crate::domain::{
    EntityInput, ExtractionBundle, LabResultEntry, LegacyField, Provenance, RecordOrigin,
    ResourceType, SkipReason, StandardizedRecord, VitalEntry,
};
use anyhow::{Context, Result};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;

pub(crate) const VITAL_KEYWORDS: &[&str] = &["vital", "blood pressure", "pulse", "temperature"];
pub(crate) const LAB_KEYWORDS: &[&str] = &["lab", "laboratory"];

const LOINC_SYSTEM: &str = "http://loinc.org";

/// Fixed code table for common vital measurements
const VITAL_CODES: &[(&str, &str, &str)] = &[
    ("blood pressure", "85354-9", "Blood pressure panel"),
    ("bp", "85354-9", "Blood pressure panel"),
    ("heart rate", "8867-4", "Heart rate"),
    ("pulse", "8867-4", "Heart rate"),
    ("temperature", "8310-5", "Body temperature"),
    ("respiratory rate", "9279-1", "Respiratory rate"),
    ("oxygen saturation", "59408-5", "Oxygen saturation"),
    ("spo2", "59408-5", "Oxygen saturation"),
    ("height", "8302-2", "Body height"),
    ("weight", "29463-7", "Body weight"),
    ("bmi", "39156-5", "Body mass index"),
];

/// Observation transformer (vitals + labs)
pub struct ObservationTransformer {
    dates: Arc<DateExtractor>,
    context_window: usize,
    legacy_measurement: Regex,
}

impl ObservationTransformer {
    /// Creates the transformer around a shared date extractor
    pub fn new(dates: Arc<DateExtractor>, context_window: usize) -> Result<Self> {
        // name, numeric-ish value (allowing 120/80), optional unit
        let legacy_measurement =
            Regex::new(r"(?i)^([a-z][a-z0-9 %]*?)[:\s]+(\d+(?:\.\d+)?(?:/\d+(?:\.\d+)?)?)\s*([a-z%/°][a-z%/°\w]*)?$")
                .context("Invalid legacy measurement pattern")?;
        Ok(Self {
            dates,
            context_window,
            legacy_measurement,
        })
    }

    fn build_vital(&self, patient_id: &str, entry: &VitalEntry) -> EntryOutcome {
        let Some(name) = entry.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
            return EntryOutcome::Skipped(SkipReason::MissingField("name".to_string()));
        };

        let resolved = resolve_date(
            &self.dates,
            entry.date_override.as_deref(),
            entry.measured_at.as_deref(),
            None,
            self.context_window,
        );

        let body = observation_body(
            name,
            "vital-signs",
            entry.value.as_ref(),
            entry.unit.as_deref(),
            None,
            "final",
            resolved.iso.as_deref(),
        );

        let provenance = Provenance::new(RecordOrigin::Structured)
            .with_confidence(clamp_confidence(entry.confidence))
            .with_date_origin(resolved.origin);

        EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::Observation,
            patient_id,
            body,
            provenance,
        ))
    }

    fn build_lab(&self, patient_id: &str, entry: &LabResultEntry) -> EntryOutcome {
        let Some(name) = entry
            .test_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
        else {
            return EntryOutcome::Skipped(SkipReason::MissingField("test_name".to_string()));
        };

        let resolved = resolve_date(
            &self.dates,
            entry.date_override.as_deref(),
            entry.collected_date.as_deref(),
            None,
            self.context_window,
        );

        let body = observation_body(
            name,
            "laboratory",
            entry.value.as_ref(),
            entry.unit.as_deref(),
            entry.reference_range.as_deref(),
            map_status(entry.status.as_deref()),
            resolved.iso.as_deref(),
        );

        let provenance = Provenance::new(RecordOrigin::Structured)
            .with_confidence(clamp_confidence(entry.confidence))
            .with_date_origin(resolved.origin);

        EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::Observation,
            patient_id,
            body,
            provenance,
        ))
    }

    fn build_legacy(&self, patient_id: &str, field: &LegacyField, item: &str) -> EntryOutcome {
        let Some(caps) = self.legacy_measurement.captures(item.trim()) else {
            return EntryOutcome::Skipped(SkipReason::UnparsableValue(item.to_string()));
        };
        let name = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        let value = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
        let unit = caps.get(3).map(|m| m.as_str());
        if name.is_empty() {
            return EntryOutcome::Skipped(SkipReason::UnparsableValue(item.to_string()));
        }

        let category = if field.label_matches(LAB_KEYWORDS) {
            "laboratory"
        } else {
            "vital-signs"
        };

        let body = observation_body(
            name,
            category,
            Some(&Value::String(value.to_string())),
            unit,
            None,
            "final",
            None,
        );

        let provenance = Provenance::new(RecordOrigin::Legacy)
            .with_confidence(clamp_confidence(field.confidence))
            .with_excerpt(bounded_excerpt(&field.value, self.context_window));

        EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::Observation,
            patient_id,
            body,
            provenance,
        ))
    }
}

impl ResourceTransformer for ObservationTransformer {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Observation
    }

    fn transform(&self, bundle: &ExtractionBundle) -> TransformOutcome {
        let mut outcome = TransformOutcome::empty();
        let Some(patient_id) = require_patient(bundle, self.resource_type()) else {
            return outcome;
        };

        let vitals = bundle.structured.as_ref().and_then(|s| s.vitals.as_deref());
        let labs = bundle
            .structured
            .as_ref()
            .and_then(|s| s.lab_results.as_deref());

        // The two sub-types resolve their input paths independently
        match EntityInput::resolve(vitals, bundle, VITAL_KEYWORDS) {
            EntityInput::Structured(entries) => {
                for (index, entry) in entries.iter().enumerate() {
                    let built = self.build_vital(patient_id, entry);
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

        match EntityInput::resolve(labs, bundle, LAB_KEYWORDS) {
            EntityInput::Structured(entries) => {
                for (index, entry) in entries.iter().enumerate() {
                    let built = self.build_lab(patient_id, entry);
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

fn observation_body(
    name: &str,
    category: &str,
    value: Option<&Value>,
    unit: Option<&str>,
    reference_range: Option<&str>,
    status: &str,
    effective: Option<&str>,
) -> Value {
    let mut code = json!({ "text": name });
    if let Some((loinc, display)) = map_vital_code(name) {
        code["coding"] = json!([{ "system": LOINC_SYSTEM, "code": loinc, "display": display }]);
    }

    let mut body = json!({
        "status": status,
        "category": [{ "coding": [{ "code": category }] }],
        "code": code,
    });

    match value.and_then(coerce_numeric) {
        Some(number) => {
            let mut quantity = json!({ "value": number });
            if let Some(unit) = unit.map(str::trim).filter(|u| !u.is_empty()) {
                quantity["unit"] = json!(unit);
            }
            body["valueQuantity"] = quantity;
        }
        None => {
            if let Some(text) = value.and_then(value_as_text) {
                body["valueString"] = json!(text);
            }
        }
    }

    if let Some(range) = reference_range.map(str::trim).filter(|r| !r.is_empty()) {
        body["referenceRange"] = json!([{ "text": range }]);
    }
    if let Some(effective) = effective {
        body["effectiveDateTime"] = json!(effective);
    }
    body
}

/// Coerces a JSON value to a number: native numbers pass through, strings
/// parse their leading float. Slash values like "120/80" stay textual.
fn coerce_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.contains('/') {
                return None;
            }
            let numeric: String = trimmed
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            numeric.parse().ok()
        }
        _ => None,
    }
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Maps a measurement name to the fixed vital code table
fn map_vital_code(name: &str) -> Option<(&'static str, &'static str)> {
    let name = name.to_lowercase();
    VITAL_CODES
        .iter()
        .find(|(key, _, _)| name.contains(key))
        .map(|(_, code, display)| (*code, *display))
}

/// Lab status vocabulary; unrecognized input defaults to "final"
fn map_status(raw: Option<&str>) -> &'static str {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("preliminary" | "pending") => "preliminary",
        Some("final" | "completed" | "resulted") => "final",
        Some("amended" | "corrected") => "amended",
        Some("cancelled" | "canceled") => "cancelled",
        _ => "final",
    }
}
