//! Condition transformer
//!
//! Converts extracted diagnoses into Condition records. Supports partial
//! onset dates: a bare year resolves to January 1 of that year and a
//! year-month to the first of that month, with the precision tagged on the
//! record before full text extraction is attempted.

use super::{
    bounded_excerpt, clamp_confidence, require_patient, resolve_date, split_list_items,
    EntryOutcome, ResourceTransformer, TransformOutcome,
};
use crate::dates::{in_plausible_window, DateExtractor};
use crate::domain::{
    ConditionEntry, DateOrigin, EntityInput, ExtractionBundle, LegacyField, Provenance,
    RecordOrigin, ResourceType, SkipReason, StandardizedRecord,
};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;

pub(crate) const LEGACY_KEYWORDS: &[&str] =
    &["diagnosis", "diagnoses", "condition", "problem", "impression"];

const ICD10_SYSTEM: &str = "http://hl7.org/fhir/sid/icd-10";
const CLINICAL_STATUS_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/condition-clinical";
const VERIFICATION_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/condition-ver-status";

/// Onset date precision after partial-date handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnsetPrecision {
    Year,
    Month,
    Day,
}

impl OnsetPrecision {
    fn label(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
        }
    }
}

/// Condition transformer
pub struct ConditionTransformer {
    dates: Arc<DateExtractor>,
    context_window: usize,
    icd_code: Regex,
}

impl ConditionTransformer {
    /// Creates the transformer around a shared date extractor
    pub fn new(dates: Arc<DateExtractor>, context_window: usize) -> Result<Self> {
        let icd_code = Regex::new(r"\b([A-TV-Z][0-9]{2}(?:\.[0-9A-Z]{1,4})?)\b")
            .context("Invalid ICD-10 code pattern")?;
        Ok(Self {
            dates,
            context_window,
            icd_code,
        })
    }

    fn build_structured(&self, patient_id: &str, entry: &ConditionEntry) -> EntryOutcome {
        let Some(name) = entry.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
            return EntryOutcome::Skipped(SkipReason::MissingField("name".to_string()));
        };

        let (onset, origin, precision) = self.resolve_onset(entry);
        let body = condition_body(
            name,
            entry.icd_code.as_deref(),
            map_clinical_status(entry.status.as_deref()),
            "confirmed",
            onset.as_deref(),
            precision,
            entry.notes.as_deref().map(|n| bounded_excerpt(n, self.context_window)),
        );

        let mut provenance = Provenance::new(RecordOrigin::Structured)
            .with_confidence(clamp_confidence(entry.confidence))
            .with_date_origin(origin);
        if let Some(notes) = entry.notes.as_deref() {
            provenance = provenance.with_excerpt(bounded_excerpt(notes, self.context_window));
        }

        EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::Condition,
            patient_id,
            body,
            provenance,
        ))
    }

    fn build_legacy(&self, patient_id: &str, field: &LegacyField, item: &str) -> EntryOutcome {
        let name = strip_trailing_code(item, &self.icd_code);
        if name.is_empty() {
            return EntryOutcome::Skipped(SkipReason::UnparsableValue(item.to_string()));
        }
        let icd = self
            .icd_code
            .captures(item)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());

        let resolved = resolve_date(&self.dates, None, None, Some(item), self.context_window);
        let body = condition_body(
            &name,
            icd.as_deref(),
            "active",
            "unconfirmed",
            resolved.iso.as_deref(),
            resolved.iso.as_ref().map(|_| OnsetPrecision::Day),
            None,
        );

        let provenance = Provenance::new(RecordOrigin::Legacy)
            .with_confidence(clamp_confidence(field.confidence))
            .with_excerpt(bounded_excerpt(&field.value, self.context_window))
            .with_date_origin(resolved.origin);

        EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::Condition,
            patient_id,
            body,
            provenance,
        ))
    }

    /// Partial-date aware onset resolution, tagging the precision used
    fn resolve_onset(
        &self,
        entry: &ConditionEntry,
    ) -> (Option<String>, DateOrigin, Option<OnsetPrecision>) {
        if let Some(raw) = entry.date_override.as_deref() {
            if let Some(iso) = self.dates.standardize(raw) {
                return (Some(iso), DateOrigin::ManualOverride, Some(OnsetPrecision::Day));
            }
        }
        if let Some(raw) = entry.onset_date.as_deref() {
            if let Some((date, precision)) = parse_partial_date(raw) {
                return (
                    Some(DateExtractor::standardize_date(date)),
                    DateOrigin::Structured,
                    Some(precision),
                );
            }
            if let Some(iso) = self.dates.standardize(raw) {
                return (Some(iso), DateOrigin::Structured, Some(OnsetPrecision::Day));
            }
        }
        if let Some(notes) = entry.notes.as_deref() {
            if let Some(candidate) = self.dates.best_date(notes, self.context_window) {
                return (
                    Some(DateExtractor::standardize_date(candidate.date)),
                    DateOrigin::ExtractedFromText,
                    Some(OnsetPrecision::Day),
                );
            }
        }
        (None, DateOrigin::Unknown, None)
    }
}

impl ResourceTransformer for ConditionTransformer {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Condition
    }

    fn transform(&self, bundle: &ExtractionBundle) -> TransformOutcome {
        let mut outcome = TransformOutcome::empty();
        let Some(patient_id) = require_patient(bundle, self.resource_type()) else {
            return outcome;
        };

        let structured = bundle
            .structured
            .as_ref()
            .and_then(|s| s.conditions.as_deref());

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

fn condition_body(
    name: &str,
    icd_code: Option<&str>,
    clinical_status: &str,
    verification_status: &str,
    onset: Option<&str>,
    precision: Option<OnsetPrecision>,
    note: Option<String>,
) -> Value {
    let mut code = json!({ "text": name });
    if let Some(icd) = icd_code.map(str::trim).filter(|c| !c.is_empty()) {
        code["coding"] = json!([{ "system": ICD10_SYSTEM, "code": icd }]);
    }

    let mut body = json!({
        "code": code,
        "clinicalStatus": {
            "coding": [{ "system": CLINICAL_STATUS_SYSTEM, "code": clinical_status }]
        },
        "verificationStatus": {
            "coding": [{ "system": VERIFICATION_SYSTEM, "code": verification_status }]
        },
    });
    if let Some(onset) = onset {
        body["onsetDateTime"] = json!(onset);
        if let Some(precision) = precision {
            body["onsetPrecision"] = json!(precision.label());
        }
    }
    if let Some(note) = note {
        body["note"] = json!([{ "text": note }]);
    }
    body
}

/// Maps a free-form status to the closed clinical-status vocabulary, with
/// "active" as the explicit default for unrecognized input
fn map_clinical_status(raw: Option<&str>) -> &'static str {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("active" | "ongoing" | "current") => "active",
        Some("resolved" | "cured") => "resolved",
        Some("inactive") => "inactive",
        Some("remission" | "in remission") => "remission",
        Some("recurrence" | "recurrent" | "relapse") => "recurrence",
        _ => "active",
    }
}

/// Parses a partial onset date: bare year → January 1, year-month → the 1st
fn parse_partial_date(raw: &str) -> Option<(NaiveDate, OnsetPrecision)> {
    let trimmed = raw.trim();
    if trimmed.len() == 4 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        let year: i32 = trimmed.parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, 1, 1)?;
        return in_plausible_window(date).then_some((date, OnsetPrecision::Year));
    }
    if let Some((year_str, month_str)) = trimmed.split_once('-') {
        if year_str.len() == 4
            && (1..=2).contains(&month_str.len())
            && year_str.chars().all(|c| c.is_ascii_digit())
            && month_str.chars().all(|c| c.is_ascii_digit())
        {
            let year: i32 = year_str.parse().ok()?;
            let month: u32 = month_str.parse().ok()?;
            let date = NaiveDate::from_ymd_opt(year, month, 1)?;
            return in_plausible_window(date).then_some((date, OnsetPrecision::Month));
        }
    }
    None
}

fn strip_trailing_code(item: &str, icd_code: &Regex) -> String {
    let without_code = icd_code.replace_all(item, "");
    without_code
        .trim()
        .trim_end_matches(['(', ')', '-', ':'])
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StructuredSection;

    fn transformer() -> ConditionTransformer {
        ConditionTransformer::new(Arc::new(DateExtractor::new(true).unwrap()), 40).unwrap()
    }

    fn bundle_with_conditions(entries: Vec<ConditionEntry>) -> ExtractionBundle {
        ExtractionBundle {
            patient_id: Some("p1".to_string()),
            structured: Some(StructuredSection {
                conditions: Some(entries),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_structured_condition_record() {
        let bundle = bundle_with_conditions(vec![ConditionEntry {
            name: Some("Type 2 Diabetes Mellitus".to_string()),
            status: Some("active".to_string()),
            onset_date: Some("2020-03-15".to_string()),
            icd_code: Some("E11.9".to_string()),
            confidence: Some(0.95),
            ..Default::default()
        }]);

        let outcome = transformer().transform(&bundle);
        assert_eq!(outcome.records.len(), 1);
        let record = &outcome.records[0];
        assert_eq!(record.subject.reference, "Patient/p1");
        assert_eq!(
            record.body["clinicalStatus"]["coding"][0]["code"],
            "active"
        );
        assert_eq!(record.body["code"]["coding"][0]["code"], "E11.9");
        assert_eq!(record.body["onsetDateTime"], "2020-03-15");
        assert_eq!(record.provenance.origin, RecordOrigin::Structured);
        assert_eq!(record.provenance.date_origin, DateOrigin::Structured);
        assert_eq!(record.provenance.extraction_confidence, Some(0.95));
    }

    #[test]
    fn test_missing_name_is_skipped_not_failed() {
        let bundle = bundle_with_conditions(vec![
            ConditionEntry::default(),
            ConditionEntry {
                name: Some("Asthma".to_string()),
                ..Default::default()
            },
        ]);
        let outcome = transformer().transform(&bundle);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].reason.label(), "missing_field");
    }

    #[test]
    fn test_partial_year_onset() {
        let bundle = bundle_with_conditions(vec![ConditionEntry {
            name: Some("Hypertension".to_string()),
            onset_date: Some("2019".to_string()),
            ..Default::default()
        }]);
        let record = &transformer().transform(&bundle).records[0];
        assert_eq!(record.body["onsetDateTime"], "2019-01-01");
        assert_eq!(record.body["onsetPrecision"], "year");
    }

    #[test]
    fn test_partial_year_month_onset() {
        let bundle = bundle_with_conditions(vec![ConditionEntry {
            name: Some("Hypertension".to_string()),
            onset_date: Some("2019-07".to_string()),
            ..Default::default()
        }]);
        let record = &transformer().transform(&bundle).records[0];
        assert_eq!(record.body["onsetDateTime"], "2019-07-01");
        assert_eq!(record.body["onsetPrecision"], "month");
    }

    #[test]
    fn test_date_override_outranks_structured() {
        let bundle = bundle_with_conditions(vec![ConditionEntry {
            name: Some("Hypertension".to_string()),
            onset_date: Some("2019-07-01".to_string()),
            date_override: Some("2020-01-15".to_string()),
            ..Default::default()
        }]);
        let record = &transformer().transform(&bundle).records[0];
        assert_eq!(record.body["onsetDateTime"], "2020-01-15");
        assert_eq!(record.provenance.date_origin, DateOrigin::ManualOverride);
    }

    #[test]
    fn test_implausible_onset_becomes_absent() {
        let bundle = bundle_with_conditions(vec![ConditionEntry {
            name: Some("Hypertension".to_string()),
            onset_date: Some("1850-01-01".to_string()),
            ..Default::default()
        }]);
        let record = &transformer().transform(&bundle).records[0];
        assert!(record.body.get("onsetDateTime").is_none());
        assert_eq!(record.provenance.date_origin, DateOrigin::Unknown);
    }

    #[test]
    fn test_legacy_diagnosis_fields() {
        let bundle = ExtractionBundle {
            patient_id: Some("p1".to_string()),
            legacy_fields: Some(vec![LegacyField::new(
                "Discharge Diagnosis",
                "1. Hypertension (I10); 2. Type 2 Diabetes diagnosed 2020-03-15",
            )
            .with_confidence(0.8)]),
            ..Default::default()
        };
        let outcome = transformer().transform(&bundle);
        assert_eq!(outcome.records.len(), 2);

        let first = &outcome.records[0];
        assert_eq!(first.provenance.origin, RecordOrigin::Legacy);
        assert_eq!(first.body["code"]["coding"][0]["code"], "I10");
        assert_eq!(
            first.body["verificationStatus"]["coding"][0]["code"],
            "unconfirmed"
        );

        let second = &outcome.records[1];
        assert_eq!(second.body["onsetDateTime"], "2020-03-15");
        assert_eq!(second.provenance.date_origin, DateOrigin::ExtractedFromText);
    }

    #[test]
    fn test_structured_key_suppresses_legacy_even_when_empty() {
        let mut bundle = bundle_with_conditions(vec![]);
        bundle.legacy_fields = Some(vec![LegacyField::new("Diagnosis", "Hypertension")]);
        let outcome = transformer().transform(&bundle);
        assert!(outcome.records.is_empty());
        assert!(outcome.skipped.is_empty());
    }

    #[test]
    fn test_no_patient_id_refuses() {
        let bundle = ExtractionBundle {
            structured: Some(StructuredSection {
                conditions: Some(vec![ConditionEntry {
                    name: Some("Asthma".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(transformer().transform(&bundle).records.is_empty());
    }
}
