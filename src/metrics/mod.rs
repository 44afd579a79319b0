//! Capture metrics
//!
//! Measures how much of an extraction bundle survived transformation:
//! per-category extracted/captured counts and rates, an overall rate,
//! quality flags, and a weighted completeness score over the categories
//! that matter most clinically. A second report can be diffed against a
//! first to classify per-category movement.

use crate::domain::{ExtractionBundle, ResourceType, StandardizedRecord};
use crate::transform;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::info;

/// Rate at or above which a category counts as high capture
pub const HIGH_CAPTURE_THRESHOLD: f64 = 90.0;

/// Rate below which a category needs improvement
pub const NEEDS_IMPROVEMENT_THRESHOLD: f64 = 50.0;

/// Minimum percentage-point movement classified as improved/declined
pub const COMPARISON_DELTA_POINTS: f64 = 5.0;

/// Categories and weights for the completeness score
const COMPLETENESS_WEIGHTS: &[(&str, f64)] = &[
    ("conditions", 0.30),
    ("medications", 0.25),
    ("observations", 0.20),
    ("allergies", 0.15),
    ("procedures", 0.10),
];

/// Fixed category → resource type map covering every bundle category,
/// including the legacy-only output types
const CATEGORY_TYPES: &[(&str, ResourceType)] = &[
    ("conditions", ResourceType::Condition),
    ("medications", ResourceType::MedicationStatement),
    ("observations", ResourceType::Observation),
    ("procedures", ResourceType::Procedure),
    ("providers", ResourceType::Practitioner),
    ("allergies", ResourceType::AllergyIntolerance),
    ("care_plans", ResourceType::CarePlan),
    ("organizations", ResourceType::Organization),
    ("encounter", ResourceType::Encounter),
    ("diagnostic_reports", ResourceType::DiagnosticReport),
    ("service_requests", ResourceType::ServiceRequest),
];

/// Per-category capture detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCapture {
    /// Category key (e.g. "medications")
    pub category: String,

    /// Items the upstream extraction found for this category
    pub extracted: usize,

    /// Records of the mapped type actually produced
    pub captured: usize,

    /// Capture rate as a percentage in [0, 100]
    pub rate: f64,
}

/// Capture report for one pipeline invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureReport {
    /// Per-category detail, in the fixed category order
    pub categories: Vec<CategoryCapture>,

    /// Total extracted items across categories
    pub total_extracted: usize,

    /// Total captured records across categories
    pub total_captured: usize,

    /// Overall rate: sum captured over sum extracted, as a percentage
    pub overall_rate: f64,

    /// Categories at or above the high-capture threshold
    pub high_capture: Vec<String>,

    /// Categories below the needs-improvement threshold
    pub needs_improvement: Vec<String>,

    /// Categories with extracted items but zero captured records
    pub missing_expected: Vec<String>,

    /// Distinct resource types present in the output
    pub resource_type_diversity: usize,

    /// Weighted completeness over the important categories, in [0, 100]
    pub completeness_score: f64,
}

/// Movement of one category between two reports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureTrend {
    Improved,
    Declined,
    #[default]
    Unchanged,
}

/// Per-category delta between two reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDelta {
    pub category: String,
    pub before_rate: f64,
    pub after_rate: f64,
    pub delta: f64,
    pub trend: CaptureTrend,
}

/// Before/after comparison of two capture reports
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CaptureComparison {
    pub deltas: Vec<CategoryDelta>,
    pub overall_delta: f64,
    pub overall_trend: CaptureTrend,
}

/// Computes the capture report for one bundle and its produced records
pub fn compute_capture(bundle: &ExtractionBundle, records: &[StandardizedRecord]) -> CaptureReport {
    let mut captured_by_type: HashMap<ResourceType, usize> = HashMap::new();
    for record in records {
        *captured_by_type.entry(record.resource_type).or_insert(0) += 1;
    }

    let mut report = CaptureReport::default();
    for (category, resource_type) in CATEGORY_TYPES {
        let extracted = extracted_count(bundle, category);
        let captured = captured_by_type.get(resource_type).copied().unwrap_or(0);

        report.total_extracted += extracted;
        report.total_captured += captured;

        let rate = percentage(captured, extracted);
        if extracted > 0 {
            if rate >= HIGH_CAPTURE_THRESHOLD {
                report.high_capture.push((*category).to_string());
            }
            if rate < NEEDS_IMPROVEMENT_THRESHOLD {
                report.needs_improvement.push((*category).to_string());
            }
            if captured == 0 {
                report.missing_expected.push((*category).to_string());
            }
        }

        report.categories.push(CategoryCapture {
            category: (*category).to_string(),
            extracted,
            captured,
            rate,
        });
    }

    report.overall_rate = percentage(report.total_captured, report.total_extracted);
    report.resource_type_diversity = captured_by_type.len();
    report.completeness_score = completeness(&report);

    info!(
        overall_rate = report.overall_rate,
        extracted = report.total_extracted,
        captured = report.total_captured,
        diversity = report.resource_type_diversity,
        "Capture report computed"
    );
    report
}

/// Compares two reports category by category
pub fn compare_reports(before: &CaptureReport, after: &CaptureReport) -> CaptureComparison {
    let before_rates: HashMap<&str, f64> = before
        .categories
        .iter()
        .map(|c| (c.category.as_str(), c.rate))
        .collect();

    let mut comparison = CaptureComparison::default();
    for category in &after.categories {
        let before_rate = before_rates
            .get(category.category.as_str())
            .copied()
            .unwrap_or(0.0);
        let delta = category.rate - before_rate;
        comparison.deltas.push(CategoryDelta {
            category: category.category.clone(),
            before_rate,
            after_rate: category.rate,
            delta,
            trend: classify(delta),
        });
    }

    comparison.overall_delta = after.overall_rate - before.overall_rate;
    comparison.overall_trend = classify(comparison.overall_delta);
    comparison
}

fn classify(delta: f64) -> CaptureTrend {
    if delta >= COMPARISON_DELTA_POINTS {
        CaptureTrend::Improved
    } else if delta <= -COMPARISON_DELTA_POINTS {
        CaptureTrend::Declined
    } else {
        CaptureTrend::Unchanged
    }
}

fn percentage(captured: usize, extracted: usize) -> f64 {
    if extracted == 0 {
        return 0.0;
    }
    (captured as f64 / extracted as f64) * 100.0
}

/// Weighted completeness over the important categories. Categories with
/// nothing extracted contribute their full weight (nothing was lost).
fn completeness(report: &CaptureReport) -> f64 {
    let rates: HashMap<&str, (usize, f64)> = report
        .categories
        .iter()
        .map(|c| (c.category.as_str(), (c.extracted, c.rate)))
        .collect();

    let mut score = 0.0;
    for (category, weight) in COMPLETENESS_WEIGHTS {
        let (extracted, rate) = rates.get(category).copied().unwrap_or((0, 0.0));
        let contribution = if extracted == 0 { 100.0 } else { rate };
        score += weight * contribution;
    }
    score
}

/// Counts extracted items for one bundle category: list length for lists,
/// 1 for a non-empty single entry, 0 otherwise. Legacy fallbacks count
/// fields through the same keyword sets the transformers dispatch on, so
/// a category can never capture records out of fields it reports as
/// unextracted.
fn extracted_count(bundle: &ExtractionBundle, category: &str) -> usize {
    let structured = bundle.structured.as_ref();
    match category {
        "conditions" => match structured.and_then(|s| s.conditions.as_ref()) {
            Some(list) => list.len(),
            None => legacy_count(bundle, transform::condition::LEGACY_KEYWORDS),
        },
        "medications" => match structured.and_then(|s| s.medications.as_ref()) {
            Some(list) => list.len(),
            None => legacy_count(bundle, transform::medication::LEGACY_KEYWORDS),
        },
        "observations" => {
            // Vitals and labs resolve their paths independently, like the
            // transformer does
            let vitals = match structured.and_then(|s| s.vitals.as_ref()) {
                Some(list) => list.len(),
                None => legacy_count(bundle, transform::observation::VITAL_KEYWORDS),
            };
            let labs = match structured.and_then(|s| s.lab_results.as_ref()) {
                Some(list) => list.len(),
                None => legacy_count(bundle, transform::observation::LAB_KEYWORDS),
            };
            vitals + labs
        }
        "procedures" => match structured.and_then(|s| s.procedures.as_ref()) {
            Some(list) => list.len(),
            None => legacy_count(bundle, transform::procedure::LEGACY_KEYWORDS),
        },
        "providers" => match structured.and_then(|s| s.providers.as_ref()) {
            Some(list) => list.len(),
            None => legacy_count(bundle, transform::practitioner::LEGACY_KEYWORDS),
        },
        "allergies" => match structured.and_then(|s| s.allergies.as_ref()) {
            Some(list) => list.len(),
            None => legacy_count(bundle, transform::allergy::LEGACY_KEYWORDS),
        },
        "care_plans" => match structured.and_then(|s| s.care_plans.as_ref()) {
            Some(list) => list.len(),
            None => legacy_count(bundle, transform::care_plan::LEGACY_KEYWORDS),
        },
        "organizations" => match structured.and_then(|s| s.organizations.as_ref()) {
            Some(list) => list.len(),
            None => legacy_count(bundle, transform::organization::LEGACY_KEYWORDS),
        },
        "encounter" => match structured.and_then(|s| s.encounter.as_ref()) {
            Some(_) => 1,
            None => usize::from(
                bundle
                    .document_type
                    .as_deref()
                    .is_some_and(|d| !d.trim().is_empty()),
            ),
        },
        "diagnostic_reports" => legacy_count(bundle, transform::diagnostic_report::REPORT_LABELS),
        "service_requests" => legacy_count(bundle, transform::service_request::REQUEST_LABELS),
        _ => 0,
    }
}

fn legacy_count(bundle: &ExtractionBundle, keywords: &[&str]) -> usize {
    bundle.legacy_fields_matching(keywords).len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        MedicationEntry, Provenance, RecordOrigin, StructuredSection,
    };
    use serde_json::json;

    fn record(resource_type: ResourceType) -> StandardizedRecord {
        StandardizedRecord::new(
            resource_type,
            "p1",
            json!({}),
            Provenance::new(RecordOrigin::Structured),
        )
    }

    fn medications_bundle(count: usize) -> ExtractionBundle {
        ExtractionBundle {
            patient_id: Some("p1".to_string()),
            structured: Some(StructuredSection {
                medications: Some(
                    (0..count)
                        .map(|i| MedicationEntry {
                            name: Some(format!("Drug {i}")),
                            ..Default::default()
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_partial_medication_capture_rate() {
        let bundle = medications_bundle(3);
        let records = vec![record(ResourceType::MedicationStatement)];
        let report = compute_capture(&bundle, &records);

        let meds = report
            .categories
            .iter()
            .find(|c| c.category == "medications")
            .unwrap();
        assert_eq!(meds.extracted, 3);
        assert_eq!(meds.captured, 1);
        assert!((meds.rate - 33.333).abs() < 0.01);
        assert!(report.needs_improvement.contains(&"medications".to_string()));
        assert!((report.overall_rate - 33.333).abs() < 0.01);
    }

    #[test]
    fn test_additivity() {
        let mut bundle = medications_bundle(2);
        bundle.legacy_fields = Some(vec![
            crate::domain::LegacyField::new("Allergies", "Penicillin"),
            crate::domain::LegacyField::new("Orders", "CBC"),
        ]);
        let records = vec![
            record(ResourceType::MedicationStatement),
            record(ResourceType::AllergyIntolerance),
            record(ResourceType::ServiceRequest),
        ];
        let report = compute_capture(&bundle, &records);

        let extracted_sum: usize = report.categories.iter().map(|c| c.extracted).sum();
        let captured_sum: usize = report.categories.iter().map(|c| c.captured).sum();
        assert_eq!(extracted_sum, report.total_extracted);
        assert_eq!(captured_sum, report.total_captured);
    }

    #[test]
    fn test_flags_and_diversity() {
        let bundle = medications_bundle(1);
        let records = vec![
            record(ResourceType::MedicationStatement),
            record(ResourceType::Condition),
        ];
        let report = compute_capture(&bundle, &records);

        assert!(report.high_capture.contains(&"medications".to_string()));
        assert!(report.missing_expected.is_empty());
        assert_eq!(report.resource_type_diversity, 2);
    }

    #[test]
    fn test_missing_expected_category() {
        let bundle = medications_bundle(2);
        let report = compute_capture(&bundle, &[]);
        assert!(report.missing_expected.contains(&"medications".to_string()));
        assert_eq!(report.overall_rate, 0.0);
    }

    #[test]
    fn test_completeness_untouched_categories_count_full() {
        // Nothing extracted at all: nothing was lost
        let report = compute_capture(&ExtractionBundle::for_patient("p1"), &[]);
        assert!((report.completeness_score - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_compare_reports_classification() {
        let bundle = medications_bundle(3);
        let before = compute_capture(&bundle, &[record(ResourceType::MedicationStatement)]);
        let after = compute_capture(
            &bundle,
            &[
                record(ResourceType::MedicationStatement),
                record(ResourceType::MedicationStatement),
                record(ResourceType::MedicationStatement),
            ],
        );

        let comparison = compare_reports(&before, &after);
        let meds = comparison
            .deltas
            .iter()
            .find(|d| d.category == "medications")
            .unwrap();
        assert_eq!(meds.trend, CaptureTrend::Improved);
        assert!((meds.delta - 66.666).abs() < 0.01);
        assert_eq!(comparison.overall_trend, CaptureTrend::Improved);

        let flat = compare_reports(&after, &after);
        assert_eq!(flat.overall_trend, CaptureTrend::Unchanged);
        assert!(flat.deltas.iter().all(|d| d.trend == CaptureTrend::Unchanged));
    }

    #[test]
    fn test_empty_extraction_rate_is_zero_not_nan() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(1, 0), 0.0);
    }

    #[test]
    fn test_default_trend_is_unchanged() {
        assert_eq!(CaptureTrend::default(), CaptureTrend::Unchanged);
        assert_eq!(
            CaptureComparison::default().overall_trend,
            CaptureTrend::Unchanged
        );
    }

    #[test]
    fn test_legacy_counts_match_transformer_keywords() {
        // Labels the transformers convert must also count as extracted
        let bundle = ExtractionBundle {
            patient_id: Some("p1".to_string()),
            legacy_fields: Some(vec![
                crate::domain::LegacyField::new("Impression", "Community-acquired pneumonia"),
                crate::domain::LegacyField::new("Follow-up", "Repeat labs in 2 weeks"),
                crate::domain::LegacyField::new("PCP", "Dr. James Wu"),
                crate::domain::LegacyField::new("Blood Pressure", "BP 120/80"),
            ]),
            ..Default::default()
        };

        let report = compute_capture(&bundle, &[]);
        let extracted: HashMap<&str, usize> = report
            .categories
            .iter()
            .map(|c| (c.category.as_str(), c.extracted))
            .collect();
        assert_eq!(extracted["conditions"], 1);
        assert_eq!(extracted["care_plans"], 1);
        assert_eq!(extracted["providers"], 1);
        assert_eq!(extracted["observations"], 1);
    }
}
