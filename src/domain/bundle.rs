//! Extraction bundle input model
//!
//! The bundle is the pipeline's sole input: one document's worth of clinical
//! facts as produced by the upstream OCR/AI extraction stage. It arrives in
//! two shapes that are never merged for the same entity type:
//!
//! - **Structured section**: typed, pre-validated per-type entity lists.
//! - **Legacy fields**: free-text label/value pairs requiring heuristic
//!   parsing, consulted only when the structured key for a type is absent.
//!
//! Presence of a structured key (even as an empty list) suppresses the
//! legacy path for that type. That asymmetry is deliberate: an upstream
//! that emitted `"conditions": []` affirmatively found nothing, which is
//! different from not having looked.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One free-text label/value pair from the legacy extraction format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyField {
    /// Field label as extracted from the document (e.g. "Diagnosis")
    pub label: String,

    /// Raw field value
    pub value: String,

    /// Upstream extraction confidence, when reported
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl LegacyField {
    /// Creates a new legacy field
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
            confidence: None,
        }
    }

    /// Sets the extraction confidence
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    /// Whether this field's label matches any of the given keywords
    /// (case-insensitive substring match)
    pub fn label_matches(&self, keywords: &[&str]) -> bool {
        let label = self.label.to_lowercase();
        keywords.iter().any(|kw| label.contains(kw))
    }
}

/// Structured condition entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionEntry {
    pub name: Option<String>,
    pub status: Option<String>,
    pub onset_date: Option<String>,
    pub date_override: Option<String>,
    pub icd_code: Option<String>,
    pub confidence: Option<f64>,
    pub notes: Option<String>,
}

/// Structured medication entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MedicationEntry {
    pub name: Option<String>,
    pub dosage: Option<String>,
    pub route: Option<String>,
    pub frequency: Option<String>,
    pub status: Option<String>,
    pub start_date: Option<String>,
    pub date_override: Option<String>,
    pub confidence: Option<f64>,
    pub instructions: Option<String>,
}

/// Structured point-in-time vital measurement
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalEntry {
    pub name: Option<String>,
    pub value: Option<Value>,
    pub unit: Option<String>,
    pub measured_at: Option<String>,
    pub date_override: Option<String>,
    pub confidence: Option<f64>,
}

/// Structured lab result with optional reference range
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LabResultEntry {
    pub test_name: Option<String>,
    pub value: Option<Value>,
    pub unit: Option<String>,
    pub reference_range: Option<String>,
    pub status: Option<String>,
    pub collected_date: Option<String>,
    pub date_override: Option<String>,
    pub confidence: Option<f64>,
}

/// Structured procedure entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcedureEntry {
    pub name: Option<String>,
    pub status: Option<String>,
    pub performed_date: Option<String>,
    pub date_override: Option<String>,
    pub cpt_code: Option<String>,
    pub provider: Option<String>,
    pub confidence: Option<f64>,
    pub notes: Option<String>,
}

/// Structured practitioner/provider entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderEntry {
    pub name: Option<String>,
    pub specialty: Option<String>,
    pub npi: Option<String>,
    pub organization: Option<String>,
    pub confidence: Option<f64>,
}

/// Structured allergy entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AllergyEntry {
    pub allergen: Option<String>,
    pub reaction: Option<String>,
    pub severity: Option<String>,
    pub status: Option<String>,
    pub confidence: Option<f64>,
}

/// Structured care plan entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CarePlanEntry {
    pub description: Option<String>,
    pub status: Option<String>,
    pub intent: Option<String>,
    pub start_date: Option<String>,
    pub date_override: Option<String>,
    pub confidence: Option<f64>,
}

/// Structured organization entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OrganizationEntry {
    pub name: Option<String>,
    pub org_type: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub confidence: Option<f64>,
}

/// Structured encounter entry (singular per bundle)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EncounterEntry {
    pub encounter_class: Option<String>,
    pub date: Option<String>,
    pub date_override: Option<String>,
    pub provider: Option<String>,
    pub location: Option<String>,
    pub reason: Option<String>,
    pub confidence: Option<f64>,
}

/// Typed per-entity-type section of the bundle
///
/// Every field is `Option` so that "key present with an empty list" and
/// "key absent" remain distinguishable after deserialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StructuredSection {
    pub conditions: Option<Vec<ConditionEntry>>,
    pub medications: Option<Vec<MedicationEntry>>,
    pub vitals: Option<Vec<VitalEntry>>,
    pub lab_results: Option<Vec<LabResultEntry>>,
    pub procedures: Option<Vec<ProcedureEntry>>,
    pub providers: Option<Vec<ProviderEntry>>,
    pub allergies: Option<Vec<AllergyEntry>>,
    pub care_plans: Option<Vec<CarePlanEntry>>,
    pub organizations: Option<Vec<OrganizationEntry>>,
    pub encounter: Option<EncounterEntry>,
}

/// Extraction bundle: the pipeline's sole input
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionBundle {
    /// Patient identifier; absence causes every transformer to refuse
    pub patient_id: Option<String>,

    /// Source document type, when known (e.g. "discharge summary")
    pub document_type: Option<String>,

    /// Typed per-entity-type section
    pub structured: Option<StructuredSection>,

    /// Free-text label/value pairs from the legacy extraction format
    pub legacy_fields: Option<Vec<LegacyField>>,
}

impl ExtractionBundle {
    /// Creates an empty bundle for the given patient
    pub fn for_patient(patient_id: impl Into<String>) -> Self {
        Self {
            patient_id: Some(patient_id.into()),
            ..Self::default()
        }
    }

    /// Returns the patient id, if present and non-empty
    pub fn patient_id(&self) -> Option<&str> {
        self.patient_id.as_deref().filter(|id| !id.trim().is_empty())
    }

    /// Returns a copy with the patient id replaced
    pub fn with_patient_id(&self, patient_id: impl Into<String>) -> Self {
        let mut bundle = self.clone();
        bundle.patient_id = Some(patient_id.into());
        bundle
    }

    /// All legacy fields, or an empty slice when the section is absent
    pub fn legacy_fields(&self) -> &[LegacyField] {
        self.legacy_fields.as_deref().unwrap_or(&[])
    }

    /// Legacy fields whose label matches any of the given keywords
    pub fn legacy_fields_matching(&self, keywords: &[&str]) -> Vec<&LegacyField> {
        self.legacy_fields()
            .iter()
            .filter(|f| f.label_matches(keywords))
            .collect()
    }
}

/// Input resolved for one entity type
///
/// The structured-vs-legacy presence check happens exactly once, here, so
/// transformers never re-inspect the bundle shape. `Structured` wins over
/// legacy fields whenever its key is present, even as an empty list.
#[derive(Debug)]
pub enum EntityInput<'a, T> {
    /// The structured key was present; entries may be empty
    Structured(&'a [T]),
    /// No structured key; matching legacy fields (possibly empty)
    Legacy(Vec<&'a LegacyField>),
    /// Neither input shape carries anything for this type
    Absent,
}

impl<'a, T> EntityInput<'a, T> {
    /// Resolves which input path applies for one entity type
    pub fn resolve(
        structured: Option<&'a [T]>,
        bundle: &'a ExtractionBundle,
        keywords: &[&str],
    ) -> Self {
        if let Some(entries) = structured {
            return EntityInput::Structured(entries);
        }
        let fields = bundle.legacy_fields_matching(keywords);
        if fields.is_empty() {
            EntityInput::Absent
        } else {
            EntityInput::Legacy(fields)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patient_id_blank_is_absent() {
        let bundle = ExtractionBundle {
            patient_id: Some("   ".to_string()),
            ..Default::default()
        };
        assert!(bundle.patient_id().is_none());
    }

    #[test]
    fn test_with_patient_id_override() {
        let bundle = ExtractionBundle::for_patient("p1");
        let replaced = bundle.with_patient_id("p2");
        assert_eq!(replaced.patient_id(), Some("p2"));
        assert_eq!(bundle.patient_id(), Some("p1"));
    }

    #[test]
    fn test_label_matches_case_insensitive() {
        let field = LegacyField::new("Primary Diagnosis", "Hypertension");
        assert!(field.label_matches(&["diagnosis"]));
        assert!(!field.label_matches(&["medication"]));
    }

    #[test]
    fn test_entity_input_structured_wins_even_empty() {
        let bundle = ExtractionBundle {
            patient_id: Some("p1".to_string()),
            legacy_fields: Some(vec![LegacyField::new("Diagnosis", "Asthma")]),
            ..Default::default()
        };
        let empty: Vec<ConditionEntry> = vec![];
        let input = EntityInput::resolve(Some(empty.as_slice()), &bundle, &["diagnosis"]);
        assert!(matches!(input, EntityInput::Structured(entries) if entries.is_empty()));
    }

    #[test]
    fn test_entity_input_falls_back_to_legacy() {
        let bundle = ExtractionBundle {
            patient_id: Some("p1".to_string()),
            legacy_fields: Some(vec![
                LegacyField::new("Diagnosis", "Asthma"),
                LegacyField::new("Medication", "Albuterol"),
            ]),
            ..Default::default()
        };
        let input: EntityInput<'_, ConditionEntry> =
            EntityInput::resolve(None, &bundle, &["diagnosis"]);
        match input {
            EntityInput::Legacy(fields) => {
                assert_eq!(fields.len(), 1);
                assert_eq!(fields[0].value, "Asthma");
            }
            _ => panic!("expected legacy input"),
        }
    }

    #[test]
    fn test_entity_input_absent() {
        let bundle = ExtractionBundle::for_patient("p1");
        let input: EntityInput<'_, ConditionEntry> =
            EntityInput::resolve(None, &bundle, &["diagnosis"]);
        assert!(matches!(input, EntityInput::Absent));
    }

    #[test]
    fn test_bundle_deserializes_from_json() {
        let bundle: ExtractionBundle = serde_json::from_value(json!({
            "patient_id": "p1",
            "structured": {
                "conditions": [
                    {"name": "Type 2 Diabetes Mellitus", "status": "active",
                     "onset_date": "2020-03-15", "icd_code": "E11.9", "confidence": 0.95}
                ],
                "vitals": []
            },
            "legacy_fields": [
                {"label": "Allergies", "value": "NKDA", "confidence": 0.8}
            ]
        }))
        .unwrap();

        let structured = bundle.structured.as_ref().unwrap();
        assert_eq!(structured.conditions.as_ref().unwrap().len(), 1);
        // Present-but-empty stays distinguishable from absent
        assert!(structured.vitals.as_ref().unwrap().is_empty());
        assert!(structured.medications.is_none());
        assert_eq!(bundle.legacy_fields().len(), 1);
    }
}
