//! Standardized record output model
//!
//! One [`StandardizedRecord`] is the pipeline's unit of output: a typed
//! envelope (resource type, id, patient subject, provenance) around a
//! FHIR-style JSON body built by the owning transformer. Records are
//! constructed fresh per invocation and never persisted by this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Closed enumeration of the record types the pipeline can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Condition,
    MedicationStatement,
    Observation,
    Procedure,
    Practitioner,
    AllergyIntolerance,
    CarePlan,
    Organization,
    Encounter,
    DiagnosticReport,
    ServiceRequest,
}

impl ResourceType {
    /// Canonical resource-type name used in serialized records
    pub fn name(&self) -> &'static str {
        match self {
            Self::Condition => "Condition",
            Self::MedicationStatement => "MedicationStatement",
            Self::Observation => "Observation",
            Self::Procedure => "Procedure",
            Self::Practitioner => "Practitioner",
            Self::AllergyIntolerance => "AllergyIntolerance",
            Self::CarePlan => "CarePlan",
            Self::Organization => "Organization",
            Self::Encounter => "Encounter",
            Self::DiagnosticReport => "DiagnosticReport",
            Self::ServiceRequest => "ServiceRequest",
        }
    }

    /// All types in the pipeline's fixed dispatch order
    pub fn all() -> [ResourceType; 11] {
        [
            Self::Condition,
            Self::MedicationStatement,
            Self::Observation,
            Self::Procedure,
            Self::Practitioner,
            Self::AllergyIntolerance,
            Self::CarePlan,
            Self::Organization,
            Self::Encounter,
            Self::DiagnosticReport,
            Self::ServiceRequest,
        ]
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Reference to the patient a record belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientReference {
    /// Reference string in FHIR style, e.g. `Patient/p1`
    pub reference: String,
}

impl PatientReference {
    /// Creates a reference for the given patient id
    pub fn new(patient_id: &str) -> Self {
        Self {
            reference: format!("Patient/{patient_id}"),
        }
    }
}

/// Which input path produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    /// Typed, pre-validated per-type entity list
    Structured,
    /// Free-text label/value pairs parsed heuristically
    Legacy,
}

/// How a record's clinical date was resolved
///
/// Distinct from the record's processing timestamp: this tags where the
/// *clinical* date came from, not when the system recorded it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOrigin {
    /// Taken directly from a structured entry field
    Structured,
    /// Supplied by a manual override upstream
    ManualOverride,
    /// Resolved by the date extractor from free text
    ExtractedFromText,
    /// No date could be resolved
    Unknown,
}

/// Pipeline-level provenance stamped by the orchestrator after all
/// transformers finish
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineProvenance {
    /// Pipeline version tag
    pub version: String,

    /// Processing timestamp (metadata, never a clinical date)
    pub processed_at: DateTime<Utc>,

    /// Total records produced in the same invocation
    pub record_count: usize,
}

/// Provenance block carried by every record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    /// Input path that produced the record
    pub origin: RecordOrigin,

    /// Upstream extraction confidence, when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction_confidence: Option<f64>,

    /// Bounded excerpt of the originating source text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_excerpt: Option<String>,

    /// How the record's clinical date was resolved
    pub date_origin: DateOrigin,

    /// Shared pipeline metadata, appended by the orchestrator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineProvenance>,
}

impl Provenance {
    /// Creates a provenance block for the given origin
    pub fn new(origin: RecordOrigin) -> Self {
        Self {
            origin,
            extraction_confidence: None,
            source_excerpt: None,
            date_origin: DateOrigin::Unknown,
            pipeline: None,
        }
    }

    /// Sets the upstream extraction confidence
    pub fn with_confidence(mut self, confidence: Option<f64>) -> Self {
        self.extraction_confidence = confidence;
        self
    }

    /// Sets the bounded source excerpt
    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.source_excerpt = Some(excerpt.into());
        self
    }

    /// Sets the clinical-date origin tag
    pub fn with_date_origin(mut self, date_origin: DateOrigin) -> Self {
        self.date_origin = date_origin;
        self
    }
}

/// One standardized interoperability record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardizedRecord {
    /// Type tag
    pub resource_type: ResourceType,

    /// Stable identifier, generated at build time
    pub id: String,

    /// Subject reference to the patient
    pub subject: PatientReference,

    /// Domain fields, FHIR-style JSON built by the owning transformer
    pub body: Value,

    /// Provenance block
    pub provenance: Provenance,
}

impl StandardizedRecord {
    /// Creates a new record with a generated id
    pub fn new(
        resource_type: ResourceType,
        patient_id: &str,
        body: Value,
        provenance: Provenance,
    ) -> Self {
        Self {
            resource_type,
            id: Uuid::new_v4().to_string(),
            subject: PatientReference::new(patient_id),
            body,
            provenance,
        }
    }
}
