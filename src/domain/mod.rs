//! Domain models and types for the pipeline.
//!
//! This module contains the core domain models and business rules:
//!
//! - **Input model** ([`ExtractionBundle`], [`StructuredSection`],
//!   [`LegacyField`], [`EntityInput`])
//! - **Output model** ([`StandardizedRecord`], [`Provenance`],
//!   [`ResourceType`])
//! - **Error types** ([`PipelineError`], [`SkipReason`])
//! - **Result type alias** ([`Result`])
//!
//! # Error handling
//!
//! Only startup/configuration defects are represented as errors. Malformed
//! documents and entries are recovered locally and surfaced through
//! [`SkipReason`], never as exceptions:
//!
//! ```rust
//! use meridian::domain::{PipelineError, Result};
//!
//! fn example() -> Result<()> {
//!     Err(PipelineError::Validation("missing transformer".to_string()))
//! }
//! ```

pub mod bundle;
pub mod errors;
pub mod record;
pub mod result;

// Re-export commonly used types for convenience
pub use bundle::{
    AllergyEntry, CarePlanEntry, ConditionEntry, EncounterEntry, EntityInput, ExtractionBundle,
    LabResultEntry, LegacyField, MedicationEntry, OrganizationEntry, ProcedureEntry,
    ProviderEntry, StructuredSection, VitalEntry,
};
pub use errors::{PipelineError, SkipReason, SkippedEntry};
pub use record::{
    DateOrigin, PatientReference, PipelineProvenance, Provenance, RecordOrigin, ResourceType,
    StandardizedRecord,
};
pub use result::Result;
