// Meridian - Clinical Extraction to Interoperability Records
// Copyright (c) 2026 Meridian Contributors
// Licensed under the MIT License

//! # Meridian - Clinical Extraction to Interoperability Records
//!
//! Meridian is a pure transformation library: it takes one document's worth
//! of clinical extraction output (from an upstream OCR/AI stage) and turns
//! it into standardized, FHIR-style interoperability records, keeping
//! *clinical* dates (when something happened) strictly apart from
//! *processing* metadata (when the system recorded it).
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Extracting** clinical dates from free text with per-pattern
//!   confidence scoring and plausibility validation
//! - **Transforming** structured entity lists and legacy label/value
//!   fields into eleven standardized record types
//! - **Orchestrating** all transformers over one bundle with per-unit
//!   failure isolation and shared pipeline provenance
//! - **Measuring** capture rates so operators can tell "nothing extracted"
//!   apart from "extraction succeeded but conversion under-performed"
//!
//! ## Architecture
//!
//! Meridian follows a layered architecture, leaf-first:
//!
//! - [`dates`] - Date extraction, validation, and standardization
//! - [`transform`] - One transformer per output record type
//! - [`pipeline`] - Orchestration, failure isolation, provenance stamping
//! - [`metrics`] - Capture-rate reports and before/after comparison
//! - [`domain`] - Input bundle and output record models
//! - [`config`] - Configuration loading and validation
//!
//! ## Quick Start
//!
//! ```rust
//! use meridian::domain::ExtractionBundle;
//! use meridian::pipeline::ClinicalPipeline;
//! use meridian::metrics::compute_capture;
//!
//! fn main() -> anyhow::Result<()> {
//!     let pipeline = ClinicalPipeline::with_defaults()?;
//!
//!     let bundle: ExtractionBundle = serde_json::from_str(
//!         r#"{
//!             "patient_id": "p1",
//!             "legacy_fields": [
//!                 {"label": "Diagnosis", "value": "Hypertension"},
//!                 {"label": "Medications", "value": "Metformin 500mg PO BID"}
//!             ]
//!         }"#,
//!     )?;
//!
//!     let records = pipeline.process(&bundle, None);
//!     let report = compute_capture(&bundle, &records);
//!     println!("captured {:.1}%", report.overall_rate);
//!     Ok(())
//! }
//! ```
//!
//! The core is synchronous and side-effect-free besides logging: each
//! invocation reads only its own bundle, so separate documents can be
//! processed concurrently without coordination.

pub mod config;
pub mod dates;
pub mod domain;
pub mod metrics;
pub mod pipeline;
pub mod transform;

pub use config::PipelineConfig;
pub use dates::DateExtractor;
pub use domain::{ExtractionBundle, StandardizedRecord};
pub use metrics::{compare_reports, compute_capture, CaptureReport};
pub use pipeline::ClinicalPipeline;
