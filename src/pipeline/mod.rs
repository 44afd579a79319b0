//! Pipeline orchestration
//!
//! [`ClinicalPipeline`] owns one transformer per resource type and runs them
//! in a fixed order over each extraction bundle. Transformers are isolated:
//! a panic inside one is caught, logged, and reduced to an empty outcome for
//! that type, so one faulty unit can never take down the invocation. After
//! all units finish, every record is stamped with shared pipeline
//! provenance (version, processing timestamp, total record count).

use crate::config::PipelineConfig;
use crate::dates::DateExtractor;
use crate::domain::{
    ExtractionBundle, PipelineProvenance, ResourceType, SkippedEntry, StandardizedRecord,
};
use crate::transform::{
    AllergyTransformer, CarePlanTransformer, ConditionTransformer, DiagnosticReportTransformer,
    EncounterTransformer, MedicationTransformer, ObservationTransformer, OrganizationTransformer,
    PractitionerTransformer, ProcedureTransformer, ResourceTransformer, ServiceRequestTransformer,
    TransformOutcome,
};
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Full result of one pipeline invocation
#[derive(Debug, Default)]
pub struct PipelineOutcome {
    /// Records from all transformers, stamped with pipeline provenance
    pub records: Vec<StandardizedRecord>,

    /// Entries skipped by any transformer, with reasons
    pub skipped: Vec<SkippedEntry>,

    /// Types whose transformer panicked and was isolated
    pub failed_types: Vec<ResourceType>,
}

/// Orchestrator over the fixed set of resource transformers
pub struct ClinicalPipeline {
    transformers: Vec<Box<dyn ResourceTransformer>>,
    version: String,
}

impl ClinicalPipeline {
    /// Builds the pipeline from configuration
    ///
    /// Compiles every transformer's patterns up front; a bad pattern fails
    /// construction rather than a later invocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or any pattern
    /// fails to compile.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let dates = Arc::new(
            DateExtractor::new(config.month_first).context("Failed to build date extractor")?,
        );
        let window = config.context_window;

        let transformers: Vec<Box<dyn ResourceTransformer>> = vec![
            Box::new(ConditionTransformer::new(Arc::clone(&dates), window)?),
            Box::new(MedicationTransformer::new(Arc::clone(&dates), window)?),
            Box::new(ObservationTransformer::new(Arc::clone(&dates), window)?),
            Box::new(ProcedureTransformer::new(Arc::clone(&dates), window)),
            Box::new(PractitionerTransformer::new(window)),
            Box::new(AllergyTransformer::new(window)),
            Box::new(CarePlanTransformer::new(Arc::clone(&dates), window)),
            Box::new(OrganizationTransformer::new(window)),
            Box::new(EncounterTransformer::new(Arc::clone(&dates), window)),
            Box::new(DiagnosticReportTransformer::new(Arc::clone(&dates), window)),
            Box::new(ServiceRequestTransformer::new(Arc::clone(&dates), window)?),
        ];

        info!(
            version = %config.version,
            transformers = transformers.len(),
            "Pipeline constructed"
        );

        Ok(Self {
            transformers,
            version: config.version,
        })
    }

    /// Builds the pipeline with default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any pattern fails to compile.
    pub fn with_defaults() -> Result<Self> {
        Self::new(PipelineConfig::default())
    }

    /// Builds the pipeline, replacing default units with the given
    /// overrides, matched by resource type
    ///
    /// # Errors
    ///
    /// Returns an error if the default set fails to build.
    pub fn with_transformers(
        config: PipelineConfig,
        overrides: Vec<Box<dyn ResourceTransformer>>,
    ) -> Result<Self> {
        let mut pipeline = Self::new(config)?;
        for replacement in overrides {
            let slot = pipeline
                .transformers
                .iter_mut()
                .find(|t| t.resource_type() == replacement.resource_type());
            match slot {
                Some(slot) => *slot = replacement,
                None => pipeline.transformers.push(replacement),
            }
        }
        Ok(pipeline)
    }

    /// Processes one extraction bundle into standardized records
    ///
    /// When `patient_override` is set it replaces the bundle's own patient
    /// id for this invocation.
    pub fn process(
        &self,
        bundle: &ExtractionBundle,
        patient_override: Option<&str>,
    ) -> Vec<StandardizedRecord> {
        self.process_with_outcome(bundle, patient_override).records
    }

    /// Processes one bundle, returning records plus skips and failures
    pub fn process_with_outcome(
        &self,
        bundle: &ExtractionBundle,
        patient_override: Option<&str>,
    ) -> PipelineOutcome {
        let bundle = match patient_override {
            Some(id) => std::borrow::Cow::Owned(bundle.with_patient_id(id)),
            None => std::borrow::Cow::Borrowed(bundle),
        };

        let mut outcome = PipelineOutcome::default();
        for transformer in &self.transformers {
            let resource_type = transformer.resource_type();
            let result = catch_unwind(AssertUnwindSafe(|| transformer.transform(bundle.as_ref())));
            match result {
                Ok(TransformOutcome { records, skipped }) => {
                    debug!(
                        resource_type = %resource_type,
                        records = records.len(),
                        skipped = skipped.len(),
                        "Transformer finished"
                    );
                    outcome.records.extend(records);
                    outcome.skipped.extend(skipped);
                }
                Err(panic) => {
                    let message = panic_message(&panic);
                    error!(
                        resource_type = %resource_type,
                        message,
                        "Transformer panicked; isolating"
                    );
                    outcome.failed_types.push(resource_type);
                }
            }
        }

        let pipeline = PipelineProvenance {
            version: self.version.clone(),
            processed_at: Utc::now(),
            record_count: outcome.records.len(),
        };
        for record in &mut outcome.records {
            record.provenance.pipeline = Some(pipeline.clone());
        }

        info!(
            records = outcome.records.len(),
            skipped = outcome.skipped.len(),
            failed_types = outcome.failed_types.len(),
            "Bundle processed"
        );
        outcome
    }

    /// The resource types this pipeline produces, in dispatch order
    pub fn supported_resource_types(&self) -> Vec<ResourceType> {
        self.transformers
            .iter()
            .map(|t| t.resource_type())
            .collect()
    }

    /// Verifies the transformer set covers every type exactly once
    ///
    /// # Errors
    ///
    /// Returns an error if any type is missing or duplicated.
    pub fn validate_configuration(&self) -> Result<()> {
        let types: HashSet<ResourceType> = self
            .transformers
            .iter()
            .map(|t| t.resource_type())
            .collect();
        if types.len() != self.transformers.len() {
            anyhow::bail!("Duplicate transformer resource types");
        }
        for expected in ResourceType::all() {
            if !types.contains(&expected) {
                anyhow::bail!("No transformer registered for {expected}");
            }
        }
        Ok(())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
