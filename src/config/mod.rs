//! Pipeline configuration
//!
//! The core needs very little configuration: the assumed reading for
//! ambiguous numeric dates, the context-window size used when excerpting
//! source text into provenance notes, and the version tag stamped into
//! pipeline provenance. Programmatic construction via [`Default`] is the
//! primary path; TOML loading is provided for deployments that keep the
//! knobs in a file.

use crate::domain::errors::PipelineError;
use crate::domain::result::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Upper bound on the provenance excerpt window; anything larger defeats
/// the point of a bounded excerpt
const MAX_CONTEXT_WINDOW: usize = 500;

/// Pipeline configuration knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Assume month-first for ambiguous numeric dates like `5/6/2023`
    pub month_first: bool,

    /// Bytes of surrounding text captured on each side of a match when
    /// excerpting source text into provenance notes
    pub context_window: usize,

    /// Version tag stamped into pipeline provenance
    pub version: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            month_first: true,
            context_window: 40,
            version: format!("meridian-{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl PipelineConfig {
    /// Loads configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the TOML fails to
    /// parse, or validation fails.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PipelineError::Configuration(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        let contents = fs::read_to_string(path).map_err(|e| {
            PipelineError::Configuration(format!(
                "Failed to read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML content and validates it
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: PipelineConfig = toml::from_str(contents)
            .map_err(|e| PipelineError::Configuration(format!("Failed to parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "version must not be empty".to_string(),
            ));
        }
        if self.context_window == 0 || self.context_window > MAX_CONTEXT_WINDOW {
            return Err(PipelineError::Configuration(format!(
                "context_window must be in 1..={MAX_CONTEXT_WINDOW}, got {}",
                self.context_window
            )));
        }
        Ok(())
    }
}
