//! Integration tests for configuration loading from files and building
//! the pipeline from loaded configuration.

use meridian::pipeline::ClinicalPipeline;
use meridian::PipelineConfig;
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_config_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
month_first = false
context_window = 80
version = "meridian-test"
"#
    )
    .unwrap();

    let config = PipelineConfig::from_file(file.path()).unwrap();
    assert!(!config.month_first);
    assert_eq!(config.context_window, 80);
    assert_eq!(config.version, "meridian-test");
}

#[test]
fn test_partial_file_keeps_defaults() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "context_window = 25").unwrap();

    let config = PipelineConfig::from_file(file.path()).unwrap();
    assert!(config.month_first);
    assert_eq!(config.context_window, 25);
    assert!(config.version.starts_with("meridian-"));
}

#[test]
fn test_invalid_file_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "context_window = 0").unwrap();
    assert!(PipelineConfig::from_file(file.path()).is_err());

    let mut garbage = NamedTempFile::new().unwrap();
    writeln!(garbage, "this is not toml = = =").unwrap();
    assert!(PipelineConfig::from_file(garbage.path()).is_err());
}

#[test]
fn test_pipeline_builds_from_loaded_config() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "month_first = false").unwrap();

    let config = PipelineConfig::from_file(file.path()).unwrap();
    let pipeline = ClinicalPipeline::new(config).unwrap();
    pipeline.validate_configuration().unwrap();
}
