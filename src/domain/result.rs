//! Crate-wide result alias

use super::errors::PipelineError;

/// Shorthand for results carrying a [`PipelineError`]
///
/// Foreign errors with a `From` conversion (io, JSON, TOML) propagate
/// through `?` without explicit mapping:
///
/// ```
/// use meridian::domain::Result;
///
/// fn parse_bundle(raw: &str) -> Result<serde_json::Value> {
///     Ok(serde_json::from_str(raw)?)
/// }
/// ```
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(raw)?)
    }

    #[test]
    fn test_question_mark_converts_foreign_errors() {
        assert!(parse(r#"{"patient_id": "p1"}"#).is_ok());
        let err = parse("{not json").unwrap_err();
        assert!(matches!(err, PipelineError::Serialization(_)));
    }
}
