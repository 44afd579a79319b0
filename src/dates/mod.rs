//! Date extraction engine
//!
//! Separates *clinical* dates (when an event happened) from *processing*
//! metadata (when the system recorded it). The engine is stateless after
//! construction: recognizers are compiled once into an immutable
//! [`patterns::PatternSet`] and every operation is a pure function of its
//! input, safe for concurrent read-only use.

pub mod extractor;
pub mod patterns;

pub use extractor::{
    in_plausible_window, DateCandidate, DateExtractor, DateValidation, ExtractionMethod,
};
