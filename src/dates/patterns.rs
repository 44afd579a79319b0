//! Date format recognizers
//!
//! The pattern set is compiled once at extractor construction and shared
//! read-only afterwards. Each recognizer carries a fixed base confidence
//! reflecting how unambiguous the format is in the wild: ISO is effectively
//! unambiguous, bare numeric forms are not.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use regex::Regex;

/// Recognized date format family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormatKind {
    /// `2023-05-15`
    Iso,
    /// `May 15, 2023` / `Sep 3 2021`
    MonthNameFirst,
    /// `15 May 2023`
    DayMonthName,
    /// `5/15/2023` (or day-first, depending on configuration)
    NumericSlash,
    /// `5-15-2023`
    NumericDash,
    /// `5/15/23`, two-digit year
    NumericSlashShortYear,
    /// `5-15-23`, two-digit year
    NumericDashShortYear,
    /// `15.05.2023`
    NumericDotted,
}

/// One compiled recognizer with its base confidence
#[derive(Debug)]
pub struct DatePattern {
    pub regex: Regex,
    pub kind: DateFormatKind,
    pub confidence: f32,
}

/// Immutable, ordered set of compiled date recognizers
///
/// Ordering matters: earlier (higher-confidence) recognizers claim their
/// match spans first, and later recognizers never re-report a covered span.
#[derive(Debug)]
pub struct PatternSet {
    patterns: Vec<DatePattern>,
}

const MONTH_NAMES: &str = "Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|Jun(?:e)?\
|Jul(?:y)?|Aug(?:ust)?|Sep(?:t(?:ember)?)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?";

impl PatternSet {
    /// Compiles the built-in recognizer set
    pub fn compile() -> Result<Self> {
        let month_name_first =
            format!(r"(?i)\b({MONTH_NAMES})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?,?\s+(\d{{4}})\b");
        let day_month_name =
            format!(r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+({MONTH_NAMES})\.?,?\s+(\d{{4}})\b");

        let specs: [(&str, DateFormatKind, f32); 8] = [
            (
                r"\b(\d{4})-(\d{2})-(\d{2})\b",
                DateFormatKind::Iso,
                0.95,
            ),
            (
                month_name_first.as_str(),
                DateFormatKind::MonthNameFirst,
                0.90,
            ),
            (
                day_month_name.as_str(),
                DateFormatKind::DayMonthName,
                0.88,
            ),
            (
                r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b",
                DateFormatKind::NumericSlash,
                0.85,
            ),
            (
                r"\b(\d{1,2})-(\d{1,2})-(\d{4})\b",
                DateFormatKind::NumericDash,
                0.80,
            ),
            (
                r"\b(\d{1,2})/(\d{1,2})/(\d{2})\b",
                DateFormatKind::NumericSlashShortYear,
                0.70,
            ),
            (
                r"\b(\d{1,2})-(\d{1,2})-(\d{2})\b",
                DateFormatKind::NumericDashShortYear,
                0.70,
            ),
            (
                r"\b(\d{1,2})\.(\d{1,2})\.(\d{2,4})\b",
                DateFormatKind::NumericDotted,
                0.65,
            ),
        ];

        let mut patterns = Vec::with_capacity(specs.len());
        for (pattern_str, kind, confidence) in specs {
            let regex = Regex::new(pattern_str)
                .with_context(|| format!("Invalid date recognizer for {kind:?}: {pattern_str}"))?;
            patterns.push(DatePattern {
                regex,
                kind,
                confidence,
            });
        }

        Ok(Self { patterns })
    }

    /// All recognizers in priority order
    pub fn all(&self) -> &[DatePattern] {
        &self.patterns
    }
}

/// Expands a two-digit year using the 50-pivot: `<50` → 2000s, `>=50` → 1900s
pub fn expand_two_digit_year(year: i32) -> i32 {
    if year < 50 {
        2000 + year
    } else {
        1900 + year
    }
}

/// Parses a month name or abbreviation (case-insensitive) to 1..=12
pub fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.to_lowercase().chars().take(3).collect();
    let number = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(number)
}

/// Resolves an ambiguous numeric (first, second) pair to (month, day)
///
/// `month_first` picks the assumed reading; an impossible month (>12)
/// triggers the swapped reading. Both out of month range resolves nothing.
pub fn resolve_month_day(first: u32, second: u32, month_first: bool) -> Option<(u32, u32)> {
    let (month, day) = if month_first {
        (first, second)
    } else {
        (second, first)
    };
    if (1..=12).contains(&month) {
        return Some((month, day));
    }
    if (1..=12).contains(&day) {
        // Swapped reading is the only possible one
        return Some((day, month));
    }
    None
}

/// Resolves a recognizer's captures to a calendar date
///
/// Returns `None` for impossible month/day combinations; callers treat that
/// as "no date", never as an error.
pub fn resolve_captures(
    kind: DateFormatKind,
    caps: &regex::Captures<'_>,
    month_first: bool,
) -> Option<NaiveDate> {
    match kind {
        DateFormatKind::Iso => {
            let year: i32 = caps.get(1)?.as_str().parse().ok()?;
            let month: u32 = caps.get(2)?.as_str().parse().ok()?;
            let day: u32 = caps.get(3)?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        }
        DateFormatKind::MonthNameFirst => {
            let month = month_number(caps.get(1)?.as_str())?;
            let day: u32 = caps.get(2)?.as_str().parse().ok()?;
            let year: i32 = caps.get(3)?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        }
        DateFormatKind::DayMonthName => {
            let day: u32 = caps.get(1)?.as_str().parse().ok()?;
            let month = month_number(caps.get(2)?.as_str())?;
            let year: i32 = caps.get(3)?.as_str().parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)
        }
        DateFormatKind::NumericSlash
        | DateFormatKind::NumericDash
        | DateFormatKind::NumericDotted => {
            let first: u32 = caps.get(1)?.as_str().parse().ok()?;
            let second: u32 = caps.get(2)?.as_str().parse().ok()?;
            let raw_year: i32 = caps.get(3)?.as_str().parse().ok()?;
            let year = if caps.get(3)?.as_str().len() == 2 {
                expand_two_digit_year(raw_year)
            } else {
                raw_year
            };
            let (month, day) = resolve_month_day(first, second, month_first)?;
            NaiveDate::from_ymd_opt(year, month, day)
        }
        DateFormatKind::NumericSlashShortYear | DateFormatKind::NumericDashShortYear => {
            let first: u32 = caps.get(1)?.as_str().parse().ok()?;
            let second: u32 = caps.get(2)?.as_str().parse().ok()?;
            let raw_year: i32 = caps.get(3)?.as_str().parse().ok()?;
            let (month, day) = resolve_month_day(first, second, month_first)?;
            NaiveDate::from_ymd_opt(expand_two_digit_year(raw_year), month, day)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_pattern_set_compiles() {
        let set = PatternSet::compile().unwrap();
        assert_eq!(set.all().len(), 8);
        // ISO must outrank every other recognizer
        assert!(set.all()[0].confidence >= set.all().iter().map(|p| p.confidence).fold(0.0, f32::max));
    }

    #[test_case(23, 2023; "low values are 2000s")]
    #[test_case(49, 2049; "forty nine is 2049")]
    #[test_case(50, 1950; "pivot value is 1950")]
    #[test_case(99, 1999; "ninety nine is 1999")]
    fn test_two_digit_year_pivot(input: i32, expected: i32) {
        assert_eq!(expand_two_digit_year(input), expected);
    }

    #[test_case("January", Some(1))]
    #[test_case("sep", Some(9))]
    #[test_case("SEPT", Some(9))]
    #[test_case("Decem", Some(12))]
    #[test_case("Smarch", None)]
    fn test_month_number(name: &str, expected: Option<u32>) {
        assert_eq!(month_number(name), expected);
    }

    #[test]
    fn test_resolve_month_day_month_first() {
        assert_eq!(resolve_month_day(5, 15, true), Some((5, 15)));
        assert_eq!(resolve_month_day(15, 5, true), Some((5, 15)));
        assert_eq!(resolve_month_day(13, 45, true), None);
    }

    #[test]
    fn test_resolve_month_day_day_first() {
        assert_eq!(resolve_month_day(15, 5, false), Some((5, 15)));
        assert_eq!(resolve_month_day(5, 6, false), Some((6, 5)));
    }

    #[test]
    fn test_iso_capture_resolution() {
        let set = PatternSet::compile().unwrap();
        let iso = &set.all()[0];
        let caps = iso.regex.captures("seen on 2023-05-15 today").unwrap();
        let date = resolve_captures(iso.kind, &caps, true).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2023, 5, 15).unwrap());
    }

    #[test]
    fn test_month_name_ordinal_suffix() {
        let set = PatternSet::compile().unwrap();
        let pattern = set
            .all()
            .iter()
            .find(|p| p.kind == DateFormatKind::MonthNameFirst)
            .unwrap();
        let caps = pattern.regex.captures("March 3rd, 2021").unwrap();
        let date = resolve_captures(pattern.kind, &caps, true).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2021, 3, 3).unwrap());
    }

    #[test]
    fn test_impossible_day_resolves_nothing() {
        let set = PatternSet::compile().unwrap();
        let pattern = set
            .all()
            .iter()
            .find(|p| p.kind == DateFormatKind::NumericSlash)
            .unwrap();
        let caps = pattern.regex.captures("13/45/2023").unwrap();
        assert!(resolve_captures(pattern.kind, &caps, true).is_none());
    }
}
