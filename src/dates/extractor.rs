//! Clinical date extraction engine
//!
//! Pure text-in/candidates-out: finds dates embedded in clinical free text,
//! scores them by format unambiguity, validates clinical plausibility, and
//! deduplicates. Malformed or implausible dates never raise; they are
//! silently excluded, and single-date operations return `None` instead of
//! erroring.

use super::patterns::{resolve_captures, PatternSet};
use anyhow::Result;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Earliest clinically plausible date
const EARLIEST_PLAUSIBLE: (i32, u32, u32) = (1900, 1, 1);

/// Fuzzy-pass base confidence; a fuzzy match may never outrank a clean
/// pattern match, so the cap stays at the numeric-slash base
const FUZZY_BASE_CONFIDENCE: f32 = 0.60;
const FUZZY_CONFIDENCE_CAP: f32 = 0.85;

/// Candidates resolving to the same date within this byte distance collapse
const DEDUP_PROXIMITY: usize = 20;

/// How a date candidate was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// Matched by a format-specific recognizer
    Pattern,
    /// Single token that parsed in strict mode
    Fuzzy,
}

/// One date found in source text
///
/// Ephemeral: consumed immediately by a transformer, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateCandidate {
    /// The matched substring as it appeared in the text
    pub raw: String,

    /// Resolved calendar date
    pub date: NaiveDate,

    /// Confidence in [0, 1]
    pub confidence: f32,

    /// How the candidate was found
    pub method: ExtractionMethod,

    /// Byte offset of the match in the source text
    pub offset: usize,

    /// Bounded excerpt of the surrounding text
    pub context: String,
}

/// Result of validating a single date string
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateValidation {
    pub valid: bool,
    pub reason: String,
}

/// Date extraction engine
///
/// Compiles its recognizer set once at construction; afterwards the
/// extractor is immutable and safe to share read-only across threads.
#[derive(Debug)]
pub struct DateExtractor {
    patterns: PatternSet,
    month_first: bool,
}

impl DateExtractor {
    /// Creates an extractor
    ///
    /// `month_first` picks the assumed reading for ambiguous numeric dates
    /// like `5/6/2023`.
    ///
    /// # Errors
    ///
    /// Returns an error only if a built-in recognizer fails to compile,
    /// which indicates a defect rather than bad input.
    pub fn new(month_first: bool) -> Result<Self> {
        Ok(Self {
            patterns: PatternSet::compile()?,
            month_first,
        })
    }

    /// Extracts all plausible dates from free text
    ///
    /// Runs the pattern pass, then a fuzzy pass over uncovered tokens,
    /// validates every candidate against the plausibility window,
    /// deduplicates near-identical hits, and returns candidates sorted by
    /// descending confidence (offset ascending on ties).
    ///
    /// # Arguments
    ///
    /// * `text` - Source text to scan
    /// * `context_window` - Bytes of surrounding text captured on each side
    ///   of a match for provenance excerpts
    pub fn extract_dates(&self, text: &str, context_window: usize) -> Vec<DateCandidate> {
        let mut candidates: Vec<DateCandidate> = Vec::new();
        let mut covered: Vec<(usize, usize)> = Vec::new();

        // Pattern pass: higher-confidence recognizers claim spans first
        for pattern in self.patterns.all() {
            for caps in pattern.regex.captures_iter(text) {
                let Some(matched) = caps.get(0) else { continue };
                let span = (matched.start(), matched.end());
                if overlaps_any(&covered, span) {
                    continue;
                }
                covered.push(span);

                let Some(date) = resolve_captures(pattern.kind, &caps, self.month_first) else {
                    continue;
                };
                if !in_plausible_window(date) {
                    continue;
                }
                candidates.push(DateCandidate {
                    raw: matched.as_str().to_string(),
                    date,
                    confidence: pattern.confidence,
                    method: ExtractionMethod::Pattern,
                    offset: matched.start(),
                    context: excerpt_around(text, span.0, span.1, context_window),
                });
            }
        }

        // Fuzzy pass: strict single-token parsing over uncovered tokens
        for (offset, token) in tokens_with_offsets(text) {
            let span = (offset, offset + token.len());
            if overlaps_any(&covered, span) {
                continue;
            }
            let (lead, trimmed) = trim_token(token);
            if trimmed.len() < 6 || !trimmed.chars().any(|c| c.is_ascii_digit()) {
                continue;
            }
            let Some(date) = self.strict_token_parse(trimmed) else {
                continue;
            };
            if !in_plausible_window(date) {
                continue;
            }

            let mut confidence = FUZZY_BASE_CONFIDENCE;
            if trimmed.len() >= 8 {
                confidence += 0.15;
            }
            if trimmed.contains(['/', '-', '.']) {
                confidence += 0.10;
            }
            confidence = confidence.min(FUZZY_CONFIDENCE_CAP);

            candidates.push(DateCandidate {
                raw: trimmed.to_string(),
                date,
                confidence,
                method: ExtractionMethod::Fuzzy,
                offset: offset + lead,
                context: excerpt_around(text, span.0, span.1, context_window),
            });
        }

        dedup_candidates(&mut candidates);
        candidates.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(a.offset.cmp(&b.offset))
        });
        candidates
    }

    /// Parses one string as a date
    ///
    /// Tries every pattern recognizer against the whole (trimmed) input,
    /// then one strict fuzzy attempt. Returns `None` when nothing valid
    /// survives the plausibility window.
    pub fn parse_date(&self, input: &str) -> Option<NaiveDate> {
        self.parse_unvalidated(input).filter(|d| in_plausible_window(*d))
    }

    /// Validates a date string, returning a human-readable reason
    pub fn validate_date(&self, input: &str) -> DateValidation {
        match self.parse_unvalidated(input) {
            None => DateValidation {
                valid: false,
                reason: format!("unrecognized date format: {:?}", input.trim()),
            },
            Some(date) if !in_plausible_window(date) => DateValidation {
                valid: false,
                reason: format!("date {date} is outside the plausible clinical window"),
            },
            Some(date) => DateValidation {
                valid: true,
                reason: format!("parsed as {date}"),
            },
        }
    }

    /// Standardizes a date string to ISO `YYYY-MM-DD`, or `None`
    ///
    /// Accepts plain dates and date-with-time strings (RFC 3339 or
    /// `YYYY-MM-DDTHH:MM:SS`). Idempotent on already-ISO input.
    pub fn standardize(&self, input: &str) -> Option<String> {
        let trimmed = input.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            let date = dt.date_naive();
            return in_plausible_window(date).then(|| Self::standardize_date(date));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
            let date = dt.date();
            return in_plausible_window(date).then(|| Self::standardize_date(date));
        }

        self.parse_date(trimmed).map(Self::standardize_date)
    }

    /// Formats a calendar date as ISO `YYYY-MM-DD`
    pub fn standardize_date(date: NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }

    /// Formats a timestamp's date part as ISO `YYYY-MM-DD`
    pub fn standardize_datetime(datetime: &DateTime<Utc>) -> String {
        Self::standardize_date(datetime.date_naive())
    }

    /// Highest-confidence date in a text, if any
    pub fn best_date(&self, text: &str, context_window: usize) -> Option<DateCandidate> {
        self.extract_dates(text, context_window).into_iter().next()
    }

    // Pattern recognizers against the full input, then one fuzzy attempt.
    fn parse_unvalidated(&self, input: &str) -> Option<NaiveDate> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }

        for pattern in self.patterns.all() {
            if let Some(caps) = pattern.regex.captures(trimmed) {
                let matched = caps.get(0)?;
                if matched.start() == 0 && matched.end() == trimmed.len() {
                    if let Some(date) = resolve_captures(pattern.kind, &caps, self.month_first) {
                        return Some(date);
                    }
                    // Matched the shape but not a real calendar date
                    return None;
                }
            }
        }

        let (_, token) = trim_token(trimmed);
        self.strict_token_parse(token)
    }

    fn strict_token_parse(&self, token: &str) -> Option<NaiveDate> {
        let formats: &[&str] = if self.month_first {
            &[
                "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%m-%d-%Y", "%m.%d.%Y", "%m/%d/%y",
                "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y",
            ]
        } else {
            &[
                "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%d/%m/%y",
                "%m/%d/%Y", "%m-%d-%Y", "%m.%d.%Y",
            ]
        };
        formats
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(token, fmt).ok())
    }
}

impl Default for DateExtractor {
    fn default() -> Self {
        Self::new(true).expect("Failed to compile built-in date recognizers")
    }
}

/// Whether a date lies in `[1900-01-01, today + 1 year]`
pub fn in_plausible_window(date: NaiveDate) -> bool {
    let (y, m, d) = EARLIEST_PLAUSIBLE;
    let earliest = NaiveDate::from_ymd_opt(y, m, d).expect("constant date");
    let latest = Utc::now().date_naive() + Duration::days(365);
    date >= earliest && date <= latest
}

fn overlaps_any(covered: &[(usize, usize)], span: (usize, usize)) -> bool {
    covered
        .iter()
        .any(|&(start, end)| span.0 < end && span.1 > start)
}

fn dedup_candidates(candidates: &mut Vec<DateCandidate>) {
    candidates.sort_by_key(|c| c.offset);
    let mut kept: Vec<DateCandidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates.drain(..) {
        if let Some(existing) = kept.iter_mut().find(|k| {
            k.date == candidate.date && k.offset.abs_diff(candidate.offset) <= DEDUP_PROXIMITY
        }) {
            if candidate.confidence > existing.confidence {
                *existing = candidate;
            }
        } else {
            kept.push(candidate);
        }
    }
    *candidates = kept;
}

fn tokens_with_offsets(text: &str) -> Vec<(usize, &str)> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(s) = start.take() {
                tokens.push((s, &text[s..idx]));
            }
        } else if start.is_none() {
            start = Some(idx);
        }
    }
    if let Some(s) = start {
        tokens.push((s, &text[s..]));
    }
    tokens
}

/// Strips wrapping punctuation, returning the leading trim width and the
/// trimmed token
fn trim_token(token: &str) -> (usize, &str) {
    let is_wrap = |c: char| matches!(c, ',' | ';' | ':' | '(' | ')' | '"' | '\'' | '.');
    let trimmed = token.trim_matches(is_wrap);
    let lead = token.len() - token.trim_start_matches(is_wrap).len();
    (lead, trimmed)
}

fn excerpt_around(text: &str, start: usize, end: usize, window: usize) -> String {
    let mut lo = start.saturating_sub(window);
    while lo > 0 && !text.is_char_boundary(lo) {
        lo -= 1;
    }
    let mut hi = end.saturating_add(window).min(text.len());
    while hi < text.len() && !text.is_char_boundary(hi) {
        hi += 1;
    }
    text[lo..hi].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn extractor() -> DateExtractor {
        DateExtractor::new(true).unwrap()
    }

    #[test]
    fn test_extracts_admission_and_discharge() {
        let text = "Patient was admitted on 2023-05-15 and discharged on 2023-05-20.";
        let candidates = extractor().extract_dates(text, 30);

        assert_eq!(candidates.len(), 2);
        for c in &candidates {
            assert_eq!(c.method, ExtractionMethod::Pattern);
            assert!(c.confidence > 0.9);
        }
        assert_eq!(candidates[0].date, NaiveDate::from_ymd_opt(2023, 5, 15).unwrap());
        assert_eq!(candidates[1].date, NaiveDate::from_ymd_opt(2023, 5, 20).unwrap());
    }

    #[test]
    fn test_invalid_month_day_parses_to_nothing() {
        assert!(extractor().parse_date("13/45/2023").is_none());
    }

    #[test]
    fn test_confidence_ordering_is_non_increasing() {
        let text = "Seen May 15, 2023, follow-up 6/1/23, imaging from 2024/01/05 reviewed.";
        let candidates = extractor().extract_dates(text, 20);
        assert!(!candidates.is_empty());
        for pair in candidates.windows(2) {
            assert!(pair[0].confidence >= pair[1].confidence);
        }
    }

    #[test]
    fn test_fuzzy_never_outranks_pattern() {
        let text = "Admitted 2023-05-15, chart notes 2021/07/04 reviewed.";
        let candidates = extractor().extract_dates(text, 20);
        let fuzzy_max = candidates
            .iter()
            .filter(|c| c.method == ExtractionMethod::Fuzzy)
            .map(|c| c.confidence)
            .fold(0.0_f32, f32::max);
        assert!(fuzzy_max <= 0.85);
        assert!(candidates[0].method == ExtractionMethod::Pattern);
    }

    #[test]
    fn test_plausibility_window_excludes_out_of_range() {
        let ex = extractor();
        // Before 1900
        assert!(ex.extract_dates("recorded 1899-12-31 in ledger", 10).is_empty());
        // More than a year out
        let far_future = Utc::now().date_naive() + Duration::days(800);
        let text = format!("scheduled {}", far_future.format("%Y-%m-%d"));
        assert!(ex.extract_dates(&text, 10).is_empty());
    }

    #[test]
    fn test_dedup_keeps_highest_confidence() {
        // Same calendar date twice within 20 bytes, different formats
        let text = "2023-05-15 (05/15/2023)";
        let candidates = extractor().extract_dates(text, 10);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].confidence, 0.95);
        assert_eq!(candidates[0].raw, "2023-05-15");
    }

    #[test]
    fn test_distant_duplicates_are_kept() {
        let text = format!("admitted 2023-05-15{}readmitted 2023-05-15", " ".repeat(30));
        let candidates = extractor().extract_dates(&text, 10);
        assert_eq!(candidates.len(), 2);
    }

    #[test_case("2020-03-15", Some((2020, 3, 15)); "iso")]
    #[test_case("March 3rd, 2021", Some((2021, 3, 3)); "month name with ordinal")]
    #[test_case("15 May 2023", Some((2023, 5, 15)); "day month name")]
    #[test_case("5/15/2023", Some((2023, 5, 15)); "numeric slash")]
    #[test_case("15/5/2023", Some((2023, 5, 15)); "disambiguated by impossible month")]
    #[test_case("05/15/23", Some((2023, 5, 15)); "two digit year 2000s")]
    #[test_case("05/15/98", Some((1998, 5, 15)); "two digit year 1900s")]
    #[test_case("15.05.2023", Some((2023, 5, 15)); "dotted")]
    #[test_case("2023/05/15", Some((2023, 5, 15)); "fuzzy year first slash")]
    #[test_case("not a date", None; "prose")]
    #[test_case("2023-02-30", None; "impossible calendar day")]
    #[test_case("", None; "empty")]
    fn test_parse_date(input: &str, expected: Option<(i32, u32, u32)>) {
        let parsed = extractor().parse_date(input);
        let expected = expected.map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d).unwrap());
        assert_eq!(parsed, expected);
    }

    #[test]
    fn test_day_first_configuration() {
        let ex = DateExtractor::new(false).unwrap();
        assert_eq!(
            ex.parse_date("05/06/2023"),
            NaiveDate::from_ymd_opt(2023, 6, 5)
        );
    }

    #[test]
    fn test_validate_date_reasons() {
        let ex = extractor();
        assert!(ex.validate_date("2023-05-15").valid);
        let unrecognized = ex.validate_date("gibberish");
        assert!(!unrecognized.valid);
        assert!(unrecognized.reason.contains("unrecognized"));
        let implausible = ex.validate_date("1850-01-01");
        assert!(!implausible.valid);
        assert!(implausible.reason.contains("window"));
    }

    #[test]
    fn test_standardize_is_idempotent_on_iso() {
        let ex = extractor();
        let once = ex.standardize("May 15, 2023").unwrap();
        assert_eq!(once, "2023-05-15");
        assert_eq!(ex.standardize(&once).unwrap(), once);
    }

    #[test]
    fn test_standardize_handles_datetimes() {
        let ex = extractor();
        assert_eq!(
            ex.standardize("2023-05-15T10:30:00Z").as_deref(),
            Some("2023-05-15")
        );
        assert_eq!(
            ex.standardize("2023-05-15T10:30:00").as_deref(),
            Some("2023-05-15")
        );
        assert_eq!(ex.standardize("not a date"), None);
    }

    #[test]
    fn test_context_excerpt_is_bounded() {
        let text = format!("{} 2023-05-15 {}", "x".repeat(100), "y".repeat(100));
        let candidates = extractor().extract_dates(&text, 15);
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].context.len() <= "2023-05-15".len() + 30);
        assert!(candidates[0].context.contains("2023-05-15"));
    }

    #[test]
    fn test_tokens_with_offsets() {
        let tokens = tokens_with_offsets("ab  cd\nef");
        assert_eq!(tokens, vec![(0, "ab"), (4, "cd"), (7, "ef")]);
    }
}
