//! Practitioner transformer
//!
//! Names decompose by stripping leading titles and trailing credentials,
//! then splitting on the last whitespace into given/family parts. A value
//! with a comma is treated as "Family, Given".

use super::{
    bounded_excerpt, clamp_confidence, require_patient, split_list_items, EntryOutcome,
    ResourceTransformer, TransformOutcome,
};
use crate::domain::{
    EntityInput, ExtractionBundle, LegacyField, Provenance, ProviderEntry, RecordOrigin,
    ResourceType, SkipReason, StandardizedRecord,
};
use serde_json::{json, Value};

pub(crate) const LEGACY_KEYWORDS: &[&str] = &[
    "provider",
    "physician",
    "doctor",
    "practitioner",
    "attending",
    "pcp",
];

const NPI_SYSTEM: &str = "http://hl7.org/fhir/sid/us-npi";

const TITLES: &[&str] = &["dr.", "dr", "mr.", "mr", "ms.", "ms", "mrs.", "mrs"];
const CREDENTIALS: &[&str] = &[
    "md", "m.d.", "do", "d.o.", "np", "pa", "pa-c", "rn", "dds", "phd", "facs", "facc",
];

/// Name split into structured parts
#[derive(Debug, Default, PartialEq)]
struct NameParts {
    prefix: Option<String>,
    given: Option<String>,
    family: String,
    suffix: Option<String>,
}

/// Practitioner transformer
pub struct PractitionerTransformer {
    context_window: usize,
}

impl PractitionerTransformer {
    /// Creates the transformer
    pub fn new(context_window: usize) -> Self {
        Self { context_window }
    }

    fn build_structured(&self, patient_id: &str, entry: &ProviderEntry) -> EntryOutcome {
        let Some(name) = entry.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
            return EntryOutcome::Skipped(SkipReason::MissingField("name".to_string()));
        };
        let Some(parts) = decompose_name(name) else {
            return EntryOutcome::Skipped(SkipReason::UnparsableValue(name.to_string()));
        };

        let body = practitioner_body(
            name,
            &parts,
            entry.specialty.as_deref(),
            entry.npi.as_deref(),
            entry.organization.as_deref(),
        );

        let provenance = Provenance::new(RecordOrigin::Structured)
            .with_confidence(clamp_confidence(entry.confidence));

        EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::Practitioner,
            patient_id,
            body,
            provenance,
        ))
    }

    fn build_legacy(&self, patient_id: &str, field: &LegacyField, item: &str) -> EntryOutcome {
        let Some(parts) = decompose_name(item) else {
            return EntryOutcome::Skipped(SkipReason::UnparsableValue(item.to_string()));
        };

        let body = practitioner_body(item, &parts, None, None, None);
        let provenance = Provenance::new(RecordOrigin::Legacy)
            .with_confidence(clamp_confidence(field.confidence))
            .with_excerpt(bounded_excerpt(&field.value, self.context_window));

        EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::Practitioner,
            patient_id,
            body,
            provenance,
        ))
    }
}

impl ResourceTransformer for PractitionerTransformer {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Practitioner
    }

    fn transform(&self, bundle: &ExtractionBundle) -> TransformOutcome {
        let mut outcome = TransformOutcome::empty();
        let Some(patient_id) = require_patient(bundle, self.resource_type()) else {
            return outcome;
        };

        let structured = bundle
            .structured
            .as_ref()
            .and_then(|s| s.providers.as_deref());

        match EntityInput::resolve(structured, bundle, LEGACY_KEYWORDS) {
            EntityInput::Structured(entries) => {
                for (index, entry) in entries.iter().enumerate() {
                    let built = self.build_structured(patient_id, entry);
                    outcome.absorb(self.resource_type(), index, built);
                }
            }
            EntityInput::Legacy(fields) => {
                let mut index = 0;
                for field in fields {
                    for item in split_list_items(&field.value) {
                        let built = self.build_legacy(patient_id, field, item);
                        outcome.absorb(self.resource_type(), index, built);
                        index += 1;
                    }
                }
            }
            EntityInput::Absent => {}
        }
        outcome
    }
}

fn practitioner_body(
    display: &str,
    parts: &NameParts,
    specialty: Option<&str>,
    npi: Option<&str>,
    organization: Option<&str>,
) -> Value {
    let mut name = json!({
        "text": display.trim(),
        "family": parts.family,
    });
    if let Some(given) = &parts.given {
        name["given"] = json!([given]);
    }
    if let Some(prefix) = &parts.prefix {
        name["prefix"] = json!([prefix]);
    }
    if let Some(suffix) = &parts.suffix {
        name["suffix"] = json!([suffix]);
    }

    let mut body = json!({ "name": [name] });
    if let Some(npi) = npi.map(str::trim).filter(|n| !n.is_empty()) {
        body["identifier"] = json!([{ "system": NPI_SYSTEM, "value": npi }]);
    }
    if let Some(specialty) = specialty.map(str::trim).filter(|s| !s.is_empty()) {
        body["qualification"] = json!([{ "code": { "text": specialty } }]);
    }
    if let Some(org) = organization.map(str::trim).filter(|o| !o.is_empty()) {
        body["organization"] = json!({ "display": org });
    }
    body
}

/// Splits a display name into prefix/given/family/suffix
///
/// Returns `None` when nothing name-like remains after stripping titles
/// and credentials.
fn decompose_name(raw: &str) -> Option<NameParts> {
    let mut parts = NameParts::default();

    // "Family, Given" form, or trailing ", MD" credentials
    let mut core = raw.trim();
    let mut comma_family: Option<&str> = None;
    if let Some((before, after)) = core.split_once(',') {
        let after = after.trim();
        if CREDENTIALS.contains(&after.to_lowercase().as_str()) {
            parts.suffix = Some(after.to_string());
            core = before.trim();
        } else {
            comma_family = Some(before.trim());
            core = after;
        }
    }

    let mut words: Vec<&str> = core.split_whitespace().collect();
    if let Some(first) = words.first() {
        if TITLES.contains(&first.to_lowercase().as_str()) {
            parts.prefix = Some(first.trim_end_matches('.').to_string());
            words.remove(0);
        }
    }
    while let Some(last) = words.last() {
        if CREDENTIALS.contains(&last.to_lowercase().trim_end_matches(',').to_string().as_str()) {
            if parts.suffix.is_none() {
                parts.suffix = Some(last.to_string());
            }
            words.pop();
        } else {
            break;
        }
    }

    if let Some(family) = comma_family {
        if family.is_empty() && words.is_empty() {
            return None;
        }
        parts.family = family.to_string();
        if !words.is_empty() {
            parts.given = Some(words.join(" "));
        }
        return Some(parts);
    }

    match words.len() {
        0 => None,
        1 => {
            parts.family = words[0].to_string();
            Some(parts)
        }
        n => {
            parts.family = words[n - 1].to_string();
            parts.given = Some(words[..n - 1].join(" "));
            Some(parts)
        }
    }
}
