//! Organization transformer

use super::{
    bounded_excerpt, clamp_confidence, require_patient, split_list_items, EntryOutcome,
    ResourceTransformer, TransformOutcome,
};
use crate::domain::{
    EntityInput, ExtractionBundle, LegacyField, OrganizationEntry, Provenance, RecordOrigin,
    ResourceType, SkipReason, StandardizedRecord,
};
use serde_json::{json, Value};

pub(crate) const LEGACY_KEYWORDS: &[&str] =
    &["facility", "hospital", "clinic", "organization", "practice"];

/// Organization transformer
pub struct OrganizationTransformer {
    context_window: usize,
}

impl OrganizationTransformer {
    /// Creates the transformer
    pub fn new(context_window: usize) -> Self {
        Self { context_window }
    }

    fn build_structured(&self, patient_id: &str, entry: &OrganizationEntry) -> EntryOutcome {
        let Some(name) = entry.name.as_deref().map(str::trim).filter(|n| !n.is_empty()) else {
            return EntryOutcome::Skipped(SkipReason::MissingField("name".to_string()));
        };

        let body = organization_body(
            name,
            entry.org_type.as_deref(),
            entry.address.as_deref(),
            entry.phone.as_deref(),
        );
        let provenance = Provenance::new(RecordOrigin::Structured)
            .with_confidence(clamp_confidence(entry.confidence));

        EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::Organization,
            patient_id,
            body,
            provenance,
        ))
    }

    fn build_legacy(&self, patient_id: &str, field: &LegacyField, item: &str) -> EntryOutcome {
        if !item.chars().any(|c| c.is_alphabetic()) {
            return EntryOutcome::Skipped(SkipReason::UnparsableValue(item.to_string()));
        }

        // The field label often carries the kind (e.g. "Facility")
        let body = organization_body(item, Some(&field.label), None, None);
        let provenance = Provenance::new(RecordOrigin::Legacy)
            .with_confidence(clamp_confidence(field.confidence))
            .with_excerpt(bounded_excerpt(&field.value, self.context_window));

        EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::Organization,
            patient_id,
            body,
            provenance,
        ))
    }
}

impl ResourceTransformer for OrganizationTransformer {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Organization
    }

    fn transform(&self, bundle: &ExtractionBundle) -> TransformOutcome {
        let mut outcome = TransformOutcome::empty();
        let Some(patient_id) = require_patient(bundle, self.resource_type()) else {
            return outcome;
        };

        let structured = bundle
            .structured
            .as_ref()
            .and_then(|s| s.organizations.as_deref());

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

fn organization_body(
    name: &str,
    org_type: Option<&str>,
    address: Option<&str>,
    phone: Option<&str>,
) -> Value {
    let mut body = json!({ "name": name });
    if let Some(org_type) = org_type.map(str::trim).filter(|t| !t.is_empty()) {
        body["type"] = json!([{ "text": org_type }]);
    }
    if let Some(address) = address.map(str::trim).filter(|a| !a.is_empty()) {
        body["address"] = json!([{ "text": address }]);
    }
    if let Some(phone) = phone.map(str::trim).filter(|p| !p.is_empty()) {
        body["telecom"] = json!([{ "system": "phone", "value": phone }]);
    }
    body
}
