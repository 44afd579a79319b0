//! Service request transformer
//!
//! Legacy-only: requests come from order/referral-labeled fields, plus
//! action phrases ("refer to ...", "ordered ...") found inside plan-like
//! narrative values.

use super::{
    bounded_excerpt, clamp_confidence, require_patient, resolve_date, split_list_items,
    EntryOutcome, ResourceTransformer, TransformOutcome,
};
use crate::dates::DateExtractor;
use crate::domain::{
    ExtractionBundle, LegacyField, Provenance, RecordOrigin, ResourceType, SkipReason,
    StandardizedRecord,
};
use anyhow::{Context, Result};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::Arc;

pub(crate) const REQUEST_LABELS: &[&str] = &["order", "orders", "referral", "referrals"];
const NARRATIVE_LABELS: &[&str] = &["plan", "recommendation", "assessment"];

/// Service request transformer
pub struct ServiceRequestTransformer {
    dates: Arc<DateExtractor>,
    context_window: usize,
    action_phrases: Vec<Regex>,
}

impl ServiceRequestTransformer {
    /// Creates the transformer around a shared date extractor
    pub fn new(dates: Arc<DateExtractor>, context_window: usize) -> Result<Self> {
        let action_phrases = [
            r"(?i)\brefer(?:red|ral)?\s+to\s+([^.;,\n]+)",
            r"(?i)\border(?:ed)?\s+([^.;,\n]+)",
            r"(?i)\bfollow[- ]?up\s+with\s+([^.;,\n]+)",
            r"(?i)\bschedule\s+([^.;,\n]+)",
        ]
        .iter()
        .map(|pattern| Regex::new(pattern))
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Invalid action phrase pattern")?;

        Ok(Self {
            dates,
            context_window,
            action_phrases,
        })
    }

    fn build_legacy(&self, patient_id: &str, field: &LegacyField, item: &str) -> EntryOutcome {
        if !item.chars().any(|c| c.is_alphabetic()) {
            return EntryOutcome::Skipped(SkipReason::UnparsableValue(item.to_string()));
        }

        let resolved = resolve_date(&self.dates, None, None, Some(item), self.context_window);
        let body = request_body(item, resolved.iso.as_deref());

        let provenance = Provenance::new(RecordOrigin::Legacy)
            .with_confidence(clamp_confidence(field.confidence))
            .with_excerpt(bounded_excerpt(&field.value, self.context_window))
            .with_date_origin(resolved.origin);

        EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::ServiceRequest,
            patient_id,
            body,
            provenance,
        ))
    }

    /// Pulls action phrases out of a narrative value
    fn action_targets<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut targets = Vec::new();
        for pattern in &self.action_phrases {
            for caps in pattern.captures_iter(text) {
                if let Some(target) = caps.get(0) {
                    let target = target.as_str().trim();
                    if !target.is_empty() && !targets.contains(&target) {
                        targets.push(target);
                    }
                }
            }
        }
        targets
    }
}

impl ResourceTransformer for ServiceRequestTransformer {
    fn resource_type(&self) -> ResourceType {
        ResourceType::ServiceRequest
    }

    fn transform(&self, bundle: &ExtractionBundle) -> TransformOutcome {
        let mut outcome = TransformOutcome::empty();
        let Some(patient_id) = require_patient(bundle, self.resource_type()) else {
            return outcome;
        };

        let mut index = 0;
        for field in bundle.legacy_fields_matching(REQUEST_LABELS) {
            for item in split_list_items(&field.value) {
                let built = self.build_legacy(patient_id, field, item);
                outcome.absorb(self.resource_type(), index, built);
                index += 1;
            }
        }

        for field in bundle.legacy_fields_matching(NARRATIVE_LABELS) {
            for target in self.action_targets(&field.value) {
                let built = self.build_legacy(patient_id, field, target);
                outcome.absorb(self.resource_type(), index, built);
                index += 1;
            }
        }
        outcome
    }
}

fn request_body(description: &str, when: Option<&str>) -> Value {
    let mut body = json!({
        "status": "active",
        "intent": "order",
        "code": { "text": description },
    });
    if let Some(when) = when {
        body["occurrenceDateTime"] = json!(when);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transformer() -> ServiceRequestTransformer {
        ServiceRequestTransformer::new(Arc::new(DateExtractor::new(true).unwrap()), 40).unwrap()
    }

    #[test]
    fn test_order_field_items() {
        let bundle = ExtractionBundle {
            patient_id: Some("p1".to_string()),
            legacy_fields: Some(vec![LegacyField::new(
                "Orders",
                "CBC with differential; Lipid panel",
            )]),
            ..Default::default()
        };
        let outcome = transformer().transform(&bundle);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].body["code"]["text"], "CBC with differential");
        assert_eq!(outcome.records[0].body["intent"], "order");
    }

    #[test]
    fn test_action_phrases_in_plan_narrative() {
        let bundle = ExtractionBundle {
            patient_id: Some("p1".to_string()),
            legacy_fields: Some(vec![LegacyField::new(
                "Plan",
                "Refer to cardiology for stress testing. Follow up with PCP in 2 weeks.",
            )]),
            ..Default::default()
        };
        let outcome = transformer().transform(&bundle);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(
            outcome.records[0].body["code"]["text"],
            "Refer to cardiology for stress testing"
        );
        assert_eq!(
            outcome.records[1].body["code"]["text"],
            "Follow up with PCP in 2 weeks"
        );
    }

    #[test]
    fn test_no_action_phrases_yields_nothing() {
        let bundle = ExtractionBundle {
            patient_id: Some("p1".to_string()),
            legacy_fields: Some(vec![LegacyField::new("Plan", "Continue current regimen.")]),
            ..Default::default()
        };
        let outcome = transformer().transform(&bundle);
        assert!(outcome.records.is_empty());
    }
}
