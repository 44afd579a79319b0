//! Care plan transformer

use super::{
    bounded_excerpt, clamp_confidence, require_patient, resolve_date, split_list_items,
    EntryOutcome, ResourceTransformer, TransformOutcome,
};
use crate::dates::DateExtractor;
use crate::domain::{
    CarePlanEntry, EntityInput, ExtractionBundle, LegacyField, Provenance, RecordOrigin,
    ResourceType, SkipReason, StandardizedRecord,
};
use serde_json::{json, Value};
use std::sync::Arc;

pub(crate) const LEGACY_KEYWORDS: &[&str] = &["plan", "recommendation", "follow-up", "followup"];

/// Care plan transformer
pub struct CarePlanTransformer {
    dates: Arc<DateExtractor>,
    context_window: usize,
}

impl CarePlanTransformer {
    /// Creates the transformer around a shared date extractor
    pub fn new(dates: Arc<DateExtractor>, context_window: usize) -> Self {
        Self {
            dates,
            context_window,
        }
    }

    fn build_structured(&self, patient_id: &str, entry: &CarePlanEntry) -> EntryOutcome {
        let Some(description) = entry
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
        else {
            return EntryOutcome::Skipped(SkipReason::MissingField("description".to_string()));
        };

        let resolved = resolve_date(
            &self.dates,
            entry.date_override.as_deref(),
            entry.start_date.as_deref(),
            Some(description),
            self.context_window,
        );

        let body = care_plan_body(
            description,
            map_status(entry.status.as_deref()),
            map_intent(entry.intent.as_deref()),
            resolved.iso.as_deref(),
        );

        let provenance = Provenance::new(RecordOrigin::Structured)
            .with_confidence(clamp_confidence(entry.confidence))
            .with_date_origin(resolved.origin);

        EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::CarePlan,
            patient_id,
            body,
            provenance,
        ))
    }

    fn build_legacy(&self, patient_id: &str, field: &LegacyField, item: &str) -> EntryOutcome {
        if !item.chars().any(|c| c.is_alphabetic()) {
            return EntryOutcome::Skipped(SkipReason::UnparsableValue(item.to_string()));
        }

        let resolved = resolve_date(&self.dates, None, None, Some(item), self.context_window);
        let body = care_plan_body(item, "active", "plan", resolved.iso.as_deref());

        let provenance = Provenance::new(RecordOrigin::Legacy)
            .with_confidence(clamp_confidence(field.confidence))
            .with_excerpt(bounded_excerpt(&field.value, self.context_window))
            .with_date_origin(resolved.origin);

        EntryOutcome::Built(StandardizedRecord::new(
            ResourceType::CarePlan,
            patient_id,
            body,
            provenance,
        ))
    }
}

impl ResourceTransformer for CarePlanTransformer {
    fn resource_type(&self) -> ResourceType {
        ResourceType::CarePlan
    }

    fn transform(&self, bundle: &ExtractionBundle) -> TransformOutcome {
        let mut outcome = TransformOutcome::empty();
        let Some(patient_id) = require_patient(bundle, self.resource_type()) else {
            return outcome;
        };

        let structured = bundle
            .structured
            .as_ref()
            .and_then(|s| s.care_plans.as_deref());

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

fn care_plan_body(description: &str, status: &str, intent: &str, start: Option<&str>) -> Value {
    let mut body = json!({
        "status": status,
        "intent": intent,
        "description": description,
    });
    if let Some(start) = start {
        body["period"] = json!({ "start": start });
    }
    body
}

/// Plan status vocabulary; unrecognized input defaults to "active"
fn map_status(raw: Option<&str>) -> &'static str {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("draft" | "proposed") => "draft",
        Some("active" | "current" | "ongoing") => "active",
        Some("on-hold" | "on hold" | "suspended") => "on-hold",
        Some("completed" | "done") => "completed",
        Some("revoked" | "cancelled" | "canceled") => "revoked",
        _ => "active",
    }
}

/// Plan intent vocabulary; unrecognized input defaults to "plan"
fn map_intent(raw: Option<&str>) -> &'static str {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("proposal" | "proposed") => "proposal",
        Some("plan") => "plan",
        Some("order" | "ordered") => "order",
        Some("option") => "option",
        _ => "plan",
    }
}
