//! Change-set report formatting.
//!
//! Thin adapter between the engine's [`ChangeSet`], the outcome of applying
//! it against the external store, and the response envelope. All the
//! decision logic lives in the engine; this module only shapes JSON.

use serde_json::{json, Value};

use crate::envelope::Envelope;
use crate::models::ChangeSet;

/// External identifiers returned by a store-write call, joined back to the
/// change set by batch position.
#[derive(Debug, Clone)]
pub struct AppliedRef {
    pub batch_index: usize,
    pub id: String,
    pub url: Option<String>,
}

/// What actually happened when the caller applied a change set.
#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    /// True when writes were performed; false for a dry-run preview.
    pub applied: bool,
    pub created: Vec<AppliedRef>,
    pub updated: Vec<AppliedRef>,
    /// Per-item write failures. Items that succeeded are still reported.
    pub write_errors: Vec<String>,
}

impl ApplyOutcome {
    pub fn dry_run() -> Self {
        Self::default()
    }
}

/// Render a change set plus its apply outcome into the standard envelope.
pub fn format_report(change_set: &ChangeSet, outcome: &ApplyOutcome) -> Envelope {
    let parsed = change_set.total();
    let created = change_set.to_create.len();
    let updated = change_set.to_update.len();
    let merged = change_set.duplicates.len();

    let mut summary = format!(
        "Parsed {} item(s). Created {}. Updated {}. Merged {} duplicate(s).",
        parsed, created, updated, merged
    );
    if !outcome.applied {
        summary.push_str(" Dry-run preview.");
    }

    let created_entries: Vec<Value> = change_set
        .to_create
        .iter()
        .map(|entry| {
            let applied = find_ref(&outcome.created, entry.batch_index);
            json!({
                "name": entry.record.name,
                "quantity": entry.quantity,
                "unit": entry.record.unit,
                "category": entry.record.category,
                "store": entry.record.store,
                "purchase_date": entry.record.purchase_date,
                "price": entry.record.price,
                "id": applied.map(|r| r.id.clone()),
                "url": applied.and_then(|r| r.url.clone()),
            })
        })
        .collect();

    let updated_entries: Vec<Value> = change_set
        .to_update
        .iter()
        .map(|entry| {
            let applied = find_ref(&outcome.updated, entry.batch_index);
            json!({
                "name": entry.record.name,
                "matched_name": entry.matched_name,
                "existing_id": entry.existing_id,
                "score": entry.score,
                "quantity": entry.merged_quantity,
                "notes": entry.merged_notes,
                "url": applied.and_then(|r| r.url.clone()),
            })
        })
        .collect();

    let duplicate_entries: Vec<Value> = change_set
        .duplicates
        .iter()
        .map(|entry| {
            json!({
                "name": entry.record.name,
                "quantity": entry.record.quantity,
                "absorbed_by": entry.absorbed_by_name,
                "score": entry.score,
            })
        })
        .collect();

    let mut errors: Vec<String> = change_set
        .rejected
        .iter()
        .map(|r| r.message.clone())
        .collect();
    errors.extend(outcome.write_errors.iter().cloned());

    let next_actions: Vec<String> = if outcome.applied {
        vec!["Review the created and updated items in the store.".to_string()]
    } else {
        vec!["Re-run with dry_run=false and confirm=true to apply.".to_string()]
    };

    Envelope::ok(
        summary,
        json!({
            "created": created_entries,
            "updated": updated_entries,
            "duplicates": duplicate_entries,
            "applied": outcome.applied,
        }),
    )
    .with_next_actions(next_actions)
    .with_errors(errors)
}

fn find_ref(refs: &[AppliedRef], batch_index: usize) -> Option<&AppliedRef> {
    refs.iter().find(|r| r.batch_index == batch_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::process;
    use crate::models::{ExistingRecord, IncomingRecord};

    fn sample_change_set() -> ChangeSet {
        let batch = vec![
            IncomingRecord {
                quantity: Some(2.0),
                ..IncomingRecord::named("Milk")
            },
            IncomingRecord {
                quantity: Some(1.0),
                ..IncomingRecord::named("milk")
            },
            IncomingRecord {
                quantity: Some(3.0),
                ..IncomingRecord::named("Bananas")
            },
            IncomingRecord::named(""),
        ];
        let existing = vec![ExistingRecord {
            id: "p1".to_string(),
            name: "Bananas".to_string(),
            quantity: 2.0,
            notes: None,
            url: None,
        }];
        process(&batch, &existing, 0.7).unwrap()
    }

    #[test]
    fn test_summary_counts() {
        let cs = sample_change_set();
        let report = format_report(&cs, &ApplyOutcome::dry_run());
        assert_eq!(
            report.summary,
            "Parsed 4 item(s). Created 1. Updated 1. Merged 1 duplicate(s). Dry-run preview."
        );
    }

    #[test]
    fn test_rejections_are_observable() {
        let cs = sample_change_set();
        let report = format_report(&cs, &ApplyOutcome::dry_run());
        assert_eq!(report.errors, vec!["item[3]: name is required".to_string()]);
    }

    #[test]
    fn test_applied_refs_joined_by_batch_index() {
        let cs = sample_change_set();
        let outcome = ApplyOutcome {
            applied: true,
            created: vec![AppliedRef {
                batch_index: 0,
                id: "page-abc".to_string(),
                url: Some("https://notion.so/page-abc".to_string()),
            }],
            updated: vec![AppliedRef {
                batch_index: 2,
                id: "p1".to_string(),
                url: Some("https://notion.so/p1".to_string()),
            }],
            write_errors: vec![],
        };
        let report = format_report(&cs, &outcome);
        assert_eq!(report.result["created"][0]["id"], "page-abc");
        assert_eq!(report.result["updated"][0]["url"], "https://notion.so/p1");
        assert!(report.summary.ends_with("Merged 1 duplicate(s)."));
    }

    #[test]
    fn test_write_errors_do_not_discard_successes() {
        let cs = sample_change_set();
        let outcome = ApplyOutcome {
            applied: true,
            created: vec![],
            updated: vec![],
            write_errors: vec!["Notion rate limited (HTTP 429). Retry after 3.".to_string()],
        };
        let report = format_report(&cs, &outcome);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.result["created"].as_array().unwrap().len(), 1);
    }
}
