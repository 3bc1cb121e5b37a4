//! Fuzzy upsert engine.
//!
//! Classifies a batch of incoming records against a snapshot of existing
//! store records and against earlier records in the same batch, producing a
//! [`ChangeSet`] that partitions every input record into exactly one of
//! create / update / duplicate / rejected.
//!
//! The engine performs no I/O and holds no state: the caller fetches the
//! existing snapshot before calling [`process`] and applies the resulting
//! change set afterward. This keeps the decision logic testable without any
//! network mocking, and makes a retry of the same batch against the same
//! snapshot produce the same change set.
//!
//! # Algorithm
//!
//! Records are processed in input order. For each record:
//!
//! 1. Validate: non-empty trimmed name, finite non-negative quantity
//!    (missing quantity defaults to 1). Invalid records land in
//!    `ChangeSet::rejected` with a positional message; the rest of the
//!    batch continues (one bad receipt line must not abort the batch).
//! 2. Score against every already-accepted record in this batch. Best score
//!    at or above the threshold → `duplicate`, and its quantity is absorbed
//!    additively into the earlier record, so a receipt with two "Milk" lines
//!    yields one store entry. Ties go to the earliest batch index.
//! 3. Otherwise score against every existing record. Best score at or above
//!    the threshold (inclusive) → `update` with additive quantity merge and
//!    append-only notes merge. Ties go to the lexicographically smallest id.
//! 4. Otherwise → `create`, optional fields carried through verbatim.

use anyhow::{bail, Result};
use std::collections::HashSet;

use crate::models::{
    ChangeSet, DuplicateLine, ExistingRecord, IncomingRecord, PendingCreate, PendingUpdate,
    RejectedLine,
};
use crate::similarity;

/// Default similarity threshold for treating two names as the same item.
pub const DEFAULT_THRESHOLD: f64 = 0.7;

/// An accepted record awaiting change-set materialization.
struct Accepted {
    batch_index: usize,
    record: IncomingRecord,
    /// Own quantity plus quantities absorbed from in-batch duplicates.
    pending_quantity: f64,
    /// Note lines contributed by this record and its absorbed duplicates,
    /// applied only on update (creates keep their fields verbatim).
    note_lines: Vec<String>,
    target: Target,
}

enum Target {
    Create,
    Update { existing_index: usize, score: f64 },
}

/// Classify `batch` against `existing` and produce a [`ChangeSet`].
///
/// Pure relative to its inputs: neither slice is mutated, and repeated calls
/// with the same inputs yield the same output.
///
/// # Errors
///
/// Fails fast, returning no partial change set, when a precondition is
/// violated: `threshold` outside `[0, 1]`, or duplicate ids in `existing`
/// (which indicates a corrupted upstream fetch). Record-level validation
/// failures are not errors; they are reported in `ChangeSet::rejected`.
pub fn process(
    batch: &[IncomingRecord],
    existing: &[ExistingRecord],
    threshold: f64,
) -> Result<ChangeSet> {
    if !(0.0..=1.0).contains(&threshold) {
        bail!(
            "invalid precondition: threshold must be within [0, 1], got {}",
            threshold
        );
    }
    let mut seen_ids = HashSet::new();
    for record in existing {
        if !seen_ids.insert(record.id.as_str()) {
            bail!(
                "invalid precondition: existing snapshot contains duplicate id '{}'",
                record.id
            );
        }
    }

    let mut accepted: Vec<Accepted> = Vec::new();
    let mut duplicates: Vec<DuplicateLine> = Vec::new();
    let mut rejected: Vec<RejectedLine> = Vec::new();

    for (index, record) in batch.iter().enumerate() {
        let quantity = match validate(index, record) {
            Ok(quantity) => quantity,
            Err(message) => {
                rejected.push(RejectedLine {
                    batch_index: index,
                    record: record.clone(),
                    message,
                });
                continue;
            }
        };

        // In-batch duplicate check against earlier accepted records.
        if let Some((slot, score)) = best_accepted_match(&accepted, &record.name, threshold) {
            duplicates.push(DuplicateLine {
                batch_index: index,
                record: record.clone(),
                absorbed_by_index: accepted[slot].batch_index,
                absorbed_by_name: accepted[slot].record.name.clone(),
                score,
            });
            accepted[slot].pending_quantity += quantity;
            if let Some(line) = note_line(record) {
                accepted[slot].note_lines.push(line);
            }
            continue;
        }

        // Existing-store match.
        let target = match best_existing_match(existing, &record.name, threshold) {
            Some((existing_index, score)) => Target::Update {
                existing_index,
                score,
            },
            None => Target::Create,
        };

        let note_lines = note_line(record).into_iter().collect();
        accepted.push(Accepted {
            batch_index: index,
            record: record.clone(),
            pending_quantity: quantity,
            note_lines,
            target,
        });
    }

    let mut change_set = ChangeSet {
        duplicates,
        rejected,
        ..Default::default()
    };

    for entry in accepted {
        match entry.target {
            Target::Create => change_set.to_create.push(PendingCreate {
                batch_index: entry.batch_index,
                record: entry.record,
                quantity: entry.pending_quantity,
            }),
            Target::Update {
                existing_index,
                score,
            } => {
                let matched = &existing[existing_index];
                change_set.to_update.push(PendingUpdate {
                    batch_index: entry.batch_index,
                    existing_id: matched.id.clone(),
                    matched_name: matched.name.clone(),
                    score,
                    merged_quantity: matched.quantity + entry.pending_quantity,
                    merged_notes: merge_notes(matched.notes.as_deref(), &entry.note_lines),
                    record: entry.record,
                });
            }
        }
    }

    Ok(change_set)
}

/// Validate one record, returning its effective quantity.
///
/// A missing quantity defaults to 1 (receipt lines rarely state one);
/// an explicitly invalid quantity rejects the record rather than being
/// silently coerced.
fn validate(index: usize, record: &IncomingRecord) -> std::result::Result<f64, String> {
    if record.name.trim().is_empty() {
        return Err(format!("item[{}]: name is required", index));
    }
    match record.quantity {
        None => Ok(1.0),
        Some(quantity) if quantity.is_finite() && quantity >= 0.0 => Ok(quantity),
        Some(_) => Err(format!(
            "item[{}]: quantity must be a non-negative number",
            index
        )),
    }
}

/// Best already-accepted match at or above the threshold.
/// Ties are broken toward the earliest accepted record.
fn best_accepted_match(accepted: &[Accepted], name: &str, threshold: f64) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (slot, entry) in accepted.iter().enumerate() {
        let score = similarity::score(name, &entry.record.name);
        if score < threshold {
            continue;
        }
        match best {
            Some((_, best_score)) if score <= best_score => {}
            _ => best = Some((slot, score)),
        }
    }
    best
}

/// Best existing-store match at or above the threshold.
/// Ties are broken toward the lexicographically smallest id.
fn best_existing_match(
    existing: &[ExistingRecord],
    name: &str,
    threshold: f64,
) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (index, entry) in existing.iter().enumerate() {
        let score = similarity::score(name, &entry.name);
        if score < threshold {
            continue;
        }
        let better = match best {
            None => true,
            Some((best_index, best_score)) => {
                score > best_score
                    || (score == best_score && entry.id < existing[best_index].id)
            }
        };
        if better {
            best = Some((index, score));
        }
    }
    best
}

/// Render the note line an incoming record contributes to an update, if any.
fn note_line(record: &IncomingRecord) -> Option<String> {
    match (record.notes.as_deref(), record.price.as_deref()) {
        (Some(notes), Some(price)) => Some(format!("{} (price: {})", notes, price)),
        (Some(notes), None) => Some(notes.to_string()),
        (None, Some(price)) => Some(format!("price: {}", price)),
        (None, None) => None,
    }
}

/// Append note lines to the existing notes without overwriting them.
fn merge_notes(existing: Option<&str>, lines: &[String]) -> Option<String> {
    if lines.is_empty() {
        return None;
    }
    let appended = lines.join("\n");
    match existing {
        Some(notes) if !notes.trim().is_empty() => Some(format!("{}\n{}", notes, appended)),
        _ => Some(appended),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, quantity: f64) -> IncomingRecord {
        IncomingRecord {
            quantity: Some(quantity),
            ..IncomingRecord::named(name)
        }
    }

    fn stored(id: &str, name: &str, quantity: f64) -> ExistingRecord {
        ExistingRecord {
            id: id.to_string(),
            name: name.to_string(),
            quantity,
            notes: None,
            url: None,
        }
    }

    #[test]
    fn test_exact_match_updates_additively() {
        let batch = vec![item("Bananas", 3.0)];
        let existing = vec![stored("p1", "Bananas", 2.0)];
        let cs = process(&batch, &existing, 0.7).unwrap();

        assert!(cs.to_create.is_empty());
        assert!(cs.duplicates.is_empty());
        assert_eq!(cs.to_update.len(), 1);
        assert_eq!(cs.to_update[0].existing_id, "p1");
        assert_eq!(cs.to_update[0].score, 1.0);
        assert_eq!(cs.to_update[0].merged_quantity, 5.0);
    }

    #[test]
    fn test_below_threshold_creates() {
        // "Organic Bananas" vs "Bananas" scores 0.5 with the token-overlap
        // formula, below the 0.7 threshold.
        let batch = vec![item("Organic Bananas", 3.0)];
        let existing = vec![stored("p1", "Bananas", 2.0)];
        let cs = process(&batch, &existing, 0.7).unwrap();

        assert!(cs.to_update.is_empty());
        assert_eq!(cs.to_create.len(), 1);
        assert_eq!(cs.to_create[0].record.name, "Organic Bananas");
        assert_eq!(cs.to_create[0].quantity, 3.0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        // Score is exactly 0.5; a threshold of 0.5 must match.
        let batch = vec![item("Organic Bananas", 1.0)];
        let existing = vec![stored("p1", "Bananas", 1.0)];
        let cs = process(&batch, &existing, 0.5).unwrap();
        assert_eq!(cs.to_update.len(), 1);
        assert_eq!(cs.to_update[0].score, 0.5);
    }

    #[test]
    fn test_tie_break_prefers_smallest_id() {
        let batch = vec![item("Bananas", 1.0)];
        let existing = vec![
            stored("p9", "Bananas", 1.0),
            stored("p2", "Bananas", 4.0),
            stored("p5", "Bananas", 7.0),
        ];
        for _ in 0..3 {
            let cs = process(&batch, &existing, 0.7).unwrap();
            assert_eq!(cs.to_update[0].existing_id, "p2");
            assert_eq!(cs.to_update[0].merged_quantity, 5.0);
        }
    }

    #[test]
    fn test_in_batch_duplicates_merge_quantities() {
        let batch = vec![item("Milk", 2.0), item("milk", 1.0)];
        let cs = process(&batch, &[], 0.7).unwrap();

        assert_eq!(cs.to_create.len(), 1);
        assert_eq!(cs.to_create[0].quantity, 3.0);
        assert_eq!(cs.duplicates.len(), 1);
        assert_eq!(cs.duplicates[0].absorbed_by_index, 0);
        assert_eq!(cs.duplicates[0].absorbed_by_name, "Milk");
    }

    #[test]
    fn test_duplicate_of_update_adds_to_merged_quantity() {
        let batch = vec![item("Milk", 2.0), item("Milk", 1.0)];
        let existing = vec![stored("p1", "Milk", 4.0)];
        let cs = process(&batch, &existing, 0.7).unwrap();

        assert_eq!(cs.to_update.len(), 1);
        assert_eq!(cs.to_update[0].merged_quantity, 7.0);
        assert_eq!(cs.duplicates.len(), 1);
    }

    #[test]
    fn test_empty_name_is_rejected_with_position() {
        let batch = vec![IncomingRecord::named("")];
        let cs = process(&batch, &[], 0.7).unwrap();

        assert!(cs.to_create.is_empty());
        assert!(cs.to_update.is_empty());
        assert!(cs.duplicates.is_empty());
        assert_eq!(cs.rejected.len(), 1);
        assert_eq!(cs.rejected[0].message, "item[0]: name is required");
    }

    #[test]
    fn test_negative_quantity_is_rejected() {
        let batch = vec![item("Bananas", -1.0)];
        let cs = process(&batch, &[], 0.7).unwrap();
        assert_eq!(cs.rejected.len(), 1);
        assert!(cs.rejected[0].message.contains("non-negative"));
    }

    #[test]
    fn test_missing_quantity_defaults_to_one() {
        let batch = vec![IncomingRecord::named("Bananas")];
        let cs = process(&batch, &[], 0.7).unwrap();
        assert_eq!(cs.to_create[0].quantity, 1.0);
    }

    #[test]
    fn test_rejection_does_not_abort_batch() {
        let batch = vec![
            IncomingRecord::named(""),
            item("Milk", 2.0),
            item("Bananas", 1.0),
        ];
        let cs = process(&batch, &[], 0.7).unwrap();
        assert_eq!(cs.rejected.len(), 1);
        assert_eq!(cs.to_create.len(), 2);
        // Rejected records are not duplicate-match candidates.
        assert!(cs.duplicates.is_empty());
    }

    #[test]
    fn test_partition_totality() {
        let batch = vec![
            item("Milk", 2.0),
            item("milk", 1.0),
            item("Bananas", 3.0),
            IncomingRecord::named(""),
            item("Eggs", 12.0),
        ];
        let existing = vec![stored("p1", "Bananas", 2.0)];
        let cs = process(&batch, &existing, 0.7).unwrap();

        assert_eq!(cs.total(), batch.len());
        let mut indices: Vec<usize> = cs
            .to_create
            .iter()
            .map(|c| c.batch_index)
            .chain(cs.to_update.iter().map(|u| u.batch_index))
            .chain(cs.duplicates.iter().map(|d| d.batch_index))
            .chain(cs.rejected.iter().map(|r| r.batch_index))
            .collect();
        indices.sort_unstable();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_output_preserves_input_order() {
        let batch = vec![item("Apples", 1.0), item("Pears", 1.0), item("Plums", 1.0)];
        let cs = process(&batch, &[], 0.7).unwrap();
        let names: Vec<&str> = cs.to_create.iter().map(|c| c.record.name.as_str()).collect();
        assert_eq!(names, vec!["Apples", "Pears", "Plums"]);
    }

    #[test]
    fn test_duplicate_existing_ids_fail_fast() {
        let batch = vec![item("Milk", 1.0)];
        let existing = vec![stored("p1", "Milk", 1.0), stored("p1", "Eggs", 2.0)];
        let err = process(&batch, &existing, 0.7).unwrap_err();
        assert!(err.to_string().contains("invalid precondition"));
        assert!(err.to_string().contains("duplicate id 'p1'"));
    }

    #[test]
    fn test_out_of_range_threshold_fails_fast() {
        let batch = vec![item("Milk", 1.0)];
        assert!(process(&batch, &[], 1.5).is_err());
        assert!(process(&batch, &[], -0.1).is_err());
        assert!(process(&batch, &[], f64::NAN).is_err());
    }

    #[test]
    fn test_update_appends_notes() {
        let mut record = item("Bananas", 1.0);
        record.notes = Some("ripe".to_string());
        record.price = Some("$1.99".to_string());
        let existing = vec![ExistingRecord {
            notes: Some("from the market".to_string()),
            ..stored("p1", "Bananas", 2.0)
        }];
        let cs = process(&[record], &existing, 0.7).unwrap();
        assert_eq!(
            cs.to_update[0].merged_notes.as_deref(),
            Some("from the market\nripe (price: $1.99)")
        );
    }

    #[test]
    fn test_update_without_notes_or_price_leaves_notes_alone() {
        let batch = vec![item("Bananas", 1.0)];
        let existing = vec![ExistingRecord {
            notes: Some("keep me".to_string()),
            ..stored("p1", "Bananas", 2.0)
        }];
        let cs = process(&batch, &existing, 0.7).unwrap();
        assert!(cs.to_update[0].merged_notes.is_none());
    }

    #[test]
    fn test_deterministic_across_runs() {
        let batch = vec![
            item("Greek Yogurt", 2.0),
            item("greek yogurt", 1.0),
            item("Oat Milk", 1.0),
        ];
        let existing = vec![stored("a2", "Oat Milk", 3.0), stored("a1", "Oat Milk", 5.0)];
        let first = process(&batch, &existing, 0.7).unwrap();
        let second = process(&batch, &existing, 0.7).unwrap();
        assert_eq!(
            serde_json::to_value(&first).unwrap(),
            serde_json::to_value(&second).unwrap()
        );
        // Tie broken toward "a1" both times.
        assert_eq!(first.to_update[0].existing_id, "a1");
    }
}
