//! Core data models used throughout Steward.
//!
//! These types represent the records and change sets that flow through the
//! fuzzy upsert engine and out to the response envelope.

use serde::{Deserialize, Serialize};

/// One line item from a request batch, before classification.
///
/// Constructed fresh per request (from a structured `items` array or from
/// receipt-text parsing) and never mutated once validated. Optional
/// fields are opaque to the engine and carried through verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingRecord {
    pub name: String,
    /// Missing quantities default to 1 during validation; negative or
    /// non-finite quantities reject the record.
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default)]
    pub store: Option<String>,
    #[serde(default)]
    pub purchase_date: Option<String>,
    /// The raw receipt line this record was parsed from, if any.
    #[serde(default)]
    pub source_line: Option<String>,
}

impl IncomingRecord {
    /// Convenience constructor for a bare named record.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity: None,
            unit: None,
            category: None,
            notes: None,
            price: None,
            store: None,
            purchase_date: None,
            source_line: None,
        }
    }
}

/// A record already present in the external store, fetched once per request.
///
/// The set passed to the engine is a snapshot; the engine never re-fetches
/// mid-run, and ids must be unique within the set.
#[derive(Debug, Clone, Serialize)]
pub struct ExistingRecord {
    pub id: String,
    pub name: String,
    pub quantity: f64,
    pub notes: Option<String>,
    pub url: Option<String>,
}

/// A record classified as new: no existing record scored at or above the
/// threshold. `quantity` includes any quantities absorbed from in-batch
/// duplicates of this record.
#[derive(Debug, Clone, Serialize)]
pub struct PendingCreate {
    /// Position of the record in the input batch.
    pub batch_index: usize,
    pub record: IncomingRecord,
    pub quantity: f64,
}

/// A record matched to an existing store entry.
#[derive(Debug, Clone, Serialize)]
pub struct PendingUpdate {
    pub batch_index: usize,
    pub record: IncomingRecord,
    /// Id of the matched existing record.
    pub existing_id: String,
    /// Name of the matched existing record, for the report.
    pub matched_name: String,
    /// Similarity score that produced the match.
    pub score: f64,
    /// Existing quantity plus the incoming (and absorbed duplicate) quantity.
    pub merged_quantity: f64,
    /// Existing notes with a new line appended, present only when the
    /// incoming record carried notes or a price.
    pub merged_notes: Option<String>,
}

/// An incoming record absorbed by an earlier record in the same batch.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateLine {
    pub batch_index: usize,
    pub record: IncomingRecord,
    /// Batch index of the earlier record that absorbed this one.
    pub absorbed_by_index: usize,
    /// Name of the absorbing record.
    pub absorbed_by_name: String,
    pub score: f64,
}

/// A record that failed validation. Rejections are data, not errors: the
/// rest of the batch is still processed.
#[derive(Debug, Clone, Serialize)]
pub struct RejectedLine {
    pub batch_index: usize,
    pub record: IncomingRecord,
    /// Human-readable message naming the positional index and the failure,
    /// e.g. `"item[0]: name is required"`.
    pub message: String,
}

/// The engine's output: every input record lands in exactly one of the four
/// groupings, each ordered by batch position.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangeSet {
    pub to_create: Vec<PendingCreate>,
    pub to_update: Vec<PendingUpdate>,
    pub duplicates: Vec<DuplicateLine>,
    pub rejected: Vec<RejectedLine>,
}

impl ChangeSet {
    /// Total number of input records accounted for by this change set.
    pub fn total(&self) -> usize {
        self.to_create.len() + self.to_update.len() + self.duplicates.len() + self.rejected.len()
    }
}
