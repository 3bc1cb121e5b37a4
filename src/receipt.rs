//! Receipt text parsing.
//!
//! Turns raw OCR'd or pasted receipt text into [`IncomingRecord`]s, one per
//! plausible line item. Payment and total lines are skipped, a leading
//! `"2 x "` quantity prefix is honored, and a trailing price token
//! (`$1.99`, `3.49`) is split off and preserved on the record.
//!
//! Parsing is line-oriented and lossy on purpose: receipts are noisy, and a
//! line we cannot make sense of is dropped rather than turned into a junk
//! pantry entry. The raw line is kept on each record for traceability.

use crate::models::IncomingRecord;

/// Lines containing any of these words are payment noise, not items.
const SKIP_KEYWORDS: &[&str] = &[
    "total",
    "subtotal",
    "tax",
    "change",
    "cash",
    "visa",
    "mastercard",
    "amex",
    "balance",
    "payment",
    "discount",
];

/// Parse receipt text into incoming records.
pub fn parse_receipt_text(text: &str) -> Vec<IncomingRecord> {
    let mut items = Vec::new();
    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }
        let lowered = line.to_lowercase();
        if SKIP_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            continue;
        }

        let (quantity, name_part) = split_quantity_prefix(line);
        let (name_part, price) = split_trailing_price(name_part);
        let name = collapse_whitespace(name_part);
        if name.chars().count() < 2 {
            continue;
        }

        items.push(IncomingRecord {
            quantity: quantity.map(f64::from),
            price,
            source_line: Some(line.to_string()),
            ..IncomingRecord::named(name)
        });
    }
    items
}

/// Split a leading `"<digits> x "` quantity prefix, e.g. `"2 x Milk"`.
fn split_quantity_prefix(line: &str) -> (Option<u32>, &str) {
    let trimmed = line.trim_start();
    let digits_end = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    if digits_end == 0 {
        return (None, line);
    }
    let rest = trimmed[digits_end..].trim_start();
    let mut chars = rest.chars();
    match chars.next() {
        Some('x') | Some('X') => {}
        _ => return (None, line),
    }
    let name = chars.as_str().trim_start();
    if name.is_empty() {
        return (None, line);
    }
    match trimmed[..digits_end].parse::<u32>() {
        Ok(quantity) => (Some(quantity), name),
        Err(_) => (None, line),
    }
}

/// Split a trailing price token from a line: an optional `$`, one or more
/// digits, and an optional `.NN` fraction, anchored at the end of the line.
fn split_trailing_price(line: &str) -> (&str, Option<String>) {
    let line = line.trim_end();
    let bytes = line.as_bytes();
    let end = bytes.len();

    let mut start = end;
    while start > 0 && bytes[start - 1].is_ascii_digit() {
        start -= 1;
    }
    if start == end {
        return (line, None);
    }

    // A two-digit fraction may be preceded by ".<int>".
    if end - start == 2 && start >= 2 && bytes[start - 1] == b'.' {
        let mut int_start = start - 1;
        while int_start > 0 && bytes[int_start - 1].is_ascii_digit() {
            int_start -= 1;
        }
        if int_start < start - 1 {
            start = int_start;
        }
    }

    if start > 0 && bytes[start - 1] == b'$' {
        start -= 1;
    }

    let price = line[start..].to_string();
    (line[..start].trim_end(), Some(price))
}

/// Collapse internal whitespace runs into single spaces.
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
