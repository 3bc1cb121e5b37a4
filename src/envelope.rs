//! The four-field response envelope shared by every tool.
//!
//! Every tool handler returns `{summary, result, next_actions, errors}`
//! as an explicit struct rather than an ad-hoc JSON shape, so the boundary
//! contract cannot drift between tools.

use serde::Serialize;
use serde_json::Value;

/// Standard tool response envelope.
///
/// `summary` is one human-readable sentence; `result` carries the
/// tool-specific payload; `next_actions` suggests follow-up steps for the
/// calling agent; `errors` collects record-level and downstream failures
/// without aborting the response (partial-failure semantics).
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    pub summary: String,
    pub result: Value,
    pub next_actions: Vec<String>,
    pub errors: Vec<String>,
}

impl Envelope {
    /// A successful envelope with a summary and result payload.
    pub fn ok(summary: impl Into<String>, result: Value) -> Self {
        Self {
            summary: summary.into(),
            result,
            next_actions: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// An envelope describing a failure the caller can act on. The result
    /// payload is still included so partial output is not discarded.
    pub fn failed(summary: impl Into<String>, result: Value, errors: Vec<String>) -> Self {
        Self {
            summary: summary.into(),
            result,
            next_actions: Vec::new(),
            errors,
        }
    }

    pub fn with_next_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next_actions = actions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_serializes_all_four_fields() {
        let envelope = Envelope::ok("Done.", json!({"ok": true}))
            .with_next_actions(["Review the result."]);
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["summary"], "Done.");
        assert_eq!(value["result"]["ok"], true);
        assert_eq!(value["next_actions"][0], "Review the result.");
        assert_eq!(value["errors"], json!([]));
    }

    #[test]
    fn test_failed_keeps_partial_result() {
        let envelope = Envelope::failed(
            "Partially applied.",
            json!({"created": ["Milk"]}),
            vec!["item[2]: name is required".to_string()],
        );
        assert_eq!(envelope.errors.len(), 1);
        assert_eq!(envelope.result["created"][0], "Milk");
    }
}
