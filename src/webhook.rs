//! Webhook forwarding.
//!
//! Mood snapshots and serendipity events are passed through to configured
//! automation webhooks as-is. The forwarder reports the downstream status
//! and a bounded preview of the response body; it never retries, the
//! automation side owns delivery semantics.

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Response body preview cap, in bytes.
const PREVIEW_LIMIT: usize = 500;

/// Outcome of one webhook delivery attempt.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookOutcome {
    pub ok: bool,
    pub status_code: u16,
    pub response_preview: String,
}

/// POST a JSON payload to `url` with a bounded timeout.
///
/// A non-2xx downstream status is not an error here; it is reported in the
/// outcome so the tool can surface it in the envelope. Only transport
/// failures (DNS, connect, timeout) propagate as errors.
pub async fn forward(url: &str, payload: &Value, timeout_secs: u64) -> Result<WebhookOutcome> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;

    let response = client.post(url).json(payload).send().await?;
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    Ok(WebhookOutcome {
        ok: status.as_u16() < 400,
        status_code: status.as_u16(),
        response_preview: truncate_preview(&body),
    })
}

fn truncate_preview(body: &str) -> String {
    if body.len() <= PREVIEW_LIMIT {
        return body.to_string();
    }
    let mut end = PREVIEW_LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_preview_unchanged() {
        assert_eq!(truncate_preview("ok"), "ok");
    }

    #[test]
    fn test_long_preview_truncated() {
        let body = "x".repeat(2000);
        assert_eq!(truncate_preview(&body).len(), PREVIEW_LIMIT);
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        let body = "é".repeat(400); // 800 bytes, boundary falls mid-char
        let preview = truncate_preview(&body);
        assert!(preview.len() <= PREVIEW_LIMIT);
        assert!(preview.chars().all(|c| c == 'é'));
    }
}
