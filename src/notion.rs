//! Notion API client and payload helpers.
//!
//! A thin reqwest wrapper over the handful of Notion endpoints the tools
//! need: search, page fetch/patch, block append, database schema fetch,
//! paginated database query, and page creation. All JSON shaping is done by
//! pure helpers so the translation layer is testable without a network.
//!
//! # Error Reporting
//!
//! Notion errors are reduced to a single human-readable message: the
//! response's `message` (or `code`) field when the body parses as JSON,
//! the raw body otherwise, and a dedicated rate-limit message for HTTP 429
//! that surfaces the `retry-after` header.

use anyhow::{bail, Result};
use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::config::{NotionConfig, PropertyMap};
use crate::models::ExistingRecord;

/// Client for the Notion REST API.
pub struct NotionClient {
    http: reqwest::Client,
    api_base: String,
    version: String,
    token: String,
}

/// A search/list result reduced to the fields agents care about.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PageSummary {
    pub id: String,
    pub title: String,
    pub url: Option<String>,
    pub last_edited_time: Option<String>,
}

impl NotionClient {
    /// Create a client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no integration token is configured
    /// (`NOTION_TOKEN`).
    pub fn new(config: &NotionConfig) -> Result<Self> {
        let token = match &config.token {
            Some(token) if !token.is_empty() => token.clone(),
            _ => bail!("NOTION_TOKEN is not set on the server"),
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            version: config.version.clone(),
            token,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_base, path))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .header("Notion-Version", &self.version)
    }

    async fn check(response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());
        let body = response.text().await.unwrap_or_default();
        bail!("{}", error_message(status.as_u16(), retry_after.as_deref(), &body))
    }

    /// Search pages by text query (`POST /search`), page objects only.
    pub async fn search_pages(&self, query: &str, limit: usize) -> Result<Vec<PageSummary>> {
        let payload = json!({
            "query": query,
            "page_size": limit.clamp(1, 50),
            "filter": {"property": "object", "value": "page"},
        });
        let response = self
            .request(reqwest::Method::POST, "/search")
            .json(&payload)
            .send()
            .await?;
        let data = Self::check(response).await?;
        let results = data["results"].as_array().cloned().unwrap_or_default();
        Ok(results.iter().map(summarize_page_brief).collect())
    }

    /// Fetch a full page object (`GET /pages/{id}`).
    pub async fn get_page(&self, page_id: &str) -> Result<Value> {
        let response = self
            .request(reqwest::Method::GET, &format!("/pages/{}", page_id))
            .send()
            .await?;
        Self::check(response).await
    }

    /// Patch page properties (`PATCH /pages/{id}`), returning the updated page.
    pub async fn update_page_properties(&self, page_id: &str, properties: Value) -> Result<Value> {
        let response = self
            .request(reqwest::Method::PATCH, &format!("/pages/{}", page_id))
            .json(&json!({ "properties": properties }))
            .send()
            .await?;
        Self::check(response).await
    }

    /// Append child blocks to a page (`PATCH /blocks/{id}/children`).
    pub async fn append_blocks(&self, page_id: &str, blocks: Vec<Value>) -> Result<()> {
        let response = self
            .request(
                reqwest::Method::PATCH,
                &format!("/blocks/{}/children", page_id),
            )
            .json(&json!({ "children": blocks }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    /// Fetch a database object, including its property schema.
    pub async fn get_database(&self, database_id: &str) -> Result<Value> {
        let response = self
            .request(reqwest::Method::GET, &format!("/databases/{}", database_id))
            .send()
            .await?;
        Self::check(response).await
    }

    /// Run one database query with a caller-supplied payload (filter, sorts,
    /// page size). No pagination; the caller bounds `page_size`.
    pub async fn query_database_once(&self, database_id: &str, payload: &Value) -> Result<Value> {
        let response = self
            .request(
                reqwest::Method::POST,
                &format!("/databases/{}/query", database_id),
            )
            .json(payload)
            .send()
            .await?;
        Self::check(response).await
    }

    /// Query a database, following pagination until `cap` entries are
    /// collected or the cursor is exhausted. Bounding is a caller policy;
    /// receipt-scale batches never need the whole store.
    pub async fn query_database(&self, database_id: &str, cap: usize) -> Result<Vec<Value>> {
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut payload = json!({
                "page_size": cap.saturating_sub(pages.len()).clamp(1, 100),
            });
            if let Some(cursor) = &cursor {
                payload["start_cursor"] = json!(cursor);
            }
            let data = self.query_database_once(database_id, &payload).await?;

            if let Some(results) = data["results"].as_array() {
                pages.extend(results.iter().cloned());
            }
            if pages.len() >= cap || !data["has_more"].as_bool().unwrap_or(false) {
                pages.truncate(cap);
                return Ok(pages);
            }
            cursor = data["next_cursor"].as_str().map(|s| s.to_string());
            if cursor.is_none() {
                return Ok(pages);
            }
        }
    }

    /// Create a page in a database, returning its id and URL.
    pub async fn create_page(&self, database_id: &str, properties: Value) -> Result<(String, Option<String>)> {
        let payload = json!({
            "parent": {"database_id": database_id},
            "properties": properties,
        });
        let response = self
            .request(reqwest::Method::POST, "/pages")
            .json(&payload)
            .send()
            .await?;
        let page = Self::check(response).await?;
        let id = page["id"].as_str().unwrap_or_default().to_string();
        let url = page["url"].as_str().map(|s| s.to_string());
        Ok((id, url))
    }
}

// ============ Pure helpers ============

/// Reduce a Notion error response to one message.
pub fn error_message(status: u16, retry_after: Option<&str>, body: &str) -> String {
    if status == 429 {
        return format!(
            "Notion rate limited (HTTP 429). Retry after {}.",
            retry_after.unwrap_or("later")
        );
    }
    match serde_json::from_str::<Value>(body) {
        Ok(parsed) => parsed["message"]
            .as_str()
            .or_else(|| parsed["code"].as_str())
            .unwrap_or(body)
            .to_string(),
        Err(_) => body.to_string(),
    }
}

/// Find the name of the title property in a database or page schema.
pub fn title_property_name(properties: &Map<String, Value>) -> Option<&str> {
    properties
        .iter()
        .find(|(_, prop)| prop["type"].as_str() == Some("title"))
        .map(|(name, _)| name.as_str())
}

/// Concatenate the `plain_text` of a rich-text array.
pub fn plain_text(items: &Value) -> String {
    items
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|item| item["plain_text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Reduce one property value to `{type, value}`.
pub fn summarize_property(prop: &Value) -> Value {
    let prop_type = prop["type"].as_str().unwrap_or("unknown");
    let value = match prop_type {
        "title" => json!(plain_text(&prop["title"])),
        "rich_text" => json!(plain_text(&prop["rich_text"])),
        "select" => prop["select"]["name"].clone(),
        "multi_select" => json!(prop["multi_select"]
            .as_array()
            .map(|arr| arr
                .iter()
                .filter_map(|item| item["name"].as_str())
                .collect::<Vec<_>>())
            .unwrap_or_default()),
        "checkbox" => prop["checkbox"].clone(),
        "number" => prop["number"].clone(),
        "url" => prop["url"].clone(),
        "date" => prop["date"].clone(),
        _ => Value::Null,
    };
    json!({"type": prop_type, "value": value})
}

/// Reduce a page object to id, title, URL, edit time, and summarized
/// properties.
pub fn summarize_page(page: &Value) -> Value {
    let empty = Map::new();
    let props = page["properties"].as_object().unwrap_or(&empty);
    let title = page_title(page);
    let summary: Map<String, Value> = props
        .iter()
        .map(|(name, prop)| (name.clone(), summarize_property(prop)))
        .collect();
    json!({
        "id": page["id"],
        "title": title,
        "url": page["url"],
        "last_edited_time": page["last_edited_time"],
        "properties": summary,
    })
}

/// Extract the title text of a page, if any.
pub fn page_title(page: &Value) -> String {
    let empty = Map::new();
    let props = page["properties"].as_object().unwrap_or(&empty);
    title_property_name(props)
        .map(|name| plain_text(&props[name]["title"]))
        .unwrap_or_default()
}

fn summarize_page_brief(page: &Value) -> PageSummary {
    PageSummary {
        id: page["id"].as_str().unwrap_or_default().to_string(),
        title: page_title(page),
        url: page["url"].as_str().map(|s| s.to_string()),
        last_edited_time: page["last_edited_time"].as_str().map(|s| s.to_string()),
    }
}

/// Build the write payload for one property, given its schema type.
///
/// Unsupported types and uncoercible values append to `errors` and yield
/// `None`, so the caller can skip the property without aborting the write.
pub fn property_payload(
    prop_type: &str,
    value: &Value,
    prop_name: &str,
    errors: &mut Vec<String>,
) -> Option<Value> {
    if value.is_null() {
        return None;
    }
    match prop_type {
        "title" => Some(json!({"title": [{"text": {"content": value_as_text(value)}}]})),
        "rich_text" => Some(json!({"rich_text": [{"text": {"content": value_as_text(value)}}]})),
        "select" => Some(json!({"select": {"name": value_as_text(value)}})),
        "multi_select" => {
            let values: Vec<Value> = match value {
                Value::Array(items) => items.clone(),
                other => vec![other.clone()],
            };
            let names: Vec<Value> = values
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| json!({"name": value_as_text(v)}))
                .collect();
            Some(json!({"multi_select": names}))
        }
        "number" => match value {
            Value::Number(n) => Some(json!({"number": n})),
            Value::String(s) => match s.trim().trim_start_matches('$').parse::<f64>() {
                Ok(n) => Some(json!({"number": n})),
                Err(_) => {
                    errors.push(format!("Property '{}' expects a number.", prop_name));
                    None
                }
            },
            _ => {
                errors.push(format!("Property '{}' expects a number.", prop_name));
                None
            }
        },
        "date" => match value {
            Value::Object(_) => Some(json!({"date": value})),
            other => Some(json!({"date": {"start": value_as_text(other)}})),
        },
        "url" => Some(json!({"url": value_as_text(value)})),
        "checkbox" => match value {
            Value::Bool(b) => Some(json!({"checkbox": b})),
            _ => {
                errors.push(format!("Property '{}' expects a boolean.", prop_name));
                None
            }
        },
        other => {
            errors.push(format!(
                "Property '{}' type '{}' not supported.",
                prop_name, other
            ));
            None
        }
    }
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Build paragraph blocks from `[{type: "paragraph", text: "..."}]` input.
/// Only paragraph blocks are supported; anything else is reported.
pub fn paragraph_blocks(append_blocks: &[Value], errors: &mut Vec<String>) -> Vec<Value> {
    let mut blocks = Vec::new();
    for block in append_blocks {
        if block["type"].as_str() != Some("paragraph") {
            errors.push("Only paragraph blocks are supported.".to_string());
            continue;
        }
        let Some(text) = block["text"].as_str() else {
            errors.push("Paragraph block requires text.".to_string());
            continue;
        };
        blocks.push(json!({
            "object": "block",
            "type": "paragraph",
            "paragraph": {"rich_text": [{"text": {"content": text}}]},
        }));
    }
    blocks
}

/// Convert a pantry database row into an [`ExistingRecord`].
///
/// Rows without a readable title are skipped, since they cannot participate in
/// name matching. A missing quantity property reads as zero.
pub fn existing_record_from_page(page: &Value, properties: &PropertyMap) -> Option<ExistingRecord> {
    let id = page["id"].as_str()?.to_string();
    let title = page_title(page);
    if title.is_empty() {
        return None;
    }
    let props = page["properties"].as_object()?;
    let quantity = props
        .get(&properties.quantity)
        .and_then(|prop| prop["number"].as_f64())
        .unwrap_or(0.0);
    let notes = props
        .get(&properties.notes)
        .map(|prop| plain_text(&prop["rich_text"]))
        .filter(|s| !s.is_empty());
    Some(ExistingRecord {
        id,
        name: title,
        quantity,
        notes,
        url: page["url"].as_str().map(|s| s.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_page() -> Value {
        json!({
            "id": "page-1",
            "url": "https://notion.so/page-1",
            "last_edited_time": "2026-08-01T10:00:00.000Z",
            "properties": {
                "Name": {
                    "type": "title",
                    "title": [{"plain_text": "Bananas"}, {"plain_text": " (ripe)"}],
                },
                "Quantity": {"type": "number", "number": 2.0},
                "Category": {"type": "select", "select": {"name": "Fruit"}},
                "Notes": {
                    "type": "rich_text",
                    "rich_text": [{"plain_text": "from the market"}],
                },
            },
        })
    }

    #[test]
    fn test_title_property_discovery() {
        let page = sample_page();
        let props = page["properties"].as_object().unwrap();
        assert_eq!(title_property_name(props), Some("Name"));
        assert_eq!(page_title(&page), "Bananas (ripe)");
    }

    #[test]
    fn test_summarize_page() {
        let summary = summarize_page(&sample_page());
        assert_eq!(summary["title"], "Bananas (ripe)");
        assert_eq!(summary["properties"]["Quantity"]["value"], 2.0);
        assert_eq!(summary["properties"]["Category"]["value"], "Fruit");
    }

    #[test]
    fn test_existing_record_from_page() {
        let record =
            existing_record_from_page(&sample_page(), &PropertyMap::default()).unwrap();
        assert_eq!(record.id, "page-1");
        assert_eq!(record.name, "Bananas (ripe)");
        assert_eq!(record.quantity, 2.0);
        assert_eq!(record.notes.as_deref(), Some("from the market"));
    }

    #[test]
    fn test_existing_record_requires_title() {
        let page = json!({"id": "x", "properties": {}});
        assert!(existing_record_from_page(&page, &PropertyMap::default()).is_none());
    }

    #[test]
    fn test_error_message_rate_limited() {
        assert_eq!(
            error_message(429, Some("3"), ""),
            "Notion rate limited (HTTP 429). Retry after 3."
        );
        assert_eq!(
            error_message(429, None, ""),
            "Notion rate limited (HTTP 429). Retry after later."
        );
    }

    #[test]
    fn test_error_message_prefers_json_message() {
        let body = r#"{"code": "object_not_found", "message": "Could not find page."}"#;
        assert_eq!(error_message(404, None, body), "Could not find page.");
        let code_only = r#"{"code": "unauthorized"}"#;
        assert_eq!(error_message(401, None, code_only), "unauthorized");
        assert_eq!(error_message(500, None, "plain text"), "plain text");
    }

    #[test]
    fn test_property_payload_number_coercion() {
        let mut errors = Vec::new();
        let payload = property_payload("number", &json!("$3.49"), "Quantity", &mut errors);
        assert_eq!(payload.unwrap()["number"], 3.49);
        assert!(errors.is_empty());

        let bad = property_payload("number", &json!("three"), "Quantity", &mut errors);
        assert!(bad.is_none());
        assert_eq!(errors, vec!["Property 'Quantity' expects a number."]);
    }

    #[test]
    fn test_property_payload_title_and_select() {
        let mut errors = Vec::new();
        let title = property_payload("title", &json!("Milk"), "Name", &mut errors).unwrap();
        assert_eq!(title["title"][0]["text"]["content"], "Milk");
        let select = property_payload("select", &json!("Dairy"), "Category", &mut errors).unwrap();
        assert_eq!(select["select"]["name"], "Dairy");
        assert!(errors.is_empty());
    }

    #[test]
    fn test_property_payload_unsupported_type() {
        let mut errors = Vec::new();
        assert!(property_payload("relation", &json!("x"), "Linked", &mut errors).is_none());
        assert_eq!(errors, vec!["Property 'Linked' type 'relation' not supported."]);
    }

    #[test]
    fn test_paragraph_blocks() {
        let mut errors = Vec::new();
        let blocks = paragraph_blocks(
            &[
                json!({"type": "paragraph", "text": "hello"}),
                json!({"type": "heading_1", "text": "nope"}),
                json!({"type": "paragraph"}),
            ],
            &mut errors,
        );
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0]["paragraph"]["rich_text"][0]["text"]["content"], "hello");
        assert_eq!(errors.len(), 2);
    }
}
