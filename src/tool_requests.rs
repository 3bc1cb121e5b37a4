//! Tool-request backlog lookups.
//!
//! Two read-only tools over a Notion "Tool Requests" database: the latest
//! entries filtered by status, and a keyword search across title and
//! description fields. Filter construction and row extraction are pure
//! helpers; the query itself is one unpaginated Notion database query with
//! a bounded page size.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::envelope::Envelope;
use crate::notion::{self, NotionClient};
use crate::tools::{Tool, ToolContext};

const DEFAULT_STATUSES: &[&str] = &["new", "triaging"];

/// Build the Notion status filter for a set of `Status` select values.
/// Blank entries are dropped; an all-blank set yields no filter.
pub fn status_filter(statuses: &[String]) -> Option<Value> {
    let cleaned: Vec<&str> = statuses
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    match cleaned.as_slice() {
        [] => None,
        [only] => Some(json!({"property": "Status", "select": {"equals": only}})),
        many => Some(json!({
            "or": many
                .iter()
                .map(|status| json!({"property": "Status", "select": {"equals": status}}))
                .collect::<Vec<_>>()
        })),
    }
}

/// Keyword filter across the title and description properties.
pub fn search_filter(query: &str) -> Value {
    json!({
        "or": [
            {"property": "Title", "title": {"contains": query}},
            {"property": "Description", "rich_text": {"contains": query}},
            {"property": "Desired outcome", "rich_text": {"contains": query}},
        ]
    })
}

fn extract_rich_text(props: &Map<String, Value>, name: &str) -> String {
    props
        .get(name)
        .map(|prop| notion::plain_text(&prop["rich_text"]))
        .unwrap_or_default()
}

fn extract_select(props: &Map<String, Value>, name: &str) -> String {
    props
        .get(name)
        .and_then(|prop| prop["select"]["name"].as_str())
        .unwrap_or("")
        .to_string()
}

fn extract_multi_select(props: &Map<String, Value>, name: &str) -> Vec<String> {
    props
        .get(name)
        .and_then(|prop| prop["multi_select"].as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item["name"].as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// Reduce one database row to the request fields agents care about.
pub fn request_item(page: &Value) -> Value {
    let empty = Map::new();
    let props = page["properties"].as_object().unwrap_or(&empty);
    json!({
        "id": page["id"],
        "title": notion::page_title(page),
        "description": extract_rich_text(props, "Description"),
        "created_time": page["created_time"],
        "status": extract_select(props, "Status"),
        "source": extract_select(props, "Source"),
        "desired_outcome": extract_rich_text(props, "Desired outcome"),
        "domain": extract_multi_select(props, "Domain"),
        "impact": extract_select(props, "Impact"),
        "frequency": extract_select(props, "Frequency"),
        "url": page["url"],
    })
}

/// One-line result summary naming up to the first three titles.
pub fn summarize(items: &[Value], label: &str) -> String {
    let titles: Vec<&str> = items
        .iter()
        .take(3)
        .map(|item| match item["title"].as_str() {
            Some(title) if !title.is_empty() => title,
            _ => "Untitled",
        })
        .collect();
    if titles.is_empty() {
        format!("{}: {} item(s).", label, items.len())
    } else {
        format!("{}: {} item(s). Top: {}.", label, items.len(), titles.join("; "))
    }
}

/// Resolve the Notion client and tool-request database id, or describe what
/// is missing.
fn request_backend(ctx: &ToolContext) -> std::result::Result<(NotionClient, String), Envelope> {
    let mut errors = Vec::new();
    let client = match ctx.notion() {
        Ok(client) => Some(client),
        Err(e) => {
            errors.push(e.to_string());
            None
        }
    };
    let database_id = ctx.config.tool_requests.database_id.clone();
    if database_id.is_none() {
        errors.push("TOOL_REQUESTS_DB_ID is not set on the server.".to_string());
    }
    match (client, database_id) {
        (Some(client), Some(database_id)) => Ok((client, database_id)),
        _ => Err(Envelope::failed(
            "Missing configuration for Notion access.",
            json!({"items": []}),
            errors,
        )
        .with_next_actions(["Set NOTION_TOKEN and TOOL_REQUESTS_DB_ID."])),
    }
}

async fn run_query(
    client: &NotionClient,
    database_id: &str,
    payload: &Value,
    label: &str,
    failure_summary: &str,
) -> Result<Envelope> {
    match client.query_database_once(database_id, payload).await {
        Ok(data) => {
            let items: Vec<Value> = data["results"]
                .as_array()
                .map(|results| results.iter().map(request_item).collect())
                .unwrap_or_default();
            Ok(Envelope::ok(
                summarize(&items, label),
                json!({"items": items}),
            ))
        }
        Err(e) => Ok(Envelope::failed(
            failure_summary,
            json!({"items": []}),
            vec![e.to_string()],
        )
        .with_next_actions(["Check Notion token, database id, and permissions."])),
    }
}

// ============ tool_requests_latest ============

/// Most recent tool requests, filtered by status.
pub struct ToolRequestsLatestTool;

#[async_trait]
impl Tool for ToolRequestsLatestTool {
    fn name(&self) -> &str {
        "tool_requests_latest"
    }

    fn description(&self) -> &str {
        "List the latest tool requests, filtered by status"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": { "type": "integer", "description": "Max results", "default": 10 },
                "statuses": {
                    "type": "array",
                    "description": "Status select values to include (default: new, triaging)"
                }
            }
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Envelope> {
        let (client, database_id) = match request_backend(ctx) {
            Ok(backend) => backend,
            Err(envelope) => return Ok(envelope),
        };

        let limit = params["limit"].as_u64().unwrap_or(10) as usize;
        let statuses: Vec<String> = params["statuses"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_else(|| DEFAULT_STATUSES.iter().map(|s| s.to_string()).collect());

        let mut payload = json!({
            "page_size": limit.clamp(1, 50),
            "sorts": [{"timestamp": "created_time", "direction": "descending"}],
        });
        if let Some(filter) = status_filter(&statuses) {
            payload["filter"] = filter;
        }

        run_query(
            &client,
            &database_id,
            &payload,
            "Latest tool requests",
            "Failed to fetch tool requests.",
        )
        .await
    }
}

// ============ tool_requests_search ============

/// Keyword search across tool-request titles and descriptions.
pub struct ToolRequestsSearchTool;

#[async_trait]
impl Tool for ToolRequestsSearchTool {
    fn name(&self) -> &str {
        "tool_requests_search"
    }

    fn description(&self) -> &str {
        "Search tool requests by keyword across title and description"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search keyword" },
                "limit": { "type": "integer", "description": "Max results", "default": 10 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Envelope> {
        let query = params["query"].as_str().unwrap_or("").trim();
        if query.is_empty() {
            return Ok(Envelope::failed(
                "query is required.",
                json!({"items": []}),
                vec!["query is required.".to_string()],
            )
            .with_next_actions(["Provide a non-empty query."]));
        }
        let (client, database_id) = match request_backend(ctx) {
            Ok(backend) => backend,
            Err(envelope) => return Ok(envelope),
        };

        let limit = params["limit"].as_u64().unwrap_or(10) as usize;
        let payload = json!({
            "page_size": limit.clamp(1, 50),
            "filter": search_filter(query),
            "sorts": [{"timestamp": "created_time", "direction": "descending"}],
        });

        run_query(
            &client,
            &database_id,
            &payload,
            "Search results",
            "Failed to search tool requests.",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, RawConfig};
    use std::sync::Arc;

    fn offline_ctx() -> ToolContext {
        let config = resolve(RawConfig::default(), &|_| None).unwrap();
        ToolContext::new(Arc::new(config))
    }

    fn sample_row() -> Value {
        json!({
            "id": "req-1",
            "url": "https://notion.so/req-1",
            "created_time": "2026-08-10T09:00:00.000Z",
            "properties": {
                "Title": {"type": "title", "title": [{"plain_text": "Grocery sync"}]},
                "Description": {
                    "type": "rich_text",
                    "rich_text": [{"plain_text": "Sync the grocery list"}],
                },
                "Status": {"type": "select", "select": {"name": "new"}},
                "Domain": {
                    "type": "multi_select",
                    "multi_select": [{"name": "pantry"}, {"name": "notion"}],
                },
            },
        })
    }

    #[test]
    fn test_status_filter_shapes() {
        assert!(status_filter(&[]).is_none());
        assert!(status_filter(&["  ".to_string()]).is_none());

        let single = status_filter(&["new".to_string()]).unwrap();
        assert_eq!(single["select"]["equals"], "new");

        let multi = status_filter(&["new".to_string(), "triaging".to_string()]).unwrap();
        assert_eq!(multi["or"].as_array().unwrap().len(), 2);
        assert_eq!(multi["or"][1]["select"]["equals"], "triaging");
    }

    #[test]
    fn test_search_filter_covers_title_and_descriptions() {
        let filter = search_filter("grocery");
        let branches = filter["or"].as_array().unwrap();
        assert_eq!(branches.len(), 3);
        assert_eq!(branches[0]["title"]["contains"], "grocery");
        assert_eq!(branches[1]["rich_text"]["contains"], "grocery");
    }

    #[test]
    fn test_request_item_extraction() {
        let item = request_item(&sample_row());
        assert_eq!(item["title"], "Grocery sync");
        assert_eq!(item["description"], "Sync the grocery list");
        assert_eq!(item["status"], "new");
        assert_eq!(item["domain"], json!(["pantry", "notion"]));
        assert_eq!(item["impact"], "");
    }

    #[test]
    fn test_summarize_names_top_titles() {
        let items: Vec<Value> = (0..5)
            .map(|i| json!({"title": format!("Request {}", i)}))
            .collect();
        assert_eq!(
            summarize(&items, "Latest tool requests"),
            "Latest tool requests: 5 item(s). Top: Request 0; Request 1; Request 2."
        );
        assert_eq!(summarize(&[], "Search results"), "Search results: 0 item(s).");
        assert_eq!(
            summarize(&[json!({"title": ""})], "Search results"),
            "Search results: 1 item(s). Top: Untitled."
        );
    }

    #[tokio::test]
    async fn test_latest_without_config_reports_both_settings() {
        let envelope = ToolRequestsLatestTool
            .execute(json!({}), &offline_ctx())
            .await
            .unwrap();
        assert_eq!(envelope.summary, "Missing configuration for Notion access.");
        assert!(envelope.errors.iter().any(|e| e.contains("NOTION_TOKEN")));
        assert!(envelope
            .errors
            .iter()
            .any(|e| e.contains("TOOL_REQUESTS_DB_ID")));
    }

    #[tokio::test]
    async fn test_search_requires_query() {
        let envelope = ToolRequestsSearchTool
            .execute(json!({"query": "  "}), &offline_ctx())
            .await
            .unwrap();
        assert_eq!(envelope.summary, "query is required.");
    }
}
