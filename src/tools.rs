//! Tool trait, registry, and built-in tool implementations.
//!
//! Every request handler in Steward is a [`Tool`]: a named, stateless
//! function with an OpenAI function-calling parameter schema, dispatched
//! through `POST /tools/{name}`. Built-in tools cover health, server info,
//! Notion lookups and edits, and webhook forwarding; the pantry-inventory,
//! nudge, and tool-request tools live in [`crate::pantry`], [`crate::nudge`],
//! and [`crate::tool_requests`]. Embedders can register custom Rust tools
//! alongside the built-ins via [`ToolRegistry::register`] and
//! [`crate::server::run_server_with_extensions`].
//!
//! All tools return the four-field [`Envelope`]; missing configuration is
//! reported inside the envelope (so agents can read it), while transport
//! failures propagate as errors for the server to classify.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::Config;
use crate::envelope::Envelope;
use crate::notion::{self, NotionClient};
use crate::nudge::GenerateNudgeTool;
use crate::pantry::PantryInventoryTool;
use crate::tool_requests::{ToolRequestsLatestTool, ToolRequestsSearchTool};
use crate::webhook;

/// A tool that agents can discover and call.
///
/// # Lifecycle
///
/// 1. The tool is registered via [`ToolRegistry::register`].
/// 2. [`name`](Tool::name), [`description`](Tool::description), and
///    [`parameters_schema`](Tool::parameters_schema) feed `GET /tools/list`.
/// 3. [`execute`](Tool::execute) runs per invocation with validated params.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name: a lowercase identifier with underscores, used as the
    /// route path (`POST /tools/{name}`).
    fn name(&self) -> &str;

    /// One-line description for agent discovery.
    fn description(&self) -> &str;

    /// Whether this tool ships with Steward. Defaults to `false` for
    /// custom registrations.
    fn is_builtin(&self) -> bool {
        false
    }

    /// OpenAI function-calling JSON Schema for parameters: an object with
    /// `type: "object"`, `properties`, and optionally `required`.
    fn parameters_schema(&self) -> Value;

    /// Execute with validated parameters.
    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Envelope>;
}

/// Per-invocation bridge to shared server state.
pub struct ToolContext {
    pub config: Arc<Config>,
}

impl ToolContext {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Construct a Notion client, failing if no token is configured.
    pub fn notion(&self) -> Result<NotionClient> {
        NotionClient::new(&self.config.notion)
    }
}

/// Tool metadata returned by `GET /tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub builtin: bool,
    pub parameters: Value,
}

/// Registry of tools, built-in and custom.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Create a registry pre-loaded with all built-in tools.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(HealthCheckTool));
        registry.register(Box::new(ServerInfoTool));
        registry.register(Box::new(NotionSearchTool));
        registry.register(Box::new(NotionGetPageTool));
        registry.register(Box::new(NotionUpdatePageTool));
        registry.register(Box::new(RecordMoodTool));
        registry.register(Box::new(LogEventTool));
        registry.register(Box::new(GenerateNudgeTool));
        registry.register(Box::new(ToolRequestsLatestTool));
        registry.register(Box::new(ToolRequestsSearchTool));
        registry.register(Box::new(PantryInventoryTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate request parameters against a tool's schema.
///
/// Checks required fields, primitive types, and enums, and injects schema
/// defaults for absent optional parameters. Returns the validated (and
/// defaulted) parameter object.
pub fn validate_params(schema: &Value, params: &Value) -> Result<Value> {
    let params_obj = params
        .as_object()
        .cloned()
        .unwrap_or_default();

    let properties = schema
        .get("properties")
        .and_then(|p| p.as_object())
        .cloned()
        .unwrap_or_default();

    let required: Vec<String> = schema
        .get("required")
        .and_then(|r| r.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default();

    for field in &required {
        if !params_obj.contains_key(field) {
            bail!("missing required parameter: {}", field);
        }
    }

    let mut result = params_obj.clone();

    for (prop_name, prop_schema) in &properties {
        if let Some(value) = params_obj.get(prop_name) {
            if let Some(expected) = prop_schema.get("type").and_then(|t| t.as_str()) {
                let type_ok = match expected {
                    "string" => value.is_string(),
                    "integer" => value.is_i64() || value.is_u64(),
                    "number" => value.is_number(),
                    "boolean" => value.is_boolean(),
                    "array" => value.is_array(),
                    "object" => value.is_object(),
                    _ => true,
                };
                if !type_ok {
                    bail!(
                        "parameter '{}' must be of type '{}', got {}",
                        prop_name,
                        expected,
                        json_type_name(value)
                    );
                }
            }
            if let Some(enum_values) = prop_schema.get("enum").and_then(|e| e.as_array()) {
                if !enum_values.contains(value) {
                    let allowed: Vec<String> =
                        enum_values.iter().map(|v| v.to_string()).collect();
                    bail!(
                        "parameter '{}' must be one of [{}], got {}",
                        prop_name,
                        allowed.join(", "),
                        value
                    );
                }
            }
        } else if let Some(default) = prop_schema.get("default") {
            result.insert(prop_name.clone(), default.clone());
        }
    }

    Ok(Value::Object(result))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============ health_check ============

/// Fallback health check for callers that cannot reach `GET /health`.
pub struct HealthCheckTool;

#[async_trait]
impl Tool for HealthCheckTool {
    fn name(&self) -> &str {
        "health_check"
    }

    fn description(&self) -> &str {
        "Check that the tool server is up"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _params: Value, _ctx: &ToolContext) -> Result<Envelope> {
        Ok(Envelope::ok("Health check ok.", json!({"ok": true})))
    }
}

// ============ server_info ============

/// Server metadata plus per-setting configuration provenance, so an agent
/// (or an operator) can see whether the deployment is actually configured.
pub struct ServerInfoTool;

#[async_trait]
impl Tool for ServerInfoTool {
    fn name(&self) -> &str {
        "server_info"
    }

    fn description(&self) -> &str {
        "Server metadata and configuration provenance"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _params: Value, ctx: &ToolContext) -> Result<Envelope> {
        Ok(Envelope::ok(
            "Server info.",
            json!({
                "version": env!("CARGO_PKG_VERSION"),
                "hostname": hostname(),
                "time_utc": Utc::now().to_rfc3339(),
                "config_provenance": ctx.config.provenance(),
            }),
        ))
    }
}

fn hostname() -> String {
    std::fs::read_to_string("/proc/sys/kernel/hostname")
        .map(|s| s.trim().to_string())
        .or_else(|_| std::env::var("HOSTNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

// ============ notion_search ============

pub struct NotionSearchTool;

#[async_trait]
impl Tool for NotionSearchTool {
    fn name(&self) -> &str {
        "notion_search"
    }

    fn description(&self) -> &str {
        "Search Notion pages by text query"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
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
        let client = match ctx.notion() {
            Ok(client) => client,
            Err(e) => return Ok(notion_unconfigured("Notion search", e)),
        };

        let limit = params["limit"].as_u64().unwrap_or(10) as usize;
        match client.search_pages(query, limit).await {
            Ok(items) => Ok(Envelope::ok(
                format!("Found {} Notion page(s) for query '{}'.", items.len(), query),
                json!({"items": items}),
            )),
            Err(e) => Ok(Envelope::failed(
                "Failed to search Notion.",
                json!({"items": []}),
                vec![e.to_string()],
            )
            .with_next_actions(["Check Notion token and permissions."])),
        }
    }
}

/// Envelope for Notion tools when the integration token is absent.
fn notion_unconfigured(what: &str, err: anyhow::Error) -> Envelope {
    Envelope::failed(
        format!("Missing configuration for {}.", what),
        json!({}),
        vec![err.to_string()],
    )
    .with_next_actions(["Set NOTION_TOKEN on the server."])
}

// ============ notion_get_page ============

pub struct NotionGetPageTool;

#[async_trait]
impl Tool for NotionGetPageTool {
    fn name(&self) -> &str {
        "notion_get_page"
    }

    fn description(&self) -> &str {
        "Fetch a Notion page and summarize its properties"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page_id": { "type": "string", "description": "Notion page id" }
            },
            "required": ["page_id"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Envelope> {
        let page_id = params["page_id"].as_str().unwrap_or("").trim();
        if page_id.is_empty() {
            return Ok(Envelope::failed(
                "page_id is required.",
                json!({"page": null}),
                vec!["page_id is required.".to_string()],
            ));
        }
        let client = match ctx.notion() {
            Ok(client) => client,
            Err(e) => return Ok(notion_unconfigured("Notion page fetch", e)),
        };

        match client.get_page(page_id).await {
            Ok(page) => {
                let summary = notion::summarize_page(&page);
                Ok(Envelope::ok(
                    format!(
                        "Fetched Notion page '{}'.",
                        summary["title"].as_str().unwrap_or("")
                    ),
                    json!({"page": summary}),
                ))
            }
            Err(e) => Ok(Envelope::failed(
                "Failed to fetch Notion page.",
                json!({"page": null}),
                vec![e.to_string()],
            )
            .with_next_actions(["Check Notion token, page id, and permissions."])),
        }
    }
}

// ============ notion_update_page ============

/// Dry-run-first page editor: previews property patches and appended
/// paragraph blocks, and applies them only with `dry_run=false` and
/// `confirm=true`.
pub struct NotionUpdatePageTool;

#[async_trait]
impl Tool for NotionUpdatePageTool {
    fn name(&self) -> &str {
        "notion_update_page"
    }

    fn description(&self) -> &str {
        "Preview or apply property updates and appended blocks on a Notion page"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "page_id": { "type": "string", "description": "Notion page id" },
                "updates": {
                    "type": "object",
                    "description": "Optional `title`, `properties` map, and `append_blocks` array"
                },
                "dry_run": { "type": "boolean", "default": true },
                "confirm": { "type": "boolean", "default": false }
            },
            "required": ["page_id", "updates"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Envelope> {
        let page_id = params["page_id"].as_str().unwrap_or("").trim().to_string();
        let updates = params["updates"].clone();
        let dry_run = params["dry_run"].as_bool().unwrap_or(true);
        let confirm = params["confirm"].as_bool().unwrap_or(false);

        if page_id.is_empty() {
            return Ok(Envelope::failed(
                "page_id is required.",
                json!({}),
                vec!["page_id is required.".to_string()],
            ));
        }
        if !dry_run && !confirm {
            return Ok(Envelope::failed(
                "Writes require confirm=true.",
                json!({}),
                vec!["Writes require confirm=true.".to_string()],
            )
            .with_next_actions(["Re-run with dry_run=false and confirm=true to apply."]));
        }
        let client = match ctx.notion() {
            Ok(client) => client,
            Err(e) => return Ok(notion_unconfigured("Notion update", e)),
        };

        let page = match client.get_page(&page_id).await {
            Ok(page) => page,
            Err(e) => {
                return Ok(Envelope::failed(
                    "Failed to fetch Notion page.",
                    json!({}),
                    vec![e.to_string()],
                )
                .with_next_actions(["Check Notion token, page id, and permissions."]));
            }
        };

        let mut errors = Vec::new();
        let before = notion::summarize_page(&page);
        let empty = serde_json::Map::new();
        let props = page["properties"].as_object().unwrap_or(&empty);

        let mut payload = serde_json::Map::new();

        if let Some(title) = updates.get("title").filter(|t| !t.is_null()) {
            match notion::title_property_name(props) {
                Some(title_prop) => {
                    if let Some(patch) =
                        notion::property_payload("title", title, title_prop, &mut errors)
                    {
                        payload.insert(title_prop.to_string(), patch);
                    }
                }
                None => errors.push("No title property found on page.".to_string()),
            }
        }

        if let Some(prop_updates) = updates.get("properties").and_then(|p| p.as_object()) {
            for (prop_name, value) in prop_updates {
                let Some(prop) = props.get(prop_name) else {
                    errors.push(format!(
                        "Property '{}' does not exist on this page.",
                        prop_name
                    ));
                    continue;
                };
                let prop_type = prop["type"].as_str().unwrap_or("unknown");
                if let Some(patch) = notion::property_payload(prop_type, value, prop_name, &mut errors)
                {
                    payload.insert(prop_name.clone(), patch);
                }
            }
        }

        let append_blocks = updates
            .get("append_blocks")
            .and_then(|b| b.as_array())
            .cloned()
            .unwrap_or_default();
        let blocks = notion::paragraph_blocks(&append_blocks, &mut errors);

        if dry_run {
            return Ok(Envelope::ok(
                "Dry-run: Notion update preview generated.",
                json!({
                    "page_id": page_id,
                    "url": page["url"],
                    "dry_run": true,
                    "before": before,
                    "proposed_properties": payload,
                    "append_blocks_count": blocks.len(),
                }),
            )
            .with_next_actions(["Re-run with dry_run=false and confirm=true to apply."])
            .with_errors(errors));
        }

        let mut after_page = page;
        if !payload.is_empty() {
            match client
                .update_page_properties(&page_id, Value::Object(payload.clone()))
                .await
            {
                Ok(updated) => after_page = updated,
                Err(e) => errors.push(e.to_string()),
            }
        }
        let blocks_count = blocks.len();
        if !blocks.is_empty() {
            if let Err(e) = client.append_blocks(&page_id, blocks).await {
                errors.push(e.to_string());
            }
        }

        let summary = if errors.is_empty() {
            "Updated Notion page."
        } else {
            "Update completed with warnings."
        };
        Ok(Envelope::ok(
            summary,
            json!({
                "page_id": page_id,
                "url": after_page["url"],
                "dry_run": false,
                "before": before,
                "after": notion::summarize_page(&after_page),
                "updated_properties": payload.keys().collect::<Vec<_>>(),
                "append_blocks_count": blocks_count,
            }),
        )
        .with_errors(errors))
    }
}

// ============ record_mood ============

/// Forward a mood snapshot to the configured automation webhook.
pub struct RecordMoodTool;

#[async_trait]
impl Tool for RecordMoodTool {
    fn name(&self) -> &str {
        "record_mood"
    }

    fn description(&self) -> &str {
        "Forward a mood snapshot to the mood webhook"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "mood": { "type": "string", "description": "Mood description" },
                "source": { "type": "string", "default": "steward" },
                "timestamp": { "type": "string" },
                "reaction": { "type": "string" },
                "action": { "type": "string" },
                "reason": { "type": "string" }
            },
            "required": ["mood"]
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Envelope> {
        let Some(url) = ctx.config.webhooks.mood_url.clone() else {
            return Ok(Envelope::failed(
                "Mood webhook is not configured.",
                json!({}),
                vec!["MOOD_MEMORY_WEBHOOK_URL is not set on the server.".to_string()],
            )
            .with_next_actions(["Set MOOD_MEMORY_WEBHOOK_URL to enable mood forwarding."]));
        };

        // Forwarded as-is; field mapping is owned by the automation side.
        let payload = json!({
            "timestamp": params["timestamp"],
            "mood": params["mood"],
            "source": params["source"],
            "poke_reaction": params["reaction"],
            "poke_action": params["action"],
            "poke_reason": params["reason"],
        });

        match webhook::forward(&url, &payload, ctx.config.webhooks.timeout_secs).await {
            Ok(outcome) => Ok(Envelope::ok(
                if outcome.ok {
                    "Mood snapshot forwarded."
                } else {
                    "Mood webhook responded with an error status."
                },
                serde_json::to_value(&outcome)?,
            )),
            Err(e) => Ok(Envelope::failed(
                "Failed to reach mood webhook.",
                json!({}),
                vec![e.to_string()],
            )),
        }
    }
}

// ============ log_event ============

/// Forward a serendipity-event payload to the configured webhook.
pub struct LogEventTool;

#[async_trait]
impl Tool for LogEventTool {
    fn name(&self) -> &str {
        "log_event"
    }

    fn description(&self) -> &str {
        "Forward a serendipity event to the event webhook"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "event_type": { "type": "string" },
                "message_to_user": { "type": "string" },
                "mood_timestamp": { "type": "string" },
                "mood_input": { "type": "string" },
                "source": { "type": "string", "default": "steward" },
                "action": { "type": "string" },
                "reason": { "type": "string" },
                "tags": { "type": "array" },
                "event_timestamp": { "type": "string" }
            },
            "required": []
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Envelope> {
        let Some(url) = ctx.config.webhooks.event_url.clone() else {
            return Ok(Envelope::failed(
                "Event webhook is not configured.",
                json!({}),
                vec!["SERENDIPITY_EVENT_WEBHOOK_URL is not set on the server.".to_string()],
            )
            .with_next_actions(["Set SERENDIPITY_EVENT_WEBHOOK_URL to enable event logging."]));
        };

        let payload = json!({
            "event_timestamp": params["event_timestamp"],
            "mood_timestamp": params["mood_timestamp"],
            "mood_input": params["mood_input"],
            "source": params["source"],
            "event_type": params["event_type"],
            "message_to_user": params["message_to_user"],
            "poke_action": params["action"],
            "poke_reason": params["reason"],
            "tags": params.get("tags").cloned().unwrap_or_else(|| json!([])),
        });

        match webhook::forward(&url, &payload, ctx.config.webhooks.timeout_secs).await {
            Ok(outcome) => Ok(Envelope::ok(
                if outcome.ok {
                    "Event logged."
                } else {
                    "Event webhook responded with an error status."
                },
                serde_json::to_value(&outcome)?,
            )),
            Err(e) => Ok(Envelope::failed(
                "Failed to reach event webhook.",
                json!({}),
                vec![e.to_string()],
            )),
        }
    }
}
