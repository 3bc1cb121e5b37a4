//! Pantry inventory tool: receipt parsing plus fuzzy upsert into Notion.
//!
//! The tool is the caller side of the upsert engine's contract: it builds
//! the incoming batch (structured `items` and/or parsed `receipt_text`),
//! fetches the existing snapshot from the pantry database, invokes
//! [`crate::engine::process`], and (only with `dry_run=false` and
//! `confirm=true`) applies the resulting change set with one Notion write
//! per entry. Write failures are reported per item without discarding the
//! entries that succeeded.
//!
//! Two concurrent invocations may both decide to create the same new item;
//! serializing writes per store is the operator's concern, not this tool's.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::config::PropertyMap;
use crate::engine;
use crate::envelope::Envelope;
use crate::models::{ExistingRecord, IncomingRecord, PendingCreate, PendingUpdate};
use crate::notion::{self, NotionClient};
use crate::receipt::parse_receipt_text;
use crate::report::{format_report, AppliedRef, ApplyOutcome};
use crate::tools::{Tool, ToolContext};

pub struct PantryInventoryTool;

#[async_trait]
impl Tool for PantryInventoryTool {
    fn name(&self) -> &str {
        "pantry_inventory"
    }

    fn description(&self) -> &str {
        "Parse receipt items and upsert them into the pantry database"
    }

    fn is_builtin(&self) -> bool {
        true
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "receipt_text": { "type": "string", "description": "Raw receipt text, one item per line" },
                "items": { "type": "array", "description": "Structured items: objects with name, quantity, unit, category, notes, price" },
                "store": { "type": "string", "description": "Store name applied to items that lack one" },
                "purchase_date": { "type": "string", "description": "Purchase date (YYYY-MM-DD) applied to items that lack one" },
                "dry_run": { "type": "boolean", "default": true },
                "confirm": { "type": "boolean", "default": false },
                "threshold": { "type": "number", "description": "Similarity threshold override in [0, 1]" }
            },
            "required": []
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<Envelope> {
        let receipt_text = params["receipt_text"].as_str();
        let items_param = params["items"].as_array();
        let dry_run = params["dry_run"].as_bool().unwrap_or(true);
        let confirm = params["confirm"].as_bool().unwrap_or(false);

        if receipt_text.map_or(true, |t| t.trim().is_empty()) && items_param.is_none() {
            return Ok(Envelope::failed(
                "Missing required inputs.",
                json!({"created": [], "updated": [], "duplicates": []}),
                vec!["Provide receipt_text or items.".to_string()],
            )
            .with_next_actions(["Provide receipt_text or items."]));
        }
        if !dry_run && !confirm {
            return Ok(Envelope::failed(
                "Writes require confirm=true.",
                json!({}),
                vec!["Writes require confirm=true.".to_string()],
            )
            .with_next_actions(["Re-run with dry_run=false and confirm=true to apply."]));
        }

        let mut input_errors = Vec::new();
        let mut batch = Vec::new();
        if let Some(items) = items_param {
            for (index, item) in items.iter().enumerate() {
                match serde_json::from_value::<IncomingRecord>(item.clone()) {
                    Ok(record) => batch.push(record),
                    Err(_) => {
                        input_errors.push(format!("items[{}]: must be an object with a name", index))
                    }
                }
            }
        }
        if let Some(text) = receipt_text {
            batch.extend(parse_receipt_text(text));
        }

        let store = params["store"].as_str();
        let purchase_date = params["purchase_date"].as_str();
        for record in &mut batch {
            if record.store.is_none() {
                record.store = store.map(|s| s.to_string());
            }
            if record.purchase_date.is_none() {
                record.purchase_date = purchase_date.map(|s| s.to_string());
            }
        }

        let threshold = params["threshold"]
            .as_f64()
            .unwrap_or(ctx.config.pantry.threshold);
        let database_id = ctx.config.pantry.database_id.clone();
        let client = ctx.notion().ok();

        match (client, database_id) {
            (Some(client), Some(database_id)) if !dry_run => {
                self.apply(ctx, &batch, threshold, &client, &database_id, input_errors)
                    .await
            }
            (client, database_id) => {
                self.preview(ctx, &batch, threshold, client, database_id, input_errors)
                    .await
            }
        }
    }
}

impl PantryInventoryTool {
    /// Dry-run preview. Uses the real existing snapshot when Notion is
    /// configured, an empty one otherwise (with the missing configuration
    /// reported so the caller knows the preview could not check the store).
    async fn preview(
        &self,
        ctx: &ToolContext,
        batch: &[IncomingRecord],
        threshold: f64,
        client: Option<NotionClient>,
        database_id: Option<String>,
        mut input_errors: Vec<String>,
    ) -> Result<Envelope> {
        let existing = match (&client, &database_id) {
            (Some(client), Some(database_id)) => {
                match fetch_existing(client, database_id, ctx).await {
                    Ok(existing) => existing,
                    Err(e) => {
                        return Ok(Envelope::failed(
                            "Failed to load pantry database.",
                            json!({}),
                            vec![e.to_string()],
                        )
                        .with_next_actions(["Verify PANTRY_DB_ID and permissions."]));
                    }
                }
            }
            _ => {
                if client.is_none() {
                    input_errors.push("NOTION_TOKEN not set; cannot write to Notion.".to_string());
                }
                if database_id.is_none() {
                    input_errors.push("PANTRY_DB_ID not set; cannot write to Notion.".to_string());
                }
                Vec::new()
            }
        };

        let change_set = engine::process(batch, &existing, threshold)?;
        let mut report = format_report(&change_set, &ApplyOutcome::dry_run());
        report.errors.extend(input_errors);
        Ok(report)
    }

    /// Apply the change set against the pantry database, one write per
    /// entry, collecting per-item failures.
    async fn apply(
        &self,
        ctx: &ToolContext,
        batch: &[IncomingRecord],
        threshold: f64,
        client: &NotionClient,
        database_id: &str,
        input_errors: Vec<String>,
    ) -> Result<Envelope> {
        let database = match client.get_database(database_id).await {
            Ok(database) => database,
            Err(e) => {
                return Ok(Envelope::failed(
                    "Failed to load pantry database.",
                    json!({}),
                    vec![e.to_string()],
                )
                .with_next_actions(["Verify PANTRY_DB_ID and permissions."]));
            }
        };
        let empty = Map::new();
        let schema = database["properties"].as_object().unwrap_or(&empty);
        if notion::title_property_name(schema).is_none() {
            return Ok(Envelope::failed(
                "Pantry database missing title property.",
                json!({}),
                vec!["No title property found.".to_string()],
            )
            .with_next_actions(["Ensure the pantry database has a title property."]));
        }

        let existing = match fetch_existing(client, database_id, ctx).await {
            Ok(existing) => existing,
            Err(e) => {
                return Ok(Envelope::failed(
                    "Failed to load pantry database.",
                    json!({}),
                    vec![e.to_string()],
                )
                .with_next_actions(["Verify PANTRY_DB_ID and permissions."]));
            }
        };

        let change_set = engine::process(batch, &existing, threshold)?;
        let properties = &ctx.config.pantry.properties;

        let mut outcome = ApplyOutcome {
            applied: true,
            ..Default::default()
        };

        for entry in &change_set.to_create {
            let mut payload_errors = Vec::new();
            let payload = create_properties(schema, properties, entry, &mut payload_errors);
            outcome.write_errors.extend(payload_errors);
            match client.create_page(database_id, payload).await {
                Ok((id, url)) => outcome.created.push(AppliedRef {
                    batch_index: entry.batch_index,
                    id,
                    url,
                }),
                Err(e) => outcome
                    .write_errors
                    .push(format!("create '{}': {}", entry.record.name, e)),
            }
        }

        for entry in &change_set.to_update {
            let mut payload_errors = Vec::new();
            let payload = update_properties(schema, properties, entry, &mut payload_errors);
            outcome.write_errors.extend(payload_errors);
            match client
                .update_page_properties(&entry.existing_id, payload)
                .await
            {
                Ok(page) => outcome.updated.push(AppliedRef {
                    batch_index: entry.batch_index,
                    id: entry.existing_id.clone(),
                    url: page["url"].as_str().map(|s| s.to_string()),
                }),
                Err(e) => outcome
                    .write_errors
                    .push(format!("update '{}': {}", entry.record.name, e)),
            }
        }

        let mut report = format_report(&change_set, &outcome);
        report.errors.extend(input_errors);
        Ok(report)
    }
}

/// Fetch the existing pantry snapshot, bounded by the configured cap.
async fn fetch_existing(
    client: &NotionClient,
    database_id: &str,
    ctx: &ToolContext,
) -> Result<Vec<ExistingRecord>> {
    let pages = client
        .query_database(database_id, ctx.config.pantry.fetch_cap)
        .await?;
    Ok(pages
        .iter()
        .filter_map(|page| notion::existing_record_from_page(page, &ctx.config.pantry.properties))
        .collect())
}

/// Build the Notion property payload for a create, mapping record fields
/// through the configured property map and the database schema. Properties
/// missing from the schema are skipped silently; uncoercible values are
/// reported.
fn create_properties(
    schema: &Map<String, Value>,
    properties: &PropertyMap,
    entry: &PendingCreate,
    errors: &mut Vec<String>,
) -> Value {
    let mut payload = Map::new();
    let record = &entry.record;

    let title_prop = notion::title_property_name(schema).unwrap_or(&properties.name);
    set_property(
        &mut payload,
        schema,
        title_prop,
        &json!(record.name),
        errors,
    );
    set_property(
        &mut payload,
        schema,
        &properties.quantity,
        &json!(entry.quantity),
        errors,
    );

    let optional: [(&str, Option<&String>); 5] = [
        (&properties.unit, record.unit.as_ref()),
        (&properties.category, record.category.as_ref()),
        (&properties.store, record.store.as_ref()),
        (&properties.purchase_date, record.purchase_date.as_ref()),
        (&properties.notes, record.notes.as_ref()),
    ];
    for (prop_name, value) in optional {
        if let Some(value) = value {
            set_property(&mut payload, schema, prop_name, &json!(value), errors);
        }
    }

    Value::Object(payload)
}

/// Build the Notion property payload for an update: merged quantity, plus
/// merged notes when the incoming record contributed any.
fn update_properties(
    schema: &Map<String, Value>,
    properties: &PropertyMap,
    entry: &PendingUpdate,
    errors: &mut Vec<String>,
) -> Value {
    let mut payload = Map::new();
    set_property(
        &mut payload,
        schema,
        &properties.quantity,
        &json!(entry.merged_quantity),
        errors,
    );
    if let Some(notes) = &entry.merged_notes {
        set_property(&mut payload, schema, &properties.notes, &json!(notes), errors);
    }
    Value::Object(payload)
}

fn set_property(
    payload: &mut Map<String, Value>,
    schema: &Map<String, Value>,
    prop_name: &str,
    value: &Value,
    errors: &mut Vec<String>,
) {
    let Some(prop) = schema.get(prop_name) else {
        return;
    };
    let prop_type = prop["type"].as_str().unwrap_or("unknown");
    if let Some(built) = notion::property_payload(prop_type, value, prop_name, errors) {
        payload.insert(prop_name.to_string(), built);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, RawConfig};
    use std::sync::Arc;

    fn pantry_schema() -> Map<String, Value> {
        json!({
            "Name": {"type": "title"},
            "Quantity": {"type": "number"},
            "Category": {"type": "select"},
            "Store": {"type": "rich_text"},
            "Purchase Date": {"type": "date"},
            "Notes": {"type": "rich_text"},
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn test_ctx() -> ToolContext {
        let config = resolve(RawConfig::default(), &|_| None).unwrap();
        ToolContext::new(Arc::new(config))
    }

    #[test]
    fn test_create_properties_maps_fields() {
        let mut errors = Vec::new();
        let entry = PendingCreate {
            batch_index: 0,
            record: IncomingRecord {
                quantity: Some(2.0),
                category: Some("Fruit".to_string()),
                store: Some("Co-op".to_string()),
                purchase_date: Some("2026-08-20".to_string()),
                ..IncomingRecord::named("Bananas")
            },
            quantity: 3.0,
        };
        let payload = create_properties(&pantry_schema(), &PropertyMap::default(), &entry, &mut errors);

        assert_eq!(payload["Name"]["title"][0]["text"]["content"], "Bananas");
        // The pending quantity (with absorbed duplicates), not the raw field.
        assert_eq!(payload["Quantity"]["number"], 3.0);
        assert_eq!(payload["Category"]["select"]["name"], "Fruit");
        assert_eq!(payload["Purchase Date"]["date"]["start"], "2026-08-20");
        assert!(errors.is_empty());
        // Unit is absent from the record and from the payload.
        assert!(payload.get("Unit").is_none());
    }

    #[test]
    fn test_create_properties_skips_missing_schema_props() {
        let mut errors = Vec::new();
        let schema = json!({"Name": {"type": "title"}}).as_object().cloned().unwrap();
        let entry = PendingCreate {
            batch_index: 0,
            record: IncomingRecord {
                quantity: Some(1.0),
                category: Some("Dairy".to_string()),
                ..IncomingRecord::named("Milk")
            },
            quantity: 1.0,
        };
        let payload = create_properties(&schema, &PropertyMap::default(), &entry, &mut errors);
        assert!(payload.get("Category").is_none());
        assert!(payload.get("Quantity").is_none());
        assert!(errors.is_empty());
    }

    #[test]
    fn test_update_properties() {
        let mut errors = Vec::new();
        let entry = PendingUpdate {
            batch_index: 0,
            record: IncomingRecord::named("Bananas"),
            existing_id: "p1".to_string(),
            matched_name: "Bananas".to_string(),
            score: 1.0,
            merged_quantity: 5.0,
            merged_notes: Some("from the market\nprice: $1.99".to_string()),
        };
        let payload = update_properties(&pantry_schema(), &PropertyMap::default(), &entry, &mut errors);
        assert_eq!(payload["Quantity"]["number"], 5.0);
        assert_eq!(
            payload["Notes"]["rich_text"][0]["text"]["content"],
            "from the market\nprice: $1.99"
        );
    }

    #[tokio::test]
    async fn test_missing_inputs() {
        let envelope = PantryInventoryTool
            .execute(json!({}), &test_ctx())
            .await
            .unwrap();
        assert_eq!(envelope.summary, "Missing required inputs.");
        assert_eq!(envelope.errors, vec!["Provide receipt_text or items."]);
    }

    #[tokio::test]
    async fn test_write_requires_confirm() {
        let envelope = PantryInventoryTool
            .execute(
                json!({"receipt_text": "BANANAS 1.99", "dry_run": false}),
                &test_ctx(),
            )
            .await
            .unwrap();
        assert_eq!(envelope.errors, vec!["Writes require confirm=true."]);
    }

    #[tokio::test]
    async fn test_dry_run_without_notion_reports_config() {
        let envelope = PantryInventoryTool
            .execute(
                json!({"receipt_text": "2 x MILK 3.49\nBANANAS 1.99\nTOTAL 5.48"}),
                &test_ctx(),
            )
            .await
            .unwrap();
        assert!(envelope.summary.starts_with("Parsed 2 item(s). Created 2."));
        assert!(envelope.summary.ends_with("Dry-run preview."));
        assert_eq!(envelope.result["created"].as_array().unwrap().len(), 2);
        assert!(envelope
            .errors
            .iter()
            .any(|e| e.contains("NOTION_TOKEN not set")));
        assert!(envelope
            .errors
            .iter()
            .any(|e| e.contains("PANTRY_DB_ID not set")));
    }

    #[tokio::test]
    async fn test_dry_run_merges_batch_duplicates() {
        let envelope = PantryInventoryTool
            .execute(
                json!({
                    "items": [
                        {"name": "Milk", "quantity": 2},
                        {"name": "milk", "quantity": 1}
                    ]
                }),
                &test_ctx(),
            )
            .await
            .unwrap();
        assert!(envelope
            .summary
            .starts_with("Parsed 2 item(s). Created 1. Updated 0. Merged 1 duplicate(s)."));
        assert_eq!(envelope.result["created"][0]["quantity"], 3.0);
    }

    #[tokio::test]
    async fn test_malformed_item_reported_without_aborting() {
        let envelope = PantryInventoryTool
            .execute(
                json!({"items": [42, {"name": "Eggs", "quantity": 12}]}),
                &test_ctx(),
            )
            .await
            .unwrap();
        assert_eq!(envelope.result["created"][0]["name"], "Eggs");
        assert!(envelope
            .errors
            .iter()
            .any(|e| e.contains("items[0]: must be an object with a name")));
    }
}
