//! TOML configuration with environment overrides and provenance tracking.
//!
//! Settings are resolved from three layers: the config file, the process
//! environment, and built-in defaults. Every resolved setting records which
//! layer supplied it, so `steward check` and the `server_info` tool can show
//! whether a deployment is actually configured or silently running on
//! defaults. Secrets (`NOTION_TOKEN`) are environment-only and never have a
//! built-in fallback value.
//!
//! See `config/steward.example.toml` for a full example.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::engine::DEFAULT_THRESHOLD;

/// Where a resolved setting's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingSource {
    ConfigFile,
    Environment,
    Default,
    Unset,
}

/// One resolved setting and its provenance, for observability output.
#[derive(Debug, Clone, Serialize)]
pub struct SettingProvenance {
    pub key: String,
    pub source: SettingSource,
}

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub notion: NotionConfig,
    pub pantry: PantryConfig,
    pub tool_requests: ToolRequestsConfig,
    pub webhooks: WebhooksConfig,
    provenance: Vec<SettingProvenance>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Clone)]
pub struct NotionConfig {
    pub api_base: String,
    /// `Notion-Version` header value.
    pub version: String,
    pub timeout_secs: u64,
    /// Integration token. Environment-only (`NOTION_TOKEN`); absent means
    /// Notion-backed tools report the missing configuration per request.
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PantryConfig {
    /// Notion database id holding pantry entries.
    pub database_id: Option<String>,
    /// Minimum similarity score for treating two names as the same item.
    pub threshold: f64,
    /// Upper bound on existing entries fetched per request.
    pub fetch_cap: usize,
    pub properties: PropertyMap,
}

/// Maps record fields to Notion property names. Overridable per-field via
/// `PANTRY_PROP_*` environment variables.
#[derive(Debug, Clone, Serialize)]
pub struct PropertyMap {
    pub name: String,
    pub quantity: String,
    pub unit: String,
    pub category: String,
    pub purchase_date: String,
    pub store: String,
    pub notes: String,
}

impl Default for PropertyMap {
    fn default() -> Self {
        Self {
            name: "Name".to_string(),
            quantity: "Quantity".to_string(),
            unit: "Unit".to_string(),
            category: "Category".to_string(),
            purchase_date: "Purchase Date".to_string(),
            store: "Store".to_string(),
            notes: "Notes".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolRequestsConfig {
    /// Notion database id holding tool-request entries.
    pub database_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WebhooksConfig {
    /// Destination for `record_mood` payloads.
    pub mood_url: Option<String>,
    /// Destination for `log_event` payloads.
    pub event_url: Option<String>,
    pub timeout_secs: u64,
}

impl Config {
    /// Per-setting provenance, ordered as resolved.
    pub fn provenance(&self) -> &[SettingProvenance] {
        &self.provenance
    }
}

// ============ Raw (file-level) config ============

#[derive(Debug, Default, Deserialize)]
pub struct RawConfig {
    #[serde(default)]
    pub server: RawServer,
    #[serde(default)]
    pub notion: RawNotion,
    #[serde(default)]
    pub pantry: RawPantry,
    #[serde(default)]
    pub tool_requests: RawToolRequests,
    #[serde(default)]
    pub webhooks: RawWebhooks,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawServer {
    pub bind: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawNotion {
    pub api_base: Option<String>,
    pub version: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawPantry {
    pub database_id: Option<String>,
    pub threshold: Option<f64>,
    pub fetch_cap: Option<usize>,
    #[serde(default)]
    pub properties: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawToolRequests {
    pub database_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawWebhooks {
    pub mood_url: Option<String>,
    pub event_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Load and resolve configuration from a TOML file plus the process
/// environment.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let raw: RawConfig = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    resolve(raw, &|key| std::env::var(key).ok())
}

/// Resolve a raw config against an environment lookup.
///
/// Kept separate from [`load_config`] so tests can supply their own
/// environment without mutating process state.
pub fn resolve(raw: RawConfig, env: &dyn Fn(&str) -> Option<String>) -> Result<Config> {
    let mut provenance = Vec::new();

    let mut setting = |key: &str,
                       file_value: Option<String>,
                       env_key: Option<&str>,
                       default: Option<&str>|
     -> Option<String> {
        let env_value = env_key.and_then(|k| env(k)).filter(|v| !v.is_empty());
        let (value, source) = if let Some(v) = env_value {
            (Some(v), SettingSource::Environment)
        } else if let Some(v) = file_value {
            (Some(v), SettingSource::ConfigFile)
        } else if let Some(v) = default {
            (Some(v.to_string()), SettingSource::Default)
        } else {
            (None, SettingSource::Unset)
        };
        provenance.push(SettingProvenance {
            key: key.to_string(),
            source,
        });
        value
    };

    let bind = setting(
        "server.bind",
        raw.server.bind,
        Some("STEWARD_BIND"),
        Some("127.0.0.1:8700"),
    )
    .unwrap_or_default();

    let api_base = setting(
        "notion.api_base",
        raw.notion.api_base,
        None,
        Some("https://api.notion.com/v1"),
    )
    .unwrap_or_default();
    let version = setting(
        "notion.version",
        raw.notion.version,
        None,
        Some("2022-06-28"),
    )
    .unwrap_or_default();
    let notion_timeout = setting(
        "notion.timeout_secs",
        raw.notion.timeout_secs.map(|v| v.to_string()),
        None,
        Some("10"),
    );
    let token = setting("notion.token", None, Some("NOTION_TOKEN"), None);

    let database_id = setting(
        "pantry.database_id",
        raw.pantry.database_id,
        Some("PANTRY_DB_ID"),
        None,
    );
    let threshold_default = DEFAULT_THRESHOLD.to_string();
    let threshold = setting(
        "pantry.threshold",
        raw.pantry.threshold.map(|v| v.to_string()),
        Some("PANTRY_MATCH_THRESHOLD"),
        Some(&threshold_default),
    );
    let fetch_cap = setting(
        "pantry.fetch_cap",
        raw.pantry.fetch_cap.map(|v| v.to_string()),
        None,
        Some("100"),
    );

    let tool_requests_db = setting(
        "tool_requests.database_id",
        raw.tool_requests.database_id,
        Some("TOOL_REQUESTS_DB_ID"),
        None,
    );

    let mood_url = setting(
        "webhooks.mood_url",
        raw.webhooks.mood_url,
        Some("MOOD_MEMORY_WEBHOOK_URL"),
        None,
    );
    let event_url = setting(
        "webhooks.event_url",
        raw.webhooks.event_url,
        Some("SERENDIPITY_EVENT_WEBHOOK_URL"),
        None,
    );
    let webhook_timeout = setting(
        "webhooks.timeout_secs",
        raw.webhooks.timeout_secs.map(|v| v.to_string()),
        None,
        Some("10"),
    );

    let mut properties = PropertyMap::default();
    let prop_fields: [(&str, &mut String); 7] = [
        ("name", &mut properties.name),
        ("quantity", &mut properties.quantity),
        ("unit", &mut properties.unit),
        ("category", &mut properties.category),
        ("purchase_date", &mut properties.purchase_date),
        ("store", &mut properties.store),
        ("notes", &mut properties.notes),
    ];
    for (field, slot) in prop_fields {
        let env_key = format!("PANTRY_PROP_{}", field.to_uppercase());
        let default = slot.clone();
        if let Some(value) = setting(
            &format!("pantry.properties.{}", field),
            raw.pantry.properties.get(field).cloned(),
            Some(&env_key),
            Some(&default),
        ) {
            *slot = value;
        }
    }

    let config = Config {
        server: ServerConfig { bind },
        notion: NotionConfig {
            api_base,
            version,
            timeout_secs: parse_u64("notion.timeout_secs", notion_timeout)?,
            token,
        },
        pantry: PantryConfig {
            database_id,
            threshold: parse_f64("pantry.threshold", threshold)?,
            fetch_cap: parse_u64("pantry.fetch_cap", fetch_cap)? as usize,
            properties,
        },
        tool_requests: ToolRequestsConfig {
            database_id: tool_requests_db,
        },
        webhooks: WebhooksConfig {
            mood_url,
            event_url,
            timeout_secs: parse_u64("webhooks.timeout_secs", webhook_timeout)?,
        },
        provenance,
    };

    validate(&config)?;
    Ok(config)
}

fn parse_u64(key: &str, value: Option<String>) -> Result<u64> {
    let value = value.unwrap_or_default();
    value
        .parse::<u64>()
        .with_context(|| format!("{} must be a positive integer, got '{}'", key, value))
}

fn parse_f64(key: &str, value: Option<String>) -> Result<f64> {
    let value = value.unwrap_or_default();
    value
        .parse::<f64>()
        .with_context(|| format!("{} must be a number, got '{}'", key, value))
}

fn validate(config: &Config) -> Result<()> {
    if config.server.bind.is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }
    if !(0.0..=1.0).contains(&config.pantry.threshold) {
        anyhow::bail!("pantry.threshold must be in [0.0, 1.0]");
    }
    if config.pantry.fetch_cap == 0 {
        anyhow::bail!("pantry.fetch_cap must be >= 1");
    }
    if config.notion.timeout_secs == 0 {
        anyhow::bail!("notion.timeout_secs must be >= 1");
    }
    if config.webhooks.timeout_secs == 0 {
        anyhow::bail!("webhooks.timeout_secs must be >= 1");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_without_file_or_env() {
        let config = resolve(RawConfig::default(), &no_env).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8700");
        assert_eq!(config.pantry.threshold, 0.7);
        assert_eq!(config.pantry.fetch_cap, 100);
        assert_eq!(config.notion.api_base, "https://api.notion.com/v1");
        assert!(config.notion.token.is_none());
        assert!(config.pantry.database_id.is_none());
    }

    #[test]
    fn test_env_overrides_file() {
        let raw: RawConfig = toml::from_str(
            r#"
            [server]
            bind = "0.0.0.0:9000"

            [pantry]
            database_id = "from-file"
            threshold = 0.6
            "#,
        )
        .unwrap();
        let env_map: HashMap<String, String> = [
            ("PANTRY_DB_ID".to_string(), "from-env".to_string()),
            ("NOTION_TOKEN".to_string(), "secret".to_string()),
            ("TOOL_REQUESTS_DB_ID".to_string(), "requests-db".to_string()),
        ]
        .into();
        let env = move |key: &str| env_map.get(key).cloned();

        let config = resolve(raw, &env).unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:9000");
        assert_eq!(config.pantry.database_id.as_deref(), Some("from-env"));
        assert_eq!(config.pantry.threshold, 0.6);
        assert_eq!(config.notion.token.as_deref(), Some("secret"));
        assert_eq!(
            config.tool_requests.database_id.as_deref(),
            Some("requests-db")
        );
    }

    #[test]
    fn test_provenance_tracks_each_layer() {
        let raw: RawConfig = toml::from_str("[pantry]\nthreshold = 0.8\n").unwrap();
        let env = |key: &str| {
            (key == "NOTION_TOKEN").then(|| "secret".to_string())
        };
        let config = resolve(raw, &env).unwrap();

        let source_of = |key: &str| {
            config
                .provenance()
                .iter()
                .find(|p| p.key == key)
                .map(|p| p.source)
                .unwrap()
        };
        assert_eq!(source_of("pantry.threshold"), SettingSource::ConfigFile);
        assert_eq!(source_of("notion.token"), SettingSource::Environment);
        assert_eq!(source_of("server.bind"), SettingSource::Default);
        assert_eq!(source_of("pantry.database_id"), SettingSource::Unset);
        assert_eq!(source_of("tool_requests.database_id"), SettingSource::Unset);
    }

    #[test]
    fn test_property_map_env_override() {
        let env = |key: &str| {
            (key == "PANTRY_PROP_NAME").then(|| "Item".to_string())
        };
        let config = resolve(RawConfig::default(), &env).unwrap();
        assert_eq!(config.pantry.properties.name, "Item");
        assert_eq!(config.pantry.properties.quantity, "Quantity");
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let raw: RawConfig = toml::from_str("[pantry]\nthreshold = 1.5\n").unwrap();
        assert!(resolve(raw, &no_env).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("steward.toml");
        std::fs::write(&path, "[server]\nbind = \"127.0.0.1:1234\"\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:1234");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(load_config(Path::new("/nonexistent/steward.toml")).is_err());
    }
}
