//! # Steward CLI
//!
//! The `steward` binary runs the personal-assistant tool server and a few
//! operational helpers.
//!
//! ## Usage
//!
//! ```bash
//! steward --config ./config/steward.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `steward serve` | Start the MCP-compatible HTTP tool server |
//! | `steward check` | Validate configuration and print per-setting provenance |
//! | `steward parse <file>` | Parse receipt text offline and print the dry-run change set |
//!
//! ## Examples
//!
//! ```bash
//! # Start the server
//! steward serve --config ./config/steward.toml
//!
//! # Verify a deployment is actually configured (not running on defaults)
//! steward check
//!
//! # Preview what a receipt would do, without touching Notion
//! steward parse receipt.txt --store "Co-op"
//! ```

mod config;
mod engine;
mod envelope;
mod models;
mod notion;
mod nudge;
mod pantry;
mod receipt;
mod report;
mod server;
mod similarity;
mod tool_requests;
mod tools;
mod webhook;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::report::ApplyOutcome;

/// Steward: a personal-assistant tool server.
#[derive(Parser)]
#[command(
    name = "steward",
    about = "Steward: Notion, webhook, and pantry-inventory tools over an MCP-compatible HTTP API",
    version,
    long_about = "Steward exposes a set of stateless assistant tools (Notion lookups and edits, \
    webhook forwarding, receipt parsing with fuzzy pantry upsert) through a unified registry \
    served over an MCP-compatible HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// All server, Notion, pantry, and webhook settings are read from this
    /// file, with environment variables taking precedence for secrets and
    /// deploy-specific values.
    #[arg(long, global = true, default_value = "./config/steward.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Start the MCP-compatible HTTP tool server.
    Serve,

    /// Validate the configuration and print where each setting came from.
    ///
    /// Useful for verifying a deployment before starting the server:
    /// settings still on their built-in defaults (or unset) are visible
    /// at a glance.
    Check,

    /// Parse receipt text and print the dry-run change set as JSON.
    ///
    /// Runs the same parser and upsert engine as the `pantry_inventory`
    /// tool, against an empty existing snapshot, without any network calls.
    Parse {
        /// Path to a text file containing the receipt. Use `-` for stdin.
        file: PathBuf,

        /// Store name applied to items that lack one.
        #[arg(long)]
        store: Option<String>,

        /// Purchase date (YYYY-MM-DD) applied to items that lack one.
        #[arg(long)]
        purchase_date: Option<String>,

        /// Similarity threshold override in [0, 1].
        #[arg(long)]
        threshold: Option<f64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let config = config::load_config(&cli.config)?;
            server::run_server(&config).await?;
        }
        Commands::Check => {
            let config = config::load_config(&cli.config)?;
            println!("Configuration OK ({})", cli.config.display());
            for setting in config.provenance() {
                println!("  {:<28} {:?}", setting.key, setting.source);
            }
        }
        Commands::Parse {
            file,
            store,
            purchase_date,
            threshold,
        } => {
            // Offline parsing works without a config file.
            let config = match config::load_config(&cli.config) {
                Ok(config) => config,
                Err(_) => config::resolve(config::RawConfig::default(), &|key| {
                    std::env::var(key).ok()
                })?,
            };

            let text = if file.as_os_str() == "-" {
                std::io::read_to_string(std::io::stdin())?
            } else {
                std::fs::read_to_string(&file)?
            };

            let mut batch = receipt::parse_receipt_text(&text);
            for record in &mut batch {
                if record.store.is_none() {
                    record.store = store.clone();
                }
                if record.purchase_date.is_none() {
                    record.purchase_date = purchase_date.clone();
                }
            }

            let threshold = threshold.unwrap_or(config.pantry.threshold);
            let change_set = engine::process(&batch, &[], threshold)?;
            let report = report::format_report(&change_set, &ApplyOutcome::dry_run());
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
