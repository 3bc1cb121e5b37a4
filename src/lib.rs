//! # Steward
//!
//! A personal-assistant tool server: Notion lookups and edits, webhook
//! forwarding, and receipt-driven pantry inventory with fuzzy upsert,
//! exposed through an MCP-compatible HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌───────────────┐   ┌─────────────┐
//! │   Receipt   │──▶│  Upsert Engine │──▶│  ChangeSet   │
//! │   Parser    │   │ (pure, no I/O) │   │   Report     │
//! └─────────────┘   └───────────────┘   └──────┬──────┘
//!                                              │
//!                    ┌─────────────────────────┤
//!                    ▼                         ▼
//!              ┌──────────┐             ┌──────────┐
//!              │  Notion  │             │   HTTP   │
//!              │  client  │             │  (MCP)   │
//!              └──────────┘             └──────────┘
//! ```
//!
//! The upsert engine is deliberately pure: the tool layer fetches the
//! existing snapshot and applies the change set, so the decision logic is
//! testable without any network mocking and retries are idempotent.
//!
//! ## Quick Start
//!
//! ```bash
//! steward check                 # validate config, show provenance
//! steward parse receipt.txt    # offline dry-run of a receipt
//! steward serve                 # start the HTTP tool server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML + environment configuration with provenance |
//! | [`models`] | Core record and change-set types |
//! | [`similarity`] | Token-overlap name scoring |
//! | [`engine`] | Fuzzy upsert classification |
//! | [`receipt`] | Receipt text parsing |
//! | [`report`] | Change-set report formatting |
//! | [`envelope`] | Four-field tool response envelope |
//! | [`notion`] | Notion API client and payload helpers |
//! | [`nudge`] | Rule-based serendipity nudge suggestions |
//! | [`tool_requests`] | Tool-request backlog lookups |
//! | [`webhook`] | Webhook forwarding |
//! | [`tools`] | Tool trait, registry, and built-in tools |
//! | [`server`] | MCP-compatible HTTP server |

pub mod config;
pub mod engine;
pub mod envelope;
pub mod models;
pub mod notion;
pub mod nudge;
pub mod pantry;
pub mod receipt;
pub mod report;
pub mod server;
pub mod similarity;
pub mod tool_requests;
pub mod tools;
pub mod webhook;
