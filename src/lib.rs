//! # Chat Recall
//!
//! Hybrid retrieval over an archive of chat messages: questions are
//! embedded, a cosine vector index supplies an over-fetched candidate pool,
//! and a keyword-aware re-ranker picks the messages handed to an answer
//! generator as context.
//!
//! The ranking pipeline itself lives in the `chat-recall-core` crate; this
//! crate supplies SQLite storage, embedding providers, configuration,
//! a CLI and an HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌──────────────┐
//! │  JSONL   │──▶│ Embed +    │──▶│   SQLite     │
//! │ messages │   │ validate   │   │ msgs + BLOBs │
//! └──────────┘   └────────────┘   └──────┬───────┘
//!                                        │ cosine scan
//!                      ┌─────────────────┤
//!                      ▼                 ▼
//!                 ┌──────────┐     ┌──────────┐
//!                 │   CLI    │     │   HTTP   │
//!                 │ (recall) │     │  (axum)  │
//!                 └──────────┘     └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! recall init
//! recall ingest ./export/messages.jsonl
//! recall search "feeding schedule" --explain
//! recall serve
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite message store and vector index |
//! | [`embedding`] | Embedding provider backends |
//! | [`ingest`] | JSONL ingestion |
//! | [`search`] | Search orchestration and output |
//! | [`get`] | Message lookup |
//! | [`retention`] | Age-based pruning |
//! | [`embed_cmd`] | Embedding rebuild |
//! | [`query_log`] | Query log |
//! | [`server`] | HTTP server |
//! | [`logging`] | `tracing` subscriber setup |

pub mod config;
pub mod db;
pub mod embed_cmd;
pub mod embedding;
pub mod get;
pub mod ingest;
pub mod logging;
pub mod migrate;
pub mod query_log;
pub mod retention;
pub mod search;
pub mod server;
pub mod sqlite_store;
