//! # Chat Recall Core
//!
//! Storage-agnostic logic for Chat Recall: message models, the embedder
//! and store traits, candidate fetching, hybrid ranking, and the retrieval
//! service that ties them together.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem I/O. Concrete
//! embedders and stores live in the `chat-recall` app crate; the
//! [`store::memory::InMemoryStore`] and [`embedding::HashEmbedder`] here
//! exist so the pipeline can run end-to-end in tests.
//!
//! ```text
//! query ─▶ Embedder ─▶ CandidateFetcher (over-fetch) ─▶ rank_candidates ─▶ Vec<Message>
//! ```

pub mod context;
pub mod embedding;
pub mod error;
pub mod fetch;
pub mod ingest;
pub mod models;
pub mod rank;
pub mod retention;
pub mod search;
pub mod store;
