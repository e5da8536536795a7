//! Error taxonomy for the retrieval and ingestion paths.
//!
//! Embedding failures are values the pipeline degrades on; index failures
//! are infrastructure faults that callers must be able to tell apart from
//! an empty result.

use std::time::Duration;

use thiserror::Error;

/// Why an embedding could not be produced.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("cannot embed blank text")]
    BlankInput,

    #[error("embedding provider is disabled")]
    Disabled,

    #[error("embedding request failed: {0}")]
    Upstream(String),

    #[error("embedding request timed out after {0:?}")]
    Timeout(Duration),

    #[error("expected a {expected}-dimensional embedding, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// The vector index could not answer a nearest-neighbor query.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector index unavailable: {0}")]
    Unavailable(String),

    #[error("vector index query timed out after {0:?}")]
    Timeout(Duration),

    #[error("vector index uses {actual} distance, expected {expected}")]
    MetricMismatch {
        expected: &'static str,
        actual: &'static str,
    },
}

/// A message that must not be written to the store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("message is missing required field `{0}`")]
    MissingField(&'static str),

    #[error("embedding has {actual} dimensions, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Returned by [`RetrievalService::search`](crate::search::RetrievalService::search).
///
/// "Nothing relevant" is an `Ok` with an empty list; only a broken index
/// or an unusable distance cutoff surfaces here.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search unavailable: {0}")]
    Index(#[from] IndexError),

    #[error("max_distance must be a finite value in [0.0, 2.0], got {0}")]
    InvalidMaxDistance(f64),
}

/// Ingestion failures that reject the write.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to store message: {0}")]
    Store(#[from] anyhow::Error),
}
