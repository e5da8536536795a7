//! Retrieval service: embed → over-fetch → hybrid rank.
//!
//! [`RetrievalService`] is stateless per call. Its collaborators are
//! injected at construction, so tests substitute a fixed-vector embedder
//! and an [`InMemoryStore`](crate::store::memory::InMemoryStore).
//!
//! # Outcomes
//!
//! | Situation | `search` returns | [`SearchStatus`] |
//! |-----------|------------------|------------------|
//! | blank query | `Ok(vec![])`, embedder not called | `BlankQuery` |
//! | `limit == 0` | `Ok(vec![])` | `ZeroLimit` |
//! | embedding failed | `Ok(vec![])` | `EmbeddingFailed` |
//! | index returned nothing | `Ok(vec![])` | `NoCandidates` |
//! | candidates ranked | `Ok(results)` (possibly empty) | `Ranked` |
//! | index failed | `Err(SearchError::Index)` | n/a |
//! | `max_distance` non-finite or outside `[0, 2]` | `Err(SearchError::InvalidMaxDistance)` | n/a |

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::embedding::{embed_text, Embedder};
use crate::error::{IndexError, SearchError};
use crate::fetch::{CandidateFetcher, DEFAULT_OVERFETCH_FACTOR};
use crate::models::{Message, ScoredCandidate};
use crate::rank::{is_valid_max_distance, rank_candidates, RankingWeights, DEFAULT_MAX_DISTANCE};
use crate::store::VectorIndex;

/// Retrieval tuning, decoupled from application config.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    pub overfetch_factor: usize,
    /// Inclusive cutoff on raw cosine distance.
    pub max_distance: f64,
    pub weights: RankingWeights,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            overfetch_factor: DEFAULT_OVERFETCH_FACTOR,
            max_distance: DEFAULT_MAX_DISTANCE,
            weights: RankingWeights::default(),
        }
    }
}

/// How a search call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStatus {
    BlankQuery,
    ZeroLimit,
    EmbeddingFailed,
    NoCandidates,
    Ranked,
}

impl SearchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchStatus::BlankQuery => "blank_query",
            SearchStatus::ZeroLimit => "zero_limit",
            SearchStatus::EmbeddingFailed => "embedding_failed",
            SearchStatus::NoCandidates => "no_candidates",
            SearchStatus::Ranked => "ranked",
        }
    }
}

/// Full result of one search, including ranking internals.
#[derive(Debug, Clone)]
pub struct SearchReport {
    pub status: SearchStatus,
    /// Candidates returned by the index before filtering.
    pub candidates_fetched: usize,
    pub results: Vec<ScoredCandidate>,
}

impl SearchReport {
    fn empty(status: SearchStatus) -> Self {
        Self {
            status,
            candidates_fetched: 0,
            results: Vec::new(),
        }
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.results.into_iter().map(|s| s.message).collect()
    }
}

/// Orchestrates [`Embedder`] → [`CandidateFetcher`] → [`rank_candidates`].
#[derive(Clone)]
pub struct RetrievalService {
    embedder: Arc<dyn Embedder>,
    fetcher: CandidateFetcher,
    params: RetrievalParams,
}

impl RetrievalService {
    /// Build a service. Fails if `index` is not a cosine index.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        params: RetrievalParams,
    ) -> Result<Self, IndexError> {
        let fetcher = CandidateFetcher::new(index, params.overfetch_factor)?;
        Ok(Self {
            embedder,
            fetcher,
            params,
        })
    }

    pub fn params(&self) -> &RetrievalParams {
        &self.params
    }

    /// Ordered messages most relevant to `query`, at most `limit`.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Message>, SearchError> {
        Ok(self.search_report(query, limit).await?.into_messages())
    }

    /// Like [`search`](Self::search) but keeps scores and the outcome.
    pub async fn search_report(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<SearchReport, SearchError> {
        self.search_with_max_distance(query, limit, self.params.max_distance)
            .await
    }

    /// Search with a per-call distance cutoff.
    pub async fn search_with_max_distance(
        &self,
        query: &str,
        limit: usize,
        max_distance: f64,
    ) -> Result<SearchReport, SearchError> {
        if !is_valid_max_distance(max_distance) {
            return Err(SearchError::InvalidMaxDistance(max_distance));
        }
        if query.trim().is_empty() {
            return Ok(SearchReport::empty(SearchStatus::BlankQuery));
        }
        if limit == 0 {
            return Ok(SearchReport::empty(SearchStatus::ZeroLimit));
        }

        let query_vector = match embed_text(self.embedder.as_ref(), query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    outcome = SearchStatus::EmbeddingFailed.as_str(),
                    model = self.embedder.model_name(),
                    error = %e,
                    "query embedding failed; returning no results"
                );
                return Ok(SearchReport::empty(SearchStatus::EmbeddingFailed));
            }
        };

        let candidates = self.fetcher.fetch(&query_vector, limit).await.map_err(|e| {
            warn!(error = %e, "vector index query failed");
            SearchError::Index(e)
        })?;

        if candidates.is_empty() {
            info!(
                outcome = SearchStatus::NoCandidates.as_str(),
                "index returned no candidates"
            );
            return Ok(SearchReport::empty(SearchStatus::NoCandidates));
        }

        let candidates_fetched = candidates.len();
        let results = rank_candidates(
            candidates,
            Some(query),
            limit,
            max_distance,
            &self.params.weights,
        );
        debug!(
            outcome = SearchStatus::Ranked.as_str(),
            candidates = candidates_fetched,
            results = results.len(),
            "ranked candidates"
        );

        Ok(SearchReport {
            status: SearchStatus::Ranked,
            candidates_fetched,
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DistanceMetric;
    use crate::error::EmbedError;
    use crate::models::{Candidate, NewMessage};
    use crate::store::memory::InMemoryStore;
    use crate::store::MessageStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the same vector for every input and counts calls.
    struct FixedEmbedder {
        vector: Vec<f32>,
        calls: AtomicUsize,
    }

    impl FixedEmbedder {
        fn new(vector: Vec<f32>) -> Arc<Self> {
            Arc::new(Self {
                vector,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            self.vector.len()
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.vector.clone())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Err(EmbedError::Upstream("503 Service Unavailable".to_string()))
        }
    }

    struct BrokenIndex;

    #[async_trait]
    impl VectorIndex for BrokenIndex {
        fn metric(&self) -> DistanceMetric {
            DistanceMetric::Cosine
        }
        async fn nearest(&self, _q: &[f32], _k: usize) -> Result<Vec<Candidate>, IndexError> {
            Err(IndexError::Unavailable("connection refused".to_string()))
        }
    }

    fn new_message(text: &str) -> NewMessage {
        NewMessage {
            channel_id: "pets".to_string(),
            channel_name: Some("Pets".to_string()),
            text: text.to_string(),
            timestamp: Utc::now(),
            sender_id: None,
            sender_name: None,
            sender_username: None,
        }
    }

    /// Query vector is [1, 0]; vectors are chosen for exact cosine distances.
    async fn corpus() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        // distance 0.4: cos = 0.6
        store
            .insert_message(&new_message("The feeding schedule is posted"), &[0.6, 0.8], "fixed")
            .await
            .unwrap();
        // distance ~0.1: cos = 0.9
        store
            .insert_message(&new_message("Vet appointment on Tuesday"), &[0.9, 0.43589], "fixed")
            .await
            .unwrap();
        // distance 1.6: cos = -0.6
        store
            .insert_message(&new_message("feeding schedule feeding schedule"), &[-0.6, 0.8], "fixed")
            .await
            .unwrap();
        store
    }

    async fn service(embedder: Arc<dyn Embedder>) -> RetrievalService {
        RetrievalService::new(embedder, corpus().await, RetrievalParams::default()).unwrap()
    }

    #[tokio::test]
    async fn test_blank_query_skips_embedder() {
        let embedder = FixedEmbedder::new(vec![1.0, 0.0]);
        let svc = service(embedder.clone()).await;
        for q in ["", "   ", "\n\t"] {
            let report = svc.search_report(q, 5).await.unwrap();
            assert_eq!(report.status, SearchStatus::BlankQuery);
            assert!(report.results.is_empty());
        }
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_lexical_match_outranks_closer_vector() {
        let svc = service(FixedEmbedder::new(vec![1.0, 0.0])).await;
        let report = svc.search_report("feeding schedule", 5).await.unwrap();
        assert_eq!(report.status, SearchStatus::Ranked);
        assert_eq!(report.candidates_fetched, 3);

        let texts: Vec<&str> = report
            .results
            .iter()
            .map(|s| s.message.text.as_str())
            .collect();
        // The distance-1.6 duplicate phrase is beyond max_distance.
        assert_eq!(
            texts,
            vec!["The feeding schedule is posted", "Vet appointment on Tuesday"]
        );
        assert!((report.results[0].score.combined - 2.28).abs() < 1e-6);
        assert!(report.results.iter().all(|s| s.distance <= 1.2));
    }

    #[tokio::test]
    async fn test_search_is_idempotent() {
        let svc = service(FixedEmbedder::new(vec![1.0, 0.0])).await;
        let first: Vec<i64> = svc.search("vet", 5).await.unwrap().iter().map(|m| m.id).collect();
        let second: Vec<i64> = svc.search("vet", 5).await.unwrap().iter().map(|m| m.id).collect();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[tokio::test]
    async fn test_limit_bounds_results() {
        let svc = service(FixedEmbedder::new(vec![1.0, 0.0])).await;
        assert_eq!(svc.search("schedule", 1).await.unwrap().len(), 1);
        let report = svc.search_report("schedule", 0).await.unwrap();
        assert_eq!(report.status, SearchStatus::ZeroLimit);
    }

    #[tokio::test]
    async fn test_embedding_failure_is_empty_not_error() {
        let svc = service(Arc::new(FailingEmbedder)).await;
        let report = svc.search_report("feeding", 5).await.unwrap();
        assert_eq!(report.status, SearchStatus::EmbeddingFailed);
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_dimension_embedding_is_failure() {
        struct LongEmbedder;

        #[async_trait]
        impl Embedder for LongEmbedder {
            fn model_name(&self) -> &str {
                "long"
            }
            fn dims(&self) -> usize {
                2
            }
            async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
                Ok(vec![1.0, 0.0, 0.0])
            }
        }

        let svc = service(Arc::new(LongEmbedder)).await;
        let report = svc.search_report("feeding", 5).await.unwrap();
        assert_eq!(report.status, SearchStatus::EmbeddingFailed);
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn test_empty_index_is_no_candidates() {
        let svc = RetrievalService::new(
            FixedEmbedder::new(vec![1.0, 0.0]),
            Arc::new(InMemoryStore::new()),
            RetrievalParams::default(),
        )
        .unwrap();
        let report = svc.search_report("anything", 5).await.unwrap();
        assert_eq!(report.status, SearchStatus::NoCandidates);
        assert!(report.results.is_empty());
    }

    #[tokio::test]
    async fn test_index_failure_is_distinguishable() {
        let svc = RetrievalService::new(
            FixedEmbedder::new(vec![1.0, 0.0]),
            Arc::new(BrokenIndex),
            RetrievalParams::default(),
        )
        .unwrap();
        let err = svc.search("anything", 5).await.unwrap_err();
        assert!(matches!(err, SearchError::Index(IndexError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_per_call_max_distance() {
        let svc = service(FixedEmbedder::new(vec![1.0, 0.0])).await;
        let report = svc
            .search_with_max_distance("feeding schedule", 5, 2.0)
            .await
            .unwrap();
        assert_eq!(report.results.len(), 3);
        let tight = svc
            .search_with_max_distance("feeding schedule", 5, 0.2)
            .await
            .unwrap();
        assert_eq!(tight.results.len(), 1);
        assert_eq!(tight.results[0].message.text, "Vet appointment on Tuesday");
    }

    #[tokio::test]
    async fn test_unusable_max_distance_is_rejected() {
        let embedder = FixedEmbedder::new(vec![1.0, 0.0]);
        let svc = service(embedder.clone()).await;
        for cutoff in [f64::NAN, f64::INFINITY, -0.5, 2.5] {
            let err = svc
                .search_with_max_distance("feeding schedule", 5, cutoff)
                .await
                .unwrap_err();
            assert!(matches!(err, SearchError::InvalidMaxDistance(_)));
        }
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_mismatched_stored_vector_is_never_ranked() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_message(&new_message("feeding schedule"), &[1.0, 0.0, 0.0], "old")
            .await
            .unwrap();
        store
            .insert_message(&new_message("feeding schedule notes"), &[0.0, 0.0], "fixed")
            .await
            .unwrap();

        let svc = RetrievalService::new(
            Arc::new(crate::embedding::HashEmbedder::new(2)),
            store,
            RetrievalParams::default(),
        )
        .unwrap();
        let report = svc.search_report("feeding schedule", 5).await.unwrap();
        // The 3-dim row is filtered by the index; the zero vector is malformed.
        assert_eq!(report.candidates_fetched, 1);
        assert!(report.results.is_empty());
    }
}
