//! Over-fetching candidate retrieval.
//!
//! Nearest-neighbor order is purely by distance, while final ranking also
//! weighs lexical overlap. [`CandidateFetcher`] therefore asks the index for
//! `limit * overfetch_factor` candidates so the ranker can promote
//! lexically strong matches that sit slightly further away.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::DistanceMetric;
use crate::error::IndexError;
use crate::models::Candidate;
use crate::store::VectorIndex;

/// Default multiplier applied to the requested result limit.
pub const DEFAULT_OVERFETCH_FACTOR: usize = 15;

/// Issues over-fetch queries against a cosine [`VectorIndex`].
#[derive(Clone)]
pub struct CandidateFetcher {
    index: Arc<dyn VectorIndex>,
    overfetch_factor: usize,
}

impl std::fmt::Debug for CandidateFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidateFetcher")
            .field("metric", &self.index.metric())
            .field("overfetch_factor", &self.overfetch_factor)
            .finish()
    }
}

impl CandidateFetcher {
    /// Wrap `index`. Fails if the index was not built with cosine distance,
    /// since the ranker's semantic term assumes the `[0, 2]` cosine scale.
    pub fn new(index: Arc<dyn VectorIndex>, overfetch_factor: usize) -> Result<Self, IndexError> {
        let metric = index.metric();
        if metric != DistanceMetric::Cosine {
            return Err(IndexError::MetricMismatch {
                expected: DistanceMetric::Cosine.as_str(),
                actual: metric.as_str(),
            });
        }
        Ok(Self {
            index,
            overfetch_factor: overfetch_factor.max(1),
        })
    }

    pub fn overfetch_factor(&self) -> usize {
        self.overfetch_factor
    }

    /// Number of candidates requested for a final `limit`.
    pub fn pool_size(&self, limit: usize) -> usize {
        limit.saturating_mul(self.overfetch_factor)
    }

    /// Fetch at most `limit * overfetch_factor` candidates, nearest first.
    pub async fn fetch(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<Candidate>, IndexError> {
        let k = self.pool_size(limit);
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut candidates = self.index.nearest(query_vector, k).await?;
        candidates.truncate(k);
        debug!(requested = k, fetched = candidates.len(), "fetched candidates");
        Ok(candidates)
    }
}
