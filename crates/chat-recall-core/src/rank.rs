//! Hybrid re-ranking of nearest-neighbor candidates.
//!
//! Each candidate is scored independently; there is no cross-candidate
//! normalization.
//!
//! ```text
//! semantic = (1 - distance) * semantic_weight
//! keywords = lowercase(query).split_whitespace()
//! full     = #keywords contained in lowercase(text)
//! keyword  = full / |keywords| * keyword_weight
//!          + exact_phrase_bonus           if text contains the whole query
//!          + long_text_bonus              if full > 0 and |text| > long_text_threshold
//!          + (partial - full) / |keywords| * partial_weight   if partial > full
//! combined = semantic + keyword
//! ```
//!
//! `partial` counts keywords that prefix, or are prefixed by, some
//! whitespace token of the text. Keywords are not stop-word filtered, so
//! mixed-language queries behave the same as English ones.
//!
//! Candidates beyond `max_distance` are dropped on raw distance before
//! scoring matters. The survivors are sorted by combined score (desc),
//! then distance (asc), then message id (asc), and truncated to `limit`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{Candidate, ScoreBreakdown, ScoredCandidate};

/// Default inclusive distance cutoff on the `[0, 2]` cosine scale.
pub const DEFAULT_MAX_DISTANCE: f64 = 1.2;

/// A usable cutoff is finite and within the cosine range `[0, 2]`.
pub fn is_valid_max_distance(max_distance: f64) -> bool {
    max_distance.is_finite() && (0.0..=2.0).contains(&max_distance)
}

/// Tunable weights for [`score_candidate`].
///
/// Defaults are empirically chosen, not derived; treat them as a baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    pub semantic_weight: f64,
    pub keyword_weight: f64,
    pub exact_phrase_bonus: f64,
    pub long_text_bonus: f64,
    /// Length in characters a text must exceed to earn `long_text_bonus`.
    pub long_text_threshold: usize,
    pub partial_weight: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            semantic_weight: 0.8,
            keyword_weight: 0.8,
            exact_phrase_bonus: 1.0,
            long_text_bonus: 0.6,
            long_text_threshold: 500,
            partial_weight: 0.3,
        }
    }
}

/// A lowercased query split into keywords once per ranking call.
#[derive(Debug, Clone)]
pub struct QueryTerms {
    phrase: String,
    keywords: Vec<String>,
}

impl QueryTerms {
    pub fn new(query: &str) -> Self {
        let phrase = query.trim().to_lowercase();
        let keywords = phrase.split_whitespace().map(str::to_string).collect();
        Self { phrase, keywords }
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

/// Score a single candidate's text at `distance`.
///
/// With no query terms the keyword signals are all zero.
pub fn score_candidate(
    text: &str,
    distance: f64,
    terms: Option<&QueryTerms>,
    weights: &RankingWeights,
) -> ScoreBreakdown {
    let semantic = (1.0 - distance) * weights.semantic_weight;
    let mut breakdown = ScoreBreakdown {
        semantic,
        combined: semantic,
        ..ScoreBreakdown::default()
    };

    let terms = match terms {
        Some(t) if !t.is_empty() => t,
        _ => return breakdown,
    };

    let text_lower = text.to_lowercase();
    let n = terms.keywords.len() as f64;

    let full_matches = terms
        .keywords
        .iter()
        .filter(|k| text_lower.contains(k.as_str()))
        .count();
    breakdown.keyword = full_matches as f64 / n * weights.keyword_weight;

    if text_lower.contains(terms.phrase.as_str()) {
        breakdown.exact_phrase = weights.exact_phrase_bonus;
    }

    if full_matches > 0 && text.chars().count() > weights.long_text_threshold {
        breakdown.long_text = weights.long_text_bonus;
    }

    let tokens: Vec<&str> = text_lower.split_whitespace().collect();
    let partial_matches = terms
        .keywords
        .iter()
        .filter(|k| {
            tokens
                .iter()
                .any(|t| t.starts_with(k.as_str()) || k.starts_with(*t))
        })
        .count();
    if partial_matches > full_matches {
        breakdown.partial = (partial_matches - full_matches) as f64 / n * weights.partial_weight;
    }

    breakdown.combined = breakdown.semantic
        + breakdown.keyword
        + breakdown.exact_phrase
        + breakdown.long_text
        + breakdown.partial;
    breakdown
}

/// Total order used for results: score desc, distance asc, id asc.
pub fn compare_scored(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .combined
        .partial_cmp(&a.score.combined)
        .unwrap_or(Ordering::Equal)
        .then(a.distance.partial_cmp(&b.distance).unwrap_or(Ordering::Equal))
        .then(a.message.id.cmp(&b.message.id))
}

/// Filter, rescore, sort, and truncate `candidates`.
///
/// Malformed candidates (blank text or a non-finite distance) are skipped
/// rather than failing the whole ranking.
pub fn rank_candidates(
    candidates: Vec<Candidate>,
    query: Option<&str>,
    limit: usize,
    max_distance: f64,
    weights: &RankingWeights,
) -> Vec<ScoredCandidate> {
    if limit == 0 || candidates.is_empty() {
        return Vec::new();
    }
    // A NaN cutoff would compare false against every distance and keep all.
    if !max_distance.is_finite() {
        warn!(max_distance, "non-finite distance cutoff; returning no results");
        return Vec::new();
    }

    let terms = query.map(QueryTerms::new);

    let mut scored: Vec<ScoredCandidate> = candidates
        .into_iter()
        .filter_map(|c| {
            if c.message.text.trim().is_empty() || !c.distance.is_finite() {
                warn!(
                    message_id = c.message.id,
                    distance = c.distance,
                    "skipping malformed candidate"
                );
                return None;
            }
            if c.distance > max_distance {
                return None;
            }
            let score = score_candidate(&c.message.text, c.distance, terms.as_ref(), weights);
            Some(ScoredCandidate {
                message: c.message,
                distance: c.distance,
                score,
            })
        })
        .collect();

    scored.sort_by(compare_scored);
    scored.truncate(limit);
    scored
}
