//! Embedder trait, distance metrics, and vector utilities.
//!
//! Defines the [`Embedder`] trait that every embedding backend implements,
//! the checked entry point [`embed_text`], and pure helpers for vector
//! serialization and similarity.
//!
//! Network-backed embedders (OpenAI, Ollama, fastembed) live in the
//! `chat-recall` app crate. [`HashEmbedder`] is a deterministic, offline
//! backend used by tests and air-gapped deployments.

use async_trait::async_trait;

use crate::error::EmbedError;

/// A text → dense-vector model.
///
/// The same model and dimension must be used at ingestion time and at
/// query time, or distances between stored and query vectors are
/// meaningless.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-large"`).
    fn model_name(&self) -> &str;
    /// Output dimension D.
    fn dims(&self) -> usize;
    /// Produce an embedding. Callers should go through [`embed_text`].
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

/// Embed `text`, enforcing the [`Embedder`] contract.
///
/// Blank input is rejected without calling the backend, and a vector whose
/// length differs from [`Embedder::dims`] is a failure rather than a
/// partial result.
pub async fn embed_text(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>, EmbedError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(EmbedError::BlankInput);
    }

    let vector = embedder.embed(trimmed).await?;
    if vector.len() != embedder.dims() {
        return Err(EmbedError::DimensionMismatch {
            expected: embedder.dims(),
            actual: vector.len(),
        });
    }
    Ok(vector)
}

/// Distance metric a vector index was built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    InnerProduct,
}

impl DistanceMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::InnerProduct => "inner_product",
        }
    }

    /// Distance between two vectors under this metric (smaller is closer).
    pub fn distance(&self, a: &[f32], b: &[f32]) -> f64 {
        match self {
            DistanceMetric::Cosine => cosine_distance(a, b),
            DistanceMetric::Euclidean => {
                if a.len() != b.len() {
                    return f64::INFINITY;
                }
                a.iter()
                    .zip(b.iter())
                    .map(|(x, y)| ((x - y) as f64).powi(2))
                    .sum::<f64>()
                    .sqrt()
            }
            DistanceMetric::InnerProduct => {
                if a.len() != b.len() {
                    return f64::INFINITY;
                }
                -a.iter()
                    .zip(b.iter())
                    .map(|(x, y)| (x * y) as f64)
                    .sum::<f64>()
            }
        }
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use chat_recall_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors, vectors
/// of different lengths, and zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Cosine distance `1 - cosine_similarity`, clamped to `[0, 2]`.
///
/// Returns `NaN` when the vectors cannot be compared: different lengths,
/// empty, or either one zero. Rankers treat a non-finite distance as a
/// malformed candidate.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return f64::NAN;
    }
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;
    if !denom.is_finite() || denom < f32::EPSILON {
        return f64::NAN;
    }
    (1.0 - cosine_similarity(a, b) as f64).clamp(0.0, 2.0)
}

/// Deterministic feature-hashing embedder.
///
/// Each lowercase alphanumeric token is hashed (FNV-1a) into one of `dims`
/// buckets with a hash-derived sign, and the result is L2-normalized. Texts
/// sharing tokens land close together; it is not a semantic model.
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    fn fnv1a(token: &str) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.as_bytes() {
            hash ^= *byte as u64;
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        hash
    }

    /// Synchronous core of [`Embedder::embed`].
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut tokens: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();
        let trimmed = lower.trim();
        if tokens.is_empty() && !trimmed.is_empty() {
            tokens.push(trimmed);
        }

        let mut vector = vec![0.0f32; self.dims];
        for token in tokens {
            let hash = Self::fnv1a(token);
            let bucket = (hash % self.dims as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.embed_sync(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        fn model_name(&self) -> &str {
            "short"
        }
        fn dims(&self) -> usize {
            4
        }
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Ok(vec![1.0, 0.0])
        }
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_distance(&v, &v).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_opposite() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_distance(&a, &b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_distance_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert!(cosine_distance(&[1.0, 2.0], &[1.0]).is_nan());
    }

    #[test]
    fn test_cosine_distance_incomparable_is_nan() {
        assert!(cosine_distance(&[], &[]).is_nan());
        assert!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]).is_nan());
        assert!(DistanceMetric::Cosine
            .distance(&[1.0, 0.0], &[0.0, 0.0])
            .is_nan());
    }

    #[test]
    fn test_euclidean_distance() {
        let d = DistanceMetric::Euclidean.distance(&[0.0, 0.0], &[3.0, 4.0]);
        assert!((d - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_hash_embedder_deterministic_and_normalized() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed_sync("Feeding schedule for puppies");
        let b = embedder.embed_sync("feeding SCHEDULE for puppies");
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hash_embedder_shared_tokens_are_closer() {
        let embedder = HashEmbedder::new(256);
        let query = embedder.embed_sync("feeding schedule");
        let related = embedder.embed_sync("what is the feeding schedule");
        let unrelated = embedder.embed_sync("router firmware upgrade");
        assert!(cosine_distance(&query, &related) < cosine_distance(&query, &unrelated));
    }

    #[tokio::test]
    async fn test_embed_text_rejects_blank() {
        let embedder = HashEmbedder::new(8);
        let err = embed_text(&embedder, "  \n ").await.unwrap_err();
        assert!(matches!(err, EmbedError::BlankInput));
    }

    #[tokio::test]
    async fn test_embed_text_rejects_wrong_dimension() {
        let err = embed_text(&ShortEmbedder, "hello").await.unwrap_err();
        assert!(matches!(
            err,
            EmbedError::DimensionMismatch {
                expected: 4,
                actual: 2
            }
        ));
    }
}
