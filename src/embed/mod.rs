//! Embedding provider (C4): produces fixed-dimension dense vectors for
//! batches of strings, plus the shared cosine-similarity helper.

mod local;
mod remote;

pub use local::LocalEmbeddingProvider;
pub use remote::RemoteEmbeddingProvider;

use async_trait::async_trait;

use crate::error::Result;

/// Capability set shared by every embedding backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Output vector dimension, constant for a given provider instance.
    fn dim(&self) -> usize;

    /// Embed a single string. Empty/whitespace-only input returns the
    /// zero vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of strings, internally chunked by `batch_size`.
    async fn embed_batch(&self, texts: &[String], batch_size: usize) -> Result<Vec<Vec<f32>>>;
}

/// Cosine similarity normalized to `[0, 1]`, with a zero-norm guard.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    ((dot / (norm_a * norm_b)) + 1.0) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors_are_maximally_similar() {
        let v = vec![0.3, 0.6, 0.1];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_opposite_vectors_are_minimally_similar() {
        let v = vec![0.3, 0.6, 0.1];
        let neg: Vec<f32> = v.iter().map(|x| -x).collect();
        let sim = cosine_similarity(&v, &neg);
        assert!(sim.abs() < 1e-5);
    }

    #[test]
    fn test_zero_vector_guard() {
        let zero = vec![0.0, 0.0, 0.0];
        let v = vec![1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&zero, &v), 0.0);
    }

    #[test]
    fn test_mismatched_lengths_return_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }
}
