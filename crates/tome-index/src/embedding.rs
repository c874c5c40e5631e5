//! Embedding service trait and the built-in feature-hashing embedder.
//!
//! `HashEmbedding` maps each token of the input into a bucket of a
//! fixed-dimension vector via a stable hash, so texts that share vocabulary
//! land near each other in cosine space. That gives retrieval and clustering
//! real similarity structure without any model download, and makes every
//! embedding fully deterministic.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::IndexError;

/// Default vector dimension for the hashing embedder.
pub const DEFAULT_DIMENSIONS: usize = 256;

/// Service for generating text embeddings.
///
/// Implementations convert text into fixed-dimensional vectors. Used for
/// both ingestion (indexing fragments) and querying.
pub trait EmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text.
    fn embed(
        &self,
        text: &str,
    ) -> impl std::future::Future<Output = Result<Vec<f32>, IndexError>> + Send;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe version of [`EmbeddingService`] for dynamic dispatch.
///
/// Because `EmbeddingService::embed` returns `impl Future` it is not
/// object-safe. This trait uses a boxed future instead, and a blanket impl
/// makes every `EmbeddingService` usable through it.
pub trait DynEmbeddingService: Send + Sync {
    /// Generate an embedding vector for the given text (boxed future).
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, IndexError>> + Send + 'a>>;

    /// Return the dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

impl<T: EmbeddingService> DynEmbeddingService for T {
    fn embed_boxed<'a>(
        &'a self,
        text: &'a str,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Vec<f32>, IndexError>> + Send + 'a>>
    {
        Box::pin(self.embed(text))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

/// Deterministic token-hashing embedder.
///
/// Each token contributes +1 or -1 to one bucket (signed feature hashing);
/// the result is L2-normalized. Identical inputs always produce identical
/// vectors.
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimensions: usize,
}

impl HashEmbedding {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 1)
            .map(|t| t.to_lowercase())
    }

    fn hash_token(token: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        token.hash(&mut hasher);
        hasher.finish()
    }

    fn embed_sync(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        if text.trim().is_empty() {
            return Err(IndexError::EmptyText);
        }

        let mut vector = vec![0.0f32; self.dimensions];
        let mut tokens = 0usize;
        for token in Self::tokenize(text) {
            let h = Self::hash_token(&token);
            let bucket = (h % self.dimensions as u64) as usize;
            // Use a high-order bit for the sign so bucket and sign are
            // decorrelated.
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
            tokens += 1;
        }

        if tokens == 0 {
            return Err(IndexError::EmptyText);
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl EmbeddingService for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        self.embed_sync(text)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (*x as f64) * (*y as f64))
        .sum();

    let mag_a: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let mag_b: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embedding_dimension() {
        let service = HashEmbedding::default();
        let vec = service.embed("hello world").await.unwrap();
        assert_eq!(vec.len(), DEFAULT_DIMENSIONS);
    }

    #[tokio::test]
    async fn test_embedding_deterministic() {
        let service = HashEmbedding::default();
        let v1 = service.embed("same text").await.unwrap();
        let v2 = service.embed("same text").await.unwrap();
        assert_eq!(v1, v2);
    }

    #[tokio::test]
    async fn test_embedding_different_inputs() {
        let service = HashEmbedding::default();
        let v1 = service.embed("text about gardening").await.unwrap();
        let v2 = service.embed("completely unrelated quantum physics").await.unwrap();
        assert_ne!(v1, v2);
    }

    #[tokio::test]
    async fn test_embedding_empty_text() {
        let service = HashEmbedding::default();
        assert!(matches!(
            service.embed("").await.unwrap_err(),
            IndexError::EmptyText
        ));
        assert!(matches!(
            service.embed("   ").await.unwrap_err(),
            IndexError::EmptyText
        ));
    }

    #[tokio::test]
    async fn test_embedding_is_unit_length() {
        let service = HashEmbedding::default();
        let vec = service.embed("normalize me please").await.unwrap();
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5, "norm was {}", norm);
    }

    #[tokio::test]
    async fn test_shared_vocabulary_is_cosine_near() {
        let service = HashEmbedding::default();
        let a = service
            .embed("the authentication system uses refresh tokens")
            .await
            .unwrap();
        let b = service
            .embed("refresh tokens secure the authentication system")
            .await
            .unwrap();
        let c = service
            .embed("tomato plants grow best in full summer sunlight")
            .await
            .unwrap();

        let sim_ab = cosine_similarity(&a, &b);
        let sim_ac = cosine_similarity(&a, &c);
        assert!(
            sim_ab > sim_ac,
            "overlapping texts should be nearer: ab={} ac={}",
            sim_ab,
            sim_ac
        );
    }

    #[tokio::test]
    async fn test_case_insensitive_tokens() {
        let service = HashEmbedding::default();
        let a = service.embed("Rust Programming").await.unwrap();
        let b = service.embed("rust programming").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_custom_dimensions() {
        let service = HashEmbedding::new(64);
        let vec = service.embed("short vector").await.unwrap();
        assert_eq!(vec.len(), 64);
        assert_eq!(EmbeddingService::dimensions(&service), 64);
    }

    #[tokio::test]
    async fn test_dyn_dispatch() {
        let service: Box<dyn DynEmbeddingService> = Box::new(HashEmbedding::default());
        let vec = service.embed_boxed("through the object").await.unwrap();
        assert_eq!(vec.len(), service.dimensions());
    }

    // ---- cosine_similarity ----

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }
}
