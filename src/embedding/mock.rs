//! Deterministic mock provider for tests and offline runs.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use super::{EmbeddingError, EmbeddingProvider};

/// Hash-bucket bag-of-words embedder. The same text always produces the
/// same vector; texts sharing no tokens land in (almost surely) different
/// buckets.
pub struct MockEmbeddingProvider {
    dimensions: usize,
    fail: bool,
}

impl MockEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            fail: false,
        }
    }

    /// A provider whose every call fails, for exercising degraded paths.
    pub fn failing(dimensions: usize) -> Self {
        Self {
            dimensions,
            fail: true,
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dimensions;
            vector[bucket] += 1.0;
        }

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if self.fail {
            return Err(EmbeddingError::Api("mock provider failure".to_string()));
        }
        Ok(self.embed_sync(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_text_identical_vector() {
        let provider = MockEmbeddingProvider::new(64);
        let a = provider.embed("I prefer dark mode").await.unwrap();
        let b = provider.embed("I prefer dark mode").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn disjoint_texts_diverge() {
        let provider = MockEmbeddingProvider::new(64);
        let a = provider.embed("I prefer dark mode").await.unwrap();
        let b = provider.embed("quarterly budget review").await.unwrap();
        let dot: f32 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        assert!(dot < 0.99, "unrelated texts should not be near-identical");
    }

    #[tokio::test]
    async fn failing_provider_errors() {
        let provider = MockEmbeddingProvider::failing(8);
        assert!(provider.embed("anything").await.is_err());
    }
}
