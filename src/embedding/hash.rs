// src/embedding/hash.rs
// Deterministic local embedder (no model files, no network)

use anyhow::Result;
use async_trait::async_trait;
use std::hash::{DefaultHasher, Hash, Hasher};

use super::EmbeddingProvider;

/// SimHash-style embedder: each word's hash bits are spread across the
/// vector, then the sum is L2-normalized. Good enough for similarity
/// ordering in development and tests; real deployments register a neural
/// embedding adapter instead.
pub struct SimHashEmbedder {
    dimension: usize,
}

impl SimHashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn compute(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return vector;
        }

        for word in &words {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let hash = hasher.finish();
            for (i, val) in vector.iter_mut().enumerate() {
                let mixed = hash ^ (i as u64);
                if (mixed >> (i % 64)) & 1 == 1 {
                    *val += 1.0;
                } else {
                    *val -= 1.0;
                }
            }
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut vector {
                *val /= norm;
            }
        }
        vector
    }
}

impl Default for SimHashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for SimHashEmbedder {
    fn name(&self) -> &str {
        "simhash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.compute(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[tokio::test]
    async fn deterministic_and_normalized() {
        let embedder = SimHashEmbedder::default();
        let a = embedder.embed("chicken dinner recipes").await.unwrap();
        let b = embedder.embed("chicken dinner recipes").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn shared_words_score_higher() {
        let embedder = SimHashEmbedder::default();
        let query = embedder.embed("easy chicken dinner").await.unwrap();
        let related = embedder.embed("chicken dinner for weeknights").await.unwrap();
        let unrelated = embedder.embed("quantum chromodynamics lattice").await.unwrap();
        assert!(
            cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated),
            "related text should be closer"
        );
    }
}
