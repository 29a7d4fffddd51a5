// src/embedding/mod.rs
// Text embedding capability

pub mod hash;

pub use hash::SimHashEmbedder;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use crate::config::AppConfig;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

/// Build the configured embedding provider. Unknown provider types fall
/// back to the local simhash embedder with a warning so retrieval stays
/// usable without external services.
pub fn provider_from_config(config: &AppConfig) -> Arc<dyn EmbeddingProvider> {
    let preferred = &config.embedding.preferred_provider;
    match config.embedding.provider(preferred) {
        Some(p) if p.provider_type == "simhash" => Arc::new(SimHashEmbedder::new(p.dimension)),
        Some(p) => {
            warn!(
                "no adapter linked for embedding provider type '{}', using simhash",
                p.provider_type
            );
            Arc::new(SimHashEmbedder::new(p.dimension))
        }
        None => {
            warn!("embedding provider '{preferred}' not configured, using simhash");
            Arc::new(SimHashEmbedder::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_of_identical_vectors_is_one() {
        let v = vec![0.5, 0.5, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_handles_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }
}
