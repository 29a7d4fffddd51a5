// src/retrieval/memory.rs
// In-memory retrieval backend for development and tests

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};

use super::backend::RetrievalBackend;
use super::{RetrievedItem, SiteFilter};
use crate::embedding::{EmbeddingProvider, cosine_similarity};
use crate::utils::trim_schema_json;

struct StoredDoc {
    item: RetrievedItem,
    embedding: Option<Vec<f32>>,
}

/// HashMap-backed corpus scored with the embedding capability, with a
/// keyword-overlap fallback when no embedder is wired.
pub struct MemoryBackend {
    name: String,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    docs: RwLock<Vec<StoredDoc>>,
}

impl MemoryBackend {
    pub fn new(name: &str, embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self {
            name: name.to_string(),
            embedder,
            docs: RwLock::new(Vec::new()),
        }
    }

    fn doc_text(item: &RetrievedItem) -> String {
        format!("{} {}", item.name, trim_schema_json(&item.schema_json))
    }

    fn keyword_score(query: &str, text: &str) -> f32 {
        let text_lower = text.to_lowercase();
        let words: Vec<&str> = query
            .split_whitespace()
            .filter(|w| w.len() > 2)
            .collect();
        if words.is_empty() {
            return 0.0;
        }
        let hits = words
            .iter()
            .filter(|w| text_lower.contains(&w.to_lowercase()))
            .count();
        hits as f32 / words.len() as f32
    }
}

#[async_trait]
impl RetrievalBackend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        query: &str,
        site: &SiteFilter,
        n: usize,
    ) -> Result<Vec<RetrievedItem>> {
        let query_embedding = match &self.embedder {
            Some(embedder) => Some(embedder.embed(query).await?),
            None => None,
        };

        let docs = self.docs.read().unwrap();
        let mut scored: Vec<(f32, RetrievedItem)> = docs
            .iter()
            .filter(|doc| site.matches(&doc.item.site))
            .map(|doc| {
                let score = match (&query_embedding, &doc.embedding) {
                    (Some(q), Some(d)) => cosine_similarity(q, d),
                    _ => Self::keyword_score(query, &Self::doc_text(&doc.item)),
                };
                (score, doc.item.clone())
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(n).map(|(_, item)| item).collect())
    }

    async fn search_by_url(&self, url: &str) -> Result<Option<RetrievedItem>> {
        let docs = self.docs.read().unwrap();
        Ok(docs.iter().find(|d| d.item.url == url).map(|d| d.item.clone()))
    }

    async fn get_sites(&self) -> Result<Vec<String>> {
        let docs = self.docs.read().unwrap();
        let sites: BTreeSet<String> = docs.iter().map(|d| d.item.site.clone()).collect();
        Ok(sites.into_iter().collect())
    }

    async fn upload_documents(&self, items: &[RetrievedItem]) -> Result<usize> {
        let mut prepared = Vec::with_capacity(items.len());
        for item in items {
            let embedding = match &self.embedder {
                Some(embedder) => Some(embedder.embed(&Self::doc_text(item)).await?),
                None => None,
            };
            prepared.push(StoredDoc {
                item: item.clone(),
                embedding,
            });
        }
        let mut docs = self.docs.write().unwrap();
        // Replace on URL collision so re-uploads update in place.
        for prepared_doc in prepared {
            docs.retain(|d| d.item.url != prepared_doc.item.url);
            docs.push(prepared_doc);
        }
        Ok(items.len())
    }

    async fn delete_documents_by_site(&self, site: &str) -> Result<usize> {
        let mut docs = self.docs.write().unwrap();
        let before = docs.len();
        docs.retain(|d| d.item.site != site);
        Ok(before - docs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::SimHashEmbedder;
    use serde_json::json;

    fn item(url: &str, name: &str, site: &str) -> RetrievedItem {
        RetrievedItem {
            url: url.to_string(),
            name: name.to_string(),
            site: site.to_string(),
            schema_json: json!({"@type": "Recipe", "name": name}),
        }
    }

    #[tokio::test]
    async fn search_filters_by_site_and_ranks() {
        let backend = MemoryBackend::new("mem", Some(Arc::new(SimHashEmbedder::default())));
        backend
            .upload_documents(&[
                item("https://a/1", "chicken pasta dinner", "siteA"),
                item("https://a/2", "beef stew", "siteA"),
                item("https://b/1", "chicken soup", "siteB"),
            ])
            .await
            .unwrap();

        let results = backend
            .search("chicken dinner", &SiteFilter::One("siteA".to_string()), 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].name, "chicken pasta dinner");

        let all = backend.search("chicken", &SiteFilter::All, 10).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn upload_replaces_by_url() {
        let backend = MemoryBackend::new("mem", None);
        backend.upload_documents(&[item("https://a/1", "v1", "s")]).await.unwrap();
        backend.upload_documents(&[item("https://a/1", "v2", "s")]).await.unwrap();
        let found = backend.search_by_url("https://a/1").await.unwrap().unwrap();
        assert_eq!(found.name, "v2");
    }

    #[tokio::test]
    async fn delete_by_site() {
        let backend = MemoryBackend::new("mem", None);
        backend
            .upload_documents(&[item("https://a/1", "x", "s1"), item("https://a/2", "y", "s2")])
            .await
            .unwrap();
        assert_eq!(backend.delete_documents_by_site("s1").await.unwrap(), 1);
        assert_eq!(backend.get_sites().await.unwrap(), vec!["s2"]);
    }
}
