// src/retrieval/backend.rs
// Backend capability implemented by every vector-store adapter

use anyhow::Result;
use async_trait::async_trait;

use super::{RetrievedItem, SiteFilter};

/// One vector-store endpoint. Adapters own their connection pools and
/// must be safe to share across concurrent requests.
#[async_trait]
pub trait RetrievalBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Top-n items for a query, scoped by site. Order is backend-ranked,
    /// best first.
    async fn search(&self, query: &str, site: &SiteFilter, n: usize)
    -> Result<Vec<RetrievedItem>>;

    /// Exact-URL lookup.
    async fn search_by_url(&self, url: &str) -> Result<Option<RetrievedItem>>;

    /// Sites present in this backend's corpus. Backends without site
    /// metadata may return an empty list; that is not an error.
    async fn get_sites(&self) -> Result<Vec<String>>;

    async fn upload_documents(&self, docs: &[RetrievedItem]) -> Result<usize>;

    async fn delete_documents_by_site(&self, site: &str) -> Result<usize>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
