// src/retrieval/mod.rs
// Uniform retrieval surface over N configured vector-store backends

pub mod backend;
pub mod memory;

pub use backend::RetrievalBackend;
pub use memory::MemoryBackend;

use anyhow::Result;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::embedding::EmbeddingProvider;

pub const DEFAULT_NUM_RESULTS: usize = 50;

/// A schema.org record from the corpus. The URL is the item's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedItem {
    pub url: String,
    pub name: String,
    pub site: String,
    pub schema_json: Value,
}

/// Site scoping for a search. `"all"` and `"nlws"` both mean cross-site
/// and normalize to `All`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteFilter {
    All,
    One(String),
    Many(Vec<String>),
}

impl SiteFilter {
    pub fn parse(site: &str) -> Self {
        match site {
            "all" | "nlws" | "" => SiteFilter::All,
            other => SiteFilter::One(other.to_string()),
        }
    }

    pub fn from_list(sites: &[String]) -> Self {
        match sites {
            [] => SiteFilter::All,
            [one] => SiteFilter::parse(one),
            many => SiteFilter::Many(many.to_vec()),
        }
    }

    pub fn matches(&self, site: &str) -> bool {
        match self {
            SiteFilter::All => true,
            SiteFilter::One(s) => s == site,
            SiteFilter::Many(sites) => sites.iter().any(|s| s == site),
        }
    }

    pub fn is_cross_site(&self) -> bool {
        matches!(self, SiteFilter::All)
    }
}

/// Fans queries out to every enabled endpoint, deduplicates by URL, and
/// isolates per-endpoint failures.
pub struct Retriever {
    /// (endpoint name, adapter) in config order; order determines the
    /// deterministic interleave of aggregated results.
    endpoints: Vec<(String, Arc<dyn RetrievalBackend>)>,
    write_endpoint: String,
}

impl Retriever {
    pub fn new(endpoints: Vec<(String, Arc<dyn RetrievalBackend>)>, write_endpoint: String) -> Self {
        Self {
            endpoints,
            write_endpoint,
        }
    }

    /// Build adapters for the enabled endpoints in config order. Only the
    /// in-process `memory` driver ships with the crate; other db_types
    /// are skipped with a warning until their adapter is registered.
    pub fn from_config(config: &AppConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        let mut endpoints: Vec<(String, Arc<dyn RetrievalBackend>)> = Vec::new();
        for endpoint in config.retrieval.enabled_endpoints() {
            match endpoint.db_type.as_str() {
                "memory" => {
                    endpoints.push((
                        endpoint.name.clone(),
                        Arc::new(MemoryBackend::new(&endpoint.name, Some(embedder.clone()))),
                    ));
                }
                other => {
                    warn!(
                        "retrieval endpoint '{}' has unsupported db_type '{other}', skipping",
                        endpoint.name
                    );
                }
            }
        }
        Self::new(endpoints, config.retrieval.write_endpoint.clone())
    }

    pub fn endpoint(&self, name: &str) -> Option<Arc<dyn RetrievalBackend>> {
        self.endpoints
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, b)| b.clone())
    }

    fn write_backend(&self, named: Option<&str>) -> Option<Arc<dyn RetrievalBackend>> {
        let name = named.unwrap_or(&self.write_endpoint);
        self.endpoint(name).or_else(|| {
            self.endpoints.first().map(|(_, b)| b.clone())
        })
    }

    /// Search every enabled endpoint in parallel. One failing backend
    /// never fails the call; a total failure yields an empty list.
    pub async fn search(
        &self,
        query: &str,
        site: &SiteFilter,
        n: usize,
    ) -> Vec<RetrievedItem> {
        let futures: Vec<_> = self
            .endpoints
            .iter()
            .map(|(name, backend)| {
                let backend = backend.clone();
                let name = name.clone();
                async move {
                    match backend.search(query, site, n).await {
                        Ok(items) => {
                            debug!("endpoint {name}: {} items", items.len());
                            items
                        }
                        Err(e) => {
                            warn!("retrieval endpoint {name} failed: {e:#}");
                            Vec::new()
                        }
                    }
                }
            })
            .collect();

        // Concatenate in endpoint-config order, then dedup by URL with
        // the first occurrence winning.
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for items in join_all(futures).await {
            for item in items {
                if seen.insert(item.url.clone()) {
                    merged.push(item);
                }
            }
        }
        merged
    }

    pub async fn search_all_sites(&self, query: &str, n: usize) -> Vec<RetrievedItem> {
        self.search(query, &SiteFilter::All, n).await
    }

    /// Search one named endpoint only. Used by the development-mode `db`
    /// override; failures degrade to an empty list like the fan-out path.
    pub async fn search_one(
        &self,
        endpoint: &str,
        query: &str,
        site: &SiteFilter,
        n: usize,
    ) -> Vec<RetrievedItem> {
        let Some(backend) = self.endpoint(endpoint) else {
            warn!("unknown retrieval endpoint '{endpoint}'");
            return Vec::new();
        };
        match backend.search(query, site, n).await {
            Ok(items) => items,
            Err(e) => {
                warn!("retrieval endpoint {endpoint} failed: {e:#}");
                Vec::new()
            }
        }
    }

    /// Exact-URL lookup: the write endpoint first, then the others until
    /// one returns a hit.
    pub async fn search_by_url(&self, url: &str) -> Option<RetrievedItem> {
        let mut order: Vec<Arc<dyn RetrievalBackend>> = Vec::new();
        if let Some(write) = self.write_backend(None) {
            order.push(write);
        }
        for (name, backend) in &self.endpoints {
            if *name != self.write_endpoint {
                order.push(backend.clone());
            }
        }
        for backend in order {
            match backend.search_by_url(url).await {
                Ok(Some(item)) => return Some(item),
                Ok(None) => continue,
                Err(e) => {
                    warn!("search_by_url failed on {}: {e:#}", backend.name());
                    continue;
                }
            }
        }
        None
    }

    /// Sorted union of the sites reported by each backend. Backends
    /// without site support contribute nothing.
    pub async fn get_sites(&self) -> Vec<String> {
        let futures: Vec<_> = self
            .endpoints
            .iter()
            .map(|(name, backend)| {
                let backend = backend.clone();
                let name = name.clone();
                async move {
                    match backend.get_sites().await {
                        Ok(sites) => sites,
                        Err(e) => {
                            warn!("get_sites failed on {name}: {e:#}");
                            Vec::new()
                        }
                    }
                }
            })
            .collect();
        let mut sites: Vec<String> = join_all(futures)
            .await
            .into_iter()
            .flatten()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        sites.sort();
        sites
    }

    pub async fn upload_documents(
        &self,
        docs: &[RetrievedItem],
        endpoint: Option<&str>,
    ) -> Result<usize> {
        let backend = self
            .write_backend(endpoint)
            .ok_or_else(|| anyhow::anyhow!("no write endpoint configured"))?;
        backend.upload_documents(docs).await
    }

    pub async fn delete_documents_by_site(
        &self,
        site: &str,
        endpoint: Option<&str>,
    ) -> Result<usize> {
        let backend = self
            .write_backend(endpoint)
            .ok_or_else(|| anyhow::anyhow!("no write endpoint configured"))?;
        backend.delete_documents_by_site(site).await
    }
}
