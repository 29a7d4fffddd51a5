// src/app.rs
// Process-wide shared state: config, capability clients, and caches

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::embedding::{self, EmbeddingProvider};
use crate::llm::LlmClient;
use crate::prompts::PromptRegistry;
use crate::retrieval::{RetrievedItem, Retriever};
use crate::router::ToolRegistry;
use crate::storage::{self, ConversationStorage};

/// Shared across all requests. Per-request state lives in
/// `handler::RequestState`; everything here is immutable or internally
/// synchronized.
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub llm: Arc<LlmClient>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub retriever: Arc<Retriever>,
    pub prompts: Arc<PromptRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub storage: Arc<dyn ConversationStorage>,
}

impl AppState {
    /// Wire every capability from config. Fails fast on malformed prompt
    /// or tool files and on unusable storage.
    pub async fn initialize(config: AppConfig) -> Result<Arc<Self>> {
        config.validate()?;
        let config = Arc::new(config);

        let embedder = embedding::provider_from_config(&config);
        let retriever = Arc::new(Retriever::from_config(&config, embedder.clone()));
        let prompts = Arc::new(
            PromptRegistry::load(&config.prompts_xml_path()).context("loading prompts.xml")?,
        );
        let tools =
            Arc::new(ToolRegistry::load(&config.tools_xml_path()).context("loading tools.xml")?);
        let storage = storage::from_config(&config, embedder.clone()).await?;
        let llm = Arc::new(LlmClient::new(config.clone()));

        info!(
            "app state initialized: mode={}, llm endpoint={}",
            config.mode, config.llm.preferred_endpoint
        );
        Ok(Arc::new(Self {
            config,
            llm,
            embedder,
            retriever,
            prompts,
            tools,
            storage,
        }))
    }

    /// Load an optional seed corpus (config_dir/corpus.json, an array of
    /// {url, name, site, schema_object}) into the write endpoint so the
    /// in-memory backend has something to serve in development.
    pub async fn load_seed_corpus(&self) -> Result<usize> {
        let path = self.config.config_dir.join("corpus.json");
        if !path.exists() {
            return Ok(0);
        }
        let raw = std::fs::read_to_string(&path)?;
        let docs: Vec<serde_json::Value> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        let items: Vec<RetrievedItem> = docs
            .into_iter()
            .filter_map(|d| {
                Some(RetrievedItem {
                    url: d.get("url")?.as_str()?.to_string(),
                    name: d.get("name")?.as_str()?.to_string(),
                    site: d.get("site")?.as_str()?.to_string(),
                    schema_json: d.get("schema_object").cloned().unwrap_or(d.clone()),
                })
            })
            .collect();
        if items.is_empty() {
            return Ok(0);
        }
        let count = self.retriever.upload_documents(&items, None).await?;
        info!("seeded {count} corpus documents from {}", path.display());
        Ok(count)
    }
}
