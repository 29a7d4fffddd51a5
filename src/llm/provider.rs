// src/llm/provider.rs
// LLM provider trait and the adapter registry keyed by llm_type

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::warn;

use crate::config::llm::LlmEndpoint;

/// Universal structured-completion interface.
///
/// A provider receives a filled prompt plus the JSON schema the response
/// must conform to, and returns the parsed object. Adapters own their
/// connection pools and must be safe to share across requests.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    async fn get_completion(
        &self,
        prompt: &str,
        schema: &Value,
        model: &str,
        max_tokens: usize,
    ) -> Result<Value>;
}

type ProviderFactory = fn(&LlmEndpoint) -> Result<Arc<dyn LlmProvider>>;

/// Lazily-initialized adapter instances, one per configured endpoint.
/// External provider adapters (openai, anthropic, gemini, ...) register
/// factories here; the crate ships only the mock adapter used in
/// development and tests.
pub struct ProviderRegistry {
    factories: RwLock<HashMap<String, ProviderFactory>>,
    instances: RwLock<HashMap<String, Arc<dyn LlmProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        let registry = Self {
            factories: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
        };
        registry.register_factory("mock", |_endpoint| {
            Ok(Arc::new(crate::testing::mock_llm::MockLlmProvider::default()))
        });
        registry
    }

    /// Register an adapter factory for an `llm_type` dispatch key.
    pub fn register_factory(&self, llm_type: &str, factory: ProviderFactory) {
        self.factories
            .write()
            .unwrap()
            .insert(llm_type.to_string(), factory);
    }

    /// Install a concrete provider instance under an endpoint name.
    /// Used by tests to wire a scripted mock to the preferred endpoint.
    pub fn install(&self, endpoint_name: &str, provider: Arc<dyn LlmProvider>) {
        self.instances
            .write()
            .unwrap()
            .insert(endpoint_name.to_string(), provider);
    }

    /// Resolve the provider for an endpoint, instantiating it on first use.
    pub fn provider_for(&self, endpoint: &LlmEndpoint) -> Option<Arc<dyn LlmProvider>> {
        if let Some(instance) = self.instances.read().unwrap().get(&endpoint.name) {
            return Some(instance.clone());
        }
        let factory = *self.factories.read().unwrap().get(&endpoint.llm_type)?;
        match factory(endpoint) {
            Ok(instance) => {
                self.instances
                    .write()
                    .unwrap()
                    .entry(endpoint.name.clone())
                    .or_insert_with(|| instance.clone());
                Some(instance)
            }
            Err(e) => {
                warn!("failed to initialize {} provider: {e}", endpoint.llm_type);
                None
            }
        }
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
