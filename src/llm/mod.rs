// src/llm/mod.rs
// Structured-completion capability: ask(prompt, schema) -> parsed JSON

pub mod provider;

pub use provider::{LlmProvider, ProviderRegistry};

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::config::AppConfig;

/// Model capability tier. Low-tier models handle the high-volume per-item
/// calls; high-tier models handle routing, decontextualization, and
/// synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Low,
    High,
}

impl Tier {
    pub fn default_timeout(&self) -> Duration {
        match self {
            Tier::Low => Duration::from_secs(8),
            Tier::High => Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AskOptions {
    /// Endpoint name override; the preferred endpoint when absent.
    pub endpoint: Option<String>,
    pub tier: Tier,
    pub timeout: Duration,
    pub max_tokens: usize,
}

impl AskOptions {
    pub fn low() -> Self {
        Self::tiered(Tier::Low)
    }

    pub fn high() -> Self {
        Self::tiered(Tier::High)
    }

    pub fn tiered(tier: Tier) -> Self {
        Self {
            endpoint: None,
            tier,
            timeout: tier.default_timeout(),
            max_tokens: 512,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Apply development-mode overrides (`llm_provider`, `llm_level`) from
    /// request query params. Ignored in production.
    pub fn with_dev_overrides(
        mut self,
        config: &AppConfig,
        query_params: &HashMap<String, String>,
    ) -> Self {
        if !config.is_development_mode() {
            return self;
        }
        if let Some(endpoint) = query_params.get("llm_provider") {
            debug!("development mode: LLM provider overridden to {endpoint}");
            self.endpoint = Some(endpoint.clone());
        }
        if let Some(level) = query_params.get("llm_level") {
            self.tier = match level.as_str() {
                "high" => Tier::High,
                _ => Tier::Low,
            };
        }
        self
    }
}

/// Shared LLM client: endpoint selection, tiered model choice, per-call
/// timeout, and degradation to `{}` on failure.
pub struct LlmClient {
    config: Arc<AppConfig>,
    registry: ProviderRegistry,
}

impl LlmClient {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            config,
            registry: ProviderRegistry::new(),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Ask for a structured completion. Errors (unknown endpoint, adapter
    /// failure, timeout, malformed response) are returned so the caller
    /// can honor the testing-mode raise policy.
    pub async fn try_ask(&self, prompt: &str, schema: &Value, opts: &AskOptions) -> anyhow::Result<Value> {
        let endpoint_name = opts
            .endpoint
            .as_deref()
            .unwrap_or(&self.config.llm.preferred_endpoint);
        let endpoint = self
            .config
            .llm
            .endpoint(endpoint_name)
            .ok_or_else(|| anyhow::anyhow!("unknown LLM endpoint '{endpoint_name}'"))?;
        let provider = self
            .registry
            .provider_for(endpoint)
            .ok_or_else(|| anyhow::anyhow!("no adapter for llm_type '{}'", endpoint.llm_type))?;

        let model = match opts.tier {
            Tier::Low => &endpoint.models.low,
            Tier::High => &endpoint.models.high,
        };
        debug!(
            "LLM request: endpoint={endpoint_name} model={model} timeout={:?}",
            opts.timeout
        );

        match tokio::time::timeout(
            opts.timeout,
            provider.get_completion(prompt, schema, model, opts.max_tokens),
        )
        .await
        {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.context(format!("LLM call failed on endpoint {endpoint_name}"))),
            Err(_) => Err(anyhow::anyhow!(
                "LLM call timed out after {:?} on endpoint {endpoint_name}",
                opts.timeout
            )),
        }
    }

    /// Ask, degrading every failure to an empty object. Callers treat `{}`
    /// as "no structured response" and skip the item rather than failing
    /// the request.
    pub async fn ask(&self, prompt: &str, schema: &Value, opts: &AskOptions) -> Value {
        match self.try_ask(prompt, schema, opts).await {
            Ok(value) => value,
            Err(e) => {
                error!("{e:#}");
                Value::Object(serde_json::Map::new())
            }
        }
    }
}

/// True when a response carries no usable structure (error degradation or
/// an empty completion).
pub fn is_empty_response(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mock_llm::MockLlmProvider;
    use serde_json::json;

    #[tokio::test]
    async fn ask_routes_to_installed_provider() {
        let config = Arc::new(AppConfig::for_tests());
        let client = LlmClient::new(config);
        client.registry().install(
            "mock",
            Arc::new(MockLlmProvider::new().with_default(json!({"score": 80}))),
        );

        let response = client
            .ask("rank this", &json!({"score": "integer"}), &AskOptions::low())
            .await;
        assert_eq!(response["score"], 80);
    }

    #[tokio::test]
    async fn unknown_endpoint_degrades_to_empty() {
        let config = Arc::new(AppConfig::for_tests());
        let client = LlmClient::new(config);
        let opts = AskOptions {
            endpoint: Some("nope".to_string()),
            ..AskOptions::low()
        };
        let response = client.ask("x", &json!({}), &opts).await;
        assert!(is_empty_response(&response));
    }
}
