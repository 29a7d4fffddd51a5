// src/config/embedding.rs
// Embedding provider configuration (config_embedding.yaml)

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::helpers::{get_raw_str, get_str, get_u64, mapping_entries};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingProviderConfig {
    pub name: String,
    /// Dispatch key for the embedding adapter registry.
    pub provider_type: String,
    pub api_key: String,
    pub api_endpoint: String,
    pub model: String,
    pub dimension: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub preferred_provider: String,
    pub providers: Vec<EmbeddingProviderConfig>,
}

impl EmbeddingConfig {
    pub fn from_yaml(data: &Value) -> Self {
        let preferred_provider = get_raw_str(data, "preferred_provider", "simhash");
        let mut providers = Vec::new();
        for (name, entry) in mapping_entries(data.get("providers").unwrap_or(&Value::Null)) {
            providers.push(EmbeddingProviderConfig {
                provider_type: get_raw_str(&entry, "provider_type", &name),
                api_key: get_str(&entry, "api_key_env", ""),
                api_endpoint: get_str(&entry, "api_endpoint_env", ""),
                model: get_raw_str(&entry, "model", ""),
                dimension: get_u64(&entry, "dimension", 384) as usize,
                name,
            });
        }
        Self {
            preferred_provider,
            providers,
        }
    }

    pub fn provider(&self, name: &str) -> Option<&EmbeddingProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            preferred_provider: "simhash".to_string(),
            providers: vec![EmbeddingProviderConfig {
                name: "simhash".to_string(),
                provider_type: "simhash".to_string(),
                api_key: String::new(),
                api_endpoint: String::new(),
                model: String::new(),
                dimension: 384,
            }],
        }
    }
}
