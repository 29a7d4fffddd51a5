// src/config/llm.rs
// LLM endpoint configuration (config_llm.yaml)

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::helpers::{get_raw_str, get_str, mapping_entries};

/// Model identifiers for the two capability tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPair {
    pub high: String,
    pub low: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmEndpoint {
    pub name: String,
    /// Dispatch key for the provider adapter registry.
    pub llm_type: String,
    pub api_key: String,
    pub api_endpoint: String,
    pub api_version: String,
    pub models: ModelPair,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub preferred_endpoint: String,
    pub endpoints: Vec<LlmEndpoint>,
}

impl LlmConfig {
    pub fn from_yaml(data: &Value) -> Self {
        let preferred_endpoint = get_raw_str(data, "preferred_endpoint", "mock");
        let mut endpoints = Vec::new();
        for (name, entry) in mapping_entries(data.get("endpoints").unwrap_or(&Value::Null)) {
            let models = entry.get("models").cloned().unwrap_or(Value::Null);
            endpoints.push(LlmEndpoint {
                llm_type: get_raw_str(&entry, "llm_type", &name),
                api_key: get_str(&entry, "api_key_env", ""),
                api_endpoint: get_str(&entry, "api_endpoint_env", ""),
                api_version: get_str(&entry, "api_version_env", ""),
                models: ModelPair {
                    high: get_raw_str(&models, "high", "high"),
                    low: get_raw_str(&models, "low", "low"),
                },
                name,
            });
        }
        Self {
            preferred_endpoint,
            endpoints,
        }
    }

    pub fn endpoint(&self, name: &str) -> Option<&LlmEndpoint> {
        self.endpoints.iter().find(|e| e.name == name)
    }

    pub fn preferred(&self) -> Option<&LlmEndpoint> {
        self.endpoint(&self.preferred_endpoint)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            preferred_endpoint: "mock".to_string(),
            endpoints: vec![LlmEndpoint {
                name: "mock".to_string(),
                llm_type: "mock".to_string(),
                api_key: String::new(),
                api_endpoint: String::new(),
                api_version: String::new(),
                models: ModelPair {
                    high: "mock-high".to_string(),
                    low: "mock-low".to_string(),
                },
            }],
        }
    }
}
