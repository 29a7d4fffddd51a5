// src/config/retrieval.rs
// Retrieval endpoint configuration (config_retrieval.yaml)

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::helpers::{get_bool, get_raw_str, get_str, mapping_entries};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalEndpoint {
    pub name: String,
    /// Backend driver key ("memory", "qdrant", "azure_ai_search", ...).
    pub db_type: String,
    pub enabled: bool,
    pub api_key: String,
    pub api_endpoint: String,
    pub index_name: String,
    pub database_path: String,
}

/// Endpoints are kept in file order; aggregation interleaves results by
/// concatenation in this order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub write_endpoint: String,
    pub endpoints: Vec<RetrievalEndpoint>,
}

impl RetrievalConfig {
    pub fn from_yaml(data: &Value) -> Self {
        let write_endpoint = get_raw_str(data, "write_endpoint", "");
        let mut endpoints = Vec::new();
        for (name, entry) in mapping_entries(data.get("endpoints").unwrap_or(&Value::Null)) {
            endpoints.push(RetrievalEndpoint {
                db_type: get_raw_str(&entry, "db_type", "memory"),
                enabled: get_bool(&entry, "enabled", true),
                api_key: get_str(&entry, "api_key_env", ""),
                api_endpoint: get_str(&entry, "api_endpoint_env", ""),
                index_name: get_raw_str(&entry, "index_name", ""),
                database_path: get_raw_str(&entry, "database_path", ""),
                name,
            });
        }
        let write_endpoint = if write_endpoint.is_empty() {
            endpoints
                .iter()
                .find(|e| e.enabled)
                .map(|e| e.name.clone())
                .unwrap_or_default()
        } else {
            write_endpoint
        };
        Self {
            write_endpoint,
            endpoints,
        }
    }

    pub fn enabled_endpoints(&self) -> impl Iterator<Item = &RetrievalEndpoint> {
        self.endpoints.iter().filter(|e| e.enabled)
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            write_endpoint: "memory".to_string(),
            endpoints: vec![RetrievalEndpoint {
                name: "memory".to_string(),
                db_type: "memory".to_string(),
                enabled: true,
                api_key: String::new(),
                api_endpoint: String::new(),
                index_name: String::new(),
                database_path: String::new(),
            }],
        }
    }
}
