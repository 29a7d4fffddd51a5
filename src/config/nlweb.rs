// src/config/nlweb.rs
// Pipeline behavior configuration (config_nlweb.yaml)

use serde::{Deserialize, Serialize};
use serde_yaml::Value;

use super::helpers::{get_bool, get_raw_str, get_string_list, get_u64};

/// Per-step enable flags for the precheck stage. A disabled step completes
/// immediately with a safe default that never aborts the fast track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecheckFlags {
    pub analyze_query: bool,
    pub decontextualize: bool,
    pub relevance_detection: bool,
    pub memory: bool,
    pub required_info: bool,
    pub query_rewrite: bool,
    pub tool_selection: bool,
    pub fast_track: bool,
}

impl PrecheckFlags {
    fn from_yaml(data: &Value) -> Self {
        Self {
            analyze_query: get_bool(data, "analyze_query", true),
            decontextualize: get_bool(data, "decontextualize", true),
            relevance_detection: get_bool(data, "relevance_detection", true),
            memory: get_bool(data, "memory", true),
            required_info: get_bool(data, "required_info", true),
            query_rewrite: get_bool(data, "query_rewrite", true),
            tool_selection: get_bool(data, "tool_selection", true),
            fast_track: get_bool(data, "fast_track", true),
        }
    }
}

/// Score thresholds for ranking and tool routing. The two early-send
/// values intentionally differ between the list and generate paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thresholds {
    pub early_send_threshold: u32,
    pub early_send_threshold_generate: u32,
    pub num_results_to_send: usize,
    pub min_result_score: u32,
    pub min_tool_score: u32,
    pub tool_early_termination_score: u32,
    pub item_match_send_score: u32,
    pub item_match_buffer_score: u32,
}

impl Thresholds {
    fn from_yaml(data: &Value) -> Self {
        Self {
            early_send_threshold: get_u64(data, "early_send_threshold", 59) as u32,
            early_send_threshold_generate: get_u64(data, "early_send_threshold_generate", 55)
                as u32,
            num_results_to_send: get_u64(data, "num_results_to_send", 10) as usize,
            min_result_score: get_u64(data, "min_result_score", 51) as u32,
            min_tool_score: get_u64(data, "min_tool_score", 70) as u32,
            tool_early_termination_score: get_u64(data, "tool_early_termination_score", 90) as u32,
            item_match_send_score: get_u64(data, "item_match_send_score", 75) as u32,
            item_match_buffer_score: get_u64(data, "item_match_buffer_score", 60) as u32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationStorageConfig {
    /// Storage driver key ("memory" or "sqlite").
    pub storage_type: String,
    pub database_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NlwebConfig {
    /// Sites a query may be scoped to; empty means any.
    pub allowed_sites: Vec<String>,
    pub prechecks: PrecheckFlags,
    pub thresholds: Thresholds,
    pub conversation_storage: ConversationStorageConfig,
}

impl NlwebConfig {
    pub fn from_yaml(data: &Value) -> Self {
        let storage = data.get("conversation_storage").cloned().unwrap_or(Value::Null);
        Self {
            allowed_sites: get_string_list(data, "sites"),
            prechecks: PrecheckFlags::from_yaml(data.get("prechecks").unwrap_or(&Value::Null)),
            thresholds: Thresholds::from_yaml(data.get("thresholds").unwrap_or(&Value::Null)),
            conversation_storage: ConversationStorageConfig {
                storage_type: get_raw_str(&storage, "type", "memory"),
                database_path: get_raw_str(&storage, "database_path", "./nlweb_conversations.db"),
            },
        }
    }

    pub fn is_site_allowed(&self, site: &str) -> bool {
        self.allowed_sites.is_empty()
            || site == "all"
            || self.allowed_sites.iter().any(|s| s == site)
    }
}

impl Default for NlwebConfig {
    fn default() -> Self {
        Self::from_yaml(&Value::Null)
    }
}
