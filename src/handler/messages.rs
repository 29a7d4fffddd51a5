// src/handler/messages.rs
// The closed vocabulary of messages streamed to clients

use serde::Serialize;
use serde_json::Value;

/// One ranked result inside a `result_batch` frame.
#[derive(Debug, Clone, Serialize)]
pub struct ResultItem {
    pub url: String,
    pub name: String,
    pub site: String,
    #[serde(rename = "siteUrl")]
    pub site_url: String,
    pub score: u32,
    pub description: String,
    pub schema_object: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct MapLocation {
    pub title: String,
    pub address: String,
}

/// Every message the pipeline may emit. `query_id` is attached at send
/// time, so it is not part of the variants.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum Message {
    AskingSites {
        message: String,
    },
    DecontextualizedQuery {
        decontextualized_query: String,
        original_query: String,
    },
    ToolSelection {
        selected_tool: String,
        score: u32,
        parameters: Value,
        query: String,
        time_elapsed: String,
    },
    QueryRewrite {
        original_query: String,
        rewritten_queries: Vec<String>,
    },
    Remember {
        item_to_remember: String,
        message: String,
    },
    AskUser {
        message: String,
    },
    SiteIsIrrelevantToQuery {
        message: String,
    },
    ResultBatch {
        results: Vec<ResultItem>,
    },
    ItemDetails {
        name: String,
        details: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        score: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        explanation: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        additional_context: Option<String>,
        url: String,
        site: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        schema_object: Option<Value>,
    },
    CompareItems {
        comparison: String,
        item1: Value,
        item2: Value,
    },
    SubstitutionSuggestions {
        message: String,
        substitutions: Value,
        recipes: Vec<Value>,
    },
    Nlws {
        answer: String,
        items: Vec<Value>,
    },
    Summary {
        message: String,
    },
    ResultsMap {
        locations: Vec<MapLocation>,
    },
    IntermediateMessage {
        message: String,
    },
    NoResults {
        message: String,
    },
    Error {
        message: String,
    },
}

impl Message {
    /// Serialize with the request's query id attached.
    pub fn to_frame(&self, query_id: &str) -> Value {
        let mut value = serde_json::to_value(self).expect("message serialization cannot fail");
        if let Value::Object(map) = &mut value {
            map.insert("query_id".to_string(), Value::String(query_id.to_string()));
        }
        value
    }

    pub fn message_type(&self) -> &'static str {
        match self {
            Message::AskingSites { .. } => "asking_sites",
            Message::DecontextualizedQuery { .. } => "decontextualized_query",
            Message::ToolSelection { .. } => "tool_selection",
            Message::QueryRewrite { .. } => "query_rewrite",
            Message::Remember { .. } => "remember",
            Message::AskUser { .. } => "ask_user",
            Message::SiteIsIrrelevantToQuery { .. } => "site_is_irrelevant_to_query",
            Message::ResultBatch { .. } => "result_batch",
            Message::ItemDetails { .. } => "item_details",
            Message::CompareItems { .. } => "compare_items",
            Message::SubstitutionSuggestions { .. } => "substitution_suggestions",
            Message::Nlws { .. } => "nlws",
            Message::Summary { .. } => "summary",
            Message::ResultsMap { .. } => "results_map",
            Message::IntermediateMessage { .. } => "intermediate_message",
            Message::NoResults { .. } => "no_results",
            Message::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_carry_message_type_and_query_id() {
        let frame = Message::AskUser {
            message: "which city?".to_string(),
        }
        .to_frame("q-1");
        assert_eq!(frame["message_type"], "ask_user");
        assert_eq!(frame["query_id"], "q-1");
    }

    #[test]
    fn result_items_use_site_url_key() {
        let frame = Message::ResultBatch {
            results: vec![ResultItem {
                url: "u".into(),
                name: "n".into(),
                site: "s".into(),
                site_url: "s".into(),
                score: 80,
                description: "d".into(),
                schema_object: serde_json::json!({}),
            }],
        }
        .to_frame("q");
        assert!(frame["results"][0].get("siteUrl").is_some());
    }
}
