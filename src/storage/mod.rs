// src/storage/mod.rs
// Conversation storage capability

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::embedding::EmbeddingProvider;

/// One exchange between user and assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub conversation_id: String,
    pub thread_id: String,
    pub user_id: String,
    pub site: String,
    pub user_prompt: String,
    pub response: String,
    pub time_of_creation: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl ConversationEntry {
    /// The text the conversation embedding is computed from.
    pub fn embedding_text(user_prompt: &str, response: &str) -> String {
        format!("User: {user_prompt}\nAssistant: {response}")
    }

    /// Compact JSON form for API responses.
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.conversation_id,
            "user_prompt": self.user_prompt,
            "response": self.response,
            "time": self.time_of_creation.to_rfc3339(),
        })
    }
}

/// Conversations that share a thread id, oldest first.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationThread {
    pub id: String,
    pub site: String,
    pub conversations: Vec<Value>,
}

#[async_trait]
pub trait ConversationStorage: Send + Sync {
    /// Store one exchange. A null `thread_id` starts a new thread. The
    /// returned entry carries the generated conversation id, the UTC
    /// timestamp, and the computed embedding.
    async fn add_conversation(
        &self,
        user_id: &str,
        site: &str,
        thread_id: Option<String>,
        user_prompt: &str,
        response: &str,
    ) -> Result<ConversationEntry>;

    /// Most recent conversations for a user, grouped by thread: threads
    /// ordered by their latest conversation descending, conversations
    /// oldest-first inside each thread. `site == "all"` disables the
    /// site filter.
    async fn get_recent_conversations(
        &self,
        user_id: &str,
        site: &str,
        limit: usize,
    ) -> Result<Vec<ConversationThread>>;

    /// Idempotent; false when nothing matched.
    async fn delete_conversation(&self, conversation_id: &str, user_id: Option<&str>)
    -> Result<bool>;

    async fn search_conversations(
        &self,
        query: &str,
        user_id: Option<&str>,
        site: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ConversationEntry>>;
}

/// Group a flat, filtered entry list into threads with the ordering the
/// capability contract requires. Shared by the storage providers.
pub fn group_into_threads(mut entries: Vec<ConversationEntry>, limit: usize) -> Vec<ConversationThread> {
    entries.sort_by(|a, b| b.time_of_creation.cmp(&a.time_of_creation));
    entries.truncate(limit);

    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<ConversationEntry>> = HashMap::new();
    // Entries arrive newest-first, so thread order falls out of first
    // appearance.
    for entry in entries {
        if !grouped.contains_key(&entry.thread_id) {
            order.push(entry.thread_id.clone());
        }
        grouped.entry(entry.thread_id.clone()).or_default().push(entry);
    }

    order
        .into_iter()
        .map(|thread_id| {
            let mut conversations = grouped.remove(&thread_id).unwrap_or_default();
            conversations.sort_by(|a, b| a.time_of_creation.cmp(&b.time_of_creation));
            ConversationThread {
                id: thread_id,
                site: conversations
                    .first()
                    .map(|c| c.site.clone())
                    .unwrap_or_default(),
                conversations: conversations.iter().map(ConversationEntry::to_json).collect(),
            }
        })
        .collect()
}

/// Build the configured storage provider.
pub async fn from_config(
    config: &AppConfig,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<Arc<dyn ConversationStorage>> {
    let storage = &config.nlweb.conversation_storage;
    match storage.storage_type.as_str() {
        "sqlite" => Ok(Arc::new(
            SqliteStorage::connect(&storage.database_path, Some(embedder)).await?,
        )),
        "memory" => Ok(Arc::new(MemoryStorage::new(Some(embedder)))),
        other => {
            tracing::warn!("unknown conversation storage type '{other}', using memory");
            Ok(Arc::new(MemoryStorage::new(Some(embedder))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(thread: &str, minute: u32) -> ConversationEntry {
        ConversationEntry {
            conversation_id: format!("{thread}-{minute}"),
            thread_id: thread.to_string(),
            user_id: "u".to_string(),
            site: "s".to_string(),
            user_prompt: "p".to_string(),
            response: "r".to_string(),
            time_of_creation: chrono::DateTime::parse_from_rfc3339(&format!(
                "2026-01-01T10:{minute:02}:00Z"
            ))
            .unwrap()
            .with_timezone(&Utc),
            embedding: None,
        }
    }

    #[test]
    fn threads_ordered_by_recency_conversations_oldest_first() {
        let threads = group_into_threads(
            vec![entry("t1", 1), entry("t2", 5), entry("t1", 9), entry("t2", 3)],
            10,
        );
        assert_eq!(threads.len(), 2);
        // t1's latest (10:09) beats t2's latest (10:05).
        assert_eq!(threads[0].id, "t1");
        let t1_times: Vec<&str> = threads[0]
            .conversations
            .iter()
            .map(|c| c["time"].as_str().unwrap())
            .collect();
        assert!(t1_times[0] < t1_times[1], "oldest first within a thread");
    }
}
