// src/storage/memory.rs
// In-process conversation storage for development and tests

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::{ConversationEntry, ConversationStorage, ConversationThread, group_into_threads};
use crate::embedding::{EmbeddingProvider, cosine_similarity};

pub struct MemoryStorage {
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    entries: Mutex<Vec<ConversationEntry>>,
}

impl MemoryStorage {
    pub fn new(embedder: Option<Arc<dyn EmbeddingProvider>>) -> Self {
        Self {
            embedder,
            entries: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl ConversationStorage for MemoryStorage {
    async fn add_conversation(
        &self,
        user_id: &str,
        site: &str,
        thread_id: Option<String>,
        user_prompt: &str,
        response: &str,
    ) -> Result<ConversationEntry> {
        let embedding = match &self.embedder {
            Some(embedder) => Some(
                embedder
                    .embed(&ConversationEntry::embedding_text(user_prompt, response))
                    .await?,
            ),
            None => None,
        };
        let entry = ConversationEntry {
            conversation_id: Uuid::new_v4().to_string(),
            thread_id: thread_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            user_id: user_id.to_string(),
            site: site.to_string(),
            user_prompt: user_prompt.to_string(),
            response: response.to_string(),
            time_of_creation: Utc::now(),
            embedding,
        };
        self.entries.lock().unwrap().push(entry.clone());
        Ok(entry)
    }

    async fn get_recent_conversations(
        &self,
        user_id: &str,
        site: &str,
        limit: usize,
    ) -> Result<Vec<ConversationThread>> {
        let entries: Vec<ConversationEntry> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.user_id == user_id && (site == "all" || e.site == site))
            .cloned()
            .collect();
        Ok(group_into_threads(entries, limit))
    }

    async fn delete_conversation(
        &self,
        conversation_id: &str,
        user_id: Option<&str>,
    ) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| {
            e.conversation_id != conversation_id
                || user_id.is_some_and(|u| u != e.user_id)
        });
        Ok(entries.len() < before)
    }

    async fn search_conversations(
        &self,
        query: &str,
        user_id: Option<&str>,
        site: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ConversationEntry>> {
        let query_embedding = match &self.embedder {
            Some(embedder) => Some(embedder.embed(query).await?),
            None => None,
        };
        let query_lower = query.to_lowercase();

        let mut scored: Vec<(f32, ConversationEntry)> = self
            .entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| user_id.is_none_or(|u| e.user_id == u))
            .filter(|e| site.is_none_or(|s| s == "all" || e.site == s))
            .map(|e| {
                let score = match (&query_embedding, &e.embedding) {
                    (Some(q), Some(emb)) => cosine_similarity(q, emb),
                    _ => {
                        let text =
                            format!("{} {}", e.user_prompt, e.response).to_lowercase();
                        if text.contains(&query_lower) { 1.0 } else { 0.0 }
                    }
                };
                (score, e.clone())
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(limit).map(|(_, e)| e).collect())
    }
}
