// src/storage/sqlite.rs
// SQLite-backed conversation storage

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use std::sync::Arc;
use uuid::Uuid;

use super::{ConversationEntry, ConversationStorage, ConversationThread, group_into_threads};
use crate::embedding::{EmbeddingProvider, cosine_similarity};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS conversations (
    conversation_id TEXT PRIMARY KEY,
    thread_id       TEXT NOT NULL,
    user_id         TEXT NOT NULL,
    site            TEXT NOT NULL,
    user_prompt     TEXT NOT NULL,
    response        TEXT NOT NULL,
    time_of_creation TEXT NOT NULL,
    embedding       TEXT
);
CREATE INDEX IF NOT EXISTS idx_conversations_user_site
    ON conversations (user_id, site, time_of_creation);
"#;

pub struct SqliteStorage {
    pool: SqlitePool,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
}

impl SqliteStorage {
    /// Open (or create) the database and ensure the schema exists. An
    /// empty path means an in-memory database.
    pub async fn connect(
        path: &str,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> Result<Self> {
        let url = if path.is_empty() || path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{path}?mode=rwc")
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .with_context(|| format!("failed to open conversation database {url}"))?;
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .context("failed to create conversation schema")?;
        Ok(Self { pool, embedder })
    }

    fn entry_from_row(row: &SqliteRow) -> Result<ConversationEntry> {
        let time: String = row.get("time_of_creation");
        let embedding: Option<String> = row.get("embedding");
        Ok(ConversationEntry {
            conversation_id: row.get("conversation_id"),
            thread_id: row.get("thread_id"),
            user_id: row.get("user_id"),
            site: row.get("site"),
            user_prompt: row.get("user_prompt"),
            response: row.get("response"),
            time_of_creation: DateTime::parse_from_rfc3339(&time)
                .context("bad timestamp in conversation row")?
                .with_timezone(&Utc),
            embedding: embedding.and_then(|raw| serde_json::from_str(&raw).ok()),
        })
    }
}

#[async_trait]
impl ConversationStorage for SqliteStorage {
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

        sqlx::query(
            r#"INSERT INTO conversations
               (conversation_id, thread_id, user_id, site, user_prompt, response, time_of_creation, embedding)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&entry.conversation_id)
        .bind(&entry.thread_id)
        .bind(&entry.user_id)
        .bind(&entry.site)
        .bind(&entry.user_prompt)
        .bind(&entry.response)
        .bind(entry.time_of_creation.to_rfc3339())
        .bind(
            entry
                .embedding
                .as_ref()
                .map(|e| serde_json::to_string(e).unwrap_or_default()),
        )
        .execute(&self.pool)
        .await
        .context("failed to insert conversation")?;

        Ok(entry)
    }

    async fn get_recent_conversations(
        &self,
        user_id: &str,
        site: &str,
        limit: usize,
    ) -> Result<Vec<ConversationThread>> {
        let rows = if site == "all" {
            sqlx::query(
                "SELECT * FROM conversations WHERE user_id = ? ORDER BY time_of_creation DESC LIMIT ?",
            )
            .bind(user_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query(
                "SELECT * FROM conversations WHERE user_id = ? AND site = ? ORDER BY time_of_creation DESC LIMIT ?",
            )
            .bind(user_id)
            .bind(site)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?
        };

        let entries: Vec<ConversationEntry> = rows
            .iter()
            .filter_map(|row| Self::entry_from_row(row).ok())
            .collect();
        Ok(group_into_threads(entries, limit))
    }

    async fn delete_conversation(
        &self,
        conversation_id: &str,
        user_id: Option<&str>,
    ) -> Result<bool> {
        let result = match user_id {
            Some(user) => {
                sqlx::query("DELETE FROM conversations WHERE conversation_id = ? AND user_id = ?")
                    .bind(conversation_id)
                    .bind(user)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("DELETE FROM conversations WHERE conversation_id = ?")
                    .bind(conversation_id)
                    .execute(&self.pool)
                    .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    async fn search_conversations(
        &self,
        query: &str,
        user_id: Option<&str>,
        site: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ConversationEntry>> {
        // Candidate rows come from SQL filters; vector scoring happens
        // in-process over the candidates.
        let rows = sqlx::query(
            r#"SELECT * FROM conversations
               WHERE (? IS NULL OR user_id = ?)
                 AND (? IS NULL OR ? = 'all' OR site = ?)
               ORDER BY time_of_creation DESC
               LIMIT 500"#,
        )
        .bind(user_id)
        .bind(user_id)
        .bind(site)
        .bind(site)
        .bind(site)
        .fetch_all(&self.pool)
        .await?;
        let entries: Vec<ConversationEntry> = rows
            .iter()
            .filter_map(|row| Self::entry_from_row(row).ok())
            .collect();

        let query_embedding = match &self.embedder {
            Some(embedder) => Some(embedder.embed(query).await?),
            None => None,
        };
        let query_lower = query.to_lowercase();

        let mut scored: Vec<(f32, ConversationEntry)> = entries
            .into_iter()
            .map(|e| {
                let score = match (&query_embedding, &e.embedding) {
                    (Some(q), Some(emb)) => cosine_similarity(q, emb),
                    _ => {
                        let text = format!("{} {}", e.user_prompt, e.response).to_lowercase();
                        if text.contains(&query_lower) { 1.0 } else { 0.0 }
                    }
                };
                (score, e)
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored.into_iter().take(limit).map(|(_, e)| e).collect())
    }
}
