// src/api/conversation.rs
// CRUD over conversation storage

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use super::ApiError;
use crate::app::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateConversation {
    pub user_id: String,
    pub site: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    pub user_prompt: String,
    pub response: String,
}

pub async fn create(
    State(app): State<Arc<AppState>>,
    Json(body): Json<CreateConversation>,
) -> Result<Json<Value>, ApiError> {
    let entry = app
        .storage
        .add_conversation(
            &body.user_id,
            &body.site,
            body.thread_id,
            &body.user_prompt,
            &body.response,
        )
        .await?;
    Ok(Json(json!({
        "conversation_id": entry.conversation_id,
        "thread_id": entry.thread_id,
        "time": entry.time_of_creation.to_rfc3339(),
    })))
}

pub async fn list_recent(
    State(app): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let user_id = params
        .get("user_id")
        .ok_or_else(|| ApiError::BadRequest("missing required parameter: user_id".to_string()))?;
    let site = params.get("site").map(String::as_str).unwrap_or("all");
    let limit = params
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(50);

    let threads = app.storage.get_recent_conversations(user_id, site, limit).await?;
    Ok(Json(json!({"threads": threads})))
}

pub async fn delete(
    State(app): State<Arc<AppState>>,
    Path(conversation_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let deleted = app
        .storage
        .delete_conversation(&conversation_id, params.get("user_id").map(String::as_str))
        .await?;
    Ok(Json(json!({"deleted": deleted})))
}

pub async fn search(
    State(app): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let query = params
        .get("query")
        .ok_or_else(|| ApiError::BadRequest("missing required parameter: query".to_string()))?;
    let limit = params
        .get("limit")
        .and_then(|v| v.parse().ok())
        .unwrap_or(10);

    let results = app
        .storage
        .search_conversations(
            query,
            params.get("user_id").map(String::as_str),
            params.get("site").map(String::as_str),
            limit,
        )
        .await?;
    let results: Vec<Value> = results.iter().map(|e| e.to_json()).collect();
    Ok(Json(json!({"results": results})))
}
