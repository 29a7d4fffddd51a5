// src/api/ask.rs
// The /ask endpoint: SSE streaming by default, aggregated JSON otherwise

use axum::Json;
use axum::extract::{RawQuery, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use serde_json::Value;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};

use super::{ApiError, parse_query_string};
use crate::app::AppState;
use crate::handler::{AskRequest, NLWebHandler};

pub async fn ask_get(
    State(app): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
) -> Result<Response, ApiError> {
    let params = parse_query_string(raw.as_deref().unwrap_or(""));
    ask(app, params).await
}

/// POST accepts the same parameters as JSON body fields, with query
/// params taking precedence.
pub async fn ask_post(
    State(app): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
    body: String,
) -> Result<Response, ApiError> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&body) {
        for (key, value) in map {
            let values = match value {
                Value::Array(items) => items
                    .into_iter()
                    .map(|v| match v {
                        Value::String(s) => s,
                        other => other.to_string(),
                    })
                    .collect(),
                Value::String(s) => vec![s],
                other => vec![other.to_string()],
            };
            params.insert(key, values);
        }
    }
    for (key, values) in parse_query_string(raw.as_deref().unwrap_or("")) {
        params.insert(key, values);
    }
    ask(app, params).await
}

async fn ask(
    app: Arc<AppState>,
    params: HashMap<String, Vec<String>>,
) -> Result<Response, ApiError> {
    let request = AskRequest::from_params(&params);
    if request.query.is_empty() {
        return Err(ApiError::BadRequest("missing required parameter: query".to_string()));
    }
    if let Some(site) = request.sites.first() {
        if !app.config.nlweb.is_site_allowed(site) {
            return Err(ApiError::BadRequest(format!("site '{site}' is not served here")));
        }
    }
    info!("ask: query={}, streaming={}", request.query, request.streaming);

    if request.streaming {
        Ok(stream_response(app, request).await)
    } else {
        let handler = NLWebHandler::new(app.clone(), request, None);
        let result = handler.clone().run().await;
        save_conversation(&handler).await;
        Ok(Json(result).into_response())
    }
}

async fn stream_response(app: Arc<AppState>, request: AskRequest) -> Response {
    let keepalive = app.config.server.sse_keepalive_seconds;
    let (tx, mut rx) = mpsc::channel::<Value>(64);
    let handler = NLWebHandler::new(app, request, Some(tx));

    // The handler owns the only sender; when the pipeline finishes the
    // channel closes and the SSE stream ends cleanly.
    tokio::spawn(async move {
        handler.clone().run().await;
        save_conversation(&handler).await;
    });

    let stream = async_stream::stream! {
        while let Some(frame) = rx.recv().await {
            yield Ok::<_, Infallible>(Event::default().data(frame.to_string()));
        }
    };
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(keepalive))
                .text("keepalive"),
        )
        .into_response()
}

/// Persist the exchange when the caller identified itself. The stored
/// response is the final answer list, which is what a later turn needs
/// for context.
async fn save_conversation(handler: &Arc<NLWebHandler>) {
    let state = &handler.state;
    let Some(user_id) = state.query_params.get("user_id") else {
        return;
    };
    let thread_id = state.query_params.get("thread_id").cloned();
    let answers: Vec<Value> = state
        .final_ranked_answers()
        .into_iter()
        .map(|a| {
            serde_json::json!({
                "name": a.name,
                "url": a.url,
                "description": a.ranking.description,
            })
        })
        .collect();
    let response = serde_json::to_string(&answers).unwrap_or_default();

    if let Err(e) = handler
        .app
        .storage
        .add_conversation(user_id, &state.site, thread_id, &state.query, &response)
        .await
    {
        error!("failed to store conversation: {e:#}");
    }
}
