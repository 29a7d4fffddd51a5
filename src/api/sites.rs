// src/api/sites.rs
// Site listing and the /who site-discovery endpoint

use axum::Json;
use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use super::ApiError;
use crate::app::AppState;
use crate::retrieval::DEFAULT_NUM_RESULTS;

/// GET /sites: JSON by default, a single SSE frame with
/// `?streaming=true`.
pub async fn sites(
    State(app): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let sites = app.retriever.get_sites().await;
    let frame = json!({"message_type": "sites", "sites": sites});

    let streaming = params
        .get("streaming")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if streaming {
        let stream = futures::stream::once(async move {
            Ok::<_, Infallible>(Event::default().data(frame.to_string()))
        });
        Sse::new(stream)
            .keep_alive(KeepAlive::new().interval(Duration::from_secs(30)).text("keepalive"))
            .into_response()
    } else {
        Json(frame).into_response()
    }
}

/// GET /who: which sites are most likely to answer this query, by
/// retrieved-item counts.
pub async fn who(
    State(app): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let query = params
        .get("query")
        .or_else(|| params.get("q"))
        .cloned()
        .ok_or_else(|| ApiError::BadRequest("missing required parameter: query".to_string()))?;

    let items = app.retriever.search_all_sites(&query, DEFAULT_NUM_RESULTS).await;
    let mut counts: HashMap<String, usize> = HashMap::new();
    for item in &items {
        *counts.entry(item.site.clone()).or_default() += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let top: Vec<_> = ranked
        .into_iter()
        .take(5)
        .map(|(site, count)| json!({"site": site, "count": count}))
        .collect();

    Ok(Json(json!({"query": query, "sites": top})))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

pub async fn ready(State(app): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ready",
        "mode": app.config.mode.to_string(),
        "retrieval_endpoints": app.config.retrieval.enabled_endpoints().count(),
    }))
}
