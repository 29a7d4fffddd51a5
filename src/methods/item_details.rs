// src/methods/item_details.rs
// Finds one item and extracts the requested details from it

use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::param_str;
use crate::handler::{Message, NLWebHandler};
use crate::llm::is_empty_response;
use crate::prompts::{RunOptions, response_score, response_str, run_prompt};
use crate::retrieval::RetrievedItem;
use crate::utils::trim_schema_json;

pub const ITEM_MATCHING_PROMPT: &str = "ItemMatchingPrompt";
pub const EXTRACT_DETAILS_PROMPT: &str = "ExtractItemDetailsPrompt";

#[derive(Default)]
struct MatchState {
    sent: bool,
    buffered: Vec<(u32, Message)>,
}

pub async fn run(handler: &Arc<NLWebHandler>, params: &Value) {
    let item_name = param_str(params, "item_name");
    let details_requested = param_str(params, "details_requested");
    let item_url = param_str(params, "item_url");

    if details_requested.is_empty() {
        warn!("no details requested in tool routing results");
        send_not_found(handler, &item_name).await;
        return;
    }

    if !item_url.is_empty() {
        info!("item details via URL: {item_url}");
        by_url(handler, &item_url, &details_requested).await;
        return;
    }

    if item_name.is_empty() {
        warn!("no item name in tool routing results");
        send_not_found(handler, &item_name).await;
        return;
    }

    handler
        .send_message(Message::IntermediateMessage {
            message: format!("Searching for {item_name}"),
        })
        .await;

    let candidates = handler.retrieve(&item_name).await;
    find_matching(handler, candidates, &item_name, &details_requested).await;
}

/// Match candidates in parallel. The first item scoring above the send
/// threshold goes out immediately; mid-range scores are buffered and the
/// best one is sent only if nothing cleared the bar. Exactly one message
/// is emitted.
async fn find_matching(
    handler: &Arc<NLWebHandler>,
    candidates: Vec<RetrievedItem>,
    item_name: &str,
    details_requested: &str,
) {
    let send_score = handler.app.config.nlweb.thresholds.item_match_send_score;
    let buffer_score = handler.app.config.nlweb.thresholds.item_match_buffer_score;
    let shared = Arc::new(Mutex::new(MatchState::default()));

    let mut tasks = JoinSet::new();
    for item in candidates {
        let handler = handler.clone();
        let shared = shared.clone();
        let item_name = item_name.to_string();
        let details_requested = details_requested.to_string();
        tasks.spawn(async move {
            evaluate_match(&handler, &shared, item, &item_name, &details_requested, send_score, buffer_score)
                .await;
        });
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            if !e.is_cancelled() {
                error!("item match task failed: {e}");
            }
        }
    }

    let fallback = {
        let mut state = shared.lock().unwrap();
        if state.sent {
            None
        } else if state.buffered.is_empty() {
            Some(None)
        } else {
            state.buffered.sort_by(|a, b| b.0.cmp(&a.0));
            state.sent = true;
            Some(Some(state.buffered.remove(0).1))
        }
    };
    match fallback {
        Some(Some(message)) => handler.send_message(message).await,
        Some(None) => send_not_found(handler, item_name).await,
        None => {}
    }
}

async fn evaluate_match(
    handler: &Arc<NLWebHandler>,
    shared: &Arc<Mutex<MatchState>>,
    item: RetrievedItem,
    item_name: &str,
    details_requested: &str,
    send_score: u32,
    buffer_score: u32,
) {
    let opts = RunOptions::high()
        .with_override("item.description", trim_schema_json(&item.schema_json))
        .with_override("request.item_name", item_name.to_string())
        .with_override("request.details_requested", details_requested.to_string());
    let response = match run_prompt(handler, ITEM_MATCHING_PROMPT, opts).await {
        Ok(Some(response)) => response,
        Ok(None) => return,
        Err(e) => {
            warn!("{ITEM_MATCHING_PROMPT} failed for {}: {e:#}", item.name);
            return;
        }
    };

    let score = response_score(&response);
    if score < buffer_score {
        return;
    }
    let message = Message::ItemDetails {
        name: item.name.clone(),
        details: response
            .get("item_details")
            .cloned()
            .unwrap_or(Value::String(String::new())),
        score: Some(score),
        explanation: Some(response_str(&response, "explanation")),
        additional_context: None,
        url: item.url.clone(),
        site: item.site.clone(),
        schema_object: Some(item.schema_json.clone()),
    };

    if score > send_score {
        // First high-confidence match wins; everyone else stands down.
        let won = {
            let mut state = shared.lock().unwrap();
            if state.sent {
                false
            } else {
                state.sent = true;
                true
            }
        };
        if won {
            info!("sending item details for {}", item.name);
            handler.send_message(message).await;
        }
    } else {
        shared.lock().unwrap().buffered.push((score, message));
    }
}

async fn by_url(handler: &Arc<NLWebHandler>, item_url: &str, details_requested: &str) {
    let Some(item) = handler.app.retriever.search_by_url(item_url).await else {
        warn!("no item found for URL {item_url}");
        send_not_found(handler, "").await;
        return;
    };

    let opts = RunOptions::high()
        .with_override("item.description", trim_schema_json(&item.schema_json))
        .with_override("request.details_requested", details_requested.to_string());
    match run_prompt(handler, EXTRACT_DETAILS_PROMPT, opts).await {
        Ok(Some(response)) if !is_empty_response(&response) => {
            let name = {
                let n = response_str(&response, "item_name");
                if n.is_empty() { item.name.clone() } else { n }
            };
            handler
                .send_message(Message::ItemDetails {
                    name,
                    details: response
                        .get("requested_details")
                        .cloned()
                        .unwrap_or(Value::String("Details not found".to_string())),
                    score: None,
                    explanation: None,
                    additional_context: Some(response_str(&response, "additional_context")),
                    url: item.url,
                    site: item.site,
                    schema_object: Some(item.schema_json),
                })
                .await;
        }
        Ok(_) => {
            // No extraction prompt configured: send the whole trimmed
            // schema rather than nothing.
            handler
                .send_message(Message::ItemDetails {
                    name: item.name.clone(),
                    details: Value::String(trim_schema_json(&item.schema_json)),
                    score: None,
                    explanation: None,
                    additional_context: None,
                    url: item.url,
                    site: item.site,
                    schema_object: Some(item.schema_json),
                })
                .await;
        }
        Err(e) => {
            error!("{EXTRACT_DETAILS_PROMPT} failed: {e:#}");
            send_not_found(handler, "").await;
        }
    }
}

async fn send_not_found(handler: &Arc<NLWebHandler>, item_name: &str) {
    handler
        .send_message(Message::ItemDetails {
            name: item_name.to_string(),
            details: Value::String(format!(
                "Could not find any items matching '{item_name}' on {}.",
                handler.state.site
            )),
            score: Some(0),
            explanation: None,
            additional_context: None,
            url: String::new(),
            site: handler.state.site.clone(),
            schema_object: None,
        })
        .await;
}
