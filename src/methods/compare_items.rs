// src/methods/compare_items.rs
// Resolves two named items and compares them with one LLM call

use serde_json::{Value, json};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::param_str;
use crate::handler::{Message, NLWebHandler};
use crate::prompts::{RunOptions, response_score, response_str, run_prompt};
use crate::retrieval::RetrievedItem;
use crate::utils::trim_schema_json;

pub const FIND_ITEM_PROMPT: &str = "FindItemPrompt";
pub const COMPARE_PROMPT: &str = "CompareItemsPrompt";
pub const COMPARE_DETAILS_PROMPT: &str = "CompareItemDetailsPrompt";

const MATCH_THRESHOLD: u32 = 75;
const CANDIDATES_PER_ITEM: usize = 20;

pub async fn run(handler: &Arc<NLWebHandler>, params: &Value) {
    let item1_name = param_str(params, "item1_name");
    let item2_name = param_str(params, "item2_name");
    let item1_url = param_str(params, "item1_url");
    let item2_url = param_str(params, "item2_url");
    let details_requested = param_str(params, "details_requested");

    if item1_name.is_empty() || item2_name.is_empty() {
        warn!("item names missing from tool routing results");
        send_not_found(handler, &item1_name, &item2_name).await;
        return;
    }

    let (item1, item2) = tokio::join!(
        resolve_item(handler, &item1_name, &item1_url),
        resolve_item(handler, &item2_name, &item2_url),
    );

    match (item1, item2) {
        (Some(item1), Some(item2)) => {
            compare(handler, &item1, &item2, &details_requested).await;
        }
        _ => {
            warn!("could not resolve both items: '{item1_name}', '{item2_name}'");
            send_not_found(handler, &item1_name, &item2_name).await;
        }
    }
}

/// URL lookup when given, otherwise search + parallel match scoring with
/// the best candidate above threshold winning.
async fn resolve_item(
    handler: &Arc<NLWebHandler>,
    name: &str,
    url: &str,
) -> Option<RetrievedItem> {
    if !url.is_empty() {
        if let Some(item) = handler.app.retriever.search_by_url(url).await {
            info!("resolved '{name}' by URL");
            return Some(item);
        }
        warn!("no item at URL {url}, falling back to search");
    }

    let candidates = handler
        .app
        .retriever
        .search(name, &handler.state.site_filter(), CANDIDATES_PER_ITEM)
        .await;

    let mut tasks = JoinSet::new();
    for item in candidates {
        let handler = handler.clone();
        let name = name.to_string();
        tasks.spawn(async move {
            let opts = RunOptions::high()
                .with_override("item.description", trim_schema_json(&item.schema_json))
                .with_override("item.name", name.clone())
                .with_override("request.item_name", name);
            match run_prompt(&handler, FIND_ITEM_PROMPT, opts).await {
                Ok(Some(response)) => {
                    let score = response_score(&response);
                    (score > MATCH_THRESHOLD).then_some((score, item))
                }
                Ok(None) => None,
                Err(e) => {
                    warn!("{FIND_ITEM_PROMPT} failed for {}: {e:#}", item.name);
                    None
                }
            }
        });
    }

    let mut best: Option<(u32, RetrievedItem)> = None;
    while let Some(joined) = tasks.join_next().await {
        if let Ok(Some((score, item))) = joined {
            if best.as_ref().is_none_or(|(s, _)| score > *s) {
                best = Some((score, item));
            }
        }
    }
    best.map(|(_, item)| item)
}

async fn compare(
    handler: &Arc<NLWebHandler>,
    item1: &RetrievedItem,
    item2: &RetrievedItem,
    details_requested: &str,
) {
    let prompt_name = if details_requested.is_empty() {
        COMPARE_PROMPT
    } else {
        COMPARE_DETAILS_PROMPT
    };
    let opts = RunOptions::high()
        .with_override("request.item1_description", trim_schema_json(&item1.schema_json))
        .with_override("request.item2_description", trim_schema_json(&item2.schema_json))
        .with_override("request.details_requested", details_requested.to_string());

    match run_prompt(handler, prompt_name, opts).await {
        Ok(Some(response)) => {
            handler
                .send_message(Message::CompareItems {
                    comparison: response_str(&response, "comparison"),
                    item1: item_ref(item1),
                    item2: item_ref(item2),
                })
                .await;
        }
        Ok(None) => {
            error!("{prompt_name} not found or empty, cannot compare");
            send_not_found(handler, &item1.name, &item2.name).await;
        }
        Err(e) => {
            error!("{prompt_name} failed: {e:#}");
            send_not_found(handler, &item1.name, &item2.name).await;
        }
    }
}

fn item_ref(item: &RetrievedItem) -> Value {
    json!({
        "name": item.name,
        "url": item.url,
        "schema_object": item.schema_json,
    })
}

async fn send_not_found(handler: &Arc<NLWebHandler>, item1_name: &str, item2_name: &str) {
    handler
        .send_message(Message::CompareItems {
            comparison: format!(
                "Could not find one or both items: '{item1_name}' and '{item2_name}' on {}.",
                handler.state.site
            ),
            item1: json!({"name": item1_name, "url": "", "schema_object": {}}),
            item2: json!({"name": item2_name, "url": "", "schema_object": {}}),
        })
        .await;
}
