// src/methods/mod.rs
// Tool dispatch to the method handlers

pub mod accompaniment;
pub mod compare_items;
pub mod generate;
pub mod item_details;
pub mod substitution;

use std::sync::Arc;
use tracing::warn;

use crate::handler::{NLWebHandler, ToolScore};
use crate::post_ranking;
use crate::ranking::{RankTrack, Ranker};

/// Route the selected tool to its handler. Unknown tools degrade to the
/// default search behavior.
pub async fn dispatch(handler: &Arc<NLWebHandler>, top: &ToolScore) {
    let params = &top.result;
    match top.tool.name.as_str() {
        "item_details" => item_details::run(handler, params).await,
        "compare_items" => compare_items::run(handler, params).await,
        "accompaniment" => accompaniment::run(handler, params).await,
        "recipe_substitution" => substitution::run(handler, params).await,
        other => {
            warn!("no handler for tool '{other}', falling back to search");
            run_search(handler).await;
        }
    }
}

/// The default handler: regular-track ranking over the retrieved items,
/// then post-ranking.
pub async fn run_search(handler: &Arc<NLWebHandler>) {
    if !handler.state.fast_track_worked() {
        let items = handler.state.final_retrieved_items();
        Ranker::new(handler.clone(), items, RankTrack::Regular).run().await;
    }
    post_ranking::run(handler).await;
}

pub(crate) fn param_str(params: &serde_json::Value, key: &str) -> String {
    params
        .get(key)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string()
}
