// src/methods/accompaniment.rs
// Finds items that pair well with a main item

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use super::param_str;
use crate::handler::{Message, NLWebHandler};
use crate::ranking::{RankTrack, Ranker};

pub async fn run(handler: &Arc<NLWebHandler>, params: &Value) {
    let search_query = param_str(params, "search_query");
    let main_item = param_str(params, "main_item");

    if search_query.is_empty() {
        warn!("no search query in tool routing results");
        send_no_results(handler, &search_query, &main_item).await;
        return;
    }

    info!("searching '{search_query}' as accompaniment for '{main_item}'");
    let candidates = handler.retrieve(&search_query).await;
    if candidates.is_empty() {
        warn!("no items found for accompaniment query '{search_query}'");
        send_no_results(handler, &search_query, &main_item).await;
        return;
    }

    // Rank against the pairing question, not the literal search terms,
    // then restore the query for post-ranking.
    let original = handler.state.decontextualized_query();
    handler.state.set_decontextualized_query(format!(
        "{search_query} that would go well with {main_item}"
    ));
    Ranker::new(handler.clone(), candidates, RankTrack::Regular).run().await;
    handler.state.set_decontextualized_query(original);
}

async fn send_no_results(handler: &Arc<NLWebHandler>, search_query: &str, main_item: &str) {
    handler
        .send_message(Message::NoResults {
            message: format!(
                "Could not find any {search_query} that would pair well with {main_item}."
            ),
        })
        .await;
}
