// src/precheck/analyze.rs
// Query analysis steps: item type, multi-type detection, query type

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::handler::{NLWebHandler, PrecheckStep};
use crate::prompts::{RunOptions, response_str, run_prompt};
use crate::utils::{local_type, namespaced_type};

pub const ITEM_TYPE_PROMPT: &str = "DetectItemTypePrompt";
pub const MULTI_ITEM_TYPE_PROMPT: &str = "DetectMultiItemTypeQueryPrompt";
pub const QUERY_TYPE_PROMPT: &str = "DetectQueryTypePrompt";

pub async fn detect_item_type(handler: Arc<NLWebHandler>) {
    let state = &handler.state;
    if handler.app.config.nlweb.prechecks.analyze_query {
        // Statistics sites carry their type from the site mapping; the
        // query cannot override it.
        if local_type(&state.item_type()) == "Statistics" {
            debug!("item type fixed by site mapping, skipping detection");
        } else {
            match run_prompt(&handler, ITEM_TYPE_PROMPT, RunOptions::low()).await {
                Ok(Some(response)) => {
                    let detected = response_str(&response, "item_type");
                    if !detected.is_empty() {
                        debug!("detected item type: {detected}");
                        state.set_item_type(namespaced_type(local_type(&detected)));
                    }
                }
                Ok(None) => warn!("no response from {ITEM_TYPE_PROMPT}, item type unchanged"),
                Err(e) => warn!("{ITEM_TYPE_PROMPT} failed: {e:#}"),
            }
        }
    } else {
        info!("analyze query disabled in config, skipping DetectItemType");
    }
    state.precheck_step_done(PrecheckStep::DetectItemType);
}

pub async fn detect_multi_item_type_query(handler: Arc<NLWebHandler>) {
    let state = &handler.state;
    if handler.app.config.nlweb.prechecks.analyze_query {
        // Advisory only: the result is logged for now.
        match run_prompt(&handler, MULTI_ITEM_TYPE_PROMPT, RunOptions::low()).await {
            Ok(response) => debug!("multi-item-type response: {response:?}"),
            Err(e) => warn!("{MULTI_ITEM_TYPE_PROMPT} failed: {e:#}"),
        }
    }
    state.precheck_step_done(PrecheckStep::DetectMultiItemTypeQuery);
}

pub async fn detect_query_type(handler: Arc<NLWebHandler>) {
    let state = &handler.state;
    if handler.app.config.nlweb.prechecks.analyze_query {
        match run_prompt(&handler, QUERY_TYPE_PROMPT, RunOptions::low()).await {
            Ok(response) => debug!("query-type response: {response:?}"),
            Err(e) => warn!("{QUERY_TYPE_PROMPT} failed: {e:#}"),
        }
    }
    state.precheck_step_done(PrecheckStep::DetectQueryType);
}
