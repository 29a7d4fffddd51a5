// src/precheck/mod.rs
// Concurrent launch of all preprocessing tasks at request start

pub mod analyze;
pub mod decontextualize;
pub mod fast_track;
pub mod memory;
pub mod query_rewrite;
pub mod relevance;
pub mod required_info;

use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::handler::{NLWebHandler, PrecheckStep};
use crate::router::run_tool_selector;

/// Run every precheck task concurrently and wait for all of them. The
/// fast track rides along in the same join set but is not a tracked
/// step, so it never gates `pre_checks_done`.
///
/// A failing task is logged and treated as done with defaults; a failing
/// precheck never fails the request.
pub async fn run_prechecks(handler: &Arc<NLWebHandler>) {
    let state = &handler.state;

    // Register every step before the first spawn so "all steps done"
    // cannot trigger early.
    for step in [
        PrecheckStep::DetectItemType,
        PrecheckStep::DetectMultiItemTypeQuery,
        PrecheckStep::DetectQueryType,
        PrecheckStep::Decon,
        PrecheckStep::Relevance,
        PrecheckStep::Memory,
        PrecheckStep::RequiredInfo,
        PrecheckStep::QueryRewrite,
        PrecheckStep::ToolSelector,
    ] {
        state.start_precheck_step(step);
    }

    let mut tasks = JoinSet::new();
    tasks.spawn(fast_track::run(handler.clone()));
    tasks.spawn(analyze::detect_item_type(handler.clone()));
    tasks.spawn(analyze::detect_multi_item_type_query(handler.clone()));
    tasks.spawn(analyze::detect_query_type(handler.clone()));
    tasks.spawn(decontextualize::run(handler.clone()));
    tasks.spawn(relevance::run(handler.clone()));
    tasks.spawn(memory::run(handler.clone()));
    tasks.spawn(required_info::run(handler.clone()));
    tasks.spawn(query_rewrite::run(handler.clone()));
    {
        let handler = handler.clone();
        tasks.spawn(async move { run_tool_selector(&handler).await });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("precheck task failed: {e}");
        }
    }
    debug!("precheck tasks done");

    // Retrieval may still be pending: the fast track was ineligible, or
    // its raw-query retrieval was invalidated by a rewrite.
    if !state.query_done()
        && (!state.retrieval_done() || state.requires_decontextualization())
    {
        let items = handler.retrieve(&state.effective_query()).await;
        state.set_final_retrieved_items(items);
        state.set_retrieval_done();
    }
}
