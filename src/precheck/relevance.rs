// src/precheck/relevance.rs
// Is the query on-topic for the requested site?

use std::sync::Arc;
use tracing::{info, warn};

use crate::handler::{Message, NLWebHandler, PrecheckStep};
use crate::prompts::{RunOptions, response_flag, response_str, run_prompt};

pub const RELEVANCE_PROMPT: &str = "DetectIrrelevantQueryPrompt";

/// The `Relevance` precheck step. Cross-site queries are always relevant.
pub async fn run(handler: Arc<NLWebHandler>) {
    let state = &handler.state;

    if state.site == "all" || !handler.app.config.nlweb.prechecks.relevance_detection {
        state.precheck_step_done(PrecheckStep::Relevance);
        return;
    }

    let response = match run_prompt(&handler, RELEVANCE_PROMPT, RunOptions::low()).await {
        Ok(Some(response)) => response,
        Ok(None) => {
            state.precheck_step_done(PrecheckStep::Relevance);
            return;
        }
        Err(e) => {
            warn!("{RELEVANCE_PROMPT} failed: {e:#}");
            state.precheck_step_done(PrecheckStep::Relevance);
            return;
        }
    };

    if response_flag(&response, "site_is_irrelevant_to_query") {
        let explanation = response_str(&response, "explanation_for_irrelevance");
        info!("site is irrelevant to query: {explanation}");
        state.set_query_is_irrelevant(true);
        state.mark_query_done();
        state.abort_fast_track_if_needed();
        handler
            .send_message(Message::SiteIsIrrelevantToQuery {
                message: explanation,
            })
            .await;
    } else {
        state.set_query_is_irrelevant(false);
    }
    state.precheck_step_done(PrecheckStep::Relevance);
}
