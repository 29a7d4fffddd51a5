// src/precheck/decontextualize.rs
// Rewriting follow-up queries into standalone form

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::handler::{Message, NLWebHandler, PrecheckStep};
use crate::prompts::{RunOptions, response_flag, response_str, run_prompt};
use crate::utils::trim_schema_json;

pub const PREV_QUERY_PROMPT: &str = "PrevQueryDecontextualizer";
pub const CONTEXT_URL_PROMPT: &str = "DecontextualizeContextPrompt";
pub const FULL_PROMPT: &str = "FullDecontextualizePrompt";

/// Which decontextualizer applies. A pure function of the request shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeconKind {
    NoOp,
    PrevQuery,
    ContextUrl,
    Full,
}

pub fn choose(prev_queries_empty: bool, context_url_empty: bool, decon_provided: bool) -> DeconKind {
    if prev_queries_empty && context_url_empty {
        return DeconKind::NoOp;
    }
    if decon_provided {
        return DeconKind::NoOp;
    }
    match (context_url_empty, prev_queries_empty) {
        (true, false) => DeconKind::PrevQuery,
        (false, true) => DeconKind::ContextUrl,
        (false, false) => DeconKind::Full,
        (true, true) => DeconKind::NoOp,
    }
}

/// The `Decon` precheck step.
pub async fn run(handler: Arc<NLWebHandler>) {
    let state = &handler.state;
    let kind = choose(
        state.prev_queries.is_empty(),
        state.context_url.is_empty(),
        !state.decontextualized_query().is_empty(),
    );

    if !handler.app.config.nlweb.prechecks.decontextualize {
        info!("decontextualization disabled in config, skipping");
        finish_noop(&handler);
        return;
    }

    match kind {
        DeconKind::NoOp => {
            debug!("decontextualization not required");
            finish_noop(&handler);
        }
        DeconKind::PrevQuery => prev_query(&handler).await,
        DeconKind::ContextUrl => with_context_url(&handler, CONTEXT_URL_PROMPT).await,
        DeconKind::Full => with_context_url(&handler, FULL_PROMPT).await,
    }
}

fn finish_noop(handler: &NLWebHandler) {
    let state = &handler.state;
    if state.decontextualized_query().is_empty() {
        state.set_decontextualized_query(state.query.clone());
    }
    state.set_requires_decontextualization(false);
    state.precheck_step_done(PrecheckStep::Decon);
}

async fn prev_query(handler: &Arc<NLWebHandler>) {
    let state = &handler.state;
    let response = match run_prompt(handler, PREV_QUERY_PROMPT, RunOptions::high()).await {
        Ok(Some(response)) => response,
        Ok(None) => {
            debug!("no response from decontextualizer");
            finish_noop(handler);
            return;
        }
        Err(e) => {
            warn!("{PREV_QUERY_PROMPT} failed: {e:#}");
            finish_noop(handler);
            return;
        }
    };

    if response_flag(&response, "requires_decontextualization") {
        let rewritten = response_str(&response, "decontextualized_query");
        if rewritten.is_empty() {
            finish_noop(handler);
            return;
        }
        state.set_requires_decontextualization(true);
        state.abort_fast_track_event.set();
        state.set_decontextualized_query(rewritten.clone());
        state.precheck_step_done(PrecheckStep::Decon);
        info!("decontextualized query: {rewritten}");
        handler
            .send_message(Message::DecontextualizedQuery {
                decontextualized_query: rewritten,
                original_query: state.query.clone(),
            })
            .await;
    } else {
        debug!("no decontextualization required despite previous queries");
        finish_noop(handler);
    }
}

/// Context-URL variants fetch the item the user was looking at, describe
/// it, then decontextualize against that description.
async fn with_context_url(handler: &Arc<NLWebHandler>, prompt_name: &str) {
    let state = &handler.state;
    let Some(item) = handler.app.retriever.search_by_url(&state.context_url).await else {
        debug!("context url {} not found in any backend", state.context_url);
        finish_noop(handler);
        return;
    };
    state.set_context_description(trim_schema_json(&item.schema_json));

    let response = match run_prompt(handler, prompt_name, RunOptions::high()).await {
        Ok(Some(response)) => response,
        Ok(None) => {
            finish_noop(handler);
            return;
        }
        Err(e) => {
            warn!("{prompt_name} failed: {e:#}");
            finish_noop(handler);
            return;
        }
    };

    let rewritten = response_str(&response, "decontextualized_query");
    if rewritten.is_empty() {
        finish_noop(handler);
        return;
    }
    state.set_requires_decontextualization(true);
    state.abort_fast_track_event.set();
    state.set_decontextualized_query(rewritten.clone());
    state.precheck_step_done(PrecheckStep::Decon);
    if rewritten != state.query {
        handler
            .send_message(Message::DecontextualizedQuery {
                decontextualized_query: rewritten,
                original_query: state.query.clone(),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The selector table: (prev empty, ctx empty, decon provided).
    #[test]
    fn selector_is_pure_function_of_inputs() {
        assert_eq!(choose(true, true, false), DeconKind::NoOp);
        assert_eq!(choose(true, true, true), DeconKind::NoOp);
        assert_eq!(choose(false, true, true), DeconKind::NoOp);
        assert_eq!(choose(true, false, true), DeconKind::NoOp);
        assert_eq!(choose(false, false, true), DeconKind::NoOp);
        assert_eq!(choose(false, true, false), DeconKind::PrevQuery);
        assert_eq!(choose(true, false, false), DeconKind::ContextUrl);
        assert_eq!(choose(false, false, false), DeconKind::Full);
    }
}
