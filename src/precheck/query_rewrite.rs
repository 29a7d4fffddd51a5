// src/precheck/query_rewrite.rs
// Rewrites the query into keyword forms for keyword-only backends

use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use crate::handler::{Message, NLWebHandler, PrecheckStep};
use crate::prompts::{RunOptions, run_prompt};

pub const QUERY_REWRITE_PROMPT: &str = "QueryRewrite";

const MAX_REWRITES: usize = 5;

/// The `QueryRewrite` precheck step. Runs on the decontextualized query,
/// so it waits for `Decon` first.
pub async fn run(handler: Arc<NLWebHandler>) {
    let state = &handler.state;
    if !handler.app.config.nlweb.prechecks.query_rewrite {
        state.precheck_step_done(PrecheckStep::QueryRewrite);
        return;
    }

    state.wait_for_decontextualization().await;
    let fallback = vec![state.effective_query()];

    let rewritten = match run_prompt(&handler, QUERY_REWRITE_PROMPT, RunOptions::high()).await {
        Ok(Some(response)) => {
            let queries: Vec<String> = response
                .get("rewritten_queries")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(Value::as_str)
                        .map(str::trim)
                        .filter(|q| !q.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            if queries.is_empty() {
                warn!("no valid rewritten queries, using original");
                fallback
            } else {
                queries.into_iter().take(MAX_REWRITES).collect()
            }
        }
        Ok(None) => {
            warn!("no response from {QUERY_REWRITE_PROMPT}, using original query");
            fallback
        }
        Err(e) => {
            warn!("{QUERY_REWRITE_PROMPT} failed: {e:#}");
            fallback
        }
    };

    info!("query rewrite produced {} forms", rewritten.len());
    state.set_rewritten_queries(rewritten.clone());
    if rewritten.len() > 1 {
        handler
            .send_message(Message::QueryRewrite {
                original_query: state.effective_query(),
                rewritten_queries: rewritten,
            })
            .await;
    }
    state.precheck_step_done(PrecheckStep::QueryRewrite);
}
