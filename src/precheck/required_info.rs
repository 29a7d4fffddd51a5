// src/precheck/required_info.rs
// Checks that the query carries the parameters some sites require

use std::sync::Arc;
use tracing::{info, warn};

use crate::handler::{Message, NLWebHandler, PrecheckStep};
use crate::prompts::{RunOptions, response_flag, response_str, run_prompt};

pub const REQUIRED_INFO_PROMPT: &str = "RequiredInfoPrompt";

/// The `RequiredInfo` precheck step. When information is missing the
/// query terminates with a single `ask_user` message.
pub async fn run(handler: Arc<NLWebHandler>) {
    let state = &handler.state;
    if !handler.app.config.nlweb.prechecks.required_info {
        state.set_required_info_found(true);
        state.precheck_step_done(PrecheckStep::RequiredInfo);
        return;
    }

    match run_prompt(&handler, REQUIRED_INFO_PROMPT, RunOptions::high()).await {
        Ok(Some(response)) => {
            // Only an explicit "False" marks information as missing; a
            // response without the field must not kill the query.
            let found = response
                .get("required_info_found")
                .map(|_| response_flag(&response, "required_info_found"))
                .unwrap_or(true);
            state.set_required_info_found(found);
            if !found {
                info!("required information missing, asking user");
                state.mark_query_done();
                state.abort_fast_track_if_needed();
                handler
                    .send_message(Message::AskUser {
                        message: response_str(&response, "user_question"),
                    })
                    .await;
            }
        }
        Ok(None) => {
            warn!("no response from {REQUIRED_INFO_PROMPT}, assuming info is present");
            state.set_required_info_found(true);
        }
        Err(e) => {
            warn!("{REQUIRED_INFO_PROMPT} failed: {e:#}");
            state.set_required_info_found(true);
        }
    }
    state.precheck_step_done(PrecheckStep::RequiredInfo);
}
