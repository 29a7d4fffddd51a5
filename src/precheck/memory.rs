// src/precheck/memory.rs
// Detects "remember that ..." personalization requests

use std::sync::Arc;
use tracing::{debug, warn};

use crate::handler::{Message, NLWebHandler, PrecheckStep};
use crate::prompts::{RunOptions, response_flag, response_str, run_prompt};

pub const MEMORY_PROMPT: &str = "DetectMemoryRequestPrompt";

/// The `Memory` precheck step. Advisory: acknowledges the request but
/// never gates the query.
pub async fn run(handler: Arc<NLWebHandler>) {
    let state = &handler.state;
    if !handler.app.config.nlweb.prechecks.memory {
        state.precheck_step_done(PrecheckStep::Memory);
        return;
    }

    match run_prompt(&handler, MEMORY_PROMPT, RunOptions::high()).await {
        Ok(Some(response)) => {
            if response_flag(&response, "is_memory_request") {
                let item = response_str(&response, "memory_request");
                debug!("memory request detected: {item}");
                handler
                    .send_message(Message::Remember {
                        item_to_remember: item,
                        message: "I'll remember that".to_string(),
                    })
                    .await;
            }
        }
        Ok(None) => warn!("no response from {MEMORY_PROMPT}, skipping memory step"),
        Err(e) => warn!("{MEMORY_PROMPT} failed: {e:#}"),
    }
    state.precheck_step_done(PrecheckStep::Memory);
}
