// src/prompts/runner.rs
// Find-fill-ask helper used by every precheck step and handler

use anyhow::Result;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::variables::fill_prompt;
use crate::handler::NLWebHandler;
use crate::llm::{AskOptions, Tier, is_empty_response};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub tier: Tier,
    pub timeout: Option<Duration>,
    pub overrides: HashMap<String, String>,
}

impl RunOptions {
    pub fn low() -> Self {
        Self {
            tier: Tier::Low,
            timeout: None,
            overrides: HashMap::new(),
        }
    }

    pub fn high() -> Self {
        Self {
            tier: Tier::High,
            timeout: None,
            overrides: HashMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_override(mut self, token: &str, value: String) -> Self {
        self.overrides.insert(token.to_string(), value);
        self
    }
}

/// Run a named prompt for the handler's (site, item-type).
///
/// Returns `Ok(None)` when the prompt is missing or the LLM produced no
/// structured response; the caller decides whether to skip or fall back.
/// In testing mode LLM failures propagate instead of degrading.
pub async fn run_prompt(
    handler: &NLWebHandler,
    prompt_name: &str,
    opts: RunOptions,
) -> Result<Option<Value>> {
    let state = &handler.state;
    let Some(template) = handler
        .app
        .prompts
        .find(&state.site, &state.item_type(), prompt_name)
    else {
        debug!("cannot run prompt '{prompt_name}': not found");
        return Ok(None);
    };

    let prompt = fill_prompt(&template.text, handler, &opts.overrides);
    let schema = template
        .return_structure
        .clone()
        .unwrap_or(Value::Object(serde_json::Map::new()));

    let mut ask = AskOptions::tiered(opts.tier).with_dev_overrides(&handler.app.config, &state.query_params);
    if let Some(timeout) = opts.timeout {
        ask = ask.with_timeout(timeout);
    }

    match handler.app.llm.try_ask(&prompt, &schema, &ask).await {
        Ok(response) if is_empty_response(&response) => Ok(None),
        Ok(response) => Ok(Some(response)),
        Err(e) => {
            if handler.app.config.should_raise_exceptions() {
                Err(e.context(format!("LLM call failed for prompt '{prompt_name}'")))
            } else {
                warn!("prompt '{prompt_name}' failed: {e:#}");
                Ok(None)
            }
        }
    }
}

/// Truthiness helper for the string booleans LLM responses carry
/// ("True"/"False" per the return schemas).
pub fn response_flag(response: &Value, key: &str) -> bool {
    match response.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

pub fn response_str(response: &Value, key: &str) -> String {
    response
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub fn response_score(response: &Value) -> u32 {
    match response.get("score") {
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0) as u32,
        Some(Value::String(s)) => s.parse().unwrap_or(0),
        _ => 0,
    }
}
