// src/router/mod.rs
// Tool selection: parallel LLM scoring with early termination

pub mod tools;

pub use tools::{ToolDef, ToolRegistry};

use serde_json::{Value, json};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::handler::{Message, NLWebHandler, PrecheckStep, ToolScore};
use crate::prompts::{self, response_score};
use crate::utils::local_type;

/// The `ToolSelector` precheck step. Always marks the step done, even on
/// failure, so `pre_checks_done` cannot deadlock.
pub async fn run_tool_selector(handler: &Arc<NLWebHandler>) {
    select(handler).await;
    handler.state.precheck_step_done(PrecheckStep::ToolSelector);
}

async fn select(handler: &Arc<NLWebHandler>) {
    let state = &handler.state;
    let config = &handler.app.config;

    if !config.nlweb.prechecks.tool_selection {
        info!("tool selection disabled in config, skipping");
        return;
    }
    if state.generate_mode.is_generative() {
        info!("skipping tool selection for generate_mode {:?}", state.generate_mode);
        return;
    }

    state.wait_for_decontextualization().await;

    let query = state.effective_query();
    let schema_type = local_type(&state.item_type()).to_string();
    let applicable = handler.app.tools.tools_for_type(&schema_type);
    if applicable.is_empty() {
        info!("no tools configured for type {schema_type}, defaulting to search");
        send_default_search_selection(handler, &query).await;
        return;
    }

    let mut results = evaluate_with_early_termination(
        handler,
        &applicable,
        config.nlweb.thresholds.tool_early_termination_score,
    )
    .await;

    results.sort_by(|a, b| b.score.cmp(&a.score));
    for result in &results {
        debug!("tool {} scored {}", result.tool.name, result.score);
    }

    let original = results.clone();
    results.retain(|r| r.score >= config.nlweb.thresholds.min_tool_score);
    if results.is_empty() {
        // Nothing above threshold: fall back to search when available.
        if let Some(search) = original.iter().find(|r| r.tool.name == "search") {
            info!("no tool met threshold, falling back to search (score {})", search.score);
            results = vec![search.clone()];
        }
    }
    results.truncate(3);

    match results.first().cloned() {
        Some(top) => {
            if top.tool.name != "search" {
                info!("fast track aborted: top tool is '{}'", top.tool.name);
                state.abort_fast_track_event.set();
            }
            let message = Message::ToolSelection {
                selected_tool: top.tool.name.clone(),
                score: top.score,
                parameters: top.result.clone(),
                query: query.clone(),
                time_elapsed: format!("{:.3}s", state.elapsed_secs()),
            };
            state.set_tool_routing_results(results);
            handler.send_message(message).await;
        }
        None => send_default_search_selection(handler, &query).await,
    }
}

async fn send_default_search_selection(handler: &Arc<NLWebHandler>, query: &str) {
    let state = &handler.state;
    handler
        .send_message(Message::ToolSelection {
            selected_tool: "search".to_string(),
            score: 0,
            parameters: json!({"score": 0, "justification": "Default fallback - no tools met threshold"}),
            query: query.to_string(),
            time_elapsed: format!("{:.3}s", state.elapsed_secs()),
        })
        .await;
    if let Some(search) = handler.app.tools.find("search") {
        state.set_tool_routing_results(vec![ToolScore {
            tool: search,
            score: 0,
            result: json!({"score": 0, "justification": "Default fallback"}),
        }]);
    }
}

/// Score every tool concurrently. The first tool at or above `threshold`
/// wins outright: the remaining tasks are aborted and the result list
/// collapses to that tool.
async fn evaluate_with_early_termination(
    handler: &Arc<NLWebHandler>,
    applicable: &[Arc<ToolDef>],
    threshold: u32,
) -> Vec<ToolScore> {
    let mut tasks = JoinSet::new();
    for tool in applicable {
        let handler = handler.clone();
        let tool = tool.clone();
        tasks.spawn(async move { evaluate_tool(&handler, tool).await });
    }

    let mut results = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let result = match joined {
            Ok(result) => result,
            // Aborted or panicked evaluation; skip it.
            Err(e) => {
                if !e.is_cancelled() {
                    error!("tool evaluation task failed: {e}");
                }
                continue;
            }
        };
        if result.score >= threshold {
            info!(
                "early termination: tool '{}' scored {}",
                result.tool.name, result.score
            );
            tasks.abort_all();
            return vec![result];
        }
        results.push(result);
    }
    results
}

async fn evaluate_tool(handler: &Arc<NLWebHandler>, tool: Arc<ToolDef>) -> ToolScore {
    if tool.prompt.is_empty() {
        return ToolScore {
            tool,
            score: 0,
            result: json!({"score": 0, "justification": "No prompt defined"}),
        };
    }

    let prompt = prompts::fill_prompt(&tool.prompt, handler, &Default::default());
    let schema = tool
        .return_structure
        .clone()
        .unwrap_or_else(|| json!({"score": "integer between 0 and 100", "justification": "string"}));
    let ask = crate::llm::AskOptions::high()
        .with_dev_overrides(&handler.app.config, &handler.state.query_params);

    let response = handler.app.llm.ask(&prompt, &schema, &ask).await;
    let result = if crate::llm::is_empty_response(&response) {
        json!({"score": 0, "justification": "No response from LLM"})
    } else {
        response
    };
    ToolScore {
        score: response_score(&result),
        result,
        tool,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_score_sorting_is_stable_for_ties() {
        fn score(name: &str, score: u32) -> ToolScore {
            ToolScore {
                tool: Arc::new(ToolDef {
                    name: name.to_string(),
                    schema_type: "Item".to_string(),
                    path: String::new(),
                    method: String::new(),
                    arguments: Default::default(),
                    examples: Vec::new(),
                    prompt: String::new(),
                    return_structure: None,
                    handler: None,
                }),
                score,
                result: Value::Null,
            }
        }
        let mut results = vec![score("a", 70), score("b", 90), score("c", 70)];
        results.sort_by(|a, b| b.score.cmp(&a.score));
        assert_eq!(results[0].tool.name, "b");
        assert_eq!(results[1].tool.name, "a");
    }
}
