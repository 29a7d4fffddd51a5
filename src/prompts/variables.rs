// src/prompts/variables.rs
// Template variable expansion over the closed {namespace.field} token set

use std::collections::HashMap;
use tracing::warn;

use crate::handler::NLWebHandler;
use crate::utils::local_type;

/// The recognized prompt variables. Unknown tokens expand to the empty
/// string with a warning rather than failing the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptVar {
    RequestQuery,
    RequestSite,
    SiteItemType,
    RequestPreviousQueries,
    RequestContextUrl,
    RequestContextDescription,
    RequestAnswers,
    RequestPrevAnswers,
    ToolDescription,
    ToolsDescription,
    RequestTopK,
    RequestItemName,
    RequestDetailsRequested,
    ItemDescription,
}

impl PromptVar {
    pub fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "request.query" => Self::RequestQuery,
            "request.site" => Self::RequestSite,
            "site.itemType" => Self::SiteItemType,
            "request.previousQueries" => Self::RequestPreviousQueries,
            "request.contextUrl" => Self::RequestContextUrl,
            "request.contextDescription" => Self::RequestContextDescription,
            "request.answers" => Self::RequestAnswers,
            "request.prevAnswers" => Self::RequestPrevAnswers,
            "tool.description" => Self::ToolDescription,
            "tools.description" => Self::ToolsDescription,
            "request.top_k" => Self::RequestTopK,
            "request.item_name" => Self::RequestItemName,
            "request.details_requested" => Self::RequestDetailsRequested,
            "item.description" => Self::ItemDescription,
            _ => return None,
        })
    }
}

fn resolve(var: PromptVar, handler: &NLWebHandler) -> String {
    let state = &handler.state;
    match var {
        PromptVar::RequestQuery => {
            // Once decontextualization has run, use its output; before
            // that, fold prior turns into the prompt text.
            if state.is_decontextualization_done() {
                state.effective_query()
            } else if !state.prev_queries.is_empty() {
                format!(
                    "{} previous queries: {:?}",
                    state.query, state.prev_queries
                )
            } else {
                state.query.clone()
            }
        }
        PromptVar::RequestSite => state.site.clone(),
        PromptVar::SiteItemType => local_type(&state.item_type()).to_string(),
        PromptVar::RequestPreviousQueries => format!("{:?}", state.prev_queries),
        PromptVar::RequestContextUrl => state.context_url.clone(),
        PromptVar::RequestContextDescription => state.context_description(),
        PromptVar::RequestAnswers => {
            let answers: Vec<_> = state
                .final_ranked_answers()
                .into_iter()
                .map(|a| {
                    serde_json::json!({
                        "url": a.url,
                        "name": a.name,
                        "score": a.ranking.score,
                        "description": a.ranking.description,
                    })
                })
                .collect();
            serde_json::to_string(&answers).unwrap_or_default()
        }
        // Prior-turn answers are not threaded through the request yet.
        PromptVar::RequestPrevAnswers => String::new(),
        PromptVar::ToolDescription | PromptVar::ToolsDescription => String::new(),
        PromptVar::RequestTopK => "3".to_string(),
        PromptVar::RequestItemName => String::new(),
        PromptVar::RequestDetailsRequested => String::new(),
        PromptVar::ItemDescription => String::new(),
    }
}

/// Expand every `{token}` in a template. `overrides` wins over
/// handler-derived values; callers use it for per-item fields like
/// `item.description`.
pub fn fill_prompt(
    template: &str,
    handler: &NLWebHandler,
    overrides: &HashMap<String, String>,
) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        match after.find('}') {
            Some(end) => {
                let token = after[..end].trim();
                if let Some(value) = overrides.get(token) {
                    out.push_str(value);
                } else if let Some(var) = PromptVar::parse(token) {
                    out.push_str(&resolve(var, handler));
                } else {
                    warn!("unknown prompt variable: {token}");
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
