// src/post_ranking.rs
// Work that runs after the final top-K list is known: the map message
// and the optional summary pass

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::handler::{GenerateMode, MapLocation, Message, NLWebHandler};
use crate::prompts::{RunOptions, response_str, run_prompt};

pub const SUMMARIZE_PROMPT: &str = "SummarizeResultsPrompt";

const SUMMARIZE_TIMEOUT: Duration = Duration::from_secs(20);
const SUMMARIZE_TOP_K: usize = 3;

pub async fn run(handler: &Arc<NLWebHandler>) {
    let state = &handler.state;
    if !state.connection_alive_event.is_set() {
        state.mark_query_done();
        return;
    }

    check_and_send_map_message(handler).await;

    if state.generate_mode == GenerateMode::Summarize {
        summarize_results(handler).await;
    }
}

/// When at least half of the final answers carry a postal address, the
/// client can render them on a map.
async fn check_and_send_map_message(handler: &Arc<NLWebHandler>) {
    let results = handler.state.final_ranked_answers();
    if results.is_empty() {
        debug!("no results to check for addresses");
        return;
    }

    let locations: Vec<MapLocation> = results
        .iter()
        .filter_map(|result| {
            extract_address(&result.schema_object).map(|address| MapLocation {
                title: result.name.clone(),
                address,
            })
        })
        .collect();

    info!(
        "found {} results with addresses out of {}",
        locations.len(),
        results.len()
    );
    if !locations.is_empty() && locations.len() * 2 >= results.len() {
        handler
            .send_message(Message::ResultsMap { locations })
            .await;
    }
}

/// Pull a printable address out of a schema.org object, flattening
/// structured addresses to a single string.
fn extract_address(schema: &Value) -> Option<String> {
    let address = ["address", "location", "streetAddress", "postalAddress"]
        .iter()
        .find_map(|key| schema.get(*key))?;

    match address {
        Value::String(s) => {
            // Some feeds append a dict representation after the address.
            let cleaned = s.split(", {").next().unwrap_or(s).trim();
            (!cleaned.is_empty()).then(|| cleaned.to_string())
        }
        Value::Object(map) => {
            let mut parts: Vec<String> = Vec::new();
            for field in ["streetAddress", "addressLocality", "addressRegion", "postalCode"] {
                if let Some(value) = map.get(field) {
                    if !value.is_object() {
                        if let Some(s) = value.as_str() {
                            parts.push(s.to_string());
                        } else {
                            parts.push(value.to_string());
                        }
                    }
                }
            }
            match map.get("addressCountry") {
                Some(Value::Object(country)) => {
                    if let Some(name) = country.get("name").and_then(Value::as_str) {
                        parts.push(name.to_string());
                    }
                }
                Some(Value::String(country)) if !country.starts_with('{') => {
                    parts.push(country.clone());
                }
                _ => {}
            }
            (!parts.is_empty()).then(|| parts.join(", "))
        }
        _ => None,
    }
}

async fn summarize_results(handler: &Arc<NLWebHandler>) {
    let state = &handler.state;
    let mut answers = state.final_ranked_answers();
    answers.truncate(SUMMARIZE_TOP_K);
    state.set_final_ranked_answers(answers);

    match run_prompt(
        handler,
        SUMMARIZE_PROMPT,
        RunOptions::high().with_timeout(SUMMARIZE_TIMEOUT),
    )
    .await
    {
        Ok(Some(response)) => {
            handler
                .send_message(Message::Summary {
                    message: response_str(&response, "summary"),
                })
                .await;
        }
        Ok(None) => warn!("no summary response, skipping summary message"),
        Err(e) => warn!("{SUMMARIZE_PROMPT} failed: {e:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_address_is_cleaned() {
        let schema = json!({"address": "1 Main St, Springfield, {'raw': 1}"});
        assert_eq!(extract_address(&schema).unwrap(), "1 Main St, Springfield");
    }

    #[test]
    fn structured_address_is_flattened() {
        let schema = json!({"address": {
            "streetAddress": "1 Main St",
            "addressLocality": "Springfield",
            "postalCode": "12345",
            "addressCountry": {"name": "USA"},
        }});
        assert_eq!(
            extract_address(&schema).unwrap(),
            "1 Main St, Springfield, 12345, USA"
        );
    }

    #[test]
    fn missing_address_is_none() {
        assert_eq!(extract_address(&json!({"name": "x"})), None);
    }
}
