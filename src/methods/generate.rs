// src/methods/generate.rs
// Generate mode: gather relevant items, synthesize an answer, describe
// each cited item

use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use crate::handler::{Message, NLWebHandler, RankedItem, Ranking};
use crate::prompts::{RunOptions, response_score, response_str, run_prompt};
use crate::retrieval::RetrievedItem;
use crate::utils::trim_schema_json;

pub const RANKING_PROMPT: &str = "RankingPromptForGenerate";
pub const SYNTHESIZE_PROMPT: &str = "SynthesizePromptForGenerate";
pub const DESCRIPTION_PROMPT: &str = "DescriptionPromptForGenerate";

const SYNTHESIZE_TIMEOUT: Duration = Duration::from_secs(100);

/// The generate pipeline. Tool routing is skipped in this mode; the
/// retrieved set from the precheck stage is ranked with the generate-tier
/// prompt and the survivors feed answer synthesis.
pub async fn run(handler: &Arc<NLWebHandler>) {
    let items = handler.state.final_retrieved_items();
    if items.is_empty() {
        handler
            .send_message(Message::NoResults {
                message: "No results were found to generate an answer from.".to_string(),
            })
            .await;
        return;
    }

    gather_items(handler, items.clone()).await;
    synthesize(handler, &items).await;
}

/// Score every item with the generate ranking prompt, keeping those
/// above the gather threshold as answer candidates.
async fn gather_items(handler: &Arc<NLWebHandler>, items: Vec<RetrievedItem>) {
    let threshold = handler
        .app
        .config
        .nlweb
        .thresholds
        .early_send_threshold_generate;
    let cap = handler.app.config.nlweb.thresholds.num_results_to_send;
    let gathered: Arc<Mutex<Vec<RankedItem>>> = Arc::new(Mutex::new(Vec::new()));

    let mut tasks = JoinSet::new();
    for item in items {
        let handler = handler.clone();
        let gathered = gathered.clone();
        tasks.spawn(async move {
            let opts = RunOptions::high()
                .with_override("item.description", trim_schema_json(&item.schema_json));
            match run_prompt(&handler, RANKING_PROMPT, opts).await {
                Ok(Some(response)) => {
                    let score = response_score(&response);
                    if score > threshold {
                        gathered.lock().unwrap().push(RankedItem {
                            url: item.url,
                            site: item.site,
                            name: item.name,
                            ranking: Ranking {
                                score,
                                description: response_str(&response, "description"),
                            },
                            schema_object: item.schema_json,
                            sent: false,
                        });
                    }
                }
                Ok(None) => debug!("no generate-ranking response for {}", item.name),
                Err(e) => warn!("{RANKING_PROMPT} failed for {}: {e:#}", item.name),
            }
        });
    }
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            if !e.is_cancelled() {
                error!("generate ranking task failed: {e}");
            }
        }
    }

    let mut answers = Arc::try_unwrap(gathered)
        .map(|m| m.into_inner().unwrap())
        .unwrap_or_default();
    answers.sort_by(|a, b| b.ranking.score.cmp(&a.ranking.score));
    answers.truncate(cap);
    handler.state.set_final_ranked_answers(answers);
}

async fn synthesize(handler: &Arc<NLWebHandler>, items: &[RetrievedItem]) {
    let response = match run_prompt(
        handler,
        SYNTHESIZE_PROMPT,
        RunOptions::high().with_timeout(SYNTHESIZE_TIMEOUT),
    )
    .await
    {
        Ok(Some(response)) => response,
        Ok(None) => {
            warn!("no synthesis response, cannot generate an answer");
            handler
                .send_message(Message::NoResults {
                    message: "Could not generate an answer for this query.".to_string(),
                })
                .await;
            return;
        }
        Err(e) => {
            error!("{SYNTHESIZE_PROMPT} failed: {e:#}");
            handler
                .send_message(Message::Error {
                    message: "Answer generation failed.".to_string(),
                })
                .await;
            return;
        }
    };

    let answer = response_str(&response, "answer");
    let cited_urls: Vec<String> = response
        .get("urls")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    // Describe each cited item in parallel before the single nlws frame
    // goes out.
    let mut tasks = JoinSet::new();
    for url in cited_urls {
        let Some(item) = items.iter().find(|i| i.url == url).cloned() else {
            continue;
        };
        let handler = handler.clone();
        tasks.spawn(async move {
            let opts = RunOptions::high()
                .with_override("item.description", trim_schema_json(&item.schema_json));
            let description = match run_prompt(&handler, DESCRIPTION_PROMPT, opts).await {
                Ok(Some(response)) => response_str(&response, "description"),
                _ => String::new(),
            };
            json!({
                "url": item.url,
                "name": item.name,
                "description": description,
                "site": item.site,
                "schema_object": item.schema_json,
            })
        });
    }
    let mut described = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        if let Ok(entry) = joined {
            described.push(entry);
        }
    }

    handler
        .send_message(Message::Nlws {
            answer,
            items: described,
        })
        .await;
}
