// src/ranking/mod.rs
// Per-item LLM scoring with early streaming, gating, and forced flush

use once_cell::sync::Lazy;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::handler::{GenerateMode, Message, NLWebHandler, RankedItem, Ranking, ResultItem};
use crate::llm::{AskOptions, Tier, is_empty_response};
use crate::prompts::{fill_prompt, response_score, response_str};
use crate::retrieval::RetrievedItem;
use crate::utils::{pretty_site, trim_schema_json};

pub const RANKING_PROMPT_NAME: &str = "RankingPrompt";

/// Fallback ranking prompt, used when the prompt file has no entry for
/// the site and item type.
const DEFAULT_RANKING_PROMPT: &str = r#"Assign a score between 0 and 100 to the following {site.itemType}
based on how relevant it is to the user's question. Use your knowledge from other sources, about the item, to make a judgement.
If the score is above 50, provide a short description of the item highlighting the relevance to the user's question, without mentioning the user's question.
Provide an explanation of the relevance of the item to the user's question, without mentioning the user's question or the score or explicitly mentioning the term relevance.
If the score is below 75, in the description, include the reason why it is still relevant.
The user's question is: {request.query}. The item's description is {item.description}"#;

static DEFAULT_RANKING_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "score": "integer between 0 and 100",
        "description": "short description of the item",
    })
});

/// Which coordination rules apply to a ranking pass. The fast-track
/// variants observe the abort event; the regular track does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankTrack {
    FastTrack,
    PostDecontextualization,
    Regular,
}

impl RankTrack {
    fn observes_abort(&self) -> bool {
        matches!(self, RankTrack::FastTrack | RankTrack::PostDecontextualization)
    }
}

struct Shared {
    ranked: Vec<RankedItem>,
    num_sent: usize,
}

pub struct Ranker {
    handler: Arc<NLWebHandler>,
    items: Vec<RetrievedItem>,
    track: RankTrack,
    shared: Mutex<Shared>,
}

impl Ranker {
    pub fn new(handler: Arc<NLWebHandler>, items: Vec<RetrievedItem>, track: RankTrack) -> Arc<Self> {
        info!("ranking {} items on track {:?}", items.len(), track);
        Arc::new(Self {
            handler,
            items,
            track,
            shared: Mutex::new(Shared {
                ranked: Vec::new(),
                num_sent: 0,
            }),
        })
    }

    fn early_send_threshold(&self) -> u32 {
        self.handler.app.config.nlweb.thresholds.early_send_threshold
    }

    fn result_cap(&self) -> usize {
        self.handler.app.config.nlweb.thresholds.num_results_to_send
    }

    fn min_score(&self) -> u32 {
        self.handler.app.config.nlweb.thresholds.min_result_score
    }

    /// Rank every item concurrently, then flush the best unsent items.
    pub async fn run(self: Arc<Self>) {
        let state = &self.handler.state;

        let mut tasks = JoinSet::new();
        for item in self.items.clone() {
            if !state.connection_alive_event.is_set() {
                break;
            }
            let ranker = self.clone();
            tasks.spawn(async move { ranker.rank_item(item).await });
        }

        self.send_asking_sites().await;

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                if !e.is_cancelled() {
                    error!("ranking task failed: {e}");
                }
            }
        }

        if !state.connection_alive_event.is_set() {
            info!("connection lost during ranking, skipping final send");
            return;
        }

        state.pre_checks_done_event.wait().await;
        if self.track.observes_abort() && state.abort_fast_track_event.is_set() {
            debug!("fast track aborted before final flush, discarding");
            return;
        }

        // The final top-K list: everything scoring above the floor,
        // best first, truncated to the result cap.
        let (final_answers, to_send) = {
            let shared = self.shared.lock().unwrap();
            let mut filtered: Vec<RankedItem> = shared
                .ranked
                .iter()
                .filter(|r| r.ranking.score > self.min_score())
                .cloned()
                .collect();
            filtered.sort_by(|a, b| b.ranking.score.cmp(&a.ranking.score));
            filtered.truncate(self.result_cap());

            let mut remaining: Vec<RankedItem> = shared
                .ranked
                .iter()
                .filter(|r| !r.sent && r.ranking.score > self.min_score())
                .cloned()
                .collect();
            remaining.sort_by(|a, b| b.ranking.score.cmp(&a.ranking.score));
            let budget = self.result_cap().saturating_sub(shared.num_sent);
            remaining.truncate(budget);
            (filtered, remaining)
        };
        state.set_final_ranked_answers(final_answers);

        if !to_send.is_empty() {
            self.send_answers(to_send, true).await;
        }
    }

    async fn rank_item(&self, item: RetrievedItem) {
        let state = &self.handler.state;
        if !state.connection_alive_event.is_set() {
            return;
        }
        if self.track.observes_abort() && state.abort_fast_track_event.is_set() {
            debug!("aborting fast track ranking for {}", item.name);
            return;
        }

        let (template_text, schema) = match self.handler.app.prompts.find(
            &state.site,
            &state.item_type(),
            RANKING_PROMPT_NAME,
        ) {
            Some(template) => {
                let schema = template
                    .return_structure
                    .clone()
                    .unwrap_or_else(|| DEFAULT_RANKING_SCHEMA.clone());
                (template.text.clone(), schema)
            }
            None => (
                DEFAULT_RANKING_PROMPT.to_string(),
                DEFAULT_RANKING_SCHEMA.clone(),
            ),
        };

        let description = trim_schema_json(&item.schema_json);
        let overrides =
            HashMap::from([("item.description".to_string(), description)]);
        let prompt = fill_prompt(&template_text, &self.handler, &overrides);

        // Summarize mode feeds the summary from these descriptions, so it
        // pays for the high tier.
        let tier = if state.generate_mode == GenerateMode::Summarize {
            Tier::High
        } else {
            Tier::Low
        };
        let ask = AskOptions::tiered(tier)
            .with_dev_overrides(&self.handler.app.config, &state.query_params);
        let response = self.handler.app.llm.ask(&prompt, &schema, &ask).await;
        if is_empty_response(&response) {
            debug!("no ranking response for {}, skipping", item.name);
            return;
        }

        let ranked = RankedItem {
            url: item.url,
            site: item.site,
            name: item.name,
            ranking: Ranking {
                score: response_score(&response),
                description: response_str(&response, "description"),
            },
            schema_object: item.schema_json,
            sent: false,
        };

        let early = ranked.ranking.score > self.early_send_threshold();
        {
            let mut shared = self.shared.lock().unwrap();
            shared.ranked.push(ranked.clone());
        }
        if early {
            self.send_answers(vec![ranked], false).await;
        }
    }

    /// Whether a result may still be sent once the cap is near. Below
    /// cap-5 everything goes; after that a new item must beat an
    /// already-sent score.
    fn should_send(shared: &Shared, cap: usize, result: &RankedItem) -> bool {
        if shared.num_sent + 5 < cap {
            return true;
        }
        shared
            .ranked
            .iter()
            .any(|r| r.sent && r.ranking.score < result.ranking.score)
    }

    async fn send_answers(&self, answers: Vec<RankedItem>, force: bool) {
        let state = &self.handler.state;
        if !state.connection_alive_event.is_set() {
            return;
        }
        if self.track.observes_abort() && state.abort_fast_track_event.is_set() {
            return;
        }

        // Select and mark under the lock so no batch can ever carry an
        // already-sent item.
        let batch: Vec<ResultItem> = {
            let mut shared = self.shared.lock().unwrap();
            let cap = self.result_cap();
            let mut batch = Vec::new();
            for answer in &answers {
                let eligible = force || Self::should_send(&shared, cap, answer);
                if !eligible {
                    continue;
                }
                let Some(entry) = shared
                    .ranked
                    .iter_mut()
                    .find(|r| r.url == answer.url && !r.sent)
                else {
                    continue;
                };
                entry.sent = true;
                batch.push(ResultItem {
                    url: entry.url.clone(),
                    name: entry.name.clone(),
                    site: entry.site.clone(),
                    site_url: entry.site.clone(),
                    score: entry.ranking.score,
                    description: entry.ranking.description.clone(),
                    schema_object: entry.schema_object.clone(),
                });
            }
            batch
        };
        if batch.is_empty() {
            return;
        }

        // Gate on prechecks; the fast track bails out instead when the
        // abort event fires first.
        if self.track.observes_abort() {
            tokio::select! {
                _ = state.pre_checks_done_event.wait() => {}
                _ = state.abort_fast_track_event.wait() => {
                    debug!("fast track aborted while gated on prechecks");
                    return;
                }
            }
            if state.abort_fast_track_event.is_set() {
                return;
            }
        } else {
            state.pre_checks_done_event.wait().await;
        }
        if state.query_done() {
            return;
        }

        if self.track == RankTrack::FastTrack || self.track == RankTrack::PostDecontextualization {
            // A successful fast-track send makes the later regular
            // ranking pass a no-op.
            state.set_fast_track_worked();
        }

        let count = batch.len();
        self.handler
            .send_message(Message::ResultBatch { results: batch })
            .await;
        self.shared.lock().unwrap().num_sent += count;
    }

    /// One informational frame naming the top sites being consulted, for
    /// cross-site queries only.
    async fn send_asking_sites(&self) {
        let state = &self.handler.state;
        if !state.site_filter().is_cross_site() || self.items.is_empty() {
            return;
        }
        if state.sites_message_sent() {
            return;
        }
        state.set_sites_message_sent();

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for item in &self.items {
            *counts.entry(item.site.as_str()).or_default() += 1;
        }
        let mut sites: Vec<(&str, usize)> = counts.into_iter().collect();
        sites.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        let top: Vec<String> = sites.iter().take(3).map(|(s, _)| pretty_site(s)).collect();

        self.handler
            .send_message(Message::AskingSites {
                message: format!("Asking {}", top.join(", ")),
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(url: &str, score: u32, sent: bool) -> RankedItem {
        RankedItem {
            url: url.to_string(),
            site: "s".to_string(),
            name: url.to_string(),
            ranking: Ranking {
                score,
                description: String::new(),
            },
            schema_object: Value::Null,
            sent,
        }
    }

    #[test]
    fn sends_are_free_well_below_the_cap() {
        let shared = Shared {
            ranked: vec![ranked("a", 80, true)],
            num_sent: 1,
        };
        assert!(Ranker::should_send(&shared, 10, &ranked("b", 60, false)));
    }

    #[test]
    fn near_the_cap_a_result_must_beat_a_sent_score() {
        let shared = Shared {
            ranked: vec![
                ranked("a", 90, true),
                ranked("b", 70, true),
                ranked("c", 85, true),
            ],
            num_sent: 8,
        };
        // 75 beats the sent 70, 65 beats nothing.
        assert!(Ranker::should_send(&shared, 10, &ranked("d", 75, false)));
        assert!(!Ranker::should_send(&shared, 10, &ranked("e", 65, false)));
    }

    #[test]
    fn unsent_items_do_not_unlock_capped_sends() {
        let shared = Shared {
            ranked: vec![ranked("a", 40, false)],
            num_sent: 9,
        };
        assert!(!Ranker::should_send(&shared, 10, &ranked("b", 60, false)));
    }
}
