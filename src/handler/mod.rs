// src/handler/mod.rs
// Per-request orchestration: parameter parsing, message emission, and the
// top-level query flow

pub mod events;
pub mod messages;
pub mod state;

pub use events::Event;
pub use messages::{MapLocation, Message, ResultItem};
pub use state::{GenerateMode, PrecheckStep, RankedItem, Ranking, RequestState, ToolScore};

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::app::AppState;
use crate::methods;
use crate::post_ranking;
use crate::precheck;
use crate::ranking::{RankTrack, Ranker};

/// Parsed /ask parameters. Values arrive as repeatable query params, form
/// fields, or a JSON body; all are normalized here.
#[derive(Debug, Clone, Default)]
pub struct AskRequest {
    pub query: String,
    pub sites: Vec<String>,
    pub prev_queries: Vec<String>,
    pub decontextualized_query: String,
    pub context_url: String,
    pub context_description: String,
    pub query_id: String,
    pub streaming: bool,
    pub generate_mode: GenerateMode,
    pub query_params: HashMap<String, String>,
}

impl AskRequest {
    pub fn from_params(params: &HashMap<String, Vec<String>>) -> Self {
        let first = |key: &str| -> String {
            params
                .get(key)
                .and_then(|v| v.first())
                .cloned()
                .unwrap_or_default()
        };
        let list = |key: &str| -> Vec<String> {
            params
                .get(key)
                .map(|values| {
                    values
                        .iter()
                        .flat_map(|v| v.trim_matches(['[', ']']).split(','))
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };

        let query = {
            let q = first("query");
            if q.is_empty() { first("q") } else { q }
        };
        let streaming = {
            let raw = first("streaming");
            !matches!(raw.to_lowercase().as_str(), "false" | "0")
        };
        let generate_mode = first("generate_mode").parse().unwrap_or_else(|e| {
            warn!("{e}, defaulting generate_mode to list");
            GenerateMode::List
        });
        let query_id = {
            let id = first("query_id");
            if id.is_empty() {
                uuid::Uuid::new_v4().to_string()
            } else {
                id
            }
        };
        let mut sites = list("site");
        if sites.is_empty() {
            sites.push("all".to_string());
        }

        // Flattened single-value view, kept for development-mode overrides
        // (model, db, llm_provider, llm_level) and storage params.
        let query_params = params
            .iter()
            .filter_map(|(k, v)| v.first().map(|v| (k.clone(), v.clone())))
            .collect();

        Self {
            query,
            sites,
            prev_queries: list("prev"),
            decontextualized_query: first("decontextualized_query"),
            context_url: first("context_url"),
            context_description: first("context_description"),
            query_id,
            streaming,
            generate_mode,
            query_params,
        }
    }
}

/// The per-request pipeline driver. Holds the shared process state, the
/// request state, and the message sink.
pub struct NLWebHandler {
    pub app: Arc<AppState>,
    pub state: Arc<RequestState>,
    tx: Option<mpsc::Sender<Value>>,
    return_value: Mutex<Map<String, Value>>,
}

impl NLWebHandler {
    pub fn new(app: Arc<AppState>, request: AskRequest, tx: Option<mpsc::Sender<Value>>) -> Arc<Self> {
        let site = request
            .sites
            .first()
            .cloned()
            .unwrap_or_else(|| "all".to_string());
        let state = Arc::new(RequestState::new(
            request.query,
            site,
            request.prev_queries,
            request.context_url,
            request.context_description,
            request.decontextualized_query,
            request.streaming,
            request.generate_mode,
            request.query_id,
            request.query_params,
        ));
        state.set_sites(request.sites);
        info!(
            "handler initialized: site={}, query={}, prev={:?}, mode={:?}, query_id={}",
            state.site,
            state.query,
            state.prev_queries,
            state.generate_mode,
            state.query_id
        );
        Arc::new(Self {
            app,
            state,
            tx,
            return_value: Mutex::new(Map::new()),
        })
    }

    /// Emit a message. Streaming requests write to the SSE channel; a
    /// failed write marks the connection dead and later sends become
    /// no-ops. Non-streaming requests accumulate into one JSON object.
    pub async fn send_message(&self, message: Message) {
        // Once the query is terminated only the terminal explanatory
        // message itself may still go out.
        if self.state.query_done()
            && !matches!(
                message,
                Message::SiteIsIrrelevantToQuery { .. }
                    | Message::AskUser { .. }
                    | Message::Error { .. }
            )
        {
            debug!("query done, dropping {} message", message.message_type());
            return;
        }
        let frame = message.to_frame(&self.state.query_id);
        match &self.tx {
            Some(tx) if self.state.streaming => {
                if !self.state.connection_alive_event.is_set() {
                    return;
                }
                if tx.send(frame).await.is_err() {
                    debug!("client disconnected, dropping further sends");
                    self.state.connection_alive_event.clear();
                }
            }
            _ => {
                let mut rv = self.return_value.lock().unwrap();
                if let Message::ResultBatch { results } = &message {
                    let entry = rv
                        .entry("results".to_string())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let Value::Array(arr) = entry {
                        for result in results {
                            arr.push(serde_json::to_value(result).unwrap_or(Value::Null));
                        }
                    }
                } else {
                    let mut val = frame;
                    if let Value::Object(map) = &mut val {
                        map.remove("message_type");
                        map.remove("query_id");
                    }
                    rv.insert(message.message_type().to_string(), val);
                }
            }
        }
    }

    /// The aggregated response for non-streaming requests.
    pub fn return_value(&self) -> Value {
        let mut map = self.return_value.lock().unwrap().clone();
        map.insert(
            "query_id".to_string(),
            Value::String(self.state.query_id.clone()),
        );
        Value::Object(map)
    }

    /// Retrieval for this request: the normal multi-backend fan-out, or a
    /// single endpoint when a development-mode `db` override names one.
    pub async fn retrieve(&self, query: &str) -> Vec<crate::retrieval::RetrievedItem> {
        let site = self.state.site_filter();
        if self.app.config.is_development_mode() {
            if let Some(db) = self.state.query_params.get("db") {
                debug!("development mode: retrieval endpoint overridden to {db}");
                return self
                    .app
                    .retriever
                    .search_one(db, query, &site, crate::retrieval::DEFAULT_NUM_RESULTS)
                    .await;
            }
        }
        self.app
            .retriever
            .search(query, &site, crate::retrieval::DEFAULT_NUM_RESULTS)
            .await
    }

    /// Run the full query pipeline: prechecks (with opportunistic fast
    /// track), tool dispatch, ranking, and post-ranking.
    pub async fn run(self: Arc<Self>) -> Value {
        precheck::run_prechecks(&self).await;

        if self.state.query_done() {
            debug!("query done during prechecks");
            return self.return_value();
        }

        if self.state.generate_mode == GenerateMode::Generate {
            methods::generate::run(&self).await;
            return self.return_value();
        }

        let top = self.state.top_tool();
        let tool_name = top
            .as_ref()
            .map(|t| t.tool.name.clone())
            .unwrap_or_else(|| "search".to_string());

        if tool_name != "search" {
            if let Some(top) = top {
                methods::dispatch(&self, &top).await;
            }
            return self.return_value();
        }

        if !self.state.fast_track_worked() {
            let items = self.state.final_retrieved_items();
            Ranker::new(self.clone(), items, RankTrack::Regular).run().await;
        }
        post_ranking::run(&self).await;

        self.return_value()
    }
}
