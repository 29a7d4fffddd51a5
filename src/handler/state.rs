// src/handler/state.rs
// Per-request mutable state and the precheck step machine

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use super::events::Event;
use crate::retrieval::{RetrievedItem, SiteFilter};
use crate::router::tools::ToolDef;
use crate::utils;

/// What to do with the ranked results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerateMode {
    None,
    #[default]
    List,
    Summarize,
    Generate,
}

impl FromStr for GenerateMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(GenerateMode::None),
            "list" | "" => Ok(GenerateMode::List),
            "summarize" => Ok(GenerateMode::Summarize),
            "generate" => Ok(GenerateMode::Generate),
            other => Err(anyhow::anyhow!("unknown generate_mode: {other}")),
        }
    }
}

impl GenerateMode {
    pub fn is_generative(&self) -> bool {
        matches!(self, GenerateMode::Summarize | GenerateMode::Generate)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ranking {
    pub score: u32,
    pub description: String,
}

/// A retrieved item after LLM scoring. `sent` prevents double
/// transmission between the early-send and forced-flush paths.
#[derive(Debug, Clone, Serialize)]
pub struct RankedItem {
    pub url: String,
    pub site: String,
    pub name: String,
    pub ranking: Ranking,
    pub schema_object: Value,
    pub sent: bool,
}

/// One tool-router evaluation result, sorted by score descending.
#[derive(Debug, Clone)]
pub struct ToolScore {
    pub tool: Arc<ToolDef>,
    pub score: u32,
    pub result: Value,
}

/// Precheck steps tracked by the state machine. FastTrack is not a
/// precheck step: it never gates `pre_checks_done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrecheckStep {
    DetectItemType,
    DetectMultiItemTypeQuery,
    DetectQueryType,
    Decon,
    Relevance,
    Memory,
    RequiredInfo,
    QueryRewrite,
    ToolSelector,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepState {
    Initial,
    Done,
}

#[derive(Debug, Default)]
struct Derived {
    decontextualized_query: String,
    requires_decontextualization: bool,
    context_description: String,
    item_type: String,
    rewritten_queries: Vec<String>,
}

#[derive(Debug, Default)]
struct Flags {
    query_done: bool,
    query_is_irrelevant: bool,
    required_info_found: bool,
    retrieval_done: bool,
    fast_track_worked: bool,
    sites_message_sent: bool,
}

/// All mutable state for one request. Created on arrival, mutated only by
/// that request's tasks, dropped when the response ends.
///
/// Write-sets: `Decon` writes the decontextualization fields and
/// `context_description`; `DetectItemType` writes `item_type`;
/// `Relevance` and `RequiredInfo` write their flags and may mark the
/// query done; `QueryRewrite` writes `rewritten_queries`; `ToolSelector`
/// writes `tool_routing_results`; retrieval and ranking write the two
/// collections. Everything else is read-only after construction.
pub struct RequestState {
    pub query: String,
    /// Normalized: "nlws" is folded into "all".
    pub site: String,
    /// Full site list when the request scoped to several sites.
    sites: RwLock<Vec<String>>,
    pub prev_queries: Vec<String>,
    pub context_url: String,
    pub streaming: bool,
    pub generate_mode: GenerateMode,
    pub query_id: String,
    /// Raw request params, kept for development-mode overrides.
    pub query_params: HashMap<String, String>,
    pub start_time: Instant,

    derived: RwLock<Derived>,
    flags: RwLock<Flags>,
    tool_routing: RwLock<Vec<ToolScore>>,
    final_retrieved_items: RwLock<Vec<RetrievedItem>>,
    final_ranked_answers: RwLock<Vec<RankedItem>>,

    steps: Mutex<HashMap<PrecheckStep, StepState>>,

    pub pre_checks_done_event: Event,
    pub decon_event: Event,
    pub tool_router_event: Event,
    pub abort_fast_track_event: Event,
    /// Initially set; cleared once when the transport reports a broken
    /// connection; never re-set.
    pub connection_alive_event: Event,
}

impl RequestState {
    pub fn new(
        query: String,
        site: String,
        prev_queries: Vec<String>,
        context_url: String,
        context_description: String,
        decontextualized_query: String,
        streaming: bool,
        generate_mode: GenerateMode,
        query_id: String,
        query_params: HashMap<String, String>,
    ) -> Self {
        let site = if site == "nlws" || site.is_empty() {
            "all".to_string()
        } else {
            site
        };
        let item_type = utils::site_to_item_type(&site);
        Self {
            query,
            sites: RwLock::new(vec![site.clone()]),
            site,
            prev_queries,
            context_url,
            streaming,
            generate_mode,
            query_id,
            query_params,
            start_time: Instant::now(),
            derived: RwLock::new(Derived {
                decontextualized_query,
                context_description,
                item_type,
                ..Default::default()
            }),
            flags: RwLock::new(Flags {
                required_info_found: true,
                ..Default::default()
            }),
            tool_routing: RwLock::new(Vec::new()),
            final_retrieved_items: RwLock::new(Vec::new()),
            final_ranked_answers: RwLock::new(Vec::new()),
            steps: Mutex::new(HashMap::new()),
            pre_checks_done_event: Event::new(),
            decon_event: Event::new(),
            tool_router_event: Event::new(),
            abort_fast_track_event: Event::new(),
            connection_alive_event: Event::new_set(),
        }
    }

    pub fn set_sites(&self, sites: Vec<String>) {
        if !sites.is_empty() {
            *self.sites.write().unwrap() = sites;
        }
    }

    pub fn site_filter(&self) -> SiteFilter {
        let sites = self.sites.read().unwrap();
        if sites.len() > 1 {
            SiteFilter::from_list(&sites)
        } else {
            SiteFilter::parse(&self.site)
        }
    }

    // --- derived fields ---

    pub fn decontextualized_query(&self) -> String {
        self.derived.read().unwrap().decontextualized_query.clone()
    }

    pub fn set_decontextualized_query(&self, query: String) {
        self.derived.write().unwrap().decontextualized_query = query;
    }

    /// The query retrieval and ranking should use: the decontextualized
    /// form when available, the raw query otherwise.
    pub fn effective_query(&self) -> String {
        let decon = self.decontextualized_query();
        if decon.is_empty() {
            self.query.clone()
        } else {
            decon
        }
    }

    pub fn requires_decontextualization(&self) -> bool {
        self.derived.read().unwrap().requires_decontextualization
    }

    pub fn set_requires_decontextualization(&self, value: bool) {
        self.derived.write().unwrap().requires_decontextualization = value;
    }

    pub fn context_description(&self) -> String {
        self.derived.read().unwrap().context_description.clone()
    }

    pub fn set_context_description(&self, value: String) {
        self.derived.write().unwrap().context_description = value;
    }

    pub fn item_type(&self) -> String {
        self.derived.read().unwrap().item_type.clone()
    }

    pub fn set_item_type(&self, item_type: String) {
        self.derived.write().unwrap().item_type = item_type;
    }

    pub fn rewritten_queries(&self) -> Vec<String> {
        self.derived.read().unwrap().rewritten_queries.clone()
    }

    pub fn set_rewritten_queries(&self, queries: Vec<String>) {
        self.derived.write().unwrap().rewritten_queries = queries;
    }

    // --- flags ---

    pub fn query_done(&self) -> bool {
        self.flags.read().unwrap().query_done
    }

    /// Sticky: once set, no further user-visible messages may be emitted
    /// beyond those already committed.
    pub fn mark_query_done(&self) {
        self.flags.write().unwrap().query_done = true;
    }

    pub fn query_is_irrelevant(&self) -> bool {
        self.flags.read().unwrap().query_is_irrelevant
    }

    pub fn set_query_is_irrelevant(&self, value: bool) {
        self.flags.write().unwrap().query_is_irrelevant = value;
    }

    pub fn required_info_found(&self) -> bool {
        self.flags.read().unwrap().required_info_found
    }

    pub fn set_required_info_found(&self, value: bool) {
        self.flags.write().unwrap().required_info_found = value;
    }

    pub fn retrieval_done(&self) -> bool {
        self.flags.read().unwrap().retrieval_done
    }

    pub fn set_retrieval_done(&self) {
        self.flags.write().unwrap().retrieval_done = true;
    }

    pub fn fast_track_worked(&self) -> bool {
        self.flags.read().unwrap().fast_track_worked
    }

    pub fn set_fast_track_worked(&self) {
        self.flags.write().unwrap().fast_track_worked = true;
    }

    pub fn sites_message_sent(&self) -> bool {
        self.flags.read().unwrap().sites_message_sent
    }

    pub fn set_sites_message_sent(&self) {
        self.flags.write().unwrap().sites_message_sent = true;
    }

    // --- collections ---

    pub fn final_retrieved_items(&self) -> Vec<RetrievedItem> {
        self.final_retrieved_items.read().unwrap().clone()
    }

    pub fn set_final_retrieved_items(&self, items: Vec<RetrievedItem>) {
        *self.final_retrieved_items.write().unwrap() = items;
    }

    pub fn final_ranked_answers(&self) -> Vec<RankedItem> {
        self.final_ranked_answers.read().unwrap().clone()
    }

    pub fn set_final_ranked_answers(&self, answers: Vec<RankedItem>) {
        *self.final_ranked_answers.write().unwrap() = answers;
    }

    pub fn tool_routing_results(&self) -> Vec<ToolScore> {
        self.tool_routing.read().unwrap().clone()
    }

    pub fn set_tool_routing_results(&self, results: Vec<ToolScore>) {
        *self.tool_routing.write().unwrap() = results;
    }

    pub fn top_tool(&self) -> Option<ToolScore> {
        self.tool_routing.read().unwrap().first().cloned()
    }

    // --- step machine ---

    pub fn start_precheck_step(&self, step: PrecheckStep) {
        self.steps.lock().unwrap().insert(step, StepState::Initial);
    }

    pub fn precheck_step_done(&self, step: PrecheckStep) {
        let all_done = {
            let mut steps = self.steps.lock().unwrap();
            steps.insert(step, StepState::Done);
            steps.values().all(|s| *s == StepState::Done)
        };
        match step {
            PrecheckStep::Decon => self.decon_event.set(),
            PrecheckStep::ToolSelector => self.tool_router_event.set(),
            _ => {}
        }
        if all_done {
            self.pre_checks_done_event.set();
        }
    }

    pub fn is_decontextualization_done(&self) -> bool {
        self.steps.lock().unwrap().get(&PrecheckStep::Decon) == Some(&StepState::Done)
    }

    pub fn is_tool_routing_done(&self) -> bool {
        self.steps.lock().unwrap().get(&PrecheckStep::ToolSelector) == Some(&StepState::Done)
    }

    pub async fn wait_for_decontextualization(&self) -> bool {
        self.decon_event.wait().await;
        self.is_decontextualization_done()
    }

    pub async fn wait_for_tool_routing(&self) -> bool {
        self.tool_router_event.wait().await;
        self.is_tool_routing_done()
    }

    /// Wait for all started precheck steps; false when the query was
    /// terminated early or the connection is gone.
    pub async fn pre_check_approval(&self) -> bool {
        self.pre_checks_done_event.wait().await;
        !self.query_done() && self.connection_alive_event.is_set()
    }

    // --- fast-track abort ---

    /// Consolidated fast-track abort conditions. Callers must re-check
    /// after every await.
    pub fn should_abort_fast_track(&self) -> bool {
        if self.query_done() || self.query_is_irrelevant() {
            return true;
        }
        if !self.required_info_found() {
            return true;
        }
        if self.requires_decontextualization() {
            return true;
        }
        if !self.connection_alive_event.is_set() {
            return true;
        }
        if let Some(top) = self.top_tool() {
            if top.tool.name != "search" {
                return true;
            }
        }
        false
    }

    pub fn abort_fast_track_if_needed(&self) -> bool {
        if self.should_abort_fast_track() {
            self.abort_fast_track_event.set();
            true
        } else {
            false
        }
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}
