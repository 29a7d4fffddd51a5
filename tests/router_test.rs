// tests/router_test.rs
// Tool-router selection semantics

mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;

use nlweb::handler::{AskRequest, NLWebHandler, PrecheckStep};
use nlweb::router::run_tool_selector;
use nlweb::testing::mock_llm::MockLlmProvider;

async fn routed(mock: MockLlmProvider, query: &str) -> Arc<NLWebHandler> {
    let app = test_app(Arc::new(mock)).await;
    seed_default_corpus(&app).await;
    let params = ask_params(&[("query", query), ("site", "seriouseats"), ("streaming", "false")]);
    let handler = NLWebHandler::new(app, AskRequest::from_params(&params), None);

    // The selector waits on decontextualization; complete it directly.
    handler.state.start_precheck_step(PrecheckStep::Decon);
    handler.state.precheck_step_done(PrecheckStep::Decon);
    handler.state.start_precheck_step(PrecheckStep::ToolSelector);
    run_tool_selector(&handler).await;
    handler
}

#[tokio::test]
async fn score_at_ninety_terminates_early_with_one_tool() {
    let mock = MockLlmProvider::new()
        .when(
            "details of one specific named item",
            json!({"score": 95, "justification": "named item", "item_name": "lasagna", "details_requested": "ingredients"}),
        )
        .when(
            "ranked list of items matching the query",
            json!({"score": 85, "justification": "could also search"}),
        )
        .with_default(json!({"score": 40, "justification": "unlikely"}));
    let handler = routed(mock, "ingredients in the lasagna?").await;

    let results = handler.state.tool_routing_results();
    assert_eq!(results.len(), 1, "early termination collapses to one tool");
    assert_eq!(results[0].tool.name, "item_details");
    assert!(
        handler.state.abort_fast_track_event.is_set(),
        "non-search top tool aborts the fast track"
    );
}

#[tokio::test]
async fn all_below_threshold_falls_back_to_search() {
    let mock = MockLlmProvider::new().with_default(json!({"score": 10, "justification": "nothing fits"}));
    let handler = routed(mock, "hmm").await;

    let results = handler.state.tool_routing_results();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].tool.name, "search");
    assert!(
        !handler.state.abort_fast_track_event.is_set(),
        "search fallback keeps the fast track alive"
    );
    assert!(handler.state.is_tool_routing_done());
}

#[tokio::test]
async fn results_sorted_and_capped_at_three() {
    let mock = MockLlmProvider::new()
        .when("ranked list of items matching the query", json!({"score": 82, "justification": ""}))
        .when("details of one specific named item", json!({"score": 76, "justification": ""}))
        .when("accompany or pair", json!({"score": 74, "justification": ""}))
        .when("ingredient substitutions", json!({"score": 72, "justification": ""}))
        .with_default(json!({"score": 71, "justification": ""}));
    let handler = routed(mock, "chicken dinner").await;

    let results = handler.state.tool_routing_results();
    assert!(results.len() <= 3, "top three only");
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
    assert_eq!(results[0].tool.name, "search");
}

#[tokio::test]
async fn generative_modes_skip_tool_selection() {
    let app = test_app(Arc::new(MockLlmProvider::new())).await;
    let params = ask_params(&[
        ("query", "summarize dinner options"),
        ("generate_mode", "summarize"),
        ("streaming", "false"),
    ]);
    let handler = NLWebHandler::new(app, AskRequest::from_params(&params), None);
    handler.state.start_precheck_step(PrecheckStep::Decon);
    handler.state.precheck_step_done(PrecheckStep::Decon);
    handler.state.start_precheck_step(PrecheckStep::ToolSelector);
    run_tool_selector(&handler).await;

    assert!(handler.state.tool_routing_results().is_empty());
    assert!(handler.state.is_tool_routing_done());
}
