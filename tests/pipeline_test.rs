// tests/pipeline_test.rs
// End-to-end pipeline scenarios driven through the scripted mock LLM

mod common;

use common::*;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use nlweb::testing::mock_llm::MockLlmProvider;

/// The tool-selection prompts live in config/tools.xml; these substrings
/// are unique to one prompt each.
const SEARCH_TOOL_MARKER: &str = "ranked list of items matching the query";
const ITEM_DETAILS_TOOL_MARKER: &str = "details of one specific named item";
const RELEVANCE_MARKER: &str = "completely unrelated";
const DECON_PREV_MARKER: &str = "previous questions in this conversation";

fn search_wins_routing(mock: MockLlmProvider) -> MockLlmProvider {
    mock.when(SEARCH_TOOL_MARKER, json!({"score": 95, "justification": "plain search"}))
}

#[tokio::test]
async fn simple_search_streams_ranked_results() {
    let mock = Arc::new(
        search_wins_routing(MockLlmProvider::new())
            .when("Classic Lasagna", json!({"score": 85, "description": "A rich baked pasta."}))
            .when("Weeknight Chicken Dinner", json!({"score": 90, "description": "Fast and bright."}))
            .when("Chicken Stir Fry", json!({"score": 75, "description": "Weeknight wok dish."}))
            .when("Space Odyssey", json!({"score": 20, "description": ""}))
            .when("Trattoria", json!({"score": 30, "description": ""})),
    );
    let app = test_app(mock).await;
    seed_default_corpus(&app).await;

    let frames = run_streaming(
        app,
        ask_params(&[("query", "pasta recipes"), ("site", "all"), ("streaming", "true")]),
    )
    .await;
    assert_known_message_types(&frames);

    // asking_sites once, tool_selection names search.
    assert_eq!(frames_of_type(&frames, "asking_sites").len(), 1);
    let selections = frames_of_type(&frames, "tool_selection");
    assert_eq!(selections.len(), 1);
    assert_eq!(selections[0]["selected_tool"], "search");

    // tool_selection precedes every result batch.
    let selection_idx = frames
        .iter()
        .position(|f| f["message_type"] == "tool_selection")
        .unwrap();
    let first_batch_idx = frames
        .iter()
        .position(|f| f["message_type"] == "result_batch")
        .expect("at least one result batch");
    assert!(selection_idx < first_batch_idx);

    // Batches: <= 10 results total, every score > 51, URL-unique.
    let mut seen_urls = HashSet::new();
    let mut total = 0;
    for batch in frames_of_type(&frames, "result_batch") {
        for result in batch["results"].as_array().unwrap() {
            total += 1;
            assert!(result["score"].as_u64().unwrap() > 51);
            assert!(
                seen_urls.insert(result["url"].as_str().unwrap().to_string()),
                "result sent twice: {}",
                result["url"]
            );
        }
    }
    assert!(total > 0 && total <= 10);
}

#[tokio::test]
async fn irrelevant_query_terminates_with_one_message() {
    let mock = Arc::new(MockLlmProvider::new().when(
        RELEVANCE_MARKER,
        json!({
            "site_is_irrelevant_to_query": "True",
            "explanation_for_irrelevance": "This site only answers cooking questions.",
        }),
    ));
    let app = test_app(mock).await;
    seed_default_corpus(&app).await;

    let frames = run_streaming(
        app,
        ask_params(&[
            ("query", "how many angels can dance on the head of a pin"),
            ("site", "seriouseats"),
        ]),
    )
    .await;
    assert_known_message_types(&frames);

    assert_eq!(frames_of_type(&frames, "site_is_irrelevant_to_query").len(), 1);
    assert!(frames_of_type(&frames, "result_batch").is_empty());
}

#[tokio::test]
async fn prior_turn_decontextualizes_the_query() {
    let mock = Arc::new(
        search_wins_routing(MockLlmProvider::new())
            .when(
                DECON_PREV_MARKER,
                json!({
                    "requires_decontextualization": "True",
                    "decontextualized_query": "easy chicken dinner recipes",
                }),
            )
            .when("Weeknight Chicken Dinner", json!({"score": 88, "description": "Chicken for dinner."}))
            .when("Chicken Stir Fry", json!({"score": 80, "description": "Chicken in a wok."}))
            .with_default(json!({"score": 40, "description": ""})),
    );
    let app = test_app(mock).await;
    seed_default_corpus(&app).await;

    let frames = run_streaming(
        app,
        ask_params(&[
            ("query", "what about chicken?"),
            ("prev", "easy dinner recipes"),
            ("site", "all"),
        ]),
    )
    .await;
    assert_known_message_types(&frames);

    let decon = frames_of_type(&frames, "decontextualized_query");
    assert_eq!(decon.len(), 1);
    let rewritten = decon[0]["decontextualized_query"].as_str().unwrap();
    assert!(rewritten.contains("chicken") && rewritten.contains("dinner"));

    // The batches reflect the rewritten query: chicken items only.
    for batch in frames_of_type(&frames, "result_batch") {
        for result in batch["results"].as_array().unwrap() {
            assert!(result["name"].as_str().unwrap().contains("Chicken"));
        }
    }
}

#[tokio::test]
async fn aborted_fast_track_discards_high_scoring_batches() {
    // No prior turns, so the fast track launches and every item scores
    // well above the early-send threshold. The relevance step then kills
    // the query; since fast-track batches gate on prechecks, the abort
    // lands before the first emission and nothing may leak out.
    let mock = Arc::new(
        search_wins_routing(MockLlmProvider::new())
            .when(
                RELEVANCE_MARKER,
                json!({
                    "site_is_irrelevant_to_query": "True",
                    "explanation_for_irrelevance": "Not a cooking question.",
                }),
            )
            .with_default(json!({"score": 90, "description": "high everywhere"})),
    );
    let app = test_app(mock).await;
    seed_default_corpus(&app).await;

    let frames = run_streaming(
        app,
        ask_params(&[("query", "chicken"), ("site", "seriouseats")]),
    )
    .await;
    assert_known_message_types(&frames);

    assert!(frames_of_type(&frames, "result_batch").is_empty());
    assert_eq!(frames_of_type(&frames, "site_is_irrelevant_to_query").len(), 1);
}

#[tokio::test]
async fn tool_router_routes_item_details() {
    let mock = Arc::new(
        MockLlmProvider::new()
            .when(
                ITEM_DETAILS_TOOL_MARKER,
                json!({
                    "score": 95,
                    "justification": "asks for ingredients of one recipe",
                    "item_name": "Classic Lasagna",
                    "details_requested": "ingredients",
                }),
            )
            // Keyed on the lasagna item's own description so only the
            // right candidate clears the match threshold.
            .when(
                "ricotta",
                json!({
                    "score": 92,
                    "explanation": "same dish",
                    "item_details": "lasagna noodles, ricotta, tomato sauce",
                }),
            ),
    );
    let app = test_app(mock).await;
    seed_default_corpus(&app).await;

    let frames = run_streaming(
        app,
        ask_params(&[
            ("query", "what are the ingredients in the classic lasagna?"),
            ("site", "seriouseats"),
        ]),
    )
    .await;
    assert_known_message_types(&frames);

    let selections = frames_of_type(&frames, "tool_selection");
    assert_eq!(selections.len(), 1);
    assert_eq!(selections[0]["selected_tool"], "item_details");

    let details = frames_of_type(&frames, "item_details");
    assert_eq!(details.len(), 1, "exactly one item_details message");
    assert_eq!(details[0]["name"], "Classic Lasagna");
    assert!(
        details[0]["details"].as_str().unwrap().contains("ricotta"),
        "details should be populated"
    );

    // A routed tool means no ranked list.
    assert!(frames_of_type(&frames, "result_batch").is_empty());
}

#[tokio::test]
async fn generate_mode_skips_routing_and_emits_one_nlws() {
    let mock = Arc::new(
        MockLlmProvider::new()
            .when(
                "how useful it is for answering",
                json!({"score": 80, "description": "useful"}),
            )
            .when(
                "Cite the URLs",
                json!({
                    "answer": "Try the weeknight chicken dinner.",
                    "urls": ["https://seriouseats.example.com/chicken-dinner"],
                }),
            )
            .when(
                "describe how this item supports",
                json!({"description": "A quick chicken recipe that answers the question."}),
            ),
    );
    let app = test_app(mock).await;
    seed_default_corpus(&app).await;

    let frames = run_streaming(
        app,
        ask_params(&[
            ("query", "what should I cook tonight?"),
            ("site", "all"),
            ("generate_mode", "generate"),
        ]),
    )
    .await;
    assert_known_message_types(&frames);

    assert!(
        frames_of_type(&frames, "tool_selection").is_empty(),
        "tool routing is skipped in generate mode"
    );
    let nlws = frames_of_type(&frames, "nlws");
    assert_eq!(nlws.len(), 1, "exactly one nlws message");
    assert_eq!(nlws[0]["answer"], "Try the weeknight chicken dinner.");
    let items = nlws[0]["items"].as_array().unwrap();
    assert!(!items.is_empty());
    for item in items {
        assert!(!item["description"].as_str().unwrap().is_empty());
    }
}

#[tokio::test]
async fn missing_required_info_asks_the_user() {
    let mock = Arc::new(MockLlmProvider::new().when(
        "carry the required information",
        json!({
            "required_info_found": "False",
            "user_question": "Which city are you looking in?",
        }),
    ));
    let app = test_app(mock).await;
    seed_default_corpus(&app).await;

    let frames = run_streaming(
        app,
        ask_params(&[("query", "find me a restaurant"), ("site", "tripadvisor")]),
    )
    .await;
    assert_known_message_types(&frames);

    let asks = frames_of_type(&frames, "ask_user");
    assert_eq!(asks.len(), 1);
    assert_eq!(asks[0]["message"], "Which city are you looking in?");
    assert!(frames_of_type(&frames, "result_batch").is_empty());
}

#[tokio::test]
async fn non_streaming_aggregates_into_one_response() {
    let mock = Arc::new(
        search_wins_routing(MockLlmProvider::new())
            .when("Classic Lasagna", json!({"score": 85, "description": "Baked pasta."}))
            .with_default(json!({"score": 10, "description": ""})),
    );
    let app = test_app(mock).await;
    seed_default_corpus(&app).await;

    use nlweb::handler::{AskRequest, NLWebHandler};
    let params = ask_params(&[
        ("query", "lasagna"),
        ("site", "all"),
        ("streaming", "false"),
    ]);
    let handler = NLWebHandler::new(app, AskRequest::from_params(&params), None);
    let result = handler.run().await;

    assert!(result.get("query_id").is_some());
    let results = result["results"].as_array().expect("aggregated results array");
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r["score"].as_u64().unwrap() > 51));
}
