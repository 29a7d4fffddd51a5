// tests/common/mod.rs
// Shared fixtures: a fully-wired AppState with scripted LLM responses
// and an in-memory corpus

use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

use nlweb::app::AppState;
use nlweb::config::AppConfig;
use nlweb::handler::{AskRequest, NLWebHandler};
use nlweb::retrieval::RetrievedItem;
use nlweb::testing::mock_llm::MockLlmProvider;

/// Build an AppState from the repository's config directory (real
/// prompts.xml and tools.xml) with the scripted mock installed as the
/// preferred LLM endpoint.
pub async fn test_app(mock: Arc<MockLlmProvider>) -> Arc<AppState> {
    let mut config = AppConfig::load(Path::new("config")).expect("config should load");
    config.llm.preferred_endpoint = "mock".to_string();
    config.nlweb.conversation_storage.storage_type = "memory".to_string();
    let app = AppState::initialize(config).await.expect("app should initialize");
    app.llm.registry().install("mock", mock);
    app
}

pub fn recipe(url: &str, name: &str, site: &str, ingredients: &[&str]) -> RetrievedItem {
    RetrievedItem {
        url: url.to_string(),
        name: name.to_string(),
        site: site.to_string(),
        schema_json: serde_json::json!({
            "@type": "Recipe",
            "name": name,
            "recipeIngredient": ingredients,
        }),
    }
}

pub async fn seed(app: &Arc<AppState>, items: &[RetrievedItem]) {
    app.retriever
        .upload_documents(items, None)
        .await
        .expect("seeding should succeed");
}

/// Standard five-document corpus used across the pipeline tests.
pub async fn seed_default_corpus(app: &Arc<AppState>) {
    seed(
        app,
        &[
            recipe(
                "https://seriouseats.example.com/lasagna",
                "Classic Lasagna",
                "seriouseats",
                &["lasagna noodles", "ricotta", "tomato sauce"],
            ),
            recipe(
                "https://seriouseats.example.com/chicken-dinner",
                "Weeknight Chicken Dinner",
                "seriouseats",
                &["chicken thighs", "garlic", "lemon"],
            ),
            recipe(
                "https://woksoflife.example.com/stir-fry",
                "Chicken Stir Fry",
                "woksoflife",
                &["chicken breast", "soy sauce"],
            ),
            RetrievedItem {
                url: "https://imdb.example.com/space-odyssey".to_string(),
                name: "2001: A Space Odyssey".to_string(),
                site: "imdb".to_string(),
                schema_json: serde_json::json!({"@type": "Movie", "name": "2001: A Space Odyssey"}),
            },
            RetrievedItem {
                url: "https://tripadvisor.example.com/trattoria".to_string(),
                name: "Trattoria Roma".to_string(),
                site: "tripadvisor".to_string(),
                schema_json: serde_json::json!({
                    "@type": "Restaurant",
                    "name": "Trattoria Roma",
                    "address": {"streetAddress": "12 Via Appia", "addressLocality": "Rome"},
                }),
            },
        ],
    )
    .await;
}

pub fn ask_params(pairs: &[(&str, &str)]) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in pairs {
        params
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
    }
    params
}

/// Run a streaming request to completion and return every emitted frame
/// in order.
pub async fn run_streaming(app: Arc<AppState>, params: HashMap<String, Vec<String>>) -> Vec<Value> {
    let (tx, mut rx) = mpsc::channel::<Value>(256);
    let handler = NLWebHandler::new(app, AskRequest::from_params(&params), Some(tx));
    let run = tokio::spawn(async move { handler.run().await });

    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(frame);
    }
    run.await.expect("pipeline should not panic");
    frames
}

pub fn frames_of_type<'a>(frames: &'a [Value], message_type: &str) -> Vec<&'a Value> {
    frames
        .iter()
        .filter(|f| f["message_type"] == message_type)
        .collect()
}

/// The message vocabulary is closed; anything outside it is a defect.
pub fn assert_known_message_types(frames: &[Value]) {
    const KNOWN: &[&str] = &[
        "asking_sites",
        "decontextualized_query",
        "tool_selection",
        "query_rewrite",
        "remember",
        "ask_user",
        "site_is_irrelevant_to_query",
        "result_batch",
        "item_details",
        "compare_items",
        "substitution_suggestions",
        "nlws",
        "summary",
        "results_map",
        "intermediate_message",
        "no_results",
        "error",
    ];
    for frame in frames {
        let message_type = frame["message_type"].as_str().unwrap_or("<missing>");
        assert!(
            KNOWN.contains(&message_type),
            "unknown message type: {message_type}"
        );
        assert!(
            frame.get("query_id").is_some(),
            "frame missing query_id: {frame}"
        );
    }
}
