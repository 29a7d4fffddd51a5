// src/methods/substitution.rs
// Ingredient substitution suggestions for retrieved recipes

use once_cell::sync::Lazy;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info};

use super::param_str;
use crate::handler::{Message, NLWebHandler};
use crate::llm::{AskOptions, is_empty_response};
use crate::retrieval::RetrievedItem;
use crate::utils::trim_schema_json;

const MAX_RECIPES: usize = 3;

const SUBSTITUTION_KEYWORDS: &[&str] = &[
    "substitute",
    "instead",
    "replace",
    "without",
    "dairy-free",
    "gluten-free",
    "vegan",
    "egg-free",
    "nut-free",
];

static SUBSTITUTION_SCHEMA: Lazy<Value> = Lazy::new(|| {
    json!({
        "substitutions": [{
            "original_ingredient": "string",
            "substitute": "string",
            "ratio": "string (e.g., '1:1', '3/4 cup for 1 cup')",
            "notes": "string"
        }],
        "general_tips": "string",
        "cooking_adjustments": "string",
        "taste_texture_impact": "string",
    })
});

pub async fn run(handler: &Arc<NLWebHandler>, params: &Value) {
    let recipe_name = param_str(params, "recipe_name");
    let dietary_need = param_str(params, "dietary_need");
    let unavailable_ingredient = param_str(params, "unavailable_ingredient");

    info!(
        "substitution request: recipe='{recipe_name}', dietary='{dietary_need}', unavailable='{unavailable_ingredient}'"
    );

    let search_query = if recipe_name.is_empty() {
        handler.state.effective_query()
    } else {
        recipe_name.clone()
    };
    let candidates = handler.retrieve(&search_query).await;
    if candidates.is_empty() {
        handler
            .send_message(Message::NoResults {
                message: format!("Could not find any recipes matching '{search_query}'."),
            })
            .await;
        return;
    }

    let recipes: Vec<&RetrievedItem> = candidates.iter().take(MAX_RECIPES).collect();
    let recipe_refs: Vec<Value> = recipes
        .iter()
        .map(|r| json!({"url": r.url, "name": r.name, "schema_object": r.schema_json}))
        .collect();

    if !needs_substitution(handler, &dietary_need, &unavailable_ingredient) {
        handler
            .send_message(Message::SubstitutionSuggestions {
                message: format!(
                    "These recipes already fit the request; no substitutions needed for '{search_query}'."
                ),
                substitutions: json!({}),
                recipes: recipe_refs,
            })
            .await;
        return;
    }

    let prompt = build_prompt(
        handler,
        &recipe_name,
        &dietary_need,
        &unavailable_ingredient,
        &recipes,
    );
    let ask = AskOptions::high()
        .with_dev_overrides(&handler.app.config, &handler.state.query_params);
    let response = handler.app.llm.ask(&prompt, &SUBSTITUTION_SCHEMA, &ask).await;
    if is_empty_response(&response) {
        error!("no substitution response from LLM");
        handler
            .send_message(Message::Error {
                message: "Could not generate substitution suggestions".to_string(),
            })
            .await;
        return;
    }

    handler
        .send_message(Message::SubstitutionSuggestions {
            message: header_for(&recipe_name, &dietary_need, &unavailable_ingredient),
            substitutions: response,
            recipes: recipe_refs,
        })
        .await;
}

fn needs_substitution(
    handler: &NLWebHandler,
    dietary_need: &str,
    unavailable_ingredient: &str,
) -> bool {
    if !dietary_need.is_empty() || !unavailable_ingredient.is_empty() {
        return true;
    }
    let query = handler.state.query.to_lowercase();
    SUBSTITUTION_KEYWORDS.iter().any(|k| query.contains(k))
}

fn build_prompt(
    handler: &NLWebHandler,
    recipe_name: &str,
    dietary_need: &str,
    unavailable_ingredient: &str,
    recipes: &[&RetrievedItem],
) -> String {
    let mut parts =
        vec!["Generate ingredient substitution suggestions for the following request:".to_string()];
    parts.push(format!("User request: {}", handler.state.effective_query()));
    if !recipe_name.is_empty() {
        parts.push(format!("Recipe: {recipe_name}"));
    }
    if !dietary_need.is_empty() {
        parts.push(format!("Dietary need: {dietary_need}"));
    }
    if !unavailable_ingredient.is_empty() {
        parts.push(format!("Unavailable ingredient: {unavailable_ingredient}"));
    }
    for recipe in recipes {
        parts.push(format!(
            "Candidate recipe '{}': {}",
            recipe.name,
            trim_schema_json(&recipe.schema_json)
        ));
    }
    parts.join("\n")
}

fn header_for(recipe_name: &str, dietary_need: &str, unavailable_ingredient: &str) -> String {
    if !recipe_name.is_empty() && !dietary_need.is_empty() {
        format!("Substitutions for making {recipe_name} {dietary_need}")
    } else if !recipe_name.is_empty() && !unavailable_ingredient.is_empty() {
        format!("Substituting {unavailable_ingredient} in {recipe_name}")
    } else if !dietary_need.is_empty() {
        format!("{dietary_need} substitutions")
    } else {
        "Ingredient substitutions".to_string()
    }
}
