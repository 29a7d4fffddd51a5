// src/testing/mock_llm.rs
// Scripted LLM provider for development and tests

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Mutex;
use std::time::Duration;

use crate::llm::LlmProvider;

/// A rule matching prompts by substring. First matching rule wins.
#[derive(Debug, Clone)]
struct MockRule {
    contains: String,
    response: Value,
}

/// Deterministic stand-in for a real LLM endpoint.
///
/// Responses are selected by matching the filled prompt against scripted
/// substring rules, falling back to a default response. Every prompt is
/// recorded so tests can assert on what was asked.
pub struct MockLlmProvider {
    rules: Vec<MockRule>,
    default_response: Value,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            // Benign defaults: queries are relevant, no rewrite needed,
            // nothing to remember, middling ranking scores.
            default_response: json!({
                "score": 0,
                "requires_decontextualization": "False",
                "site_is_irrelevant_to_query": "False",
                "is_memory_request": "False",
                "required_info_found": "True",
                "item_type": "Item",
            }),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Respond with `response` whenever the prompt contains `substring`.
    pub fn when(mut self, substring: &str, response: Value) -> Self {
        self.rules.push(MockRule {
            contains: substring.to_string(),
            response,
        });
        self
    }

    pub fn with_default(mut self, response: Value) -> Self {
        self.default_response = response;
        self
    }

    /// Delay every completion, for timeout and cancellation tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Prompts seen so far, in completion-request order.
    pub fn recorded_prompts(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Default for MockLlmProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn get_completion(
        &self,
        prompt: &str,
        _schema: &Value,
        _model: &str,
        _max_tokens: usize,
    ) -> Result<Value> {
        self.calls.lock().unwrap().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        for rule in &self.rules {
            if prompt.contains(&rule.contains) {
                return Ok(rule.response.clone());
            }
        }
        Ok(self.default_response.clone())
    }
}
