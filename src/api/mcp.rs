// src/api/mcp.rs
// Minimal JSON-RPC 2.0 endpoint: initialize, tools/list, tools/call

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::app::AppState;
use crate::handler::{AskRequest, NLWebHandler};

const PROTOCOL_VERSION: &str = "2024-11-05";

pub async fn handle(State(app): State<Arc<AppState>>, Json(request): Json<Value>) -> Json<Value> {
    let id = request.get("id").cloned().unwrap_or(Value::Null);
    let method = request.get("method").and_then(Value::as_str).unwrap_or("");
    let params = request.get("params").cloned().unwrap_or(Value::Null);
    info!("mcp request: {method}");

    let result = match method {
        "initialize" => Ok(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {"name": "nlweb", "version": env!("CARGO_PKG_VERSION")},
            "capabilities": {"tools": {}},
        })),
        "notifications/initialized" | "ping" => Ok(json!({})),
        "tools/list" => Ok(tools_list()),
        "tools/call" => tools_call(&app, &params).await,
        other => Err((-32601, format!("method not found: {other}"))),
    };

    Json(match result {
        Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
        Err((code, message)) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": code, "message": message},
        }),
    })
}

fn tools_list() -> Value {
    json!({
        "tools": [
            {
                "name": "ask",
                "description": "Ask a natural-language question against the schema.org corpus",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "The question to answer"},
                        "site": {"type": "string", "description": "Site to scope to (default: all)"},
                        "prev": {"type": "array", "items": {"type": "string"}, "description": "Prior queries in this conversation"},
                        "generate_mode": {"type": "string", "enum": ["none", "list", "summarize", "generate"]},
                    },
                    "required": ["query"],
                },
            },
            {
                "name": "get_sites",
                "description": "List the sites available for querying",
                "inputSchema": {"type": "object", "properties": {}},
            },
        ],
    })
}

async fn tools_call(app: &Arc<AppState>, params: &Value) -> Result<Value, (i32, String)> {
    let name = params.get("name").and_then(Value::as_str).unwrap_or("");
    let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

    match name {
        "ask" => {
            let mut multi: HashMap<String, Vec<String>> = HashMap::new();
            if let Value::Object(map) = arguments {
                for (key, value) in map {
                    let values = match value {
                        Value::Array(items) => items
                            .into_iter()
                            .map(|v| match v {
                                Value::String(s) => s,
                                other => other.to_string(),
                            })
                            .collect(),
                        Value::String(s) => vec![s],
                        other => vec![other.to_string()],
                    };
                    multi.insert(key, values);
                }
            }
            // MCP callers always get the aggregated JSON form.
            multi.insert("streaming".to_string(), vec!["false".to_string()]);

            let request = AskRequest::from_params(&multi);
            if request.query.is_empty() {
                return Err((-32602, "missing required argument: query".to_string()));
            }
            let handler = NLWebHandler::new(app.clone(), request, None);
            let result = handler.run().await;
            Ok(json!({
                "content": [{"type": "text", "text": result.to_string()}],
            }))
        }
        "get_sites" => {
            let sites = app.retriever.get_sites().await;
            Ok(json!({
                "content": [{"type": "text", "text": json!({"sites": sites}).to_string()}],
            }))
        }
        other => Err((-32602, format!("unknown tool: {other}"))),
    }
}
