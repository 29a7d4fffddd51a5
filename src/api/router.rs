// src/api/router.rs
// HTTP router composition

use axum::Router;
use axum::http::{HeaderValue, header};
use axum::routing::{delete, get, post};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::set_header::SetResponseHeaderLayer;

use super::{ask, conversation, mcp, sites};
use crate::app::AppState;

/// The full HTTP surface. CORS preflight is accepted on every route when
/// enabled; static files are served with cache headers.
pub fn build_router(app: Arc<AppState>) -> Router {
    let static_dir = app.config.server.static_directory.clone();
    let cache_header = HeaderValue::from_str(&format!(
        "public, max-age={}",
        app.config.server.static_cache_seconds
    ))
    .unwrap_or(HeaderValue::from_static("public, max-age=3600"));
    let static_service = ServiceBuilder::new()
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            cache_header,
        ))
        .service(ServeDir::new(&static_dir));

    let mut router = Router::new()
        // Liveness
        .route("/health", get(sites::health))
        .route("/ready", get(sites::ready))
        // Query pipeline
        .route("/ask", get(ask::ask_get).post(ask::ask_post))
        .route("/who", get(sites::who))
        .route("/sites", get(sites::sites))
        // MCP (JSON-RPC 2.0)
        .route("/mcp", post(mcp::handle))
        // Conversation storage
        .route(
            "/api/conversations",
            post(conversation::create).get(conversation::list_recent),
        )
        .route("/api/conversations/search", get(conversation::search))
        .route("/api/conversations/{id}", delete(conversation::delete))
        // Static content
        .route_service("/", ServeFile::new(format!("{static_dir}/index.html")))
        .nest_service("/static", static_service.clone())
        .nest_service("/html", static_service)
        .with_state(app.clone());

    if app.config.server.enable_cors {
        router = router.layer(CorsLayer::permissive());
    }
    router
}
