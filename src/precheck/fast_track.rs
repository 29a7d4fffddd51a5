// src/precheck/fast_track.rs
// Opportunistic retrieval + ranking racing the precheck stage

use std::sync::Arc;
use tracing::{debug, info};

use crate::handler::NLWebHandler;
use crate::ranking::{RankTrack, Ranker};

/// A request qualifies only when there is no context to resolve: no
/// prior turns and no context URL. Generative modes run their own
/// gather-and-synthesize pass and never stream ranked batches.
pub fn is_eligible(handler: &NLWebHandler) -> bool {
    handler.state.context_url.is_empty()
        && handler.state.prev_queries.is_empty()
        && !handler.state.generate_mode.is_generative()
}

/// Launch retrieval for the raw query in parallel with the precheck
/// steps, and start ranking as soon as the retrieval lands. All work here
/// is discarded silently if the abort event fires first.
pub async fn run(handler: Arc<NLWebHandler>) {
    let state = &handler.state;
    if !handler.app.config.nlweb.prechecks.fast_track || !is_eligible(&handler) {
        return;
    }

    let items = handler.retrieve(&state.query).await;
    state.set_final_retrieved_items(items.clone());

    if state.is_decontextualization_done() {
        if state.requires_decontextualization() {
            // The rewrite invalidates this retrieval; the post-precheck
            // fallback re-retrieves with the rewritten query.
            debug!("fast track dropped: decontextualization required");
            return;
        }
        state.set_retrieval_done();
        if !state.query_done() {
            info!("fast track: decontextualization resolved, ranking");
            Ranker::new(handler.clone(), items, RankTrack::PostDecontextualization)
                .run()
                .await;
        }
    } else {
        state.set_retrieval_done();
        if !state.query_done() {
            info!("fast track: ranking ahead of decontextualization");
            Ranker::new(handler.clone(), items, RankTrack::FastTrack).run().await;
        }
    }
}
