//! Axum router: maps all URL paths to handlers.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::handlers::{arxiv, history, search, system};
use crate::sse::search_stream;
use crate::state::SharedState;

/// Build and return the full Axum router.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/",           get(system::root))
        .route("/api/health", get(system::health))

        // Search
        .route("/api/search",        post(search::search))
        .route("/api/search/stream", post(search_stream))

        // arXiv
        .route("/api/arxiv/latest",          post(arxiv::latest))
        .route("/api/arxiv/refine-abstract", post(arxiv::refine_abstract))

        // History
        .route("/api/history/save",     post(history::save))
        .route("/api/history/list",     post(history::list))
        .route("/api/history/get/{id}", get(history::get))

        // Middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
