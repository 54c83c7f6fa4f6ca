//! Multi-engine search.

use axum::{extract::State, Json};
use scholarsift_common::ApiError;
use scholarsift_ingestion::{SearchOutcome, SearchRequest};
use tracing::info;

use super::search_error;
use crate::state::SharedState;

/// Reject requests the pipeline cannot do anything useful with.
pub(crate) fn check_request(req: &SearchRequest) -> Result<(), ApiError> {
    if req.keywords.trim().is_empty() {
        return Err(ApiError::BadRequest("keywords must not be empty".to_string()));
    }
    Ok(())
}

/// POST /api/search
pub async fn search(
    State(state): State<SharedState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchOutcome>, ApiError> {
    check_request(&req)?;
    info!(keywords = %req.keywords, engines = ?req.engines, "Search requested");
    let outcome = state.pipeline.search(req).await.map_err(search_error)?;
    Ok(Json(outcome))
}
