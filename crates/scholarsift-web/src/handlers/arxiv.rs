//! arXiv-only endpoints: latest submissions and abstract refinement.

use axum::{extract::State, Json};
use scholarsift_common::ApiError;
use scholarsift_ingestion::{LatestPapers, LatestRequest};
use serde::{Deserialize, Serialize};

use super::search_error;
use crate::state::SharedState;

/// POST /api/arxiv/latest
pub async fn latest(
    State(state): State<SharedState>,
    Json(req): Json<LatestRequest>,
) -> Result<Json<LatestPapers>, ApiError> {
    let papers = state.pipeline.latest(req).await.map_err(search_error)?;
    Ok(Json(papers))
}

#[derive(Debug, Deserialize)]
pub struct RefineRequest {
    pub arxiv_id: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct RefineResponse {
    pub refined_abstract: String,
}

/// POST /api/arxiv/refine-abstract
pub async fn refine_abstract(
    State(state): State<SharedState>,
    Json(req): Json<RefineRequest>,
) -> Json<RefineResponse> {
    let refined_abstract = state.refiner.refine(&req.arxiv_id, &req.abstract_text, &req.title).await;
    Json(RefineResponse { refined_abstract })
}
