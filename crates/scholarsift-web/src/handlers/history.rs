//! History CRUD over the JSON-on-disk store.

use axum::{
    extract::{Path, State},
    Json,
};
use scholarsift_common::ApiError;
use scholarsift_db::{HistoryError, HistoryRecord, RecordType};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    #[serde(rename = "type")]
    pub record_type: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub result_summary: Value,
    #[serde(default)]
    pub papers: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRequest {
    #[serde(rename = "type", default)]
    pub record_type: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub records: Vec<HistoryRecord>,
    pub total: usize,
}

fn parse_type(name: &str) -> Result<RecordType, ApiError> {
    name.parse().map_err(|e: HistoryError| ApiError::BadRequest(e.to_string()))
}

/// POST /api/history/save
pub async fn save(
    State(state): State<SharedState>,
    Json(req): Json<SaveRequest>,
) -> Result<Json<SaveResponse>, ApiError> {
    let record_type = parse_type(&req.record_type)?;
    let id = state
        .history
        .save(record_type, req.params, req.result_summary, req.papers)
        .await
        .map_err(|e| ApiError::Internal(format!("saving history failed: {e}")))?;
    Ok(Json(SaveResponse { id }))
}

/// POST /api/history/list
pub async fn list(
    State(state): State<SharedState>,
    Json(req): Json<ListRequest>,
) -> Result<Json<ListResponse>, ApiError> {
    let record_type = req.record_type.as_deref().filter(|t| !t.is_empty()).map(parse_type).transpose()?;
    let limit = req.limit.unwrap_or(state.default_list_limit);
    let records = state.history.list(record_type, limit).await;
    Ok(Json(ListResponse { total: records.len(), records }))
}

/// GET /api/history/get/{id}
pub async fn get(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<HistoryRecord>, ApiError> {
    match state.history.get(&id).await {
        Ok(record) => Ok(Json(record)),
        Err(HistoryError::NotFound(_)) => Err(ApiError::NotFound(format!("history record {id} not found"))),
        Err(e) => Err(ApiError::Internal(e.to_string())),
    }
}
