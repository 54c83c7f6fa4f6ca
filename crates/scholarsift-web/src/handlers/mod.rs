//! HTTP handlers for all API routes.

pub mod arxiv;
pub mod history;
pub mod search;
pub mod system;

use scholarsift_common::ApiError;
use scholarsift_ingestion::SearchError;

/// Client-input errors become 400; anything else is a server fault.
pub(crate) fn search_error(err: SearchError) -> ApiError {
    match err {
        SearchError::InvalidCategory(e) => ApiError::from(e),
        other => ApiError::Internal(other.to_string()),
    }
}
