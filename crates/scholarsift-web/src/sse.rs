//! Server-Sent Events stream of search progress.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_util::Stream;
use scholarsift_common::{validate_arxiv_category, ApiError};
use scholarsift_ingestion::{PipelineEvent, SearchRequest};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::handlers::search::check_request;
use crate::state::SharedState;

/// POST /api/search/stream: runs a search and streams its progress.
///
/// Input errors are answered with a plain 400 before the stream opens. The
/// search itself runs in its own task, so a client hanging up does not
/// cancel it.
pub async fn search_stream(
    State(state): State<SharedState>,
    Json(req): Json<SearchRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    check_request(&req)?;
    if let Some(category) = req.arxiv_category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        validate_arxiv_category(category)?;
    }
    info!(keywords = %req.keywords, "Streaming search requested");

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let errors = tx.clone();
        if let Err(e) = state.pipeline.run(req, Some(tx)).await {
            warn!(error = %e, "Streaming search failed");
            let _ = errors.send(PipelineEvent::Error { message: e.to_string() });
        }
    });

    let stream = UnboundedReceiverStream::new(rx).filter_map(|event| {
        serde_json::to_string(&event).ok().map(|data| Ok(Event::default().data(data)))
    });

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    ))
}
