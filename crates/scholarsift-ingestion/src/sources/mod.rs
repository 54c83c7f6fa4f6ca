//! Paper search engine clients.

pub mod arxiv;
pub mod pubmed;
pub mod semantic_scholar;

use async_trait::async_trait;
use scholarsift_common::{EngineError, PaperRecord, SandboxError, Source};

/// Common interface for all paper search engines.
///
/// Implementations convert every underlying fault into `EngineError`, so one
/// engine failing never aborts the others.
#[async_trait]
pub trait PaperEngine: Send + Sync {
    fn source(&self) -> Source;

    /// Search for papers matching `keywords`, returning at most `limit`
    /// records. `category` is only meaningful to arXiv.
    async fn search(
        &self,
        keywords: &str,
        limit: usize,
        category: Option<&str>,
    ) -> Result<Vec<PaperRecord>, EngineError>;
}

pub(crate) fn blocked(engine: Source, err: SandboxError) -> EngineError {
    EngineError::network(engine, err)
}

/// Read the body of a response, mapping non-success statuses to `Upstream`.
pub(crate) async fn read_body(engine: Source, resp: reqwest::Response) -> Result<String, EngineError> {
    let status = resp.status();
    let body = resp.text().await.map_err(|e| EngineError::network(engine, e))?;
    if !status.is_success() {
        return Err(EngineError::Upstream {
            engine,
            status: status.as_u16(),
            message: body.chars().take(200).collect(),
        });
    }
    Ok(body)
}

/// Collapse runs of whitespace, as found in XML text nodes.
pub(crate) fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
