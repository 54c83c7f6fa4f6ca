use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use scholarsift_common::{EngineError, PaperRecord, Source};
use scholarsift_ingestion::sources::PaperEngine;

/// Engine that returns a fixed list, truncated to the requested limit.
pub struct StaticEngine {
    source: Source,
    papers: Vec<PaperRecord>,
    calls: AtomicUsize,
}

impl StaticEngine {
    pub fn new(source: Source, papers: Vec<PaperRecord>) -> Self {
        Self { source, papers, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaperEngine for StaticEngine {
    fn source(&self) -> Source {
        self.source
    }

    async fn search(
        &self,
        _keywords: &str,
        limit: usize,
        _category: Option<&str>,
    ) -> Result<Vec<PaperRecord>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.papers.iter().take(limit).cloned().collect())
    }
}

/// Engine whose every search fails with a network error.
pub struct FailingEngine {
    source: Source,
}

impl FailingEngine {
    pub fn new(source: Source) -> Self {
        Self { source }
    }
}

#[async_trait]
impl PaperEngine for FailingEngine {
    fn source(&self) -> Source {
        self.source
    }

    async fn search(
        &self,
        _keywords: &str,
        _limit: usize,
        _category: Option<&str>,
    ) -> Result<Vec<PaperRecord>, EngineError> {
        Err(EngineError::network(self.source, "connection refused"))
    }
}
