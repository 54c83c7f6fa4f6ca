//! Search orchestration.
//!
//! One search request flows through:
//!   1. Validate the arXiv category and resolve the requested engines
//!   2. Query each engine in turn, pausing between engines
//!   3. Ask the relevance filter to pick papers for the question
//!   4. Annotate the survivors through the bounded, order-preserving pool
//!   5. Record the outcome in history (best effort)
//!
//! Progress events are sent via `events` if provided. Engine, model and
//! history failures are logged and degraded; only client-input errors
//! reach the caller.

use std::sync::Arc;
use std::time::Duration;

use scholarsift_common::{
    validate_arxiv_category, AnnotatedPaper, EngineError, InvalidCategoryError, PaperRecord, PaperResponse, Source,
};
use scholarsift_db::{HistoryStore, RecordType};
use scholarsift_ranker::{Annotator, Progress, RelevanceFilter};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, instrument, warn};

use crate::sources::arxiv::ArxivClient;
use crate::sources::PaperEngine;

// ── Requests ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub keywords: String,
    #[serde(default)]
    pub question: String,
    /// Engine names; empty or unrecognised means the configured default.
    #[serde(default)]
    pub engines: Vec<String>,
    #[serde(default)]
    pub arxiv_category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestRequest {
    pub category: String,
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_latest_limit")]
    pub limit: usize,
}

fn default_days() -> u32 { 7 }
fn default_latest_limit() -> usize { 20 }
const MAX_LATEST_LIMIT: usize = 100;

impl LatestRequest {
    pub fn new(category: impl Into<String>) -> Self {
        Self { category: category.into(), days: default_days(), offset: 0, limit: default_latest_limit() }
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

/// How one engine fared during a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineReport {
    pub source: Source,
    pub count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOutcome {
    pub papers: Vec<PaperResponse>,
    pub total: usize,
    pub engines: Vec<EngineReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestPapers {
    pub papers: Vec<PaperResponse>,
    pub total: usize,
    pub category: String,
    pub offset: usize,
    pub has_more: bool,
}

/// Progress event streamed to clients during a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    Status { message: String, progress: u8 },
    Progress { current: usize, total: usize, paper_title: String, progress: u8 },
    Complete { papers: Vec<PaperResponse>, total: usize },
    Error { message: String },
}

impl PipelineEvent {
    fn status(message: impl Into<String>, progress: u8) -> Self {
        Self::Status { message: message.into(), progress }
    }

    /// Annotation occupies the 30..=90 band of the overall progress bar.
    fn annotated(p: Progress, title: &str) -> Self {
        let pct = if p.total == 0 { 90 } else { 30 + 60 * p.current / p.total };
        Self::Progress {
            current: p.current,
            total: p.total,
            paper_title: title.chars().take(50).collect(),
            progress: pct.min(90) as u8,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    InvalidCategory(#[from] InvalidCategoryError),

    /// The latest-papers listing has a single upstream, so its failure
    /// cannot be degraded around.
    #[error("latest papers unavailable: {0}")]
    Upstream(EngineError),
}

impl From<EngineError> for SearchError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::InvalidCategory(c) => SearchError::InvalidCategory(c),
            other => SearchError::Upstream(other),
        }
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_results_per_engine: usize,
    pub engine_delay: Duration,
    pub default_engines: Vec<Source>,
    pub default_arxiv_category: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_results_per_engine: 50,
            engine_delay: Duration::from_millis(1000),
            default_engines: vec![Source::Arxiv],
            default_arxiv_category: "cs".to_string(),
        }
    }
}

pub struct SearchPipeline {
    engines: Vec<Arc<dyn PaperEngine>>,
    arxiv: Option<Arc<ArxivClient>>,
    filter: RelevanceFilter,
    annotator: Arc<Annotator>,
    history: Option<Arc<HistoryStore>>,
    settings: PipelineSettings,
}

impl SearchPipeline {
    pub fn new(filter: RelevanceFilter, annotator: Arc<Annotator>, settings: PipelineSettings) -> Self {
        Self { engines: Vec::new(), arxiv: None, filter, annotator, history: None, settings }
    }

    /// Register an engine. A later engine for the same source replaces the
    /// earlier one.
    pub fn with_engine(mut self, engine: Arc<dyn PaperEngine>) -> Self {
        self.engines.retain(|e| e.source() != engine.source());
        self.engines.push(engine);
        self
    }

    /// Register the arXiv client both as a search engine and as the source
    /// of the latest-papers listing.
    pub fn with_arxiv(self, arxiv: Arc<ArxivClient>) -> Self {
        let mut this = self.with_engine(arxiv.clone());
        this.arxiv = Some(arxiv);
        this
    }

    pub fn with_history(mut self, history: Arc<HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    fn engine(&self, source: Source) -> Option<&Arc<dyn PaperEngine>> {
        self.engines.iter().find(|e| e.source() == source)
    }

    /// Requested engine names mapped to sources, deduplicated in request
    /// order. Falls back to the configured defaults when nothing usable
    /// was requested.
    pub fn resolve_engines(&self, requested: &[String]) -> Vec<Source> {
        let mut sources = Vec::new();
        for name in requested {
            match Source::parse(name) {
                Some(s) if !sources.contains(&s) => sources.push(s),
                Some(_) => {}
                None => warn!(engine = %name, "Ignoring unknown engine"),
            }
        }
        if sources.is_empty() {
            sources = self.settings.default_engines.clone();
        }
        if sources.is_empty() {
            sources.push(Source::Arxiv);
        }
        sources
    }

    /// Run a search without progress events.
    pub async fn search(&self, req: SearchRequest) -> Result<SearchOutcome, SearchError> {
        self.run(req, None).await
    }

    /// Run a search, sending progress events to `events`. The final
    /// `Complete` event is sent on success; a rejected request sends nothing
    /// and returns the error.
    #[instrument(skip(self, req, events), fields(keywords = %req.keywords))]
    pub async fn run(
        &self,
        req: SearchRequest,
        events: Option<UnboundedSender<PipelineEvent>>,
    ) -> Result<SearchOutcome, SearchError> {
        let emit = |event: PipelineEvent| {
            if let Some(tx) = &events {
                let _ = tx.send(event);
            }
        };

        let category = match req.arxiv_category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) => validate_arxiv_category(c)?.to_string(),
            None => self.settings.default_arxiv_category.clone(),
        };
        let sources = self.resolve_engines(&req.engines);
        info!(engines = ?sources, category = %category, "Starting search");

        let names: Vec<&str> = sources.iter().map(|s| s.as_str()).collect();
        emit(PipelineEvent::status(format!("Searching {}...", names.join(", ")), 0));

        // ── 1. Engines, in sequence ───────────────────────────────────────────
        let (candidates, reports) = self.collect(&req.keywords, &category, &sources).await;

        emit(PipelineEvent::status(
            format!("Found {} papers, filtering...", candidates.len()),
            10,
        ));

        if candidates.is_empty() {
            info!("No candidates from any engine");
            let history_id = self.record_search(&req, &category, &reports, &[]).await;
            emit(PipelineEvent::Complete { papers: Vec::new(), total: 0 });
            return Ok(SearchOutcome { papers: Vec::new(), total: 0, engines: reports, history_id });
        }

        // ── 2. Relevance filter ───────────────────────────────────────────────
        let filtered = self.filter.filter(&req.keywords, &req.question, &candidates).await;
        info!(candidates = candidates.len(), kept = filtered.len(), "Filter complete");

        emit(PipelineEvent::status(
            format!("Filtering done, {} papers left, annotating...", filtered.len()),
            30,
        ));

        // ── 3. Annotation ─────────────────────────────────────────────────────
        let titles: Vec<String> = filtered.iter().map(|p| p.title.clone()).collect();
        let annotated = self
            .annotator
            .annotate_batch(filtered, &req.question, |p| {
                let title = titles.get(p.index).map(String::as_str).unwrap_or_default();
                emit(PipelineEvent::annotated(p, title));
            })
            .await;

        // ── 4. History ────────────────────────────────────────────────────────
        let history_id = self.record_search(&req, &category, &reports, &annotated).await;

        let papers: Vec<PaperResponse> = annotated.into_iter().map(PaperResponse::from).collect();
        let total = papers.len();
        info!(total, "Search complete");
        emit(PipelineEvent::Complete { papers: papers.clone(), total });

        Ok(SearchOutcome { papers, total, engines: reports, history_id })
    }

    async fn collect(
        &self,
        keywords: &str,
        category: &str,
        sources: &[Source],
    ) -> (Vec<PaperRecord>, Vec<EngineReport>) {
        let mut candidates = Vec::new();
        let mut reports = Vec::with_capacity(sources.len());

        for (i, source) in sources.iter().copied().enumerate() {
            if i > 0 && !self.settings.engine_delay.is_zero() {
                tokio::time::sleep(self.settings.engine_delay).await;
            }

            let Some(engine) = self.engine(source) else {
                warn!(source = %source, "Engine requested but not configured");
                reports.push(EngineReport { source, count: 0, error: Some("engine not configured".to_string()) });
                continue;
            };

            match engine.search(keywords, self.settings.max_results_per_engine, Some(category)).await {
                Ok(papers) => {
                    info!(source = %source, n = papers.len(), "Papers retrieved");
                    reports.push(EngineReport { source, count: papers.len(), error: None });
                    candidates.extend(papers);
                }
                Err(e) => {
                    warn!(source = %source, error = %e, "Engine failed, continuing without it");
                    reports.push(EngineReport { source, count: 0, error: Some(e.to_string()) });
                }
            }
        }

        (candidates, reports)
    }

    async fn record_search(
        &self,
        req: &SearchRequest,
        category: &str,
        reports: &[EngineReport],
        papers: &[AnnotatedPaper],
    ) -> Option<String> {
        let engines: Vec<Source> = reports.iter().map(|r| r.source).collect();
        let params = json!({
            "keywords": req.keywords,
            "question": req.question,
            "engines": engines,
            "arxiv_category": category,
        });
        let summary = json!({ "total": papers.len(), "engines": reports });
        self.record(RecordType::MultiEngine, params, summary, papers).await
    }

    /// Save to history if configured. Failures are logged and swallowed.
    async fn record(
        &self,
        record_type: RecordType,
        params: serde_json::Value,
        summary: serde_json::Value,
        papers: &[AnnotatedPaper],
    ) -> Option<String> {
        let history = self.history.as_ref()?;
        let responses: Vec<PaperResponse> = papers.iter().cloned().map(PaperResponse::from).collect();
        let papers = match serde_json::to_value(responses) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Could not serialise papers for history");
                return None;
            }
        };
        match history.save(record_type, params, summary, Some(papers)).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(record_type = record_type.as_str(), error = %e, "History save failed");
                None
            }
        }
    }

    /// Newest arXiv submissions in a category, annotated without a question.
    #[instrument(skip(self))]
    pub async fn latest(&self, req: LatestRequest) -> Result<LatestPapers, SearchError> {
        let category = validate_arxiv_category(req.category.trim())?.to_string();
        let arxiv = self
            .arxiv
            .as_ref()
            .ok_or_else(|| SearchError::Upstream(EngineError::network(Source::Arxiv, "arXiv client not configured")))?;

        let limit = req.limit.clamp(1, MAX_LATEST_LIMIT);
        let page = arxiv.latest(&category, req.days, req.offset, limit).await?;
        // More may exist only if the feed filled the page and the date window
        // has not been crossed yet.
        let has_more = page.fetched == limit && page.papers.len() == page.fetched;

        let annotated = self.annotator.annotate_batch(page.papers, "", |_| {}).await;

        let params = json!({
            "category": category,
            "days": req.days,
            "offset": req.offset,
            "limit": limit,
        });
        let summary = json!({ "total": annotated.len(), "has_more": has_more });
        self.record(RecordType::LatestPapers, params, summary, &annotated).await;

        let papers: Vec<PaperResponse> = annotated.into_iter().map(PaperResponse::from).collect();
        info!(category = %category, total = papers.len(), has_more, "Latest papers ready");
        Ok(LatestPapers { total: papers.len(), papers, category, offset: req.offset, has_more })
    }
}
