//! scholarsift-ingestion: Paper search across engines.
//!
//! Engine adapters (arXiv, Semantic Scholar, PubMed) normalise each API into
//! `PaperRecord`s behind the `PaperEngine` trait. `SearchPipeline` runs the
//! requested engines in sequence, then hands the merged candidates to the
//! relevance filter and the annotator, and records the outcome in history.

pub mod pipeline;
pub mod sources;

pub use pipeline::{
    EngineReport, LatestPapers, LatestRequest, PipelineEvent, PipelineSettings, SearchError,
    SearchOutcome, SearchPipeline, SearchRequest,
};
pub use sources::{
    arxiv::ArxivClient, pubmed::PubMedClient, semantic_scholar::SemanticScholarClient, PaperEngine,
};
