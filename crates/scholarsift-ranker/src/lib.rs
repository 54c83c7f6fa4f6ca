//! scholarsift-ranker: Relevance filtering and per-paper annotation.
//!
//! - `filter` one model call picks the relevant candidates, with
//!                backfill and first-N fallbacks.
//! - `annotate` translation, keywords and relevance summary per paper.
//! - `refine` cached plain-language rewrite of an abstract.
//! - `parallel` the bounded, order-preserving map both batch paths share.

pub mod annotate;
pub mod cache;
pub mod filter;
pub mod parallel;
pub mod refine;

pub use annotate::{AnnotationSettings, Annotator};
pub use cache::{LruRefineCache, RefineCache};
pub use filter::RelevanceFilter;
pub use parallel::{OrderedPool, Progress};
pub use refine::{RefineSettings, Refiner, EMPTY_ABSTRACT_PLACEHOLDER};
