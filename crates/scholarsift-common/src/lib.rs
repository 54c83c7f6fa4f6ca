//! scholarsift-common: Shared types, errors, and the outbound HTTP client
//! used across all scholarsift crates.

pub mod categories;
pub mod error;
pub mod models;
pub mod sandbox;

pub use categories::{is_valid_arxiv_category, validate_arxiv_category, ARXIV_CATEGORIES};
pub use error::{ApiError, EngineError, InvalidCategoryError};
pub use models::{AnnotatedPaper, Annotation, PaperRecord, PaperResponse, Source};
pub use sandbox::{SandboxClient, SandboxError};
