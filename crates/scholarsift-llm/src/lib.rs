//! scholarsift-llm: Language-model backend abstraction.
//!
//! Provides the `LlmBackend` trait, concrete HTTP backends, a factory that
//! builds a backend from settings, prompt templating with brace escaping and
//! defensive parsing of structured model output.

pub mod backend;
pub mod prompt;
pub mod router;
pub mod structured;

pub use backend::{LlmBackend, LlmRequest, LlmResponse, Message, ModelCallError};
pub use prompt::{escape_braces, PromptTemplate};
pub use router::{build_backend, BackendConfig, BackendKind};
