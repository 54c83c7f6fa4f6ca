//! scholarsift-web: HTTP surface for scholarsift.
//!   - Multi-engine search, plain or as an SSE progress stream
//!   - Latest arXiv submissions and abstract refinement
//!   - Search history
//!   - Root and health probes

pub mod handlers;
pub mod router;
pub mod sse;
pub mod state;
