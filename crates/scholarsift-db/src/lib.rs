//! scholarsift-db: search history persistence.
//!
//! History is kept as one JSON array per record type inside a directory,
//! newest record first, capped at a configured number of records per type.
//! Persistence is best-effort: callers log a `HistoryError` and carry on.
//!
//! ```rust,no_run
//! use scholarsift_db::{HistoryStore, RecordType};
//!
//! # async fn demo() -> Result<(), scholarsift_db::HistoryError> {
//! let store = HistoryStore::new("./history", 100);
//! let id = store
//!     .save(RecordType::MultiEngine, serde_json::json!({"keywords": "llm"}), serde_json::json!({"total": 0}), None)
//!     .await?;
//! let record = store.get(&id).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod history;

pub use error::{HistoryError, Result};
pub use history::{HistoryRecord, HistoryStore, RecordType};
