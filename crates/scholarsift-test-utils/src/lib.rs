//! Shared testing utilities: a scripted language model, in-memory engines
//! and paper fixtures.

pub mod engines;
pub mod fixtures;
pub mod llm;

pub use engines::{FailingEngine, StaticEngine};
pub use fixtures::{annotation_json, paper, papers};
pub use llm::ScriptedLlm;
