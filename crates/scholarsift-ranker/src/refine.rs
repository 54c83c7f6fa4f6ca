//! Plain-language abstract refinement, cached per paper version.

use std::sync::Arc;

use scholarsift_llm::{structured, LlmBackend, LlmRequest, PromptTemplate};
use tracing::{info, instrument, warn};

use crate::cache::{refine_key, RefineCache};

pub const EMPTY_ABSTRACT_PLACEHOLDER: &str = "(empty abstract)";

const REFINE_PROMPT: &str = "You are a science communicator who turns dense academic abstracts into short, \
plain language.\n\n\
Rewrite the abstract below so that:\n\
1. it is much shorter, keeping only the core content and dropping all repetition;\n\
2. it uses everyday words, briefly explaining any technical term that must stay;\n\
3. it states what problem the paper studies, the method used and the result.\n\n\
Paper title: {title}\n\n\
Original abstract:\n{abstract}\n\n\
Write the result in {language}, translating if needed. Return only the rewritten abstract, \
with no other text or formatting.";

#[derive(Debug, Clone)]
pub struct RefineSettings {
    pub model: Option<String>,
    pub temperature: f32,
    pub target_language: String,
}

impl Default for RefineSettings {
    fn default() -> Self {
        Self {
            model: None,
            temperature: 0.3,
            target_language: "Simplified Chinese".to_string(),
        }
    }
}

pub struct Refiner {
    llm: Arc<dyn LlmBackend>,
    cache: Arc<dyn RefineCache>,
    settings: RefineSettings,
}

impl Refiner {
    pub fn new(llm: Arc<dyn LlmBackend>, cache: Arc<dyn RefineCache>, settings: RefineSettings) -> Self {
        Self { llm, cache, settings }
    }

    /// Refine `abstract_text`. Never fails: a failed model call returns the
    /// original abstract and is not cached, so a later call can retry.
    #[instrument(skip(self, abstract_text, title))]
    pub async fn refine(&self, id: &str, abstract_text: &str, title: &str) -> String {
        if abstract_text.trim().is_empty() {
            return EMPTY_ABSTRACT_PLACEHOLDER.to_string();
        }

        let key = refine_key(id, abstract_text);
        if let Some(hit) = self.cache.get(&key) {
            info!("Using cached refinement");
            return hit;
        }

        let prompt = PromptTemplate::new(REFINE_PROMPT).render(&[
            ("title", title),
            ("abstract", abstract_text),
            ("language", &self.settings.target_language),
        ]);
        let req = LlmRequest::user(prompt)
            .with_model(self.settings.model.clone())
            .with_temperature(self.settings.temperature);

        let refined = match self.llm.complete(req).await {
            Ok(resp) => structured::strip_code_fences(&resp.content).replace("```", "").trim().to_string(),
            Err(e) => {
                warn!(error = %e, "Refinement failed, returning original abstract");
                return abstract_text.to_string();
            }
        };

        let refined = if refined.is_empty() {
            warn!("Refinement came back empty, using original abstract");
            abstract_text.to_string()
        } else {
            refined
        };

        self.cache.put(&key, refined.clone());
        info!("Abstract refined");
        refined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LruRefineCache;
    use scholarsift_test_utils::ScriptedLlm;

    fn refiner(llm: Arc<ScriptedLlm>) -> Refiner {
        Refiner::new(llm, Arc::new(LruRefineCache::new(16)), RefineSettings::default())
    }

    #[tokio::test]
    async fn test_second_call_is_a_cache_hit() {
        let llm = Arc::new(ScriptedLlm::always("Short version."));
        let r = refiner(llm.clone());
        let first = r.refine("2401.00001", "Long abstract.", "Title").await;
        let second = r.refine("2401.00001", "Long abstract.", "Title").await;
        assert_eq!(first, "Short version.");
        assert_eq!(first, second);
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_changed_abstract_misses_cache() {
        let llm = Arc::new(ScriptedLlm::always("Short."));
        let r = refiner(llm.clone());
        r.refine("2401.00001", "v1", "").await;
        r.refine("2401.00001", "v2", "").await;
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_abstract_skips_model() {
        let llm = Arc::new(ScriptedLlm::always("unused"));
        let out = refiner(llm.clone()).refine("x", "   ", "T").await;
        assert_eq!(out, EMPTY_ABSTRACT_PLACEHOLDER);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_failure_returns_original_and_is_not_cached() {
        let llm = Arc::new(ScriptedLlm::failing());
        let r = refiner(llm.clone());
        assert_eq!(r.refine("id", "Original.", "").await, "Original.");
        assert_eq!(r.refine("id", "Original.", "").await, "Original.");
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_answer_falls_back_and_is_cached() {
        let llm = Arc::new(ScriptedLlm::always("```\n```"));
        let r = refiner(llm.clone());
        assert_eq!(r.refine("id", "Original.", "").await, "Original.");
        assert_eq!(r.refine("id", "Original.", "").await, "Original.");
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn test_uses_refine_model_and_strips_fences() {
        let llm = Arc::new(ScriptedLlm::new(|req| Ok(format!("```text\nmodel={}\n```", req.model.clone().unwrap_or_default()))));
        let settings = RefineSettings { model: Some("gemini-2.5-flash".into()), ..Default::default() };
        let r = Refiner::new(llm, Arc::new(LruRefineCache::new(4)), settings);
        assert_eq!(r.refine("id", "abc {x}", "").await, "model=gemini-2.5-flash");
    }
}
