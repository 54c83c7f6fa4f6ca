use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use scholarsift_llm::{LlmBackend, LlmRequest, LlmResponse, ModelCallError};

type Responder = dyn Fn(&LlmRequest) -> Result<String, ModelCallError> + Send + Sync;
type Latency = dyn Fn(&LlmRequest) -> Option<Duration> + Send + Sync;

/// Language model whose answers come from a closure.
///
/// Counts calls and records the prompt text of each one so tests can assert
/// on cache hits and prompt contents.
pub struct ScriptedLlm {
    respond: Box<Responder>,
    latency: Box<Latency>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(
        respond: impl Fn(&LlmRequest) -> Result<String, ModelCallError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            respond: Box::new(respond),
            latency: Box::new(|_| None),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Always answers `text`.
    pub fn always(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Every call fails as if the provider were down.
    pub fn failing() -> Self {
        Self::new(|_| Err(ModelCallError::Unavailable("scripted failure".to_string())))
    }

    /// Sleep for the returned duration before answering.
    pub fn with_latency(
        mut self,
        latency: impl Fn(&LlmRequest) -> Option<Duration> + Send + Sync + 'static,
    ) -> Self {
        self.latency = Box::new(latency);
        self
    }

    pub fn into_arc(self) -> Arc<dyn LlmBackend> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl LlmBackend for ScriptedLlm {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, ModelCallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(req.prompt_text());

        if let Some(delay) = (self.latency)(&req) {
            tokio::time::sleep(delay).await;
        }

        let content = (self.respond)(&req)?;
        Ok(LlmResponse {
            content,
            model: req.model.unwrap_or_else(|| "scripted".to_string()),
            prompt_tokens: 0,
            completion_tokens: 0,
        })
    }

    fn model_id(&self) -> &str { "scripted" }
    fn is_local(&self) -> bool { true }
}
