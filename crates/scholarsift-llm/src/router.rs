//! Backend selection: builds the configured backend and wraps it so every
//! call is logged with the model it went to.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::backend::{
    GeminiBackend, LlmBackend, LlmRequest, LlmResponse, ModelCallError, OpenAiCompatibleBackend,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Gemini,
    OpenAi,
    OpenAiCompatible,
    Ollama,
}

/// Everything needed to construct one backend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

impl BackendConfig {
    pub fn new(kind: BackendKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
            api_key: None,
            base_url: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Construct the backend described by `cfg`.
///
/// Hosted providers need an API key; a missing key is reported as
/// `Unavailable` so the caller can decide whether to start without a model.
pub fn build_backend(cfg: &BackendConfig) -> Result<Arc<dyn LlmBackend>, ModelCallError> {
    let require_key = || {
        cfg.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ModelCallError::Unavailable(format!("{:?} backend needs an API key", cfg.kind)))
    };

    let backend: Arc<dyn LlmBackend> = match cfg.kind {
        BackendKind::Gemini => {
            let mut b = GeminiBackend::new(require_key()?, &cfg.model)?.with_timeout(cfg.timeout)?;
            if let Some(url) = &cfg.base_url {
                b = b.with_base_url(url);
            }
            Arc::new(b)
        }
        BackendKind::OpenAi => {
            let b = match &cfg.base_url {
                Some(url) => OpenAiCompatibleBackend::new(url, &cfg.model, Some(require_key()?))?,
                None => OpenAiCompatibleBackend::openai(require_key()?, &cfg.model)?,
            };
            Arc::new(b.with_timeout(cfg.timeout)?)
        }
        BackendKind::OpenAiCompatible => {
            let url = cfg.base_url.clone().ok_or_else(|| {
                ModelCallError::Unavailable("openai_compatible backend needs a base_url".to_string())
            })?;
            let b = OpenAiCompatibleBackend::new(url, &cfg.model, cfg.api_key.clone())?;
            Arc::new(b.with_timeout(cfg.timeout)?)
        }
        BackendKind::Ollama => {
            let b = OpenAiCompatibleBackend::ollama(cfg.base_url.clone(), &cfg.model)?;
            Arc::new(b.with_timeout(cfg.timeout)?)
        }
    };

    tracing::info!(
        kind = ?cfg.kind,
        model = backend.model_id(),
        is_local = backend.is_local(),
        "LLM backend ready"
    );
    Ok(Arc::new(TracedBackend { inner: backend }))
}

/// Logs every request with its model and outcome.
struct TracedBackend {
    inner: Arc<dyn LlmBackend>,
}

#[async_trait]
impl LlmBackend for TracedBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, ModelCallError> {
        let model = req.model.clone().unwrap_or_else(|| self.inner.model_id().to_string());
        tracing::debug!(model = %model, json_mode = req.json_mode, "LLM request routed");
        let result = self.inner.complete(req).await;
        match &result {
            Ok(resp) => tracing::debug!(
                model = %resp.model,
                prompt_tokens = resp.prompt_tokens,
                completion_tokens = resp.completion_tokens,
                "LLM request completed"
            ),
            Err(e) => tracing::warn!(model = %model, error = %e, "LLM request failed"),
        }
        result
    }

    fn model_id(&self) -> &str { self.inner.model_id() }
    fn is_local(&self) -> bool { self.inner.is_local() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gemini_requires_key() {
        let cfg = BackendConfig::new(BackendKind::Gemini, "gemini-2.0-flash");
        assert!(matches!(build_backend(&cfg), Err(ModelCallError::Unavailable(_))));
    }

    #[test]
    fn test_blank_key_is_rejected() {
        let mut cfg = BackendConfig::new(BackendKind::OpenAi, "gpt-4o-mini");
        cfg.api_key = Some("   ".to_string());
        assert!(build_backend(&cfg).is_err());
    }

    #[test]
    fn test_compatible_requires_base_url() {
        let cfg = BackendConfig::new(BackendKind::OpenAiCompatible, "local");
        assert!(matches!(build_backend(&cfg), Err(ModelCallError::Unavailable(_))));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let cfg = BackendConfig::new(BackendKind::Ollama, "llama3:8b");
        let backend = build_backend(&cfg).unwrap();
        assert!(backend.is_local());
        assert_eq!(backend.model_id(), "llama3:8b");
    }
}
