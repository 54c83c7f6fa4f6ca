//! LLM backend trait and concrete implementations.
//!
//! Backends:
//!   GeminiBackend            Google Gemini API (gemini-2.0-flash, 2.5-flash, …)
//!   OpenAiCompatibleBackend  OpenAI and any OpenAI-compatible endpoint
//!                            (Ollama, LMStudio, vLLM, OpenRouter, …)

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_API_BASE: &str = "https://api.openai.com";
const OLLAMA_API_BASE: &str = "http://localhost:11434";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// ── Error ─────────────────────────────────────────────────────────────────────

/// A model call failed or produced output that could not be used.
/// Always recovered by the caller; never surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum ModelCallError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Rate limit exceeded")]
    RateLimitExceeded,
    #[error("API error [{status}]: {message}")]
    ApiError { status: u16, message: String },
    #[error("Model returned an empty response")]
    EmptyResponse,
    #[error("Model output could not be parsed: {0}")]
    Unparseable(String),
}

// ── Request / Response ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,   // "system" | "user" | "assistant"
    pub content: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Ask the backend for a JSON object instead of free text.
    #[serde(default)]
    pub json_mode: bool,
}

impl LlmRequest {
    pub fn user(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message { role: "user".to_string(), content: prompt.into() }],
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.messages.insert(0, Message { role: "system".to_string(), content: system.into() });
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    /// Concatenated user-visible prompt text, mainly for logging and tests.
    pub fn prompt_text(&self) -> String {
        self.messages.iter().map(|m| m.content.as_str()).collect::<Vec<_>>().join("\n")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub content: String,
    pub model: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait LlmBackend: Send + Sync {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, ModelCallError>;
    fn model_id(&self) -> &str;
    fn is_local(&self) -> bool;
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn parse_openai_response(json: &serde_json::Value, fallback_model: &str) -> LlmResponse {
    LlmResponse {
        content: json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string(),
        model: json["model"]
            .as_str()
            .unwrap_or(fallback_model)
            .to_string(),
        prompt_tokens:     json["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
        completion_tokens: json["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
    }
}

async fn check_response_status(resp: reqwest::Response) -> Result<serde_json::Value, ModelCallError> {
    let status = resp.status().as_u16();
    if status == 429 {
        return Err(ModelCallError::RateLimitExceeded);
    }
    let text = resp.text().await?;
    if status >= 400 {
        let body: serde_json::Value = serde_json::from_str(&text).unwrap_or_default();
        let msg = body["error"]["message"]
            .as_str()
            .or_else(|| body["message"].as_str())
            .map(String::from)
            .unwrap_or_else(|| text.chars().take(200).collect());
        return Err(ModelCallError::ApiError { status, message: msg });
    }
    Ok(serde_json::from_str(&text)?)
}

fn build_http_client(timeout: Duration) -> Result<reqwest::Client, ModelCallError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

// ── 1. Google Gemini ──────────────────────────────────────────────────────────

pub struct GeminiBackend {
    pub model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiBackend {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ModelCallError> {
        Ok(Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
            client: build_http_client(DEFAULT_TIMEOUT)?,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ModelCallError> {
        self.client = build_http_client(timeout)?;
        Ok(self)
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, ModelCallError> {
        let model = req.model.as_deref().unwrap_or(&self.model);
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        );

        // System message → systemInstruction
        let system_text = req.messages.iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.clone());

        let contents: Vec<serde_json::Value> = req.messages.iter()
            .filter(|m| m.role != "system")
            .map(|m| {
                let role = if m.role == "assistant" { "model" } else { "user" };
                serde_json::json!({
                    "role": role,
                    "parts": [{ "text": m.content }]
                })
            })
            .collect();

        let mut generation_config = serde_json::json!({
            "maxOutputTokens": req.max_tokens.unwrap_or(8192),
            "temperature":     req.temperature.unwrap_or(0.0),
        });
        if req.json_mode {
            generation_config["responseMimeType"] = serde_json::Value::String("application/json".to_string());
        }

        let mut body = serde_json::json!({
            "contents": contents,
            "generationConfig": generation_config,
        });
        if let Some(sys) = system_text {
            body["systemInstruction"] = serde_json::json!({
                "parts": [{ "text": sys }]
            });
        }

        let resp = self.client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let json = check_response_status(resp).await?;

        let content = json["candidates"][0]["content"]["parts"]
            .as_array()
            .map(|parts| {
                parts.iter()
                    .filter_map(|p| p["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        Ok(LlmResponse {
            content,
            model: model.to_string(),
            prompt_tokens:     json["usageMetadata"]["promptTokenCount"].as_u64().unwrap_or(0) as u32,
            completion_tokens: json["usageMetadata"]["candidatesTokenCount"].as_u64().unwrap_or(0) as u32,
        })
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { false }
}

// ── 2. OpenAI-Compatible (OpenAI, Ollama, LMStudio, vLLM, OpenRouter, …) ─────

pub struct OpenAiCompatibleBackend {
    pub base_url: String,
    pub model: String,
    api_key: Option<String>,
    local: bool,
    client: reqwest::Client,
}

impl OpenAiCompatibleBackend {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ModelCallError> {
        Ok(Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            local: false,
            client: build_http_client(DEFAULT_TIMEOUT)?,
        })
    }

    /// The hosted OpenAI API.
    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ModelCallError> {
        Self::new(OPENAI_API_BASE, model, Some(api_key.into()))
    }

    /// A local Ollama server through its OpenAI-compatible endpoint.
    pub fn ollama(base_url: Option<String>, model: impl Into<String>) -> Result<Self, ModelCallError> {
        let mut b = Self::new(base_url.unwrap_or_else(|| OLLAMA_API_BASE.to_string()), model, None)?;
        b.local = true;
        Ok(b)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ModelCallError> {
        self.client = build_http_client(timeout)?;
        Ok(self)
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(k) => req.bearer_auth(k),
            None    => req,
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatibleBackend {
    async fn complete(&self, req: LlmRequest) -> Result<LlmResponse, ModelCallError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let mut body = serde_json::json!({
            "model":       req.model.as_deref().unwrap_or(&self.model),
            "messages":    req.messages,
            "max_tokens":  req.max_tokens.unwrap_or(4096),
            "temperature": req.temperature.unwrap_or(0.0),
        });
        if req.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        let resp = self.auth(self.client.post(&url)).json(&body).send().await?;
        let json = check_response_status(resp).await?;
        Ok(parse_openai_response(&json, &self.model))
    }

    fn model_id(&self) -> &str { &self.model }
    fn is_local(&self) -> bool { self.local }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_request_builder_puts_system_first() {
        let req = LlmRequest::user("question").with_system("be brief").json();
        assert_eq!(req.messages[0].role, "system");
        assert_eq!(req.messages[1].content, "question");
        assert!(req.json_mode);
    }

    #[test]
    fn test_ollama_is_local() {
        let b = OpenAiCompatibleBackend::ollama(None, "llama3:8b").unwrap();
        assert!(b.is_local());
        assert_eq!(b.base_url, "http://localhost:11434");
    }

    #[test]
    fn test_gemini_backend_is_not_local() {
        let b = GeminiBackend::new("AIza-test", "gemini-2.0-flash").unwrap();
        assert!(!b.is_local());
        assert_eq!(b.model_id(), "gemini-2.0-flash");
    }

    #[tokio::test]
    async fn test_gemini_complete_joins_parts_and_sets_json_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/gemini-2.0-flash:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "generationConfig": { "responseMimeType": "application/json" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "{\"a\":" }, { "text": "1}" }], "role": "model" }
                }],
                "usageMetadata": { "promptTokenCount": 12, "candidatesTokenCount": 3 }
            })))
            .mount(&server)
            .await;

        let b = GeminiBackend::new("test-key", "gemini-2.0-flash")
            .unwrap()
            .with_base_url(server.uri());
        let resp = b.complete(LlmRequest::user("hi").json()).await.unwrap();
        assert_eq!(resp.content, "{\"a\":1}");
        assert_eq!(resp.prompt_tokens, 12);
        assert_eq!(resp.completion_tokens, 3);
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let b = OpenAiCompatibleBackend::new(server.uri(), "m", None).unwrap();
        let err = b.complete(LlmRequest::user("hi")).await.unwrap_err();
        assert!(matches!(err, ModelCallError::RateLimitExceeded));
    }

    #[tokio::test]
    async fn test_api_error_keeps_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": { "message": "bad model" }
            })))
            .mount(&server)
            .await;

        let b = OpenAiCompatibleBackend::new(server.uri(), "m", Some("k".into())).unwrap();
        match b.complete(LlmRequest::user("hi")).await {
            Err(ModelCallError::ApiError { status: 400, message }) => assert_eq!(message, "bad model"),
            other => panic!("expected ApiError(400), got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_openai_compatible_parses_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({ "response_format": { "type": "json_object" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "served-model",
                "choices": [{ "message": { "role": "assistant", "content": "ok" } }],
                "usage": { "prompt_tokens": 5, "completion_tokens": 1 }
            })))
            .mount(&server)
            .await;

        let b = OpenAiCompatibleBackend::new(server.uri(), "m", None).unwrap();
        let resp = b.complete(LlmRequest::user("hi").json()).await.unwrap();
        assert_eq!(resp.content, "ok");
        assert_eq!(resp.model, "served-model");
    }
}
