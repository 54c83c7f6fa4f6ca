//! Configuration loading for scholarsift.
//! Reads scholarsift.toml from the current directory or the path in the
//! SCHOLARSIFT_CONFIG env var. Every field has a default, so a missing file
//! is not an error. Secrets may come from the environment (or `.env`).

use std::path::Path;

use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: String, source: std::io::Error },

    #[error("invalid config file {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub search: SearchConfig,
    pub llm: LlmConfig,
    pub annotation: AnnotationConfig,
    pub refine: RefineConfig,
    pub engines: EnginesConfig,
    pub history: HistoryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String { "0.0.0.0:8001".to_string() }

impl Default for ServerConfig {
    fn default() -> Self { Self { bind: default_bind() } }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_max_per_engine")]
    pub max_results_per_engine: usize,
    #[serde(default = "default_max_filtered")]
    pub max_filtered_results: usize,
    /// Pause between two engine calls of the same request.
    #[serde(default = "default_engine_delay_ms")]
    pub engine_delay_ms: u64,
    #[serde(default = "default_engines")]
    pub default_engines: Vec<String>,
    #[serde(default = "default_arxiv_category")]
    pub default_arxiv_category: String,
}

fn default_max_per_engine()  -> usize { 50 }
fn default_max_filtered()    -> usize { 20 }
fn default_engine_delay_ms() -> u64   { 1000 }
fn default_engines()         -> Vec<String> { vec!["arxiv".to_string()] }
fn default_arxiv_category()  -> String { "cs".to_string() }

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_results_per_engine: default_max_per_engine(),
            max_filtered_results: default_max_filtered(),
            engine_delay_ms: default_engine_delay_ms(),
            default_engines: default_engines(),
            default_arxiv_category: default_arxiv_category(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
    Ollama,
}

#[derive(Debug, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: LlmProvider,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_refine_model")]
    pub refine_model: String,
    #[serde(default = "default_refine_temperature")]
    pub refine_temperature: f32,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_provider()           -> LlmProvider { LlmProvider::Gemini }
fn default_model()              -> String { "gemini-2.0-flash".to_string() }
fn default_refine_model()       -> String { "gemini-2.5-flash".to_string() }
fn default_refine_temperature() -> f32    { 0.3 }
fn default_request_timeout()    -> u64    { 60 }

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: 0.0,
            refine_model: default_refine_model(),
            refine_temperature: default_refine_temperature(),
            api_key: None,
            base_url: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnnotationConfig {
    /// Maximum number of in-flight model calls per batch.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,
    #[serde(default = "default_target_language")]
    pub target_language: String,
}

fn default_concurrency()     -> usize  { 5 }
fn default_task_timeout()    -> u64    { 90 }
fn default_target_language() -> String { "Simplified Chinese".to_string() }

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            task_timeout_secs: default_task_timeout(),
            target_language: default_target_language(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefineConfig {
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_cache_capacity() -> usize { 1024 }

impl Default for RefineConfig {
    fn default() -> Self { Self { cache_capacity: default_cache_capacity() } }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EnginesConfig {
    /// HTTP timeout for engine requests. Model calls use `llm.request_timeout_secs`.
    pub request_timeout_secs: u64,
    pub arxiv: ArxivConfig,
    pub semantic_scholar: SemanticScholarConfig,
    pub pubmed: PubMedConfig,
}

fn default_engine_timeout() -> u64 { 30 }

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_engine_timeout(),
            arxiv: ArxivConfig::default(),
            semantic_scholar: SemanticScholarConfig::default(),
            pubmed: PubMedConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArxivConfig {
    #[serde(default = "default_arxiv_base")]
    pub base_url: String,
}

fn default_arxiv_base() -> String { "https://export.arxiv.org".to_string() }

impl Default for ArxivConfig {
    fn default() -> Self { Self { base_url: default_arxiv_base() } }
}

#[derive(Debug, Deserialize)]
pub struct SemanticScholarConfig {
    #[serde(default = "default_s2_base")]
    pub base_url: String,
    pub api_key: Option<SecretString>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

fn default_s2_base()         -> String { "https://api.semanticscholar.org".to_string() }
fn default_max_retries()     -> u32    { 3 }
fn default_base_backoff_ms() -> u64    { 1000 }

impl Default for SemanticScholarConfig {
    fn default() -> Self {
        Self {
            base_url: default_s2_base(),
            api_key: None,
            max_retries: default_max_retries(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PubMedConfig {
    #[serde(default = "default_pubmed_base")]
    pub base_url: String,
    pub api_key: Option<SecretString>,
    #[serde(default = "default_pubmed_email")]
    pub email: String,
}

fn default_pubmed_base()  -> String { "https://eutils.ncbi.nlm.nih.gov".to_string() }
fn default_pubmed_email() -> String { "pubmed@example.com".to_string() }

impl Default for PubMedConfig {
    fn default() -> Self {
        Self {
            base_url: default_pubmed_base(),
            api_key: None,
            email: default_pubmed_email(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_history_dir")]
    pub dir: String,
    #[serde(default = "default_max_per_type")]
    pub max_per_type: usize,
    #[serde(default = "default_list_limit")]
    pub default_list_limit: usize,
}

fn default_history_dir()  -> String { "history".to_string() }
fn default_max_per_type() -> usize  { 100 }
fn default_list_limit()   -> usize  { 50 }

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            dir: default_history_dir(),
            max_per_type: default_max_per_type(),
            default_list_limit: default_list_limit(),
        }
    }
}

mod tests;

impl Config {
    /// Load configuration from scholarsift.toml, then apply environment
    /// overrides. Checks SCHOLARSIFT_CONFIG first, then the current directory.
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env is normal.
        let _ = dotenvy::dotenv();

        let path = std::env::var("SCHOLARSIFT_CONFIG")
            .unwrap_or_else(|_| "scholarsift.toml".to_string());

        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            tracing::warn!(path = %path, "config file not found, using defaults");
            Self::default()
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: display.clone(), source })?;
        Self::from_toml_str(&content)
            .map_err(|source| ConfigError::Parse { path: display, source })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Fill secrets and the bind address from the environment. File values
    /// win for secrets; the bind override always wins.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(bind) = non_empty("SCHOLARSIFT_BIND") {
            self.server.bind = bind;
        }

        if self.llm.api_key.is_none() {
            let key_var = match self.llm.provider {
                LlmProvider::Gemini => Some("GEMINI_API_KEY"),
                LlmProvider::OpenAi | LlmProvider::OpenAiCompatible => Some("OPENAI_API_KEY"),
                LlmProvider::Ollama => None,
            };
            if let Some(key) = key_var.and_then(non_empty) {
                self.llm.api_key = Some(SecretString::from(key));
            }
        }

        if self.engines.pubmed.api_key.is_none() {
            if let Some(key) = non_empty("NCBI_API_KEY") {
                self.engines.pubmed.api_key = Some(SecretString::from(key));
            }
        }

        if self.engines.semantic_scholar.api_key.is_none() {
            if let Some(key) = non_empty("SEMANTIC_SCHOLAR_API_KEY") {
                self.engines.semantic_scholar.api_key = Some(SecretString::from(key));
            }
        }
    }
}
