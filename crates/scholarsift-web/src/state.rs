//! Shared application state for the web server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use scholarsift_common::{SandboxClient, Source};
use scholarsift_config::{Config, LlmProvider};
use scholarsift_db::HistoryStore;
use scholarsift_ingestion::{
    ArxivClient, PipelineSettings, PubMedClient, SearchPipeline, SemanticScholarClient,
};
use scholarsift_llm::{build_backend, BackendConfig, BackendKind, LlmBackend};
use scholarsift_ranker::{
    AnnotationSettings, Annotator, LruRefineCache, RefineSettings, Refiner, RelevanceFilter,
};
use secrecy::ExposeSecret;
use tracing::{info, warn};

/// Shared state injected into every Axum handler.
pub struct AppState {
    pub pipeline: SearchPipeline,
    pub refiner: Refiner,
    pub history: Arc<HistoryStore>,
    /// Records returned by a history listing that names no limit.
    pub default_list_limit: usize,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(pipeline: SearchPipeline, refiner: Refiner, history: Arc<HistoryStore>) -> Self {
        Self { pipeline, refiner, history, default_list_limit: 50 }
    }

    /// Wire engines, model backends, cache and history from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let http = sandbox_client(config)?;

        let annotate_llm = llm_backend(config, &config.llm.model)?;
        let refine_llm = llm_backend(config, &config.llm.refine_model)?;

        let filter = RelevanceFilter::new(annotate_llm.clone(), config.search.max_filtered_results)
            .with_model(config.llm.model.clone(), config.llm.temperature);
        let annotator = Arc::new(Annotator::new(
            annotate_llm,
            AnnotationSettings {
                concurrency: config.annotation.concurrency,
                task_timeout: Duration::from_secs(config.annotation.task_timeout_secs),
                target_language: config.annotation.target_language.clone(),
                model: Some(config.llm.model.clone()),
                temperature: config.llm.temperature,
            },
        ));

        let default_engines = config
            .search
            .default_engines
            .iter()
            .filter_map(|name| {
                let source = Source::parse(name);
                if source.is_none() {
                    warn!(engine = %name, "Unknown default engine in config, ignoring");
                }
                source
            })
            .collect();
        let settings = PipelineSettings {
            max_results_per_engine: config.search.max_results_per_engine,
            engine_delay: Duration::from_millis(config.search.engine_delay_ms),
            default_engines,
            default_arxiv_category: config.search.default_arxiv_category.clone(),
        };

        let engines = &config.engines;
        let arxiv = ArxivClient::new(http.clone(), &engines.arxiv.base_url)
            .with_default_category(&config.search.default_arxiv_category);
        let s2 = SemanticScholarClient::new(
            http.clone(),
            &engines.semantic_scholar.base_url,
            engines.semantic_scholar.api_key.as_ref().map(|k| k.expose_secret().to_string()),
        )
        .with_retry_policy(
            engines.semantic_scholar.max_retries,
            Duration::from_millis(engines.semantic_scholar.base_backoff_ms),
        );
        let pubmed = PubMedClient::new(
            http,
            &engines.pubmed.base_url,
            engines.pubmed.api_key.as_ref().map(|k| k.expose_secret().to_string()),
            &engines.pubmed.email,
        );

        let history = Arc::new(HistoryStore::new(&config.history.dir, config.history.max_per_type));

        let pipeline = SearchPipeline::new(filter, annotator, settings)
            .with_arxiv(Arc::new(arxiv))
            .with_engine(Arc::new(s2))
            .with_engine(Arc::new(pubmed))
            .with_history(history.clone());

        let refiner = Refiner::new(
            refine_llm,
            Arc::new(LruRefineCache::new(config.refine.cache_capacity)),
            RefineSettings {
                model: Some(config.llm.refine_model.clone()),
                temperature: config.llm.refine_temperature,
                target_language: config.annotation.target_language.clone(),
            },
        );

        info!(
            provider = ?config.llm.provider,
            model = %config.llm.model,
            history = %config.history.dir,
            "Application state ready"
        );

        let mut state = Self::new(pipeline, refiner, history);
        state.default_list_limit = config.history.default_list_limit;
        Ok(state)
    }
}

/// The engines' HTTP client, bounded by `engines.request_timeout_secs`.
/// Hosts of configured base URLs join the allowlist.
fn sandbox_client(config: &Config) -> anyhow::Result<SandboxClient> {
    let mut http = SandboxClient::with_timeout(Duration::from_secs(config.engines.request_timeout_secs))
        .context("building HTTP client")?;
    http.allow_base_url(&config.engines.arxiv.base_url);
    http.allow_base_url(&config.engines.semantic_scholar.base_url);
    http.allow_base_url(&config.engines.pubmed.base_url);
    Ok(http)
}

fn llm_backend(config: &Config, model: &str) -> anyhow::Result<Arc<dyn LlmBackend>> {
    let kind = match config.llm.provider {
        LlmProvider::Gemini => BackendKind::Gemini,
        LlmProvider::OpenAi => BackendKind::OpenAi,
        LlmProvider::OpenAiCompatible => BackendKind::OpenAiCompatible,
        LlmProvider::Ollama => BackendKind::Ollama,
    };
    let mut cfg = BackendConfig::new(kind, model);
    cfg.api_key = config.llm.api_key.as_ref().map(|k| k.expose_secret().to_string());
    cfg.base_url = config.llm.base_url.clone();
    cfg.timeout = Duration::from_secs(config.llm.request_timeout_secs);
    build_backend(&cfg).with_context(|| format!("configuring {kind:?} model backend"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hosted_provider_without_key_fails() {
        let config = Config::default();
        let err = AppState::from_config(&config).err().expect("missing key should fail");
        assert!(format!("{err:#}").contains("API key"));
    }

    #[test]
    fn test_local_provider_builds_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.llm.provider = LlmProvider::Ollama;
        config.history.dir = dir.path().display().to_string();
        config.history.default_list_limit = 7;
        config.search.default_engines = vec!["pubmed".into(), "nonsense".into()];

        let state = AppState::from_config(&config).unwrap();
        assert_eq!(state.default_list_limit, 7);
        assert_eq!(state.pipeline.settings().default_engines, vec![Source::Pubmed]);
        assert_eq!(state.pipeline.resolve_engines(&[]), vec![Source::Pubmed]);
    }
}
