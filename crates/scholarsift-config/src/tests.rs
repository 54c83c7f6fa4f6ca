#[cfg(test)]
mod tests {
    use super::super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.search.max_results_per_engine, 50);
        assert_eq!(config.search.max_filtered_results, 20);
        assert_eq!(config.annotation.concurrency, 5);
        assert_eq!(config.history.max_per_type, 100);
        assert_eq!(config.llm.provider, LlmProvider::Gemini);
        assert_eq!(config.search.default_engines, vec!["arxiv".to_string()]);
    }

    #[test]
    fn test_empty_file_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8001");
        assert_eq!(config.engines.semantic_scholar.max_retries, 3);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            [search]
            max_filtered_results = 10
            engine_delay_ms = 0

            [llm]
            provider = "openai_compatible"
            base_url = "http://localhost:1234"
            model = "local-model"

            [engines.semantic_scholar]
            max_retries = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.search.max_filtered_results, 10);
        assert_eq!(config.search.max_results_per_engine, 50);
        assert_eq!(config.search.engine_delay_ms, 0);
        assert_eq!(config.llm.provider, LlmProvider::OpenAiCompatible);
        assert_eq!(config.llm.refine_model, "gemini-2.5-flash");
        assert_eq!(config.engines.semantic_scholar.max_retries, 5);
        assert_eq!(config.engines.semantic_scholar.base_backoff_ms, 1000);
        assert_eq!(config.engines.request_timeout_secs, 30);
    }

    #[test]
    fn test_engine_and_model_timeouts_are_separate() {
        let config = Config::from_toml_str(
            r#"
            [llm]
            request_timeout_secs = 120

            [engines]
            request_timeout_secs = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.llm.request_timeout_secs, 120);
        assert_eq!(config.engines.request_timeout_secs, 10);
        assert_eq!(config.engines.arxiv.base_url, "https://export.arxiv.org");
    }

    #[test]
    fn test_env_overrides_fill_missing_secrets() {
        let env: HashMap<&str, &str> = [
            ("GEMINI_API_KEY", "gem-key"),
            ("NCBI_API_KEY", "ncbi-key"),
            ("SCHOLARSIFT_BIND", "127.0.0.1:9000"),
            ("SEMANTIC_SCHOLAR_API_KEY", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.llm.api_key.as_ref().unwrap().expose_secret(), "gem-key");
        assert_eq!(config.engines.pubmed.api_key.as_ref().unwrap().expose_secret(), "ncbi-key");
        assert!(config.engines.semantic_scholar.api_key.is_none());
    }

    #[test]
    fn test_file_secret_wins_over_env() {
        let mut config = Config::from_toml_str(
            r#"
            [llm]
            api_key = "from-file"
            "#,
        )
        .unwrap();
        config.apply_env_overrides(|k| (k == "GEMINI_API_KEY").then(|| "from-env".to_string()));
        assert_eq!(config.llm.api_key.as_ref().unwrap().expose_secret(), "from-file");
    }

    #[test]
    fn test_from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[search\nmax_filtered_results = ").unwrap();
        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
