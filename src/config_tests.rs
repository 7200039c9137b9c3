//! Unit tests for configuration module
//!
//! These tests validate configuration parsing, defaults, and env overrides.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;

    use crate::config::*;

    // ====== Default Value Tests ======

    #[test]
    fn test_defaults_match_deployment() {
        let config = AppConfig::default();
        assert_eq!(config.server.addr, "0.0.0.0:8080");
        assert_eq!(config.server.max_body_bytes, 65536);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.retrieval.max_sources, 2);
        assert!((config.retrieval.min_score - 0.25).abs() < f32::EPSILON);
        assert_eq!(config.rate_limit.requests, 30);
        assert_eq!(config.rate_limit_window(), Duration::from_secs(60));
        assert_eq!(config.embeddings.cache_max_entries, 256);
        assert_eq!(config.auth_leeway(), Duration::from_secs(10));
        assert_eq!(config.chat_log.buffer, 1000);
        assert_eq!(config.chat_log.batch_size, 100);
        assert_eq!(config.chat_log.flush_every_ms, 500);
        assert_eq!(config.llm.llm_model, "gpt-4o-mini");
        assert_eq!(config.llm_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_fallback_answer_uses_site_name() {
        let config = AppConfig::default();
        assert_eq!(
            config.fallback_answer(),
            "I don't know based on AlicanteAbout content."
        );
    }

    // ====== Parsing Tests ======

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml = r#"
            [retrieval]
            top_k = 5

            [llm]
            llm_model = "gpt-4o"
        "#;
        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.max_sources, 2);
        assert_eq!(config.llm.llm_model, "gpt-4o");
        assert!((config.llm.temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.embeddings.provider, "openai");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\naddr = \"127.0.0.1:9000\"\n\n[rate_limit]\nrequests = 5\nwindow_secs = 10"
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.server.addr, "127.0.0.1:9000");
        assert_eq!(config.rate_limit.requests, 5);
        assert_eq!(config.rate_limit_window(), Duration::from_secs(10));
    }

    #[test]
    fn test_from_file_rejects_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\naddr = ").unwrap();
        let err = AppConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(err, crate::RagChatError::TomlParsing(_)));
    }

    // ====== Env Override Tests ======

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("CHAT_JWT_SECRET", "s3cret"),
            ("CHAT_DB_DSN", "postgres://localhost/chat"),
            ("CORS_ALLOWED_ORIGIN", "https://example.org"),
            ("CHAT_LOG_DISABLE", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.embeddings.api_key, "sk-test");
        assert_eq!(config.llm.llm_key, "sk-test");
        assert_eq!(config.auth.jwt_secret, "s3cret");
        assert_eq!(config.database.url, "postgres://localhost/chat");
        assert_eq!(config.server.cors_allowed_origin, "https://example.org");
        assert!(!config.chat_log.enabled);
        assert!(!config.chat_log_persistence_enabled());
    }

    #[test]
    fn test_env_api_key_does_not_replace_file_value() {
        let mut config = AppConfig::default();
        config.llm.llm_key = "from-file".to_string();
        config.apply_overrides(|key| (key == "OPENAI_API_KEY").then(|| "from-env".to_string()));
        assert_eq!(config.llm.llm_key, "from-file");
        assert_eq!(config.embeddings.api_key, "from-env");
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = AppConfig::default();
        config.apply_overrides(|_| Some("   ".to_string()));
        assert!(config.auth.jwt_secret.is_empty());
        assert_eq!(config.auth.issuer, "alicanteabout.com");
    }

    #[test]
    fn test_env_tuning_overrides() {
        let env: HashMap<&str, &str> = [
            ("RATE_LIMIT", "5"),
            ("RATE_WINDOW", "2m"),
            ("TOP_K", "6"),
            ("MAX_SOURCES", "4"),
            ("MIN_SCORE", "0.4"),
            ("EMBED_MODEL", "text-embedding-3-large"),
            ("CHAT_MODEL", "gpt-4o"),
            ("TIMEOUT", "45s"),
            ("EMBED_CACHE_MAX", "64"),
            ("CHAT_JWT_LEEWAY", "5"),
            ("CHAT_LOG_BUFFER", "50"),
            ("CHAT_LOG_BATCH_SIZE", "10"),
            ("CHAT_LOG_FLUSH_EVERY", "250ms"),
            ("CHAT_LOG_REPORT_EVERY", "1m30s"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.rate_limit.requests, 5);
        assert_eq!(config.rate_limit_window(), Duration::from_secs(120));
        assert_eq!(config.retrieval.top_k, 6);
        assert_eq!(config.retrieval.max_sources, 4);
        assert!((config.retrieval.min_score - 0.4).abs() < f32::EPSILON);
        assert_eq!(config.embeddings.model, "text-embedding-3-large");
        assert_eq!(config.llm.llm_model, "gpt-4o");
        assert_eq!(config.llm_timeout(), Duration::from_secs(45));
        assert_eq!(config.embeddings.cache_max_entries, 64);
        assert_eq!(config.auth_leeway(), Duration::from_secs(5));
        assert_eq!(config.chat_log.buffer, 50);
        assert_eq!(config.chat_log.batch_size, 10);
        assert_eq!(config.chat_log.flush_every_ms, 250);
        assert_eq!(config.chat_log.report_every_secs, 90);
    }

    #[test]
    fn test_unparseable_env_numbers_keep_defaults() {
        let env: HashMap<&str, &str> = [
            ("RATE_LIMIT", "lots"),
            ("TOP_K", "-1"),
            ("RATE_WINDOW", "1 fortnight"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| (*v).to_string()));

        assert_eq!(config.rate_limit.requests, 30);
        assert_eq!(config.retrieval.top_k, 3);
        assert_eq!(config.rate_limit.window_secs, 60);
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("ms"), None);
        assert_eq!(parse_duration("10d"), None);
    }

    #[test]
    fn test_persistence_requires_database_url() {
        let mut config = AppConfig::default();
        assert!(!config.chat_log_persistence_enabled());
        config.database.url = "postgres://db".to_string();
        assert!(config.chat_log_persistence_enabled());
    }
}
