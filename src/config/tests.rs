use super::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn resolve_data_dir_prefers_override() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let resolved = resolve_data_dir(Some(temp_dir.path())).expect("should resolve");
    assert_eq!(resolved, temp_dir.path());
}

#[test]
fn resolve_data_dir_default_ends_with_app_dir() {
    if let Ok(dir) = resolve_data_dir(None) {
        assert!(dir.ends_with(".uni-scout") || dir.ends_with("uni-scout"));
    }
}

#[test]
fn ensure_directories_creates_layout() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config = Config::with_base_dir(temp_dir.path().join("data"));

    config
        .ensure_directories()
        .expect("should create directories");

    assert!(config.raw_dir().is_dir());
    assert!(config.processed_dir().is_dir());
}

#[test]
fn invalid_toml_handling() {
    let invalid_toml = r#"
        [llm
        provider = "gemini"
    "#;

    let result: Result<Config, toml::de::Error> = toml::from_str(invalid_toml);
    assert!(result.is_err());
}

#[test]
fn partial_config_with_defaults() {
    let partial_toml = r#"
        [server]
        port = 9001
    "#;

    let config: Config = toml::from_str(partial_toml).expect("partial config should parse");
    assert_eq!(config.server.port, 9001);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.llm, LlmConfig::default());
    assert_eq!(config.search, SearchConfig::default());
    assert_eq!(config.crawler, CrawlerSettings::default());
}

#[test]
fn complete_valid_config() {
    let valid_toml = r#"
        [llm]
        provider = "ollama"
        base_url = "http://localhost:11434"
        chat_model = "llama3.2"
        embedding_model = "nomic-embed-text:latest"
        embedding_dimension = 768
        batch_size = 32
        timeout_secs = 30
        retry_attempts = 2

        [server]
        host = "127.0.0.1"
        port = 8080
        allowed_origins = ["http://localhost:3000"]

        [ingest]
        extensions = ["html"]
        max_content_chars = 20000

        [search]
        default_limit = 10
        max_limit = 25
        chat_course_limit = 4
        chat_university_limit = 1

        [crawler]
        user_agent = "campus-bot/2.0"
        timeout_secs = 10
        politeness_delay_ms = 1000
        retry_attempts = 2
    "#;

    let config: Config = toml::from_str(valid_toml).expect("config should parse");
    assert!(config.validate().is_ok());
    assert_eq!(config.llm.provider, LlmProvider::Ollama);
    assert_eq!(config.server.allowed_origins, vec!["http://localhost:3000"]);
    assert_eq!(config.ingest.extensions, vec!["html"]);
    assert_eq!(config.search.max_limit, 25);
    assert_eq!(config.crawler.user_agent, "campus-bot/2.0");
    assert_eq!(config.crawler.politeness_delay_ms, 1000);
}

#[test]
fn saved_file_is_readable_toml() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config = Config::with_base_dir(temp_dir.path());
    config.save().expect("should save");

    let content =
        fs::read_to_string(config.config_file_path()).expect("should read saved config");
    assert!(content.contains("[llm]"));
    assert!(content.contains("[server]"));
    assert!(content.contains("provider = \"gemini\""));
}
