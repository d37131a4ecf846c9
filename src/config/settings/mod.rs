
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

const API_KEY_ENV_VARS: [&str; 2] = ["UNI_SCOUT_API_KEY", "GEMINI_API_KEY"];
const PORT_ENV_VAR: &str = "UNI_SCOUT_PORT";

/// First non-blank API key found in the environment
#[inline]
pub fn api_key_from_env() -> Option<String> {
    API_KEY_ENV_VARS
        .iter()
        .find_map(|name| std::env::var(name).ok())
        .filter(|key| !key.trim().is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub crawler: CrawlerSettings,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Gemini,
    Ollama,
}

impl fmt::Display for LlmProvider {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            LlmProvider::Gemini => write!(f, "gemini"),
            LlmProvider::Ollama => write!(f, "ollama"),
        }
    }
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(LlmProvider::Gemini),
            "ollama" => Ok(LlmProvider::Ollama),
            other => Err(ConfigError::InvalidProvider(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dimension: u32,
    pub batch_size: u32,
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    /// Read from the environment only, never persisted
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self::for_provider(LlmProvider::Gemini)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            allowed_origins: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// Overrides `<data dir>/raw` when set
    pub raw_dir: Option<PathBuf>,
    pub extensions: Vec<String>,
    pub max_content_chars: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            raw_dir: None,
            extensions: vec!["json".to_string(), "txt".to_string(), "html".to_string()],
            max_content_chars: 30_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    pub chat_course_limit: usize,
    pub chat_university_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: 5,
            max_limit: 50,
            chat_course_limit: 3,
            chat_university_limit: 2,
        }
    }
}

/// How the `scrape` command downloads pages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CrawlerSettings {
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Minimum gap between two requests
    pub politeness_delay_ms: u64,
    pub retry_attempts: u32,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            user_agent: concat!("uni-scout/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 30,
            politeness_delay_ms: 250,
            retry_attempts: 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid provider: {0} (must be 'gemini' or 'ollama')")]
    InvalidProvider(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid port in {0}: {1:?} (must be a number between 1 and 65535)")]
    UnparsablePort(&'static str, String),
    #[error("Invalid host: {0:?} (cannot be empty)")]
    InvalidHost(String),
    #[error("Invalid CORS origin: {0}")]
    InvalidOrigin(String),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0:?} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("No raw file extensions configured")]
    NoExtensions,
    #[error("Invalid max content size: {0} (must be between 1000 and 1000000 characters)")]
    InvalidMaxContentChars(usize),
    #[error("Invalid max search limit: {0} (must be between 1 and 200)")]
    InvalidMaxLimit(usize),
    #[error("Default search limit ({0}) must be between 1 and the max limit ({1})")]
    InvalidDefaultLimit(usize, usize),
    #[error("Invalid politeness delay: {0}ms (must be at most 60000)")]
    InvalidPolitenessDelay(u64),
    #[error("Invalid user agent: {0:?} (cannot be empty)")]
    InvalidUserAgent(String),
    #[error("Invalid chat lookup limit: {0} (must be between 1 and 20)")]
    InvalidChatLimit(usize),
    #[error("Missing API key: set one of {0}")]
    MissingApiKey(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Configuration rooted at `base_dir` with every section at its default
    #[inline]
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            llm: LlmConfig::default(),
            server: ServerConfig::default(),
            ingest: IngestConfig::default(),
            search: SearchConfig::default(),
            crawler: CrawlerSettings::default(),
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    /// Default data directory: `~/.uni-scout`
    #[inline]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".uni-scout"))
            .or({
                #[cfg(windows)]
                {
                    dirs::data_dir().map(|data| data.join("uni-scout"))
                }
                #[cfg(not(windows))]
                {
                    None
                }
            })
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load `config.toml` from `config_dir` (defaults when absent), apply the
    /// environment overrides and validate
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let mut config = Self::read_file(config_dir.as_ref())?;
        config.apply_env_overrides()?;

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    /// Like [`Config::load`] but ignoring the environment, for editing and
    /// saving the file itself
    #[inline]
    pub fn load_file<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config = Self::read_file(config_dir.as_ref())?;

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    fn read_file(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join("config.toml");

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path).with_context(|| {
                format!("Failed to read config file: {}", config_path.display())
            })?;

            toml::from_str::<Config>(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Self::with_base_dir(config_dir)
        };
        config.base_dir = config_dir.to_path_buf();
        Ok(config)
    }

    /// Environment variables win over the file
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(provider) = std::env::var("UNI_SCOUT_LLM_PROVIDER") {
            let provider = provider.parse()?;
            if provider != self.llm.provider {
                let dimension = self.llm.embedding_dimension;
                self.llm = LlmConfig {
                    embedding_dimension: dimension,
                    ..LlmConfig::for_provider(provider)
                };
            }
        }
        if let Ok(url) = std::env::var("UNI_SCOUT_LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Ok(host) = std::env::var("UNI_SCOUT_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var(PORT_ENV_VAR) {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::UnparsablePort(PORT_ENV_VAR, port))?;
        }
        self.llm.api_key = api_key_from_env();
        Ok(())
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.llm.validate()?;
        self.server.validate()?;
        self.ingest.validate()?;
        self.search.validate()?;
        self.crawler.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the SQLite catalog database
    #[inline]
    pub fn database_path(&self) -> PathBuf {
        self.get_base_dir().join("catalog.db")
    }

    /// Get the path for the vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }

    #[inline]
    pub fn raw_dir(&self) -> PathBuf {
        self.ingest
            .raw_dir
            .clone()
            .unwrap_or_else(|| self.get_base_dir().join("raw"))
    }

    #[inline]
    pub fn processed_dir(&self) -> PathBuf {
        self.get_base_dir().join("processed")
    }

    /// Create the data, raw and processed directories
    #[inline]
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.get_base_dir().to_path_buf(),
            self.raw_dir(),
            self.processed_dir(),
        ] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        }
        Ok(())
    }
}

impl LlmConfig {
    /// Provider defaults: hosted Gemini or a local Ollama daemon
    #[inline]
    pub fn for_provider(provider: LlmProvider) -> Self {
        match provider {
            LlmProvider::Gemini => Self {
                provider,
                base_url: "https://generativelanguage.googleapis.com".to_string(),
                chat_model: "gemini-1.5-pro".to_string(),
                embedding_model: "gemini-embedding-exp-03-07".to_string(),
                embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
                batch_size: 16,
                timeout_secs: 60,
                retry_attempts: 3,
                api_key: None,
            },
            LlmProvider::Ollama => Self {
                provider,
                base_url: "http://localhost:11434".to_string(),
                chat_model: "llama3.2".to_string(),
                embedding_model: "nomic-embed-text:latest".to_string(),
                embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
                batch_size: 16,
                timeout_secs: 60,
                retry_attempts: 3,
                api_key: None,
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base_url()?;

        if self.chat_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.chat_model.clone()));
        }

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(self.base_url.trim())
            .map_err(|_| ConfigError::InvalidUrl(self.base_url.clone()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::InvalidUrl(self.base_url.clone()));
        }
        Ok(url)
    }

    /// The API key, required by hosted providers
    pub fn api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ConfigError::MissingApiKey(API_KEY_ENV_VARS.join(" or ")))
    }

    pub fn set_base_url(&mut self, base_url: String) -> Result<(), ConfigError> {
        let temp_config = LlmConfig {
            base_url: base_url.clone(),
            ..self.clone()
        };
        temp_config.base_url()?;
        self.base_url = base_url;
        Ok(())
    }

    pub fn set_chat_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.chat_model = model;
        Ok(())
    }

    pub fn set_embedding_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.embedding_model = model;
        Ok(())
    }

    pub fn set_batch_size(&mut self, batch_size: u32) -> Result<(), ConfigError> {
        if batch_size == 0 || batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(batch_size));
        }
        self.batch_size = batch_size;
        Ok(())
    }

    pub fn set_embedding_dimension(&mut self, dimension: u32) -> Result<(), ConfigError> {
        if !(64..=4096).contains(&dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(dimension));
        }
        self.embedding_dimension = dimension;
        Ok(())
    }
}

impl CrawlerSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::InvalidUserAgent(self.user_agent.clone()));
        }

        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        if self.politeness_delay_ms > 60_000 {
            return Err(ConfigError::InvalidPolitenessDelay(self.politeness_delay_ms));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidHost(self.host.clone()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        for origin in &self.allowed_origins {
            if origin != "*" && Url::parse(origin).is_err() {
                return Err(ConfigError::InvalidOrigin(origin.clone()));
            }
        }

        Ok(())
    }

    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl IngestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(ConfigError::NoExtensions);
        }

        if !(1000..=1_000_000).contains(&self.max_content_chars) {
            return Err(ConfigError::InvalidMaxContentChars(self.max_content_chars));
        }

        Ok(())
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=200).contains(&self.max_limit) {
            return Err(ConfigError::InvalidMaxLimit(self.max_limit));
        }

        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(ConfigError::InvalidDefaultLimit(
                self.default_limit,
                self.max_limit,
            ));
        }

        for limit in [self.chat_course_limit, self.chat_university_limit] {
            if !(1..=20).contains(&limit) {
                return Err(ConfigError::InvalidChatLimit(limit));
            }
        }

        Ok(())
    }

    /// Clamp a requested result count into `1..=max_limit`
    #[inline]
    pub fn clamp_limit(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit)
    }
}
