
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::chunking::ChunkingConfig;
use crate::embeddings::ProviderKind;
use crate::embeddings::ollama::DEFAULT_EMBEDDING_DIMENSION;
use crate::search::SearchOptions;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub providers: ProvidersConfig,
    pub chunking: ChunkingConfig,
    pub search: SearchOptions,
    pub library: LibraryConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Provider selection and call discipline for the embedding service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Primary backend; its (name, model, dimensions) become part of every
    /// index identity created under this configuration.
    pub provider: ProviderKind,
    /// Backends tried in order when the primary is unavailable. Configure
    /// these dimension-compatible with the primary: a fallback producing a
    /// different width fails the write rather than corrupting an index.
    pub fallback: Vec<ProviderKind>,
    /// Caller-chosen output dimensionality, for providers that allow one.
    pub dimensions: Option<u32>,
    pub timeout_ms: u64,
    pub retry_attempts: u32,
    /// Chunks embedded per provider call while indexing.
    pub batch_size: usize,
    /// Entries held by the shared embedding cache; 0 disables it.
    pub cache_capacity: usize,
}

impl Default for EmbeddingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            fallback: Vec::new(),
            dimensions: None,
            timeout_ms: 30_000,
            retry_attempts: 3,
            batch_size: 16,
            cache_capacity: 2048,
        }
    }
}

impl EmbeddingConfig {
    #[inline]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: OpenAiConfig,
    pub gemini: GeminiConfig,
    pub ollama: OllamaConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenAiConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub default_dimensions: u32,
}

impl Default for OpenAiConfig {
    #[inline]
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/".to_string(),
            api_key: None,
            model: "text-embedding-3-small".to_string(),
            default_dimensions: 1536,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeminiConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub default_dimensions: u32,
}

impl Default for GeminiConfig {
    #[inline]
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/".to_string(),
            api_key: None,
            model: "text-embedding-004".to_string(),
            default_dimensions: 768,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    pub embedding_dimension: u32,
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "nomic-embed-text:latest".to_string(),
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
        }
    }
}

/// Where the document library lives on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct LibraryConfig {
    /// Defaults to `<base_dir>/library` when unset.
    pub root: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid timeout: {0}ms (must be between 1 and 600000)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(usize),
    #[error("Invalid embedding dimension: {0} (must be between 1 and 3072)")]
    InvalidDimensions(u32),
    #[error("Invalid chunk size: {0} (must be between 50 and 10000)")]
    InvalidChunkSize(usize),
    #[error("Chunk overlap ({0}) must be smaller than chunk size ({1})")]
    InvalidChunkOverlap(usize, usize),
    #[error("Invalid weight: {0} (must be between 0 and 1)")]
    InvalidWeight(f32),
    #[error("Invalid similarity threshold: {0} (must be between -1 and 1)")]
    InvalidThreshold(f32),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        fs::create_dir_all(&self.base_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                self.base_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_embedding()?;
        self.providers.ollama.validate()?;
        self.validate_chunking()?;
        self.validate_search()?;
        Ok(())
    }

    fn validate_embedding(&self) -> Result<(), ConfigError> {
        let embedding = &self.embedding;
        if embedding.timeout_ms == 0 || embedding.timeout_ms > 600_000 {
            return Err(ConfigError::InvalidTimeout(embedding.timeout_ms));
        }
        if embedding.retry_attempts == 0 || embedding.retry_attempts > 10 {
            return Err(ConfigError::InvalidRetryAttempts(embedding.retry_attempts));
        }
        if embedding.batch_size == 0 || embedding.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(embedding.batch_size));
        }
        if let Some(dims) = embedding.dimensions {
            if !(1..=3072).contains(&dims) {
                return Err(ConfigError::InvalidDimensions(dims));
            }
        }
        Ok(())
    }

    fn validate_chunking(&self) -> Result<(), ConfigError> {
        let chunking = &self.chunking;
        if !(50..=10_000).contains(&chunking.chunk_size) {
            return Err(ConfigError::InvalidChunkSize(chunking.chunk_size));
        }
        if chunking.chunk_overlap >= chunking.chunk_size {
            return Err(ConfigError::InvalidChunkOverlap(
                chunking.chunk_overlap,
                chunking.chunk_size,
            ));
        }
        Ok(())
    }

    fn validate_search(&self) -> Result<(), ConfigError> {
        let search = &self.search;
        for weight in [search.vector_weight, search.lexical_weight] {
            if !(0.0..=1.0).contains(&weight) || weight.is_nan() {
                return Err(ConfigError::InvalidWeight(weight));
            }
        }
        if !(-1.0..=1.0).contains(&search.similarity_threshold)
            || search.similarity_threshold.is_nan()
        {
            return Err(ConfigError::InvalidThreshold(search.similarity_threshold));
        }
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }

    /// Directory holding the metadata database and vector files.
    #[inline]
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.join("data")
    }

    /// Root of the document library.
    #[inline]
    pub fn library_root(&self) -> PathBuf {
        self.library
            .root
            .clone()
            .unwrap_or_else(|| self.base_dir.join("library"))
    }
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }
        if self.embedding_dimension == 0 || self.embedding_dimension > 3072 {
            return Err(ConfigError::InvalidDimensions(self.embedding_dimension));
        }
        self.url()?;
        Ok(())
    }

    #[inline]
    pub fn url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        let candidate = OllamaConfig {
            host: host.clone(),
            ..self.clone()
        };
        candidate.validate()?;
        self.host = host;
        Ok(())
    }

    #[inline]
    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port));
        }
        self.port = port;
        Ok(())
    }

    #[inline]
    pub fn set_model(&mut self, model: String) -> Result<(), ConfigError> {
        if model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(model));
        }
        self.model = model;
        Ok(())
    }
}
