// Embedding generation: provider backends, fallback orchestration, caching.

pub mod cache;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod service;
pub mod stub;

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Config;
use crate::vecmath::DimensionMismatch;

pub use cache::EmbeddingCache;
pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;
pub use service::{Embedded, EmbeddedBatch, EmbeddingService};
pub use stub::StubProvider;

/// Upper bound on input length accepted by any provider, in characters.
pub const MAX_INPUT_CHARS: usize = 32_768;

/// Errors surfaced by embedding providers and the service.
///
/// `ProviderUnavailable` and `RateLimited` are recoverable: the service
/// retries them with backoff and walks the fallback chain. `InvalidInput`
/// and `Dimension` are caller/configuration errors and surface immediately.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("provider {provider} unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },

    #[error("provider {provider} rate limited")]
    RateLimited {
        provider: String,
        retry_after_ms: Option<u64>,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Dimension(#[from] DimensionMismatch),
}

impl EmbeddingError {
    /// Whether the service may retry this error with backoff.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EmbeddingError::ProviderUnavailable { .. } | EmbeddingError::RateLimited { .. }
        )
    }
}

/// A backend capable of turning text into fixed-width embedding vectors.
///
/// `generate_batch` has a default body that degrades to sequential
/// `generate_one` calls, so single-input backends satisfy the batch contract
/// without their callers knowing. Every implementation here returns batch
/// results in input order; see each provider for how that order is
/// established.
pub trait EmbeddingProvider: Send + Sync {
    /// Stable provider name, part of every index identity.
    fn name(&self) -> &str;

    /// Model identifier as configured, part of every index identity.
    fn model_id(&self) -> &str;

    /// Output dimensionality. Fixed for the lifetime of the provider.
    fn dimensions(&self) -> usize;

    fn generate_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    #[inline]
    fn generate_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.generate_one(text)).collect()
    }
}

/// Closed set of provider backends constructible from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Openai,
    Gemini,
    Ollama,
    Stub,
}

impl std::fmt::Display for ProviderKind {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ProviderKind::Openai => write!(f, "openai"),
            ProviderKind::Gemini => write!(f, "gemini"),
            ProviderKind::Ollama => write!(f, "ollama"),
            ProviderKind::Stub => write!(f, "stub"),
        }
    }
}

/// Construct a provider from the configuration for the given kind.
#[inline]
pub fn create_provider(kind: ProviderKind, config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let timeout = config.embedding.timeout();
    Ok(match kind {
        ProviderKind::Openai => Arc::new(OpenAiProvider::new(
            &config.providers.openai,
            config.embedding.dimensions,
            timeout,
        )?),
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(
            &config.providers.gemini,
            config.embedding.dimensions,
            timeout,
        )?),
        ProviderKind::Ollama => Arc::new(OllamaProvider::new(&config.providers.ollama, timeout)?),
        ProviderKind::Stub => Arc::new(StubProvider::new(
            config.embedding.dimensions.map_or(64, |d| d as usize),
        )),
    })
}

/// Reject inputs no provider should be asked to embed.
pub(crate) fn validate_input(text: &str) -> Result<(), EmbeddingError> {
    if text.trim().is_empty() {
        return Err(EmbeddingError::InvalidInput(
            "cannot embed empty text".to_string(),
        ));
    }
    let chars = text.chars().count();
    if chars > MAX_INPUT_CHARS {
        return Err(EmbeddingError::InvalidInput(format!(
            "input of {chars} characters exceeds the {MAX_INPUT_CHARS} character limit"
        )));
    }
    Ok(())
}

/// Map a transport-level failure onto the provider error taxonomy.
pub(crate) fn classify_http_error(provider: &str, error: &ureq::Error) -> EmbeddingError {
    match error {
        ureq::Error::StatusCode(status) => match *status {
            429 => EmbeddingError::RateLimited {
                provider: provider.to_string(),
                retry_after_ms: None,
            },
            400 | 413 | 422 => EmbeddingError::InvalidInput(format!(
                "provider {provider} rejected the request: HTTP {status}"
            )),
            status => EmbeddingError::ProviderUnavailable {
                provider: provider.to_string(),
                message: format!("HTTP {status}"),
            },
        },
        other => EmbeddingError::ProviderUnavailable {
            provider: provider.to_string(),
            message: other.to_string(),
        },
    }
}
