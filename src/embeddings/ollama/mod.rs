
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::OllamaConfig;
use crate::embeddings::{EmbeddingError, EmbeddingProvider, classify_http_error, validate_input};

pub const PROVIDER_NAME: &str = "ollama";

pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

/// Client for a local Ollama instance.
///
/// The `/api/embed` endpoint embeds one prompt or a whole input array; the
/// batch response is positional. Output dimensionality is a property of the
/// loaded model, so it comes from configuration rather than a per-request
/// override.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: Url,
    model: String,
    dimensions: usize,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
}

impl OllamaProvider {
    #[inline]
    pub fn new(config: &OllamaConfig, timeout: Duration) -> Result<Self> {
        let base_url = config
            .url()
            .context("Failed to generate Ollama URL from config")?;

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Ok(Self {
            base_url,
            model: config.model.clone(),
            dimensions: config.embedding_dimension as usize,
            agent,
        })
    }

    /// Check that the server responds and the configured model is pulled.
    #[inline]
    pub fn health_check(&self) -> Result<(), EmbeddingError> {
        let models = self.list_models()?;
        if models.iter().any(|m| m.name == self.model) {
            debug!("model {} is available", self.model);
            Ok(())
        } else {
            let available: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            Err(EmbeddingError::ProviderUnavailable {
                provider: PROVIDER_NAME.to_string(),
                message: format!(
                    "model '{}' is not available, found {available:?}",
                    self.model
                ),
            })
        }
    }

    fn list_models(&self) -> Result<Vec<ModelInfo>, EmbeddingError> {
        let url = self
            .base_url
            .join("api/tags")
            .map_err(|e| EmbeddingError::InvalidInput(format!("bad tags URL: {e}")))?;

        let response_text = self
            .agent
            .get(url.as_str())
            .call()
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| classify_http_error(PROVIDER_NAME, &e))?;

        let parsed: ModelsResponse = serde_json::from_str(&response_text).map_err(|e| {
            EmbeddingError::ProviderUnavailable {
                provider: PROVIDER_NAME.to_string(),
                message: format!("unparseable models response: {e}"),
            }
        })?;
        Ok(parsed.models)
    }

    fn post_embed(&self, body: &str) -> Result<String, EmbeddingError> {
        let url = self
            .base_url
            .join("api/embed")
            .map_err(|e| EmbeddingError::InvalidInput(format!("bad embed URL: {e}")))?;

        self.agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| classify_http_error(PROVIDER_NAME, &e))
    }
}

impl EmbeddingProvider for OllamaProvider {
    #[inline]
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    #[inline]
    fn model_id(&self) -> &str {
        &self.model
    }

    #[inline]
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[inline]
    fn generate_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        validate_input(text)?;

        let request = EmbedRequest {
            model: &self.model,
            prompt: text,
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| EmbeddingError::InvalidInput(format!("unserializable request: {e}")))?;

        let response_text = self.post_embed(&body)?;
        let parsed: EmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
            EmbeddingError::ProviderUnavailable {
                provider: PROVIDER_NAME.to_string(),
                message: format!("unparseable response: {e}"),
            }
        })?;

        debug!("generated embedding with {} dimensions", parsed.embedding.len());
        Ok(parsed.embedding)
    }

    #[inline]
    fn generate_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        for text in texts {
            validate_input(text)?;
        }

        let request = BatchEmbedRequest {
            model: &self.model,
            input: texts,
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| EmbeddingError::InvalidInput(format!("unserializable request: {e}")))?;

        let response_text = self.post_embed(&body)?;
        let parsed: BatchEmbedResponse = serde_json::from_str(&response_text).map_err(|e| {
            EmbeddingError::ProviderUnavailable {
                provider: PROVIDER_NAME.to_string(),
                message: format!("unparseable response: {e}"),
            }
        })?;

        if parsed.embeddings.len() != texts.len() {
            return Err(EmbeddingError::ProviderUnavailable {
                provider: PROVIDER_NAME.to_string(),
                message: format!(
                    "requested {} embeddings, response carried {}",
                    texts.len(),
                    parsed.embeddings.len()
                ),
            });
        }

        Ok(parsed.embeddings)
    }
}
