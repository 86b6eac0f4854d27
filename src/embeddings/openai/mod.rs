
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::OpenAiConfig;
use crate::embeddings::{EmbeddingError, EmbeddingProvider, classify_http_error, validate_input};

pub const PROVIDER_NAME: &str = "openai";

/// Dimension overrides the embeddings endpoint accepts.
pub const DIMENSION_RANGE: std::ops::RangeInclusive<u32> = 1..=3072;

const EMBEDDINGS_PATH: &str = "v1/embeddings";

/// Client for an OpenAI-compatible `/v1/embeddings` endpoint.
///
/// The API accepts a whole batch per request and identifies each output by
/// an `index` field; responses are re-ordered by that index before being
/// returned, so callers always see input order.
#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    base_url: Url,
    api_key: String,
    model: String,
    dimensions: usize,
    /// Sent with each request only when the caller overrode the model default.
    requested_dimensions: Option<u32>,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingObject>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingObject {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiProvider {
    #[inline]
    pub fn new(
        config: &OpenAiConfig,
        dimensions_override: Option<u32>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url =
            Url::parse(&config.endpoint).context("Invalid OpenAI endpoint in configuration")?;

        if let Some(dims) = dimensions_override {
            anyhow::ensure!(
                DIMENSION_RANGE.contains(&dims),
                "dimensions override {dims} is outside the supported range 1..=3072"
            );
        }

        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.model.clone(),
            dimensions: dimensions_override.map_or(config.default_dimensions as usize, |d| {
                d as usize
            }),
            requested_dimensions: dimensions_override,
            agent,
        })
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = self
            .base_url
            .join(EMBEDDINGS_PATH)
            .map_err(|e| EmbeddingError::InvalidInput(format!("bad embeddings URL: {e}")))?;

        let request = EmbeddingsRequest {
            model: &self.model,
            input: texts,
            dimensions: self.requested_dimensions,
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| EmbeddingError::InvalidInput(format!("unserializable request: {e}")))?;

        debug!("requesting {} embeddings from {}", texts.len(), url);

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Authorization", &format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .send(&body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| classify_http_error(PROVIDER_NAME, &e))?;

        let parsed: EmbeddingsResponse = serde_json::from_str(&response_text).map_err(|e| {
            EmbeddingError::ProviderUnavailable {
                provider: PROVIDER_NAME.to_string(),
                message: format!("unparseable response: {e}"),
            }
        })?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::ProviderUnavailable {
                provider: PROVIDER_NAME.to_string(),
                message: format!(
                    "requested {} embeddings, response carried {}",
                    texts.len(),
                    parsed.data.len()
                ),
            });
        }

        // The API is free to reorder outputs; the index field is the contract.
        let mut data = parsed.data;
        data.sort_by_key(|item| item.index);

        Ok(data.into_iter().map(|item| item.embedding).collect())
    }
}

impl EmbeddingProvider for OpenAiProvider {
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
        let input = [text.to_string()];
        let mut vectors = self.embed(&input)?;
        Ok(vectors.remove(0))
    }

    #[inline]
    fn generate_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        for text in texts {
            validate_input(text)?;
        }
        self.embed(texts)
    }
}
