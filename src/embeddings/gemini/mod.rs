#[cfg(test)]
mod tests;

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::GeminiConfig;
use crate::embeddings::{EmbeddingError, EmbeddingProvider, classify_http_error, validate_input};

pub const PROVIDER_NAME: &str = "gemini";

/// Output dimensionality overrides accepted by the embedContent API.
pub const DIMENSION_RANGE: std::ops::RangeInclusive<u32> = 1..=3072;

/// Client for a Gemini-style `batchEmbedContents` endpoint.
///
/// Unlike the OpenAI wire format there is no index field: the response
/// embeddings array is positional, matching the request order. The API key
/// travels as a query parameter.
#[derive(Debug, Clone)]
pub struct GeminiProvider {
    base_url: Url,
    api_key: String,
    model: String,
    dimensions: usize,
    requested_dimensions: Option<u32>,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchEmbedRequest {
    requests: Vec<EmbedContentRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest {
    model: String,
    content: Content,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<u32>,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}

impl GeminiProvider {
    #[inline]
    pub fn new(
        config: &GeminiConfig,
        dimensions_override: Option<u32>,
        timeout: Duration,
    ) -> Result<Self> {
        let base_url =
            Url::parse(&config.endpoint).context("Invalid Gemini endpoint in configuration")?;

        if let Some(dims) = dimensions_override {
            anyhow::ensure!(
                DIMENSION_RANGE.contains(&dims),
                "output dimensionality {dims} is outside the supported range 1..=3072"
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
        let mut url = self
            .base_url
            .join(&format!("v1beta/models/{}:batchEmbedContents", self.model))
            .map_err(|e| EmbeddingError::InvalidInput(format!("bad embed URL: {e}")))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);

        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: format!("models/{}", self.model),
                    content: Content {
                        parts: vec![Part { text: text.clone() }],
                    },
                    output_dimensionality: self.requested_dimensions,
                })
                .collect(),
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| EmbeddingError::InvalidInput(format!("unserializable request: {e}")))?;

        debug!("requesting {} embeddings from {}", texts.len(), self.model);

        let response_text = self
            .agent
            .post(url.as_str())
            .header("Content-Type", "application/json")
            .send(&body)
            .and_then(|mut resp| resp.body_mut().read_to_string())
            .map_err(|e| classify_http_error(PROVIDER_NAME, &e))?;

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

        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }
}

impl EmbeddingProvider for GeminiProvider {
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
