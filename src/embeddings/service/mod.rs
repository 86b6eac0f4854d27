#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

use crate::config::Config;
use crate::embeddings::cache::EmbeddingCache;
use crate::embeddings::{EmbeddingError, EmbeddingProvider, create_provider, validate_input};
use crate::vecmath::DimensionMismatch;

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);

/// One embedding together with the provider that actually produced it.
///
/// When a fallback provider services the call, `provider`/`model` name the
/// fallback, not the configured primary.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedded {
    pub vector: Vec<f32>,
    pub provider: String,
    pub model: String,
}

/// A batch of embeddings in input order, all from the same provider.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedBatch {
    pub vectors: Vec<Vec<f32>>,
    pub provider: String,
    pub model: String,
}

/// Orchestrates provider selection, retry, fallback and caching.
///
/// The chain is tried in order. Transient failures (`ProviderUnavailable`,
/// `RateLimited`) are retried with exponential backoff up to the configured
/// attempt count, then the next provider takes over. `InvalidInput` and
/// dimension mismatches surface immediately; neither retrying nor another
/// backend can fix those.
pub struct EmbeddingService {
    chain: Vec<Arc<dyn EmbeddingProvider>>,
    cache: Option<Arc<EmbeddingCache>>,
    retry_attempts: u32,
    initial_backoff: Duration,
}

impl EmbeddingService {
    #[inline]
    pub fn new(chain: Vec<Arc<dyn EmbeddingProvider>>) -> Result<Self> {
        anyhow::ensure!(
            !chain.is_empty(),
            "embedding service needs at least one provider"
        );
        Ok(Self {
            chain,
            cache: None,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
        })
    }

    /// Build the provider chain (primary plus fallbacks) from configuration.
    #[inline]
    pub fn from_config(config: &Config, cache: Option<Arc<EmbeddingCache>>) -> Result<Self> {
        let mut chain = vec![create_provider(config.embedding.provider, config)?];
        for kind in &config.embedding.fallback {
            chain.push(create_provider(*kind, config)?);
        }
        let mut service = Self::new(chain)?.with_retry_attempts(config.embedding.retry_attempts);
        if let Some(cache) = cache {
            service = service.with_cache(cache);
        }
        Ok(service)
    }

    #[inline]
    pub fn with_cache(mut self, cache: Arc<EmbeddingCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    #[inline]
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// The configured primary provider.
    #[inline]
    pub fn primary(&self) -> &dyn EmbeddingProvider {
        self.chain[0].as_ref()
    }

    /// Dimensionality of the active configuration, for pre-write validation.
    #[inline]
    pub fn dimensions(&self) -> usize {
        self.primary().dimensions()
    }

    #[inline]
    pub fn provider_name(&self) -> &str {
        self.primary().name()
    }

    #[inline]
    pub fn model_id(&self) -> &str {
        self.primary().model_id()
    }

    /// Embed one text, walking the fallback chain as needed.
    #[inline]
    pub fn generate_one(&self, text: &str) -> Result<Embedded, EmbeddingError> {
        validate_input(text)?;

        let mut last_error = None;
        for provider in &self.chain {
            let key = EmbeddingCache::key(
                provider.name(),
                provider.model_id(),
                provider.dimensions(),
                text,
            );
            if let Some(vector) = self.cache.as_ref().and_then(|c| c.get(&key)) {
                return Ok(Embedded {
                    vector,
                    provider: provider.name().to_string(),
                    model: provider.model_id().to_string(),
                });
            }

            match self.call_with_retry(provider.as_ref(), || provider.generate_one(text)) {
                Ok(vector) => {
                    check_dimensions(provider.as_ref(), &vector)?;
                    if let Some(cache) = &self.cache {
                        cache.insert(key, vector.clone());
                    }
                    return Ok(Embedded {
                        vector,
                        provider: provider.name().to_string(),
                        model: provider.model_id().to_string(),
                    });
                }
                Err(error) if error.is_retryable() => {
                    warn!(
                        "provider {} failed after retries, trying next in chain: {}",
                        provider.name(),
                        error
                    );
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }

        Err(last_error.unwrap_or_else(|| EmbeddingError::InvalidInput(
            "no provider serviced the request".to_string(),
        )))
    }

    /// Embed a batch, served whole by a single provider in input order.
    ///
    /// Cached texts are not re-sent; only the misses go over the wire, and
    /// the stitched result preserves input order.
    #[inline]
    pub fn generate_batch(&self, texts: &[String]) -> Result<EmbeddedBatch, EmbeddingError> {
        if texts.is_empty() {
            return Ok(EmbeddedBatch {
                vectors: Vec::new(),
                provider: self.provider_name().to_string(),
                model: self.model_id().to_string(),
            });
        }
        for text in texts {
            validate_input(text)?;
        }

        let mut last_error = None;
        for provider in &self.chain {
            let keys: Vec<_> = texts
                .iter()
                .map(|text| {
                    EmbeddingCache::key(
                        provider.name(),
                        provider.model_id(),
                        provider.dimensions(),
                        text,
                    )
                })
                .collect();

            let mut vectors: Vec<Option<Vec<f32>>> = keys
                .iter()
                .map(|key| self.cache.as_ref().and_then(|c| c.get(key)))
                .collect();

            let miss_indexes: Vec<usize> = vectors
                .iter()
                .enumerate()
                .filter(|(_, v)| v.is_none())
                .map(|(i, _)| i)
                .collect();

            if !miss_indexes.is_empty() {
                let miss_texts: Vec<String> =
                    miss_indexes.iter().map(|&i| texts[i].clone()).collect();
                debug!(
                    "embedding {} of {} texts via {} ({} cached)",
                    miss_texts.len(),
                    texts.len(),
                    provider.name(),
                    texts.len() - miss_texts.len()
                );

                match self.call_with_retry(provider.as_ref(), || {
                    provider.generate_batch(&miss_texts)
                }) {
                    Ok(generated) => {
                        if generated.len() != miss_indexes.len() {
                            last_error = Some(EmbeddingError::ProviderUnavailable {
                                provider: provider.name().to_string(),
                                message: format!(
                                    "batch returned {} vectors for {} inputs",
                                    generated.len(),
                                    miss_indexes.len()
                                ),
                            });
                            continue;
                        }
                        for (slot, vector) in miss_indexes.iter().zip(generated) {
                            check_dimensions(provider.as_ref(), &vector)?;
                            if let Some(cache) = &self.cache {
                                cache.insert(keys[*slot], vector.clone());
                            }
                            vectors[*slot] = Some(vector);
                        }
                    }
                    Err(error) if error.is_retryable() => {
                        warn!(
                            "provider {} failed batch after retries, trying next in chain: {}",
                            provider.name(),
                            error
                        );
                        last_error = Some(error);
                        continue;
                    }
                    Err(error) => return Err(error),
                }
            }

            let vectors: Vec<Vec<f32>> = vectors.into_iter().flatten().collect();
            return Ok(EmbeddedBatch {
                vectors,
                provider: provider.name().to_string(),
                model: provider.model_id().to_string(),
            });
        }

        Err(last_error.unwrap_or_else(|| EmbeddingError::InvalidInput(
            "no provider serviced the request".to_string(),
        )))
    }

    /// Clear the shared cache, if one is attached.
    #[inline]
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    fn call_with_retry<T>(
        &self,
        provider: &dyn EmbeddingProvider,
        mut call: impl FnMut() -> Result<T, EmbeddingError>,
    ) -> Result<T, EmbeddingError> {
        let mut last_error = None;
        for attempt in 1..=self.retry_attempts {
            match call() {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !error.is_retryable() {
                        return Err(error);
                    }
                    warn!(
                        "provider {} attempt {}/{} failed: {}",
                        provider.name(),
                        attempt,
                        self.retry_attempts,
                        error
                    );
                    if attempt < self.retry_attempts {
                        let backoff = self.initial_backoff * 2u32.pow(attempt - 1);
                        let delay = match &error {
                            EmbeddingError::RateLimited {
                                retry_after_ms: Some(ms),
                                ..
                            } => backoff.max(Duration::from_millis(*ms)),
                            _ => backoff,
                        };
                        std::thread::sleep(delay);
                    }
                    last_error = Some(error);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| EmbeddingError::InvalidInput(
            "retry loop ran zero attempts".to_string(),
        )))
    }
}

fn check_dimensions(
    provider: &dyn EmbeddingProvider,
    vector: &[f32],
) -> Result<(), EmbeddingError> {
    if vector.len() != provider.dimensions() {
        return Err(EmbeddingError::Dimension(DimensionMismatch {
            expected: provider.dimensions(),
            actual: vector.len(),
        }));
    }
    Ok(())
}
