#[cfg(test)]
mod tests;

use std::sync::atomic::{AtomicUsize, Ordering};

use sha2::{Digest, Sha256};

use crate::embeddings::{EmbeddingError, EmbeddingProvider, validate_input};
use crate::vecmath;

pub const PROVIDER_NAME: &str = "stub";

/// Deterministic in-process backend for tests and offline use.
///
/// Vectors are expanded from a SHA-256 digest of the input text and
/// unit-normalised, so identical text always embeds identically, different
/// text almost never collides, and no network is involved. Call counts are
/// tracked so tests can assert on cache behaviour.
#[derive(Debug)]
pub struct StubProvider {
    model: String,
    dimensions: usize,
    calls: AtomicUsize,
}

impl StubProvider {
    #[inline]
    pub fn new(dimensions: usize) -> Self {
        Self {
            model: "stub-deterministic".to_string(),
            dimensions,
            calls: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Number of texts embedded so far, across single and batch calls.
    #[inline]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut values = Vec::with_capacity(self.dimensions);
        let mut counter = 0u32;
        while values.len() < self.dimensions {
            let mut hasher = Sha256::new();
            hasher.update(self.model.as_bytes());
            hasher.update([0]);
            hasher.update(counter.to_le_bytes());
            hasher.update(text.as_bytes());
            let digest = hasher.finalize();
            for byte in digest {
                if values.len() == self.dimensions {
                    break;
                }
                values.push(f32::from(byte) / 127.5 - 1.0);
            }
            counter += 1;
        }
        vecmath::normalize(&values)
    }
}

impl EmbeddingProvider for StubProvider {
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
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.embed(text))
    }
}
