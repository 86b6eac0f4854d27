use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::embeddings::StubProvider;

/// Always fails with `ProviderUnavailable`.
struct FailingProvider {
    calls: AtomicUsize,
}

impl FailingProvider {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl EmbeddingProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    fn model_id(&self) -> &str {
        "failing-model"
    }

    fn dimensions(&self) -> usize {
        8
    }

    fn generate_one(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(EmbeddingError::ProviderUnavailable {
            provider: "failing".to_string(),
            message: "configured to fail".to_string(),
        })
    }
}

/// Rate-limits the first `failures` calls, then succeeds.
struct FlakyProvider {
    failures: usize,
    calls: AtomicUsize,
}

impl EmbeddingProvider for FlakyProvider {
    fn name(&self) -> &str {
        "flaky"
    }

    fn model_id(&self) -> &str {
        "flaky-model"
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn generate_one(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(EmbeddingError::RateLimited {
                provider: "flaky".to_string(),
                retry_after_ms: None,
            })
        } else {
            Ok(vec![1.0, 0.0])
        }
    }
}

/// Declares one dimensionality, returns another.
struct LyingProvider;

impl EmbeddingProvider for LyingProvider {
    fn name(&self) -> &str {
        "lying"
    }

    fn model_id(&self) -> &str {
        "lying-model"
    }

    fn dimensions(&self) -> usize {
        16
    }

    fn generate_one(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(vec![0.5; 4])
    }
}

fn no_backoff(service: EmbeddingService) -> EmbeddingService {
    service.with_initial_backoff(Duration::ZERO)
}

#[test]
fn fallback_chain_reports_the_servicing_provider() {
    let primary = Arc::new(FailingProvider::new());
    let secondary = Arc::new(StubProvider::new(8));
    let chain: Vec<Arc<dyn EmbeddingProvider>> = vec![primary.clone(), secondary];
    let service = no_backoff(EmbeddingService::new(chain).expect("chain is non-empty"));

    let embedded = service.generate_one("text").expect("secondary services");
    assert_eq!(embedded.provider, "stub");
    assert_eq!(embedded.model, "stub-deterministic");
    assert_eq!(embedded.vector.len(), 8);
    // The primary was tried (and retried) before the fallback took over.
    assert!(primary.calls.load(Ordering::SeqCst) >= 1);
}

#[test]
fn rate_limits_are_retried_on_the_same_provider() {
    let flaky = Arc::new(FlakyProvider {
        failures: 2,
        calls: AtomicUsize::new(0),
    });
    let chain: Vec<Arc<dyn EmbeddingProvider>> = vec![flaky.clone()];
    let service =
        no_backoff(EmbeddingService::new(chain).expect("chain is non-empty")).with_retry_attempts(3);

    let embedded = service.generate_one("text").expect("third attempt succeeds");
    assert_eq!(embedded.provider, "flaky");
    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
}

#[test]
fn exhausted_chain_returns_the_last_error() {
    let chain: Vec<Arc<dyn EmbeddingProvider>> = vec![Arc::new(FailingProvider::new())];
    let service =
        no_backoff(EmbeddingService::new(chain).expect("chain is non-empty")).with_retry_attempts(2);

    let error = service.generate_one("text").expect_err("must fail");
    assert!(matches!(error, EmbeddingError::ProviderUnavailable { .. }));
}

#[test]
fn invalid_input_is_not_retried_or_failed_over() {
    let primary = Arc::new(FailingProvider::new());
    let chain: Vec<Arc<dyn EmbeddingProvider>> =
        vec![primary.clone(), Arc::new(StubProvider::new(8))];
    let service = no_backoff(EmbeddingService::new(chain).expect("chain is non-empty"));

    let error = service.generate_one("   ").expect_err("must fail");
    assert!(matches!(error, EmbeddingError::InvalidInput(_)));
    assert_eq!(primary.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn dimension_mismatch_is_a_hard_error() {
    let chain: Vec<Arc<dyn EmbeddingProvider>> =
        vec![Arc::new(LyingProvider), Arc::new(StubProvider::new(16))];
    let service = no_backoff(EmbeddingService::new(chain).expect("chain is non-empty"));

    let error = service.generate_one("text").expect_err("must fail");
    assert!(matches!(error, EmbeddingError::Dimension(_)));
}

#[test]
fn cache_prevents_repeat_provider_calls() {
    let stub = Arc::new(StubProvider::new(8));
    let cache = Arc::new(EmbeddingCache::new(16));
    let chain: Vec<Arc<dyn EmbeddingProvider>> = vec![stub.clone()];
    let service = EmbeddingService::new(chain)
        .expect("chain is non-empty")
        .with_cache(cache.clone());

    let first = service.generate_one("repeated text").expect("embeds");
    let second = service.generate_one("repeated text").expect("cache hit");

    assert_eq!(first, second);
    assert_eq!(stub.call_count(), 1);
    let (hits, _) = cache.stats();
    assert_eq!(hits, 1);
}

#[test]
fn batch_preserves_input_order() {
    let chain: Vec<Arc<dyn EmbeddingProvider>> = vec![Arc::new(StubProvider::new(8))];
    let service = EmbeddingService::new(chain).expect("chain is non-empty");
    let texts = vec!["alpha".to_string(), "beta".to_string(), "gamma".to_string()];
    let batch = service.generate_batch(&texts).expect("batch succeeds");

    let reference = StubProvider::new(8);
    for (text, vector) in texts.iter().zip(&batch.vectors) {
        assert_eq!(vector, &reference.generate_one(text).expect("embeds"));
    }
}

#[test]
fn batch_only_embeds_cache_misses() {
    let stub = Arc::new(StubProvider::new(8));
    let cache = Arc::new(EmbeddingCache::new(16));
    let chain: Vec<Arc<dyn EmbeddingProvider>> = vec![stub.clone()];
    let service = EmbeddingService::new(chain)
        .expect("chain is non-empty")
        .with_cache(cache);

    service.generate_one("alpha").expect("embeds");
    assert_eq!(stub.call_count(), 1);

    let texts = vec!["alpha".to_string(), "beta".to_string()];
    let batch = service.generate_batch(&texts).expect("batch succeeds");
    assert_eq!(batch.vectors.len(), 2);
    // Only "beta" was a miss.
    assert_eq!(stub.call_count(), 2);
}

#[test]
fn empty_batch_is_a_no_op() {
    let stub = Arc::new(StubProvider::new(8));
    let chain: Vec<Arc<dyn EmbeddingProvider>> = vec![stub.clone()];
    let service = EmbeddingService::new(chain).expect("chain is non-empty");
    let batch = service.generate_batch(&[]).expect("empty batch");
    assert!(batch.vectors.is_empty());
    assert_eq!(stub.call_count(), 0);
}

#[test]
fn batch_falls_over_to_the_secondary_provider() {
    let secondary = Arc::new(StubProvider::new(8));
    let chain: Vec<Arc<dyn EmbeddingProvider>> =
        vec![Arc::new(FailingProvider::new()), secondary];
    let service = no_backoff(EmbeddingService::new(chain).expect("chain is non-empty"));

    let texts = vec!["one".to_string(), "two".to_string()];
    let batch = service.generate_batch(&texts).expect("secondary services");
    assert_eq!(batch.provider, "stub");
    assert_eq!(batch.vectors.len(), 2);
}
