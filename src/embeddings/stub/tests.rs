use super::*;
use crate::vecmath::{NormOrder, cosine_similarity, norm};

#[test]
fn identical_text_embeds_identically() {
    let provider = StubProvider::new(16);
    let a = provider.generate_one("the same text").expect("embed");
    let b = provider.generate_one("the same text").expect("embed");
    assert_eq!(a, b);
}

#[test]
fn different_text_embeds_differently() {
    let provider = StubProvider::new(16);
    let a = provider.generate_one("one text").expect("embed");
    let b = provider.generate_one("another text").expect("embed");
    assert_ne!(a, b);
    let similarity = cosine_similarity(&a, &b).expect("equal lengths");
    assert!(similarity < 0.99);
}

#[test]
fn vectors_are_unit_length() {
    let provider = StubProvider::new(64);
    let v = provider.generate_one("anything").expect("embed");
    assert_eq!(v.len(), 64);
    assert!((norm(&v, NormOrder::L2) - 1.0).abs() < 1e-5);
}

#[test]
fn dimension_larger_than_one_digest() {
    let provider = StubProvider::new(100);
    let v = provider.generate_one("needs two digest blocks").expect("embed");
    assert_eq!(v.len(), 100);
}

#[test]
fn model_id_changes_the_embedding() {
    let a = StubProvider::new(8).generate_one("text").expect("embed");
    let b = StubProvider::new(8)
        .with_model("other-model")
        .generate_one("text")
        .expect("embed");
    assert_ne!(a, b);
}

#[test]
fn batch_default_counts_every_text() {
    let provider = StubProvider::new(8);
    let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let vectors = provider.generate_batch(&texts).expect("batch");
    assert_eq!(vectors.len(), 3);
    assert_eq!(provider.call_count(), 3);
}

#[test]
fn empty_text_is_rejected() {
    let provider = StubProvider::new(8);
    let error = provider.generate_one("").expect_err("must fail");
    assert!(matches!(error, EmbeddingError::InvalidInput(_)));
    assert_eq!(provider.call_count(), 0);
}
