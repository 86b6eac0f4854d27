use super::*;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(endpoint: String) -> GeminiConfig {
    GeminiConfig {
        endpoint,
        api_key: Some("gm-key".to_string()),
        model: "text-embedding-004".to_string(),
        default_dimensions: 3,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_results_are_positional() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/text-embedding-004:batchEmbedContents"))
        .and(query_param("key", "gm-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [
                { "values": [1.0, 0.0, 0.0] },
                { "values": [0.0, 1.0, 0.0] },
            ]
        })))
        .mount(&server)
        .await;

    let provider = GeminiProvider::new(
        &test_config(server.uri() + "/"),
        None,
        std::time::Duration::from_secs(5),
    )
    .expect("provider construction");

    let texts = vec!["alpha".to_string(), "beta".to_string()];
    let vectors = provider.generate_batch(&texts).expect("batch succeeds");
    assert_eq!(vectors[0], vec![1.0, 0.0, 0.0]);
    assert_eq!(vectors[1], vec![0.0, 1.0, 0.0]);
}

#[tokio::test(flavor = "multi_thread")]
async fn throttling_maps_to_rate_limited() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let provider = GeminiProvider::new(
        &test_config(server.uri() + "/"),
        None,
        std::time::Duration::from_secs(5),
    )
    .expect("provider construction");

    let error = provider.generate_one("text").expect_err("must fail");
    assert!(matches!(error, EmbeddingError::RateLimited { .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_embeddings_are_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [] })))
        .mount(&server)
        .await;

    let provider = GeminiProvider::new(
        &test_config(server.uri() + "/"),
        None,
        std::time::Duration::from_secs(5),
    )
    .expect("provider construction");

    let error = provider.generate_one("text").expect_err("must fail");
    assert!(matches!(error, EmbeddingError::ProviderUnavailable { .. }));
}

#[test]
fn dimension_override_bounds_are_enforced() {
    assert!(
        GeminiProvider::new(
            &test_config("http://localhost:1/".to_string()),
            Some(0),
            std::time::Duration::from_secs(1),
        )
        .is_err()
    );
    let provider = GeminiProvider::new(
        &test_config("http://localhost:1/".to_string()),
        Some(256),
        std::time::Duration::from_secs(1),
    )
    .expect("in-range override");
    assert_eq!(provider.dimensions(), 256);
}
