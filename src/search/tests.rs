use super::*;
use std::sync::Arc;

use tempfile::TempDir;

use crate::database::sqlite::{IndexIdentity, NewChunk};
use crate::embeddings::{EmbeddingProvider, EmbeddingService, StubProvider};
use crate::library::FsLibrary;
use crate::store::IndexStore;
use crate::vecmath;

const DIMS: usize = 8;

struct Fixture {
    store: Arc<IndexStore>,
    engine: SearchEngine,
    _data_dir: TempDir,
    library_dir: TempDir,
}

async fn fixture() -> Fixture {
    let data_dir = TempDir::new().expect("data dir");
    let library_dir = TempDir::new().expect("library dir");

    let store = Arc::new(IndexStore::open(data_dir.path()).await.expect("store opens"));
    let chain: Vec<Arc<dyn EmbeddingProvider>> = vec![Arc::new(StubProvider::new(DIMS))];
    let service = Arc::new(EmbeddingService::new(chain).expect("chain is non-empty"));
    let library = Arc::new(FsLibrary::new(library_dir.path()));
    let engine = SearchEngine::new(
        store.clone(),
        service,
        library,
        SearchOptions::default(),
    );

    Fixture {
        store,
        engine,
        _data_dir: data_dir,
        library_dir,
    }
}

fn identity(document_id: &str) -> IndexIdentity {
    IndexIdentity {
        document_id: document_id.to_string(),
        provider_name: "stub".to_string(),
        model_id: "stub-deterministic".to_string(),
        dimensions: DIMS as i64,
        chunk_size: 100,
        chunk_overlap: 20,
    }
}

/// Embed like the engine's provider does, for constructing test vectors.
fn embed(text: &str) -> Vec<f32> {
    StubProvider::new(DIMS)
        .generate_one(text)
        .expect("stub embeds")
}

/// A unit vector orthogonal to `v`.
fn orthogonal_to(v: &[f32]) -> Vec<f32> {
    let mut basis = vec![0.0f32; v.len()];
    basis[0] = 1.0;
    let projection = vecmath::dot(&basis, v).expect("equal lengths");
    let perp: Vec<f32> = basis
        .iter()
        .zip(v)
        .map(|(b, x)| b - projection * x)
        .collect();
    vecmath::normalize(&perp)
}

/// A unit vector at the given cosine from unit vector `v`.
fn at_cosine(v: &[f32], cosine: f32) -> Vec<f32> {
    let perp = orthogonal_to(v);
    let sine = (1.0 - cosine * cosine).sqrt();
    v.iter()
        .zip(&perp)
        .map(|(x, p)| cosine * x + sine * p)
        .collect()
}

async fn append(
    fixture: &Fixture,
    document_id: &str,
    rows: Vec<(&str, Vec<f32>)>,
) -> i64 {
    let index = fixture
        .store
        .create_or_get_index(&identity(document_id))
        .await
        .expect("create index");
    let start = fixture
        .store
        .chunk_count(index.id)
        .await
        .expect("chunk count");
    let items: Vec<(NewChunk, Vec<f32>)> = rows
        .into_iter()
        .enumerate()
        .map(|(i, (content, vector))| {
            (
                NewChunk {
                    ordinal: start + i as i64,
                    start_offset: (start + i as i64) * 100,
                    end_offset: (start + i as i64) * 100 + 100,
                    content: content.to_string(),
                    has_argument_marker: false,
                },
                vector,
            )
        })
        .collect();
    fixture
        .store
        .append_chunks_and_vectors(index.id, &items)
        .await
        .expect("append");
    index.id
}

fn write_doc(fixture: &Fixture, name: &str, content: &str) {
    std::fs::write(fixture.library_dir.path().join(name), content).expect("write document");
}

#[tokio::test]
async fn semantic_search_ranks_by_similarity_and_applies_threshold() {
    let fixture = fixture().await;
    let query_vector = embed("the eternal recurrence");

    append(
        &fixture,
        "doc",
        vec![
            ("strong match", at_cosine(&query_vector, 0.95)),
            ("weak match", at_cosine(&query_vector, 0.5)),
            ("unrelated", orthogonal_to(&query_vector)),
        ],
    )
    .await;

    let request = SearchRequest::new("the eternal recurrence", SearchMode::Semantic);
    let hits = fixture.engine.search(&request).await.expect("search");

    // The orthogonal chunk falls below the similarity threshold.
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk.content, "strong match");
    assert_eq!(hits[1].chunk.content, "weak match");
    assert!(hits[0].score > hits[1].score);
}

#[tokio::test]
async fn minimum_score_floor_is_applied_after_scoring() {
    let fixture = fixture().await;
    let query_vector = embed("query");

    append(
        &fixture,
        "doc",
        vec![
            ("high", at_cosine(&query_vector, 0.97)),
            ("mid", at_cosine(&query_vector, 0.6)),
        ],
    )
    .await;

    let request =
        SearchRequest::new("query", SearchMode::Semantic).with_minimum_score(0.9);
    let hits = fixture.engine.search(&request).await.expect("search");

    assert_eq!(hits.len(), 1);
    assert!(hits.iter().all(|h| h.score >= 0.9));
}

#[tokio::test]
async fn limit_caps_the_result_count() {
    let fixture = fixture().await;
    let query_vector = embed("query");

    let rows: Vec<(&str, Vec<f32>)> = (0..6)
        .map(|i| ("filler", at_cosine(&query_vector, 0.9 - 0.05 * i as f32)))
        .collect();
    append(&fixture, "doc", rows).await;

    let request = SearchRequest::new("query", SearchMode::Semantic).with_limit(3);
    let hits = fixture.engine.search(&request).await.expect("search");
    assert_eq!(hits.len(), 3);
}

#[tokio::test]
async fn hybrid_combines_vector_and_lexical_scores_with_default_weights() {
    let fixture = fixture().await;
    let query = "the eternal recurrence";
    let query_vector = embed(query);

    // One chunk matches only by vector (0.9 cosine, zero term overlap); the
    // other only lexically (orthogonal vector, full term coverage).
    append(
        &fixture,
        "doc",
        vec![
            ("amor fati, said differently", at_cosine(&query_vector, 0.9)),
            ("the eternal recurrence", orthogonal_to(&query_vector)),
        ],
    )
    .await;

    let request = SearchRequest::new(query, SearchMode::Hybrid);
    let hits = fixture.engine.search(&request).await.expect("search");

    assert_eq!(hits.len(), 2);
    // 0.7 × 0.9 = 0.63 beats 0.3 × 1.0 = 0.30 under the default weighting.
    assert_eq!(hits[0].chunk.content, "amor fati, said differently");
    assert!((hits[0].score - 0.63).abs() < 0.01);
    assert_eq!(hits[1].chunk.content, "the eternal recurrence");
    assert!((hits[1].score - 0.30).abs() < 0.01);
}

#[tokio::test]
async fn genealogical_orders_by_publication_date_then_score() {
    let fixture = fixture().await;
    let query_vector = embed("query");

    write_doc(&fixture, "late.txt", "Date: 1887\n\nLater text.");
    write_doc(&fixture, "early.txt", "Date: 1781\n\nEarlier text.");
    write_doc(&fixture, "undated.txt", "No headers here.");

    append(&fixture, "late", vec![("late chunk", at_cosine(&query_vector, 0.99))]).await;
    append(&fixture, "early", vec![("early chunk", at_cosine(&query_vector, 0.8))]).await;
    append(
        &fixture,
        "undated",
        vec![("undated chunk", at_cosine(&query_vector, 0.9))],
    )
    .await;

    let request = SearchRequest::new("query", SearchMode::Genealogical);
    let hits = fixture.engine.search(&request).await.expect("search");

    let order: Vec<&str> = hits.iter().map(|h| h.chunk.content.as_str()).collect();
    // Chronological ascending, undated last; not score order.
    assert_eq!(order, vec!["early chunk", "late chunk", "undated chunk"]);
}

#[tokio::test]
async fn genealogical_breaks_date_ties_by_score() {
    let fixture = fixture().await;
    let query_vector = embed("query");

    write_doc(&fixture, "a.txt", "Date: 1807\n\nA.");
    write_doc(&fixture, "b.txt", "Date: 1807\n\nB.");

    append(&fixture, "a", vec![("weaker", at_cosine(&query_vector, 0.6))]).await;
    append(&fixture, "b", vec![("stronger", at_cosine(&query_vector, 0.95))]).await;

    let request = SearchRequest::new("query", SearchMode::Genealogical);
    let hits = fixture.engine.search(&request).await.expect("search");

    let order: Vec<&str> = hits.iter().map(|h| h.chunk.content.as_str()).collect();
    assert_eq!(order, vec!["stronger", "weaker"]);
}

#[tokio::test]
async fn dialectical_tags_hits_with_their_probe() {
    let fixture = fixture().await;
    let query = "the presence of being";
    let opposing = "the absence of being";

    append(
        &fixture,
        "doc",
        vec![
            ("direct hit", embed(query)),
            ("opposing hit", embed(opposing)),
        ],
    )
    .await;

    let request = SearchRequest::new(query, SearchMode::Dialectical)
        .with_opposing_query(opposing);
    let hits = fixture.engine.search(&request).await.expect("search");

    assert_eq!(hits.len(), 2);
    let direct = hits
        .iter()
        .find(|h| h.chunk.content == "direct hit")
        .expect("direct hit present");
    assert_eq!(direct.matched_probe, Some(Probe::Direct));
    let opposed = hits
        .iter()
        .find(|h| h.chunk.content == "opposing hit")
        .expect("opposing hit present");
    assert_eq!(opposed.matched_probe, Some(Probe::Opposing));
}

#[tokio::test]
async fn document_scope_restricts_results() {
    let fixture = fixture().await;
    let query_vector = embed("query");

    append(&fixture, "wanted", vec![("in scope", at_cosine(&query_vector, 0.9))]).await;
    append(
        &fixture,
        "other",
        vec![("out of scope", at_cosine(&query_vector, 0.95))],
    )
    .await;

    let request = SearchRequest::new("query", SearchMode::Semantic)
        .with_scope(SearchScope::Document("wanted".to_string()));
    let hits = fixture.engine.search(&request).await.expect("search");

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document_id, "wanted");
}

#[tokio::test]
async fn document_scope_without_matching_index_suggests_existing_ones() {
    let fixture = fixture().await;

    // An index exists for the document, but under a different dimension, so
    // the active configuration cannot use it.
    let mut other = identity("doc");
    other.dimensions = 4;
    fixture
        .store
        .create_or_get_index(&other)
        .await
        .expect("create");

    let request = SearchRequest::new("query", SearchMode::Semantic)
        .with_scope(SearchScope::Document("doc".to_string()));
    let error = fixture.engine.search(&request).await.expect_err("must fail");

    match &error {
        SearchError::NoMatchingIndex { existing, .. } => {
            assert_eq!(existing.len(), 1);
            assert!(existing[0].contains("4d"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    // The message names the existing indexes for the user.
    assert!(error.to_string().contains("4d"));
}

#[tokio::test]
async fn library_scope_with_no_indexes_is_empty_not_an_error() {
    let fixture = fixture().await;
    let request = SearchRequest::new("query", SearchMode::Semantic);
    let hits = fixture.engine.search(&request).await.expect("search");
    assert!(hits.is_empty());
}

#[test]
fn negation_probe_swaps_antonyms_and_negates() {
    let probes = NegationProbe.derive("the presence of eternal truth");
    assert!(probes.iter().any(|p| p.contains("absence")));
    assert!(probes.iter().any(|p| p.contains("temporal")));
    assert!(probes.iter().any(|p| p.contains("opposite of")));
}

#[test]
fn search_mode_parses_from_str() {
    assert_eq!("semantic".parse::<SearchMode>(), Ok(SearchMode::Semantic));
    assert_eq!("Hybrid".parse::<SearchMode>(), Ok(SearchMode::Hybrid));
    assert!("unknown".parse::<SearchMode>().is_err());
}
