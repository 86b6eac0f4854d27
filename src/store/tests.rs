use super::*;
use tempfile::TempDir;

async fn test_store() -> (IndexStore, TempDir) {
    let dir = TempDir::new().expect("temp dir");
    let store = IndexStore::open(dir.path()).await.expect("store opens");
    (store, dir)
}

fn identity(document_id: &str, dimensions: i64) -> IndexIdentity {
    IndexIdentity {
        document_id: document_id.to_string(),
        provider_name: "stub".to_string(),
        model_id: "stub-deterministic".to_string(),
        dimensions,
        chunk_size: 100,
        chunk_overlap: 20,
    }
}

fn item(ordinal: i64, content: &str, vector: Vec<f32>) -> (NewChunk, Vec<f32>) {
    (
        NewChunk {
            ordinal,
            start_offset: ordinal * 80,
            end_offset: ordinal * 80 + 100,
            content: content.to_string(),
            has_argument_marker: content.to_lowercase().contains("therefore"),
        },
        vector,
    )
}

#[tokio::test]
async fn create_or_get_never_duplicates() {
    let (store, _dir) = test_store().await;
    let first = store
        .create_or_get_index(&identity("doc", 4))
        .await
        .expect("create");
    let second = store
        .create_or_get_index(&identity("doc", 4))
        .await
        .expect("reuse");
    assert_eq!(first.id, second.id);
    assert_eq!(store.list_all_indexes().await.expect("list").len(), 1);
}

#[tokio::test]
async fn vector_round_trip_within_f32_precision() {
    let (store, dir) = test_store().await;
    let index = store
        .create_or_get_index(&identity("doc", 3))
        .await
        .expect("create");

    let original = vec![0.123_456_79_f32, -0.987_654_3, 3.141_592_7];
    store
        .append_chunks_and_vectors(index.id, &[item(0, "text", original.clone())])
        .await
        .expect("append");

    let mut file = VectorFile::open(&dir.path().join("vectors"), index.id).expect("open file");
    let read = file
        .read_vector(0)
        .expect("read succeeds")
        .expect("vector exists");
    assert_eq!(read, original);
}

#[tokio::test]
async fn append_rejects_wrong_dimension_entirely() {
    let (store, _dir) = test_store().await;
    let index = store
        .create_or_get_index(&identity("doc", 3))
        .await
        .expect("create");

    let items = vec![
        item(0, "good", vec![1.0, 0.0, 0.0]),
        item(1, "bad", vec![1.0, 0.0]),
    ];
    let error = store
        .append_chunks_and_vectors(index.id, &items)
        .await
        .expect_err("must fail");
    assert!(matches!(error, StoreError::Dimension(_)));

    // Nothing from the failed call is visible.
    assert_eq!(store.chunk_count(index.id).await.expect("count"), 0);
}

#[tokio::test]
async fn search_returns_descending_scores_capped_at_limit() {
    let (store, _dir) = test_store().await;
    let index = store
        .create_or_get_index(&identity("doc", 2))
        .await
        .expect("create");

    // Vectors at varying angles from the query direction (1, 0).
    let items = vec![
        item(0, "exact", vec![1.0, 0.0]),
        item(1, "close", vec![0.9, 0.1]),
        item(2, "orthogonal", vec![0.0, 1.0]),
        item(3, "opposite", vec![-1.0, 0.0]),
        item(4, "near", vec![0.8, 0.3]),
    ];
    store
        .append_chunks_and_vectors(index.id, &items)
        .await
        .expect("append");

    let results = store
        .search_similar(index.id, &[1.0, 0.0], 3, &ChunkFilter::default())
        .await
        .expect("search");

    assert_eq!(results.len(), 3);
    for pair in results.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    assert_eq!(results[0].chunk.content, "exact");
    assert!((results[0].score - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn search_rejects_mismatched_query_dimension() {
    let (store, _dir) = test_store().await;
    let index = store
        .create_or_get_index(&identity("doc", 3))
        .await
        .expect("create");

    let error = store
        .search_similar(index.id, &[1.0, 0.0], 5, &ChunkFilter::default())
        .await
        .expect_err("must fail");
    assert!(matches!(error, StoreError::Dimension(_)));
}

#[tokio::test]
async fn dimension_isolation_between_indexes() {
    let (store, _dir) = test_store().await;
    let narrow = store
        .create_or_get_index(&identity("doc", 2))
        .await
        .expect("create narrow");
    let wide = store
        .create_or_get_index(&identity("doc", 4))
        .await
        .expect("create wide");
    assert_ne!(narrow.id, wide.id);

    store
        .append_chunks_and_vectors(narrow.id, &[item(0, "narrow chunk", vec![1.0, 0.0])])
        .await
        .expect("append narrow");
    store
        .append_chunks_and_vectors(wide.id, &[item(0, "wide chunk", vec![1.0, 0.0, 0.0, 0.0])])
        .await
        .expect("append wide");

    let results = store
        .search_similar(narrow.id, &[1.0, 0.0], 10, &ChunkFilter::default())
        .await
        .expect("search narrow");

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.content, "narrow chunk");
    assert!(results.iter().all(|r| r.index_id == narrow.id));
}

#[tokio::test]
async fn filters_narrow_before_scoring() {
    let (store, _dir) = test_store().await;
    let index = store
        .create_or_get_index(&identity("doc", 2))
        .await
        .expect("create");

    let items = vec![
        item(0, "Plain best match", vec![1.0, 0.0]),
        item(1, "Therefore a marked chunk", vec![0.5, 0.5]),
    ];
    store
        .append_chunks_and_vectors(index.id, &items)
        .await
        .expect("append");

    let filter = ChunkFilter {
        argument_markers_only: true,
        ordinal_range: None,
    };
    let results = store
        .search_similar(index.id, &[1.0, 0.0], 10, &filter)
        .await
        .expect("search");

    // The better-scoring unmarked chunk is excluded by the filter.
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].chunk.ordinal, 1);
}

#[tokio::test]
async fn delete_cascades_and_spares_siblings() {
    let (store, dir) = test_store().await;
    let doomed = store
        .create_or_get_index(&identity("doc", 2))
        .await
        .expect("create");
    let sibling = store
        .create_or_get_index(&identity("doc", 4))
        .await
        .expect("create sibling");

    store
        .append_chunks_and_vectors(doomed.id, &[item(0, "going away", vec![1.0, 0.0])])
        .await
        .expect("append");
    store
        .append_chunks_and_vectors(sibling.id, &[item(0, "staying", vec![1.0, 0.0, 0.0, 0.0])])
        .await
        .expect("append sibling");

    store.delete_index(doomed.id).await.expect("delete");

    let error = store.get_index(doomed.id).await.expect_err("gone");
    assert!(matches!(error, StoreError::IndexNotFound(_)));
    assert!(!VectorFile::exists(&dir.path().join("vectors"), doomed.id));

    // The other index over the same document is untouched.
    assert_eq!(store.chunk_count(sibling.id).await.expect("count"), 1);
    let survivors = store
        .list_indexes_for_document("doc")
        .await
        .expect("list");
    assert_eq!(survivors.len(), 1);
    assert_eq!(survivors[0].id, sibling.id);
}

#[tokio::test]
async fn append_to_unknown_index_is_index_not_found() {
    let (store, _dir) = test_store().await;
    let error = store
        .append_chunks_and_vectors(999, &[item(0, "text", vec![1.0])])
        .await
        .expect_err("must fail");
    assert!(matches!(error, StoreError::IndexNotFound(999)));
}

#[tokio::test]
async fn empty_index_searches_empty() {
    let (store, _dir) = test_store().await;
    let index = store
        .create_or_get_index(&identity("doc", 2))
        .await
        .expect("create");
    let results = store
        .search_similar(index.id, &[1.0, 0.0], 5, &ChunkFilter::default())
        .await
        .expect("search");
    assert!(results.is_empty());
}

#[tokio::test]
async fn sequential_appends_accumulate() {
    let (store, _dir) = test_store().await;
    let index = store
        .create_or_get_index(&identity("doc", 2))
        .await
        .expect("create");

    store
        .append_chunks_and_vectors(index.id, &[item(0, "first", vec![1.0, 0.0])])
        .await
        .expect("append one");
    store
        .append_chunks_and_vectors(index.id, &[item(1, "second", vec![0.0, 1.0])])
        .await
        .expect("append two");

    assert_eq!(store.chunk_count(index.id).await.expect("count"), 2);
    let refreshed = store.get_index(index.id).await.expect("get");
    assert_eq!(refreshed.total_chunks, 2);

    let results = store
        .search_similar(index.id, &[0.0, 1.0], 10, &ChunkFilter::default())
        .await
        .expect("search");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].chunk.content, "second");
}
