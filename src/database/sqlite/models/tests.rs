use super::*;

#[test]
fn new_chunk_from_text_chunk() {
    let text_chunk = TextChunk {
        ordinal: 3,
        start_offset: 800,
        end_offset: 1800,
        text: "Therefore the conclusion holds.".to_string(),
        has_argument_marker: true,
    };
    let new_chunk = NewChunk::from(&text_chunk);
    assert_eq!(new_chunk.ordinal, 3);
    assert_eq!(new_chunk.start_offset, 800);
    assert_eq!(new_chunk.end_offset, 1800);
    assert!(new_chunk.has_argument_marker);
    assert_eq!(new_chunk.content, "Therefore the conclusion holds.");
}

#[test]
fn identity_display_is_compact() {
    let identity = IndexIdentity {
        document_id: "critique".to_string(),
        provider_name: "openai".to_string(),
        model_id: "text-embedding-3-small".to_string(),
        dimensions: 1536,
        chunk_size: 1000,
        chunk_overlap: 200,
    };
    let rendered = identity.to_string();
    assert!(rendered.contains("critique"));
    assert!(rendered.contains("1536d"));
}

#[test]
fn record_identity_round_trip() {
    let record = IndexRecord {
        id: 1,
        document_id: "doc".to_string(),
        provider_name: "stub".to_string(),
        model_id: "stub-deterministic".to_string(),
        dimensions: 64,
        chunk_size: 500,
        chunk_overlap: 100,
        total_chunks: 0,
        metadata: None,
        created_date: chrono::Utc::now().naive_utc(),
        updated_date: chrono::Utc::now().naive_utc(),
    };
    let identity = record.identity();
    assert_eq!(identity.document_id, "doc");
    assert_eq!(identity.dimensions, 64);
}
