#[cfg(test)]
mod tests;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::chunking::TextChunk;

/// The identity tuple of an index. Unique: requesting indexing twice with
/// identical parameters reuses the existing index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexIdentity {
    pub document_id: String,
    pub provider_name: String,
    pub model_id: String,
    pub dimensions: i64,
    pub chunk_size: i64,
    pub chunk_overlap: i64,
}

impl std::fmt::Display for IndexIdentity {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}/{}@{}d (chunks {}/{})",
            self.document_id,
            self.provider_name,
            self.model_id,
            self.dimensions,
            self.chunk_size,
            self.chunk_overlap
        )
    }
}

/// A persisted index row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct IndexRecord {
    pub id: i64,
    pub document_id: String,
    pub provider_name: String,
    pub model_id: String,
    pub dimensions: i64,
    pub chunk_size: i64,
    pub chunk_overlap: i64,
    pub total_chunks: i64,
    pub metadata: Option<String>,
    pub created_date: NaiveDateTime,
    pub updated_date: NaiveDateTime,
}

impl IndexRecord {
    #[inline]
    pub fn identity(&self) -> IndexIdentity {
        IndexIdentity {
            document_id: self.document_id.clone(),
            provider_name: self.provider_name.clone(),
            model_id: self.model_id.clone(),
            dimensions: self.dimensions,
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
        }
    }
}

/// A persisted chunk row. Vectors live in the index's binary file, keyed by
/// `ordinal`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ChunkRecord {
    pub id: i64,
    pub index_id: i64,
    pub ordinal: i64,
    pub start_offset: i64,
    pub end_offset: i64,
    pub content: String,
    pub has_argument_marker: bool,
    pub indexed_date: NaiveDateTime,
}

/// A chunk about to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChunk {
    pub ordinal: i64,
    pub start_offset: i64,
    pub end_offset: i64,
    pub content: String,
    pub has_argument_marker: bool,
}

impl From<&TextChunk> for NewChunk {
    #[inline]
    fn from(chunk: &TextChunk) -> Self {
        Self {
            ordinal: chunk.ordinal as i64,
            start_offset: chunk.start_offset as i64,
            end_offset: chunk.end_offset as i64,
            content: chunk.text.clone(),
            has_argument_marker: chunk.has_argument_marker,
        }
    }
}
