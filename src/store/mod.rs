#[cfg(test)]
mod tests;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::database::sqlite::{
    ChunkFilter, ChunkQueries, ChunkRecord, Database, IndexIdentity, IndexQueries, IndexRecord,
    NewChunk,
};
use crate::database::vectors::{VectorFile, VectorFileError};
use crate::vecmath::{self, DimensionMismatch};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("index {0} not found")]
    IndexNotFound(i64),

    #[error(transparent)]
    Dimension(#[from] DimensionMismatch),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    VectorFile(#[from] VectorFileError),

    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One scored hit from a brute-force scan, still tied to its index.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: ChunkRecord,
    pub score: f32,
    pub index_id: i64,
}

/// Durable multi-index repository of chunks and vectors.
///
/// Chunk text and metadata live in SQLite; vectors live in one binary file
/// per index. An append writes vector bytes first, commits the chunk rows
/// in a single transaction, and only then publishes the new vector count,
/// so concurrent readers observe each append either entirely or not at
/// all.
pub struct IndexStore {
    db: Database,
    vectors_dir: PathBuf,
    append_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl IndexStore {
    /// Open the store rooted at `data_dir`, creating layout on first use.
    #[inline]
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir).with_context(|| {
            format!("Failed to create data directory: {}", data_dir.display())
        })?;

        let db = Database::new(data_dir.join("metadata.db"))
            .await
            .context("Failed to open metadata database")?;

        Ok(Self {
            db,
            vectors_dir: data_dir.join("vectors"),
            append_locks: Mutex::new(HashMap::new()),
        })
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.db
    }

    #[inline]
    pub fn vectors_dir(&self) -> &Path {
        &self.vectors_dir
    }

    /// Idempotent index resolution: an identical identity tuple always maps
    /// to the same index, never a duplicate.
    #[inline]
    pub async fn create_or_get_index(
        &self,
        identity: &IndexIdentity,
    ) -> Result<IndexRecord, StoreError> {
        let record = IndexQueries::create_or_get(self.db.pool(), identity, None).await?;
        Ok(record)
    }

    /// Look up an index that must already exist.
    #[inline]
    pub async fn find_index(
        &self,
        identity: &IndexIdentity,
    ) -> Result<Option<IndexRecord>, StoreError> {
        Ok(IndexQueries::get_by_identity(self.db.pool(), identity).await?)
    }

    #[inline]
    pub async fn get_index(&self, index_id: i64) -> Result<IndexRecord, StoreError> {
        IndexQueries::get_by_id(self.db.pool(), index_id)
            .await?
            .ok_or(StoreError::IndexNotFound(index_id))
    }

    #[inline]
    pub async fn list_indexes_for_document(
        &self,
        document_id: &str,
    ) -> Result<Vec<IndexRecord>, StoreError> {
        Ok(IndexQueries::list_for_document(self.db.pool(), document_id).await?)
    }

    #[inline]
    pub async fn list_all_indexes(&self) -> Result<Vec<IndexRecord>, StoreError> {
        Ok(IndexQueries::list_all(self.db.pool()).await?)
    }

    /// Chunk rows of one index passing the filter, in ordinal order.
    #[inline]
    pub async fn list_chunks(
        &self,
        index_id: i64,
        filter: &ChunkFilter,
    ) -> Result<Vec<ChunkRecord>, StoreError> {
        self.get_index(index_id).await?;
        let chunks = ChunkQueries::list_for_index(self.db.pool(), index_id).await?;
        if filter.is_empty() {
            return Ok(chunks);
        }
        Ok(chunks
            .into_iter()
            .filter(|chunk| {
                (!filter.argument_markers_only || chunk.has_argument_marker)
                    && filter
                        .ordinal_range
                        .is_none_or(|(low, high)| chunk.ordinal >= low && chunk.ordinal <= high)
            })
            .collect())
    }

    #[inline]
    pub async fn chunk_count(&self, index_id: i64) -> Result<i64, StoreError> {
        self.get_index(index_id).await?;
        Ok(ChunkQueries::count_for_index(self.db.pool(), index_id).await?)
    }

    /// Append chunk/vector pairs atomically.
    ///
    /// Every vector is validated against the index's declared dimension
    /// before anything is written; a mismatch fails the whole call. On a
    /// transaction failure the already-written vector tail is trimmed back
    /// so the file matches the committed rows.
    #[inline]
    pub async fn append_chunks_and_vectors(
        &self,
        index_id: i64,
        items: &[(NewChunk, Vec<f32>)],
    ) -> Result<(), StoreError> {
        if items.is_empty() {
            return Ok(());
        }

        let index = self.get_index(index_id).await?;
        let dimensions = index.dimensions as usize;
        for (_, vector) in items {
            if vector.len() != dimensions {
                return Err(DimensionMismatch {
                    expected: dimensions,
                    actual: vector.len(),
                }
                .into());
            }
        }

        let lock = self.append_lock(index_id).await;
        let _guard = lock.lock().await;

        let mut vector_file =
            VectorFile::open_or_create(&self.vectors_dir, index_id, dimensions)?;

        let records: Vec<(u32, &[f32])> = items
            .iter()
            .map(|(chunk, vector)| (chunk.ordinal as u32, vector.as_slice()))
            .collect();
        vector_file.append_records(&records)?;

        let tx_result: Result<(), sqlx::Error> = async {
            let mut tx = self.db.pool().begin().await?;
            for (chunk, _) in items {
                ChunkQueries::insert(&mut tx, index_id, chunk).await?;
            }
            IndexQueries::record_appended(&mut tx, index_id, items.len() as i64).await?;
            tx.commit().await
        }
        .await;

        if let Err(error) = tx_result {
            // Roll the vector file back to the committed prefix.
            let _ = vector_file.truncate_to_published();
            return Err(error.into());
        }

        vector_file.publish()?;

        debug!(
            "appended {} chunks to index {} ({} total)",
            items.len(),
            index_id,
            index.total_chunks + items.len() as i64
        );
        Ok(())
    }

    /// Brute-force cosine scan of one index.
    ///
    /// The filter narrows candidates by chunk metadata before any scoring
    /// happens. Results come back sorted by descending score, at most
    /// `limit` of them.
    #[inline]
    pub async fn search_similar(
        &self,
        index_id: i64,
        query: &[f32],
        limit: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let index = self.get_index(index_id).await?;
        let dimensions = index.dimensions as usize;
        if query.len() != dimensions {
            return Err(DimensionMismatch {
                expected: dimensions,
                actual: query.len(),
            }
            .into());
        }
        if limit == 0 || !VectorFile::exists(&self.vectors_dir, index_id) {
            return Ok(Vec::new());
        }

        let candidates: Option<HashSet<u32>> = if filter.is_empty() {
            None
        } else {
            let ordinals = ChunkQueries::ordinals_matching(self.db.pool(), index_id, filter).await?;
            Some(ordinals.into_iter().map(|o| o as u32).collect())
        };

        // Min-heap of the best `limit` scores seen so far.
        let mut heap: BinaryHeap<Reverse<HeapEntry>> = BinaryHeap::with_capacity(limit + 1);
        let mut vector_file = VectorFile::open(&self.vectors_dir, index_id)?;
        let mut scan_error = None;
        vector_file.for_each(|ordinal, values| {
            if let Some(wanted) = &candidates {
                if !wanted.contains(&ordinal) {
                    return;
                }
            }
            match vecmath::cosine_similarity(query, values) {
                Ok(score) => {
                    heap.push(Reverse(HeapEntry { score, ordinal }));
                    if heap.len() > limit {
                        heap.pop();
                    }
                }
                Err(error) => {
                    if scan_error.is_none() {
                        scan_error = Some(error);
                    }
                }
            }
        })?;
        if let Some(error) = scan_error {
            return Err(error.into());
        }

        let mut hits: Vec<HeapEntry> = heap.into_iter().map(|Reverse(entry)| entry).collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));

        let ordinals: Vec<i64> = hits.iter().map(|h| i64::from(h.ordinal)).collect();
        let chunks = ChunkQueries::by_ordinals(self.db.pool(), index_id, &ordinals).await?;
        let by_ordinal: HashMap<i64, ChunkRecord> =
            chunks.into_iter().map(|c| (c.ordinal, c)).collect();

        let results = hits
            .into_iter()
            .filter_map(|hit| {
                by_ordinal.get(&i64::from(hit.ordinal)).map(|chunk| ScoredChunk {
                    chunk: chunk.clone(),
                    score: hit.score,
                    index_id,
                })
            })
            .collect();
        Ok(results)
    }

    /// Delete an index, its chunks (cascading) and its vector file.
    ///
    /// Other indexes over the same document are untouched.
    #[inline]
    pub async fn delete_index(&self, index_id: i64) -> Result<(), StoreError> {
        let index = self.get_index(index_id).await?;

        let lock = self.append_lock(index_id).await;
        let _guard = lock.lock().await;

        IndexQueries::delete(self.db.pool(), index_id).await?;
        VectorFile::delete(&self.vectors_dir, index_id)?;
        self.append_locks.lock().await.remove(&index_id);

        info!("deleted index {} ({})", index_id, index.identity());
        Ok(())
    }

    async fn append_lock(&self, index_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.append_locks.lock().await;
        locks.entry(index_id).or_default().clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct HeapEntry {
    score: f32,
    ordinal: u32,
}

impl Eq for HeapEntry {}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.ordinal.cmp(&other.ordinal))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
