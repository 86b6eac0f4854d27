use chrono::Utc;
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::debug;

use super::models::{ChunkRecord, IndexIdentity, IndexRecord, NewChunk};

const INDEX_COLUMNS: &str = "id, document_id, provider_name, model_id, dimensions, chunk_size, \
                             chunk_overlap, total_chunks, metadata, created_date, updated_date";

const CHUNK_COLUMNS: &str =
    "id, index_id, ordinal, start_offset, end_offset, content, has_argument_marker, indexed_date";

/// Chunk-level candidate narrowing applied before similarity scoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkFilter {
    /// Only chunks tagged with an argument marker.
    pub argument_markers_only: bool,
    /// Only chunks whose ordinal falls within this inclusive range.
    pub ordinal_range: Option<(i64, i64)>,
}

impl ChunkFilter {
    /// Whether the filter excludes nothing.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.argument_markers_only && self.ordinal_range.is_none()
    }
}

pub struct IndexQueries;

impl IndexQueries {
    /// Insert the identity if it is new, then fetch the row either way.
    #[inline]
    pub async fn create_or_get(
        pool: &SqlitePool,
        identity: &IndexIdentity,
        metadata: Option<&str>,
    ) -> Result<IndexRecord, sqlx::Error> {
        let now = Utc::now().naive_utc();
        let inserted = sqlx::query(
            "INSERT INTO indexes (document_id, provider_name, model_id, dimensions, chunk_size, \
             chunk_overlap, total_chunks, metadata, created_date, updated_date) \
             VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?) \
             ON CONFLICT(document_id, provider_name, model_id, dimensions, chunk_size, chunk_overlap) \
             DO NOTHING",
        )
        .bind(&identity.document_id)
        .bind(&identity.provider_name)
        .bind(&identity.model_id)
        .bind(identity.dimensions)
        .bind(identity.chunk_size)
        .bind(identity.chunk_overlap)
        .bind(metadata)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await?
        .rows_affected();

        if inserted > 0 {
            debug!("created index for {identity}");
        }

        Self::get_by_identity(pool, identity)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    #[inline]
    pub async fn get_by_id(
        pool: &SqlitePool,
        id: i64,
    ) -> Result<Option<IndexRecord>, sqlx::Error> {
        sqlx::query_as::<_, IndexRecord>(&format!(
            "SELECT {INDEX_COLUMNS} FROM indexes WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    #[inline]
    pub async fn get_by_identity(
        pool: &SqlitePool,
        identity: &IndexIdentity,
    ) -> Result<Option<IndexRecord>, sqlx::Error> {
        sqlx::query_as::<_, IndexRecord>(&format!(
            "SELECT {INDEX_COLUMNS} FROM indexes \
             WHERE document_id = ? AND provider_name = ? AND model_id = ? \
             AND dimensions = ? AND chunk_size = ? AND chunk_overlap = ?"
        ))
        .bind(&identity.document_id)
        .bind(&identity.provider_name)
        .bind(&identity.model_id)
        .bind(identity.dimensions)
        .bind(identity.chunk_size)
        .bind(identity.chunk_overlap)
        .fetch_optional(pool)
        .await
    }

    #[inline]
    pub async fn list_for_document(
        pool: &SqlitePool,
        document_id: &str,
    ) -> Result<Vec<IndexRecord>, sqlx::Error> {
        sqlx::query_as::<_, IndexRecord>(&format!(
            "SELECT {INDEX_COLUMNS} FROM indexes WHERE document_id = ? ORDER BY id"
        ))
        .bind(document_id)
        .fetch_all(pool)
        .await
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<IndexRecord>, sqlx::Error> {
        sqlx::query_as::<_, IndexRecord>(&format!(
            "SELECT {INDEX_COLUMNS} FROM indexes ORDER BY id"
        ))
        .fetch_all(pool)
        .await
    }

    /// Bump chunk count after an append, inside the append transaction.
    #[inline]
    pub async fn record_appended(
        tx: &mut Transaction<'_, Sqlite>,
        id: i64,
        added: i64,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().naive_utc();
        sqlx::query("UPDATE indexes SET total_chunks = total_chunks + ?, updated_date = ? WHERE id = ?")
            .bind(added)
            .bind(now)
            .bind(id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Overwrite the recorded chunk count, used by consistency repair.
    #[inline]
    pub async fn set_total_chunks(
        pool: &SqlitePool,
        id: i64,
        total_chunks: i64,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().naive_utc();
        sqlx::query("UPDATE indexes SET total_chunks = ?, updated_date = ? WHERE id = ?")
            .bind(total_chunks)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Returns whether a row was deleted. Chunks cascade via foreign key.
    #[inline]
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let affected = sqlx::query("DELETE FROM indexes WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }
}

pub struct ChunkQueries;

impl ChunkQueries {
    #[inline]
    pub async fn insert(
        tx: &mut Transaction<'_, Sqlite>,
        index_id: i64,
        chunk: &NewChunk,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().naive_utc();
        sqlx::query(
            "INSERT INTO chunks (index_id, ordinal, start_offset, end_offset, content, \
             has_argument_marker, indexed_date) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(index_id)
        .bind(chunk.ordinal)
        .bind(chunk.start_offset)
        .bind(chunk.end_offset)
        .bind(&chunk.content)
        .bind(chunk.has_argument_marker)
        .bind(now)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    #[inline]
    pub async fn list_for_index(
        pool: &SqlitePool,
        index_id: i64,
    ) -> Result<Vec<ChunkRecord>, sqlx::Error> {
        sqlx::query_as::<_, ChunkRecord>(&format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks WHERE index_id = ? ORDER BY ordinal"
        ))
        .bind(index_id)
        .fetch_all(pool)
        .await
    }

    /// Fetch specific chunks of one index by ordinal.
    #[inline]
    pub async fn by_ordinals(
        pool: &SqlitePool,
        index_id: i64,
        ordinals: &[i64],
    ) -> Result<Vec<ChunkRecord>, sqlx::Error> {
        if ordinals.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ordinals.len()].join(", ");
        let sql = format!(
            "SELECT {CHUNK_COLUMNS} FROM chunks WHERE index_id = ? AND ordinal IN ({placeholders})"
        );
        let mut query = sqlx::query_as::<_, ChunkRecord>(&sql).bind(index_id);
        for ordinal in ordinals {
            query = query.bind(ordinal);
        }
        query.fetch_all(pool).await
    }

    /// Ordinals passing the filter, for pre-scoring candidate narrowing.
    #[inline]
    pub async fn ordinals_matching(
        pool: &SqlitePool,
        index_id: i64,
        filter: &ChunkFilter,
    ) -> Result<Vec<i64>, sqlx::Error> {
        let mut sql = "SELECT ordinal FROM chunks WHERE index_id = ?".to_string();
        if filter.argument_markers_only {
            sql.push_str(" AND has_argument_marker = 1");
        }
        if filter.ordinal_range.is_some() {
            sql.push_str(" AND ordinal BETWEEN ? AND ?");
        }
        let mut query = sqlx::query_scalar::<_, i64>(&sql).bind(index_id);
        if let Some((low, high)) = filter.ordinal_range {
            query = query.bind(low).bind(high);
        }
        query.fetch_all(pool).await
    }

    #[inline]
    pub async fn count_for_index(pool: &SqlitePool, index_id: i64) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM chunks WHERE index_id = ?")
            .bind(index_id)
            .fetch_one(pool)
            .await
    }
}
