// Cross-checks the metadata database against the vector files and repairs
// the divergences an interrupted append can leave behind.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::database::sqlite::{ChunkQueries, IndexQueries};
use crate::database::vectors::VectorFile;
use crate::embeddings::EmbeddingService;
use crate::store::IndexStore;

/// One divergence between chunk rows and vector records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexIssue {
    pub index_id: i64,
    pub document_id: String,
    pub kind: IssueKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueKind {
    /// Chunk rows exist but the vector file is gone.
    MissingVectorFile { chunks: i64 },
    /// Fewer published vectors than committed chunk rows.
    MissingVectors { chunks: i64, vectors: usize },
    /// Record bytes beyond the published count, from an append whose
    /// transaction never committed.
    UnpublishedTail { records: usize },
    /// The index row's chunk counter disagrees with the actual rows.
    CountDrift { recorded: i64, actual: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyReport {
    pub checked_indexes: usize,
    pub issues: Vec<IndexIssue>,
}

impl ConsistencyReport {
    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Validates and repairs store consistency.
///
/// Repairing missing vectors re-embeds chunk text, so a service is required
/// for that path; validation alone never needs one.
pub struct ConsistencyValidator<'a> {
    store: &'a IndexStore,
    embeddings: Option<&'a EmbeddingService>,
}

impl<'a> ConsistencyValidator<'a> {
    #[inline]
    pub fn new(store: &'a IndexStore) -> Self {
        Self {
            store,
            embeddings: None,
        }
    }

    #[inline]
    pub fn with_embeddings(mut self, embeddings: &'a EmbeddingService) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    /// Compare every index's chunk rows against its vector file.
    #[inline]
    pub async fn validate(&self) -> Result<ConsistencyReport> {
        let indexes = self
            .store
            .list_all_indexes()
            .await
            .context("Failed to list indexes")?;

        let mut issues = Vec::new();
        for index in &indexes {
            let chunks = ChunkQueries::count_for_index(self.store.database().pool(), index.id)
                .await
                .context("Failed to count chunks")?;

            if index.total_chunks != chunks {
                issues.push(IndexIssue {
                    index_id: index.id,
                    document_id: index.document_id.clone(),
                    kind: IssueKind::CountDrift {
                        recorded: index.total_chunks,
                        actual: chunks,
                    },
                });
            }

            if !VectorFile::exists(self.store.vectors_dir(), index.id) {
                if chunks > 0 {
                    issues.push(IndexIssue {
                        index_id: index.id,
                        document_id: index.document_id.clone(),
                        kind: IssueKind::MissingVectorFile { chunks },
                    });
                }
                continue;
            }

            let file = VectorFile::open(self.store.vectors_dir(), index.id)
                .context("Failed to open vector file")?;
            let published = file.count();
            let on_disk = file.records_on_disk()?;

            if on_disk > published {
                issues.push(IndexIssue {
                    index_id: index.id,
                    document_id: index.document_id.clone(),
                    kind: IssueKind::UnpublishedTail {
                        records: on_disk - published,
                    },
                });
            }
            if (published as i64) < chunks {
                issues.push(IndexIssue {
                    index_id: index.id,
                    document_id: index.document_id.clone(),
                    kind: IssueKind::MissingVectors {
                        chunks,
                        vectors: published,
                    },
                });
            }
        }

        if issues.is_empty() {
            info!("consistency check passed for {} indexes", indexes.len());
        } else {
            warn!(
                "consistency check found {} issues across {} indexes",
                issues.len(),
                indexes.len()
            );
        }

        Ok(ConsistencyReport {
            checked_indexes: indexes.len(),
            issues,
        })
    }

    /// Fix what the report found. Returns the number of repaired issues.
    #[inline]
    pub async fn repair(&self, report: &ConsistencyReport) -> Result<usize> {
        let mut repaired = 0;
        for issue in &report.issues {
            match &issue.kind {
                IssueKind::UnpublishedTail { records } => {
                    let mut file = VectorFile::open(self.store.vectors_dir(), issue.index_id)
                        .context("Failed to open vector file for truncation")?;
                    let dropped = file.truncate_to_published()?;
                    info!(
                        "trimmed {dropped} unpublished records from index {} (expected {records})",
                        issue.index_id
                    );
                    repaired += 1;
                }
                IssueKind::CountDrift { actual, .. } => {
                    IndexQueries::set_total_chunks(
                        self.store.database().pool(),
                        issue.index_id,
                        *actual,
                    )
                    .await
                    .context("Failed to correct chunk count")?;
                    repaired += 1;
                }
                IssueKind::MissingVectorFile { .. } | IssueKind::MissingVectors { .. } => {
                    if self.reembed_missing(issue.index_id).await? {
                        repaired += 1;
                    }
                }
            }
        }
        Ok(repaired)
    }

    /// Regenerate vectors for chunk rows the file does not cover.
    async fn reembed_missing(&self, index_id: i64) -> Result<bool> {
        let Some(embeddings) = self.embeddings else {
            warn!("index {index_id} needs re-embedding but no service was provided");
            return Ok(false);
        };

        let index = self.store.get_index(index_id).await?;
        let chunks = ChunkQueries::list_for_index(self.store.database().pool(), index_id)
            .await
            .context("Failed to list chunks")?;

        let mut file = VectorFile::open_or_create(
            self.store.vectors_dir(),
            index_id,
            index.dimensions as usize,
        )?;

        let mut present = std::collections::HashSet::new();
        file.for_each(|ordinal, _| {
            present.insert(ordinal);
        })?;

        let missing: Vec<_> = chunks
            .iter()
            .filter(|chunk| !present.contains(&(chunk.ordinal as u32)))
            .collect();
        if missing.is_empty() {
            return Ok(false);
        }

        let texts: Vec<String> = missing.iter().map(|c| c.content.clone()).collect();
        let embedded = embeddings
            .generate_batch(&texts)
            .context("Failed to re-embed missing chunks")?;

        let records: Vec<(u32, &[f32])> = missing
            .iter()
            .zip(&embedded.vectors)
            .map(|(chunk, vector)| (chunk.ordinal as u32, vector.as_slice()))
            .collect();
        file.append_batch(&records)?;

        info!(
            "re-embedded {} missing vectors for index {index_id} via {}",
            records.len(),
            embedded.provider
        );
        Ok(true)
    }
}
