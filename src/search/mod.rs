// Search modes over the index store: semantic, dialectical, genealogical,
// hybrid. The engine is state-free per call; everything durable lives in
// the store and the library.

#[cfg(test)]
mod tests;

pub mod lexical;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::database::sqlite::{ChunkFilter, ChunkRecord, IndexRecord};
use crate::embeddings::{Embedded, EmbeddingError, EmbeddingService};
use crate::library::DocumentLibrary;
use crate::store::{IndexStore, StoreError};

#[derive(Error, Debug)]
pub enum SearchError {
    #[error(
        "no index for document '{document_id}' matches the active embedding configuration; \
         existing indexes: {}",
        format_existing(existing)
    )]
    NoMatchingIndex {
        document_id: String,
        existing: Vec<String>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("library error: {0}")]
    Library(String),
}

fn format_existing(existing: &[String]) -> String {
    if existing.is_empty() {
        "none".to_string()
    } else {
        existing.join(", ")
    }
}

/// The four retrieval semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Semantic,
    Dialectical,
    Genealogical,
    Hybrid,
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "semantic" => Ok(SearchMode::Semantic),
            "dialectical" => Ok(SearchMode::Dialectical),
            "genealogical" => Ok(SearchMode::Genealogical),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(format!(
                "unknown search mode '{other}' (expected semantic, dialectical, genealogical or hybrid)"
            )),
        }
    }
}

/// What part of the library a search runs against.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SearchScope {
    #[default]
    Library,
    Document(String),
    Documents(Vec<String>),
}

/// A single search call.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub mode: SearchMode,
    pub scope: SearchScope,
    pub limit: usize,
    /// Floor applied to final scores, after mode-specific combination.
    pub minimum_score: Option<f32>,
    /// Explicit oppositional query for dialectical mode; wins over the
    /// probe strategy when present.
    pub opposing_query: Option<String>,
    pub filter: ChunkFilter,
}

impl SearchRequest {
    #[inline]
    pub fn new(query: impl Into<String>, mode: SearchMode) -> Self {
        Self {
            query: query.into(),
            mode,
            scope: SearchScope::default(),
            limit: 10,
            minimum_score: None,
            opposing_query: None,
            filter: ChunkFilter::default(),
        }
    }

    #[inline]
    pub fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    #[inline]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[inline]
    pub fn with_minimum_score(mut self, minimum_score: f32) -> Self {
        self.minimum_score = Some(minimum_score);
        self
    }

    #[inline]
    pub fn with_opposing_query(mut self, opposing: impl Into<String>) -> Self {
        self.opposing_query = Some(opposing.into());
        self
    }
}

/// Which probe matched a dialectical hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Probe {
    Direct,
    Opposing,
}

/// One ranked result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub chunk: ChunkRecord,
    pub document_id: String,
    pub index_id: i64,
    pub score: f32,
    /// Set in dialectical mode only.
    pub matched_probe: Option<Probe>,
}

/// Derives oppositional probe queries for dialectical search.
///
/// How the opposing query is derived is an open design question, so the
/// strategy is pluggable rather than baked in.
pub trait ProbeStrategy: Send + Sync {
    fn derive(&self, query: &str) -> Vec<String>;
}

/// Default strategy: a fixed antonym table plus a plain negation wrapper.
pub struct NegationProbe;

/// Concept pairs flipped by [`NegationProbe`].
const ANTONYMS: &[(&str, &str)] = &[
    ("presence", "absence"),
    ("being", "nothingness"),
    ("freedom", "necessity"),
    ("order", "chaos"),
    ("truth", "falsehood"),
    ("unity", "multiplicity"),
    ("finite", "infinite"),
    ("objective", "subjective"),
    ("eternal", "temporal"),
    ("affirmation", "negation"),
];

impl ProbeStrategy for NegationProbe {
    #[inline]
    fn derive(&self, query: &str) -> Vec<String> {
        let mut probes = Vec::new();

        let mut flipped = false;
        let swapped: Vec<String> = query
            .split_whitespace()
            .map(|word| {
                let lowered = word.to_lowercase();
                for (a, b) in ANTONYMS {
                    if lowered == *a {
                        flipped = true;
                        return (*b).to_string();
                    }
                    if lowered == *b {
                        flipped = true;
                        return (*a).to_string();
                    }
                }
                word.to_string()
            })
            .collect();
        if flipped {
            probes.push(swapped.join(" "));
        }

        probes.push(format!("the opposite of {query}"));
        probes
    }
}

/// Tuning knobs shared by all searches, from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Similarity floor for semantic candidates.
    pub similarity_threshold: f32,
    /// Weight of the vector score in hybrid mode.
    pub vector_weight: f32,
    /// Weight of the lexical score in hybrid mode.
    pub lexical_weight: f32,
}

impl Default for SearchOptions {
    #[inline]
    fn default() -> Self {
        Self {
            similarity_threshold: 0.25,
            vector_weight: 0.7,
            lexical_weight: 0.3,
        }
    }
}

/// Executes search requests against the store.
pub struct SearchEngine {
    store: Arc<IndexStore>,
    embeddings: Arc<EmbeddingService>,
    library: Arc<dyn DocumentLibrary>,
    options: SearchOptions,
    probe_strategy: Box<dyn ProbeStrategy>,
}

impl SearchEngine {
    #[inline]
    pub fn new(
        store: Arc<IndexStore>,
        embeddings: Arc<EmbeddingService>,
        library: Arc<dyn DocumentLibrary>,
        options: SearchOptions,
    ) -> Self {
        Self {
            store,
            embeddings,
            library,
            options,
            probe_strategy: Box::new(NegationProbe),
        }
    }

    #[inline]
    pub fn with_probe_strategy(mut self, strategy: Box<dyn ProbeStrategy>) -> Self {
        self.probe_strategy = strategy;
        self
    }

    /// Run one search request, dispatching on its mode.
    #[inline]
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, SearchError> {
        let embedded = self.embeddings.generate_one(&request.query)?;
        let indexes = self.resolve_indexes(&request.scope, &embedded).await?;
        if indexes.is_empty() {
            return Ok(Vec::new());
        }
        debug!(
            "searching {} indexes in {:?} mode",
            indexes.len(),
            request.mode
        );

        let mut hits = match request.mode {
            SearchMode::Semantic => self.semantic(request, &embedded, &indexes).await?,
            SearchMode::Dialectical => self.dialectical(request, &embedded, &indexes).await?,
            SearchMode::Genealogical => self.genealogical(request, &embedded, &indexes).await?,
            SearchMode::Hybrid => self.hybrid(request, &embedded, &indexes).await?,
        };

        if let Some(floor) = request.minimum_score {
            hits.retain(|hit| hit.score >= floor);
        }
        hits.truncate(request.limit);
        Ok(hits)
    }

    /// Plain similarity above the configured threshold.
    async fn semantic(
        &self,
        request: &SearchRequest,
        embedded: &Embedded,
        indexes: &[IndexRecord],
    ) -> Result<Vec<SearchHit>, SearchError> {
        let mut hits = self
            .vector_leg(&embedded.vector, indexes, request.limit, &request.filter)
            .await?;
        hits.retain(|hit| hit.score >= self.options.similarity_threshold);
        sort_by_score(&mut hits);
        Ok(hits)
    }

    /// Direct plus oppositional probes, each hit tagged with its probe.
    async fn dialectical(
        &self,
        request: &SearchRequest,
        embedded: &Embedded,
        indexes: &[IndexRecord],
    ) -> Result<Vec<SearchHit>, SearchError> {
        let probe_queries = match &request.opposing_query {
            Some(explicit) => vec![explicit.clone()],
            None => self.probe_strategy.derive(&request.query),
        };

        let mut merged: HashMap<(i64, i64), SearchHit> = HashMap::new();
        let direct = self
            .vector_leg(&embedded.vector, indexes, request.limit, &request.filter)
            .await?;
        for mut hit in direct {
            if hit.score < self.options.similarity_threshold {
                continue;
            }
            hit.matched_probe = Some(Probe::Direct);
            merged.insert((hit.index_id, hit.chunk.id), hit);
        }

        for probe_query in &probe_queries {
            let probe_embedded = self.embeddings.generate_one(probe_query)?;
            let probe_hits = self
                .vector_leg(&probe_embedded.vector, indexes, request.limit, &request.filter)
                .await?;
            for mut hit in probe_hits {
                if hit.score < self.options.similarity_threshold {
                    continue;
                }
                hit.matched_probe = Some(Probe::Opposing);
                match merged.entry((hit.index_id, hit.chunk.id)) {
                    std::collections::hash_map::Entry::Occupied(mut present) => {
                        // On a tie between directions the higher score wins,
                        // tag included.
                        if hit.score > present.get().score {
                            present.insert(hit);
                        }
                    }
                    std::collections::hash_map::Entry::Vacant(slot) => {
                        slot.insert(hit);
                    }
                }
            }
        }

        let mut hits: Vec<SearchHit> = merged.into_values().collect();
        sort_by_score(&mut hits);
        Ok(hits)
    }

    /// Semantic search re-ordered by source document date, ascending.
    async fn genealogical(
        &self,
        request: &SearchRequest,
        embedded: &Embedded,
        indexes: &[IndexRecord],
    ) -> Result<Vec<SearchHit>, SearchError> {
        let mut hits = self.semantic(request, embedded, indexes).await?;

        let documents: Vec<String> = hits.iter().map(|h| h.document_id.clone()).unique().collect();
        let mut dates: HashMap<String, Option<NaiveDate>> = HashMap::new();
        for document_id in documents {
            let published = match self.library.metadata(&document_id) {
                Ok(meta) => meta.published,
                Err(error) => {
                    warn!("no metadata for document '{document_id}', ordering it last: {error}");
                    None
                }
            };
            dates.insert(document_id, published);
        }

        hits.sort_by(|a, b| {
            let date_a = dates.get(&a.document_id).copied().flatten();
            let date_b = dates.get(&b.document_id).copied().flatten();
            match (date_a, date_b) {
                (Some(x), Some(y)) => x.cmp(&y).then_with(|| b.score.total_cmp(&a.score)),
                // Undated documents sort after all dated ones.
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => b.score.total_cmp(&a.score),
            }
        });
        Ok(hits)
    }

    /// Weighted sum of vector and lexical scores, deduplicated per chunk.
    async fn hybrid(
        &self,
        request: &SearchRequest,
        embedded: &Embedded,
        indexes: &[IndexRecord],
    ) -> Result<Vec<SearchHit>, SearchError> {
        let vector_weight = self.options.vector_weight;
        let lexical_weight = self.options.lexical_weight;

        // Vector leg: raw top-k, no similarity threshold; a chunk may earn
        // its place on lexical evidence alone.
        let vector_hits = self
            .vector_leg(&embedded.vector, indexes, request.limit, &request.filter)
            .await?;
        let vector_scores: HashMap<(i64, i64), f32> = vector_hits
            .iter()
            .map(|hit| ((hit.index_id, hit.chunk.id), hit.score))
            .collect();

        let mut merged: HashMap<(i64, i64), SearchHit> = HashMap::new();
        for mut hit in vector_hits {
            hit.score *= vector_weight;
            merged.insert((hit.index_id, hit.chunk.id), hit);
        }

        for index in indexes {
            let chunks = self.store.list_chunks(index.id, &request.filter).await?;
            for chunk in chunks {
                let lexical = lexical::lexical_score(&request.query, &chunk.content);
                if lexical == 0.0 {
                    continue;
                }
                let key = (index.id, chunk.id);
                let vector_part = vector_scores.get(&key).copied().unwrap_or(0.0);
                let combined = vector_weight * vector_part + lexical_weight * lexical;
                match merged.entry(key) {
                    std::collections::hash_map::Entry::Occupied(mut present) => {
                        present.get_mut().score = combined;
                    }
                    std::collections::hash_map::Entry::Vacant(slot) => {
                        slot.insert(SearchHit {
                            chunk,
                            document_id: index.document_id.clone(),
                            index_id: index.id,
                            score: combined,
                            matched_probe: None,
                        });
                    }
                }
            }
        }

        let mut hits: Vec<SearchHit> = merged.into_values().collect();
        sort_by_score(&mut hits);
        Ok(hits)
    }

    /// Scan every candidate index and merge the per-index top hits.
    async fn vector_leg(
        &self,
        query: &[f32],
        indexes: &[IndexRecord],
        limit: usize,
        filter: &ChunkFilter,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let mut hits = Vec::new();
        for index in indexes {
            let scored = self
                .store
                .search_similar(index.id, query, limit, filter)
                .await?;
            hits.extend(scored.into_iter().map(|s| SearchHit {
                chunk: s.chunk,
                document_id: index.document_id.clone(),
                index_id: s.index_id,
                score: s.score,
                matched_probe: None,
            }));
        }
        sort_by_score(&mut hits);
        Ok(hits)
    }

    /// Indexes in scope whose (provider, model, dimensions) match the
    /// embedding that will score against them. A search never scans an
    /// index of a different dimension.
    async fn resolve_indexes(
        &self,
        scope: &SearchScope,
        embedded: &Embedded,
    ) -> Result<Vec<IndexRecord>, SearchError> {
        let matches = |index: &IndexRecord| {
            index.provider_name == embedded.provider
                && index.model_id == embedded.model
                && index.dimensions as usize == embedded.vector.len()
        };

        match scope {
            SearchScope::Library => {
                let all = self.store.list_all_indexes().await?;
                Ok(all.into_iter().filter(|i| matches(i)).collect())
            }
            SearchScope::Document(document_id) => {
                let existing = self.store.list_indexes_for_document(document_id).await?;
                let compatible: Vec<IndexRecord> =
                    existing.iter().filter(|i| matches(i)).cloned().collect();
                if compatible.is_empty() {
                    return Err(SearchError::NoMatchingIndex {
                        document_id: document_id.clone(),
                        existing: existing.iter().map(|i| i.identity().to_string()).collect(),
                    });
                }
                Ok(compatible)
            }
            SearchScope::Documents(document_ids) => {
                let mut compatible = Vec::new();
                for document_id in document_ids {
                    let existing = self.store.list_indexes_for_document(document_id).await?;
                    compatible.extend(existing.into_iter().filter(|i| matches(i)));
                }
                Ok(compatible)
            }
        }
    }
}

fn sort_by_score(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| b.score.total_cmp(&a.score));
}
