// Background indexing: chunk -> embed -> append, with progress events,
// cooperative cancellation and resumability.


pub mod consistency;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::chunking::{ChunkingConfig, chunk_text};
use crate::database::sqlite::{IndexIdentity, NewChunk};
use crate::embeddings::EmbeddingService;
use crate::library::DocumentLibrary;
use crate::store::IndexStore;

pub use consistency::{ConsistencyReport, ConsistencyValidator, IndexIssue, IssueKind};

/// Lifecycle of one indexing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

impl std::fmt::Display for JobState {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            JobState::Pending => write!(f, "Pending"),
            JobState::Running => write!(f, "Running"),
            JobState::Completed => write!(f, "Completed"),
            JobState::Failed => write!(f, "Failed"),
            JobState::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Progress snapshot published after every committed batch.
///
/// `current` counts chunks durably committed to the store, so a consumer
/// reading a `Failed` or `Cancelled` event knows exactly how much of the
/// document remains queryable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub job_id: Uuid,
    pub current: usize,
    pub total: usize,
    pub state: JobState,
    /// Why the job failed, for `Failed` events.
    pub error: Option<String>,
}

/// Caller's handle on a running job.
#[derive(Debug)]
pub struct JobHandle {
    pub job_id: Uuid,
    pub identity: IndexIdentity,
    /// True when this handle joined a job that was already running for the
    /// same identity instead of starting a new one.
    pub joined: bool,
    progress: watch::Receiver<ProgressEvent>,
    cancel: CancellationToken,
}

impl JobHandle {
    /// Subscribe to progress updates.
    #[inline]
    pub fn progress(&self) -> watch::Receiver<ProgressEvent> {
        self.progress.clone()
    }

    /// Request cooperative cancellation. The job stops between batches;
    /// chunks already committed stay queryable.
    #[inline]
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the job to reach a terminal state.
    #[inline]
    pub async fn wait(&mut self) -> ProgressEvent {
        loop {
            let event = self.progress.borrow_and_update().clone();
            if event.state.is_terminal() {
                return event;
            }
            if self.progress.changed().await.is_err() {
                return self.progress.borrow().clone();
            }
        }
    }
}

struct ActiveJob {
    job_id: Uuid,
    progress: watch::Receiver<ProgressEvent>,
    cancel: CancellationToken,
}

/// Drives end-to-end indexing of documents.
///
/// At most one job runs per index identity: starting the same target again
/// joins the running job's progress stream. Jobs for different documents
/// (or different configurations of the same document) run concurrently.
pub struct IndexingCoordinator {
    store: Arc<IndexStore>,
    embeddings: Arc<EmbeddingService>,
    library: Arc<dyn DocumentLibrary>,
    chunking: ChunkingConfig,
    batch_size: usize,
    active: Arc<Mutex<HashMap<IndexIdentity, ActiveJob>>>,
}

impl IndexingCoordinator {
    #[inline]
    pub fn new(
        store: Arc<IndexStore>,
        embeddings: Arc<EmbeddingService>,
        library: Arc<dyn DocumentLibrary>,
        chunking: ChunkingConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            store,
            embeddings,
            library,
            chunking,
            batch_size: batch_size.max(1),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The index identity the active configuration assigns to a document.
    #[inline]
    pub fn identity_for(&self, document_id: &str) -> IndexIdentity {
        IndexIdentity {
            document_id: document_id.to_string(),
            provider_name: self.embeddings.provider_name().to_string(),
            model_id: self.embeddings.model_id().to_string(),
            dimensions: self.embeddings.dimensions() as i64,
            chunk_size: self.chunking.chunk_size as i64,
            chunk_overlap: self.chunking.chunk_overlap as i64,
        }
    }

    /// Start indexing a document, or join the job already running for the
    /// same identity.
    #[inline]
    pub fn start(&self, document_id: &str) -> Result<JobHandle> {
        let identity = self.identity_for(document_id);

        let mut active = self.active.lock().expect("job registry lock poisoned");
        if let Some(job) = active.get(&identity) {
            if !job.progress.borrow().state.is_terminal() {
                info!("joining running indexing job for {identity}");
                return Ok(JobHandle {
                    job_id: job.job_id,
                    identity,
                    joined: true,
                    progress: job.progress.clone(),
                    cancel: job.cancel.clone(),
                });
            }
            active.remove(&identity);
        }

        let job_id = Uuid::new_v4();
        let (sender, receiver) = watch::channel(ProgressEvent {
            job_id,
            current: 0,
            total: 0,
            state: JobState::Pending,
            error: None,
        });
        let cancel = CancellationToken::new();

        active.insert(
            identity.clone(),
            ActiveJob {
                job_id,
                progress: receiver.clone(),
                cancel: cancel.clone(),
            },
        );
        drop(active);

        let runner = JobRunner {
            job_id,
            identity: identity.clone(),
            store: Arc::clone(&self.store),
            embeddings: Arc::clone(&self.embeddings),
            library: Arc::clone(&self.library),
            chunking: self.chunking.clone(),
            batch_size: self.batch_size,
            sender,
            cancel: cancel.clone(),
            registry: Arc::clone(&self.active),
        };
        tokio::spawn(runner.run());

        info!("started indexing job {job_id} for {identity}");
        Ok(JobHandle {
            job_id,
            identity,
            joined: false,
            progress: receiver,
            cancel,
        })
    }

    /// Start a job and wait for its terminal event.
    #[inline]
    pub async fn run_to_completion(&self, document_id: &str) -> Result<ProgressEvent> {
        let mut handle = self
            .start(document_id)
            .with_context(|| format!("Failed to start indexing for '{document_id}'"))?;
        Ok(handle.wait().await)
    }

    /// Progress streams of all currently running jobs.
    #[inline]
    pub fn running_jobs(&self) -> Vec<(IndexIdentity, watch::Receiver<ProgressEvent>)> {
        let active = self.active.lock().expect("job registry lock poisoned");
        active
            .iter()
            .filter(|(_, job)| !job.progress.borrow().state.is_terminal())
            .map(|(identity, job)| (identity.clone(), job.progress.clone()))
            .collect()
    }
}

struct JobRunner {
    job_id: Uuid,
    identity: IndexIdentity,
    store: Arc<IndexStore>,
    embeddings: Arc<EmbeddingService>,
    library: Arc<dyn DocumentLibrary>,
    chunking: ChunkingConfig,
    batch_size: usize,
    sender: watch::Sender<ProgressEvent>,
    cancel: CancellationToken,
    registry: Arc<Mutex<HashMap<IndexIdentity, ActiveJob>>>,
}

impl JobRunner {
    async fn run(self) {
        let outcome = self.drive().await;
        if let Err(error) = outcome {
            // drive() already emitted a terminal event for expected failure
            // paths; this covers anything that escaped.
            error!("indexing job {} aborted: {error:#}", self.job_id);
        }
        let mut registry = self.registry.lock().expect("job registry lock poisoned");
        if registry
            .get(&self.identity)
            .is_some_and(|job| job.job_id == self.job_id)
        {
            registry.remove(&self.identity);
        }
    }

    async fn drive(&self) -> Result<()> {
        let text = match self.library.fetch_text(&self.identity.document_id) {
            Ok(text) => text,
            Err(error) => {
                self.emit(0, 0, JobState::Failed, Some(format!("{error:#}")));
                return Ok(());
            }
        };

        let chunks = chunk_text(&text, &self.chunking);
        let total = chunks.len();
        if total == 0 {
            // Empty documents are not an error; there is just nothing to do.
            self.emit(0, 0, JobState::Completed, None);
            return Ok(());
        }

        // Resume from whatever an earlier run already committed.
        let mut index_id = None;
        let mut committed = 0usize;
        match self.store.find_index(&self.identity).await {
            Ok(Some(index)) => {
                index_id = Some(index.id);
                committed = match self.store.chunk_count(index.id).await {
                    Ok(count) => count as usize,
                    Err(error) => {
                        self.emit(0, total, JobState::Failed, Some(error.to_string()));
                        return Ok(());
                    }
                };
                if committed > 0 {
                    info!(
                        "resuming indexing of '{}' at chunk {committed}/{total}",
                        self.identity.document_id
                    );
                }
            }
            Ok(None) => {}
            Err(error) => {
                self.emit(0, total, JobState::Failed, Some(error.to_string()));
                return Ok(());
            }
        }

        self.emit(committed, total, JobState::Running, None);
        if committed >= total {
            self.emit(committed, total, JobState::Completed, None);
            return Ok(());
        }

        for batch in chunks[committed..].chunks(self.batch_size) {
            if self.cancel.is_cancelled() {
                self.emit(committed, total, JobState::Cancelled, None);
                return Ok(());
            }

            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = match self.embeddings.generate_batch(&texts) {
                Ok(embedded) => embedded,
                Err(error) => {
                    warn!(
                        "embedding failed after {committed}/{total} chunks of '{}': {error}",
                        self.identity.document_id
                    );
                    self.emit(committed, total, JobState::Failed, Some(error.to_string()));
                    return Ok(());
                }
            };

            // A cancellation that arrived while the provider call was in
            // flight: the call was allowed to finish, its result is not
            // committed.
            if self.cancel.is_cancelled() {
                self.emit(committed, total, JobState::Cancelled, None);
                return Ok(());
            }

            let id = match index_id {
                Some(id) => id,
                None => match self.store.create_or_get_index(&self.identity).await {
                    Ok(index) => {
                        index_id = Some(index.id);
                        index.id
                    }
                    Err(error) => {
                        self.emit(committed, total, JobState::Failed, Some(error.to_string()));
                        return Ok(());
                    }
                },
            };

            let items: Vec<(NewChunk, Vec<f32>)> = batch
                .iter()
                .map(NewChunk::from)
                .zip(embedded.vectors)
                .collect();
            if let Err(error) = self.store.append_chunks_and_vectors(id, &items).await {
                self.emit(committed, total, JobState::Failed, Some(error.to_string()));
                return Ok(());
            }

            committed += batch.len();
            self.emit(committed, total, JobState::Running, None);
        }

        self.emit(committed, total, JobState::Completed, None);
        info!(
            "indexing job {} completed: {committed} chunks for '{}'",
            self.job_id, self.identity.document_id
        );
        Ok(())
    }

    fn emit(&self, current: usize, total: usize, state: JobState, error: Option<String>) {
        let _ = self.sender.send(ProgressEvent {
            job_id: self.job_id,
            current,
            total,
            state,
            error,
        });
    }
}
