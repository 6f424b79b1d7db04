//! Batch ingestion orchestration.
//!
//! Each document runs fetch → convert → chunk → embed → store in isolation:
//! a failure is recorded in the report and the batch continues, unless the
//! caller asked for strict mode. Configuration errors are always fatal to
//! the whole call.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::collections::Collection;
use crate::embeddings::EmbeddingProvider;
use crate::stores::{Backend, ChunkRecord};
use crate::types::RagError;

use super::chunk::Chunker;
use super::convert::to_plain_text;
use super::fetch::{Document, DocumentCache, ensure_fetchable, fetch_document};

/// Bounded retry with doubling delay, applied to the network-dependent
/// fetch and embed steps.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no waiting. Used by tests and latency-sensitive callers.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
        }
    }
}

async fn with_retry<T, F, Fut>(policy: RetryPolicy, op: F) -> Result<T, RagError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, RagError>>,
{
    let attempts = policy.attempts.max(1);
    let mut delay = policy.base_delay;
    let mut last_err = RagError::Configuration("retry ran zero attempts".to_string());
    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::debug!(attempt, error = %err, "retryable step failed");
                last_err = err;
                if attempt < attempts {
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
    Err(last_err)
}

/// Batch-level ingestion settings.
#[derive(Clone, Copy, Debug, Default)]
pub struct IngestOptions {
    /// Abort the whole batch on the first per-document failure.
    pub strict: bool,
    /// Retry policy for fetch and embed.
    pub retry: RetryPolicy,
}

/// Outcome for one document in an ingestion batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentStatus {
    /// Chunks were embedded and stored.
    Ingested { document_id: String, chunks: usize },
    /// The document converted to empty text; nothing was stored.
    Empty { document_id: String },
    /// The resume tracker had already recorded this document id.
    AlreadyIngested { document_id: String },
    /// A pipeline stage failed for this document.
    Failed {
        document_id: String,
        stage: &'static str,
        error: String,
    },
}

impl DocumentStatus {
    pub fn document_id(&self) -> &str {
        match self {
            DocumentStatus::Ingested { document_id, .. }
            | DocumentStatus::Empty { document_id }
            | DocumentStatus::AlreadyIngested { document_id }
            | DocumentStatus::Failed { document_id, .. } => document_id,
        }
    }
}

/// Per-document statuses for an ingestion batch, in input order.
#[derive(Clone, Debug, Default)]
pub struct IngestReport {
    pub statuses: Vec<DocumentStatus>,
}

impl IngestReport {
    /// Total chunks written across the batch.
    pub fn chunks_written(&self) -> usize {
        self.statuses
            .iter()
            .map(|status| match status {
                DocumentStatus::Ingested { chunks, .. } => *chunks,
                _ => 0,
            })
            .sum()
    }

    /// Statuses for documents that failed a stage.
    pub fn failures(&self) -> impl Iterator<Item = &DocumentStatus> {
        self.statuses
            .iter()
            .filter(|status| matches!(status, DocumentStatus::Failed { .. }))
    }

    /// True when no document failed.
    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Tracks which document ids have already been processed so ingest jobs can
/// resume after interruption.
#[derive(Clone, Debug)]
pub struct ResumeTracker {
    path: PathBuf,
    state: Arc<Mutex<HashSet<String>>>,
}

impl ResumeTracker {
    /// Creates a tracker that persists state to the provided path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Path where the tracker persists processed document ids.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads previously persisted state, if any.
    pub async fn load(&self) -> Result<(), RagError> {
        if !self.path.exists() {
            return Ok(());
        }
        let data = fs::read_to_string(&self.path).await?;
        let ids: Vec<String> =
            serde_json::from_str(&data).map_err(|err| RagError::Io(err.to_string()))?;
        let mut guard = self.state.lock().await;
        guard.clear();
        guard.extend(ids);
        Ok(())
    }

    /// Returns `true` if the given document id has already been processed.
    pub async fn contains(&self, document_id: &str) -> bool {
        let guard = self.state.lock().await;
        guard.contains(document_id)
    }

    /// Marks a document id as processed and persists the updated state.
    pub async fn mark_processed(&self, document_id: &str) -> Result<(), RagError> {
        let mut guard = self.state.lock().await;
        let inserted = guard.insert(document_id.to_string());
        if !inserted && self.path.exists() {
            return Ok(());
        }
        let ids: Vec<String> = guard.iter().cloned().collect();
        drop(guard);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let serialized =
            serde_json::to_string(&ids).map_err(|err| RagError::Io(err.to_string()))?;
        fs::write(&self.path, serialized).await?;
        Ok(())
    }
}

/// Runs documents through fetch → convert → chunk → embed → store.
pub struct IngestionPipeline {
    client: reqwest::Client,
    backend: Arc<dyn Backend>,
    provider: Arc<dyn EmbeddingProvider>,
    chunker: Chunker,
    cache: Option<DocumentCache>,
    resume: Option<ResumeTracker>,
    options: IngestOptions,
}

impl IngestionPipeline {
    pub fn new(backend: Arc<dyn Backend>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            client: reqwest::Client::new(),
            backend,
            provider,
            chunker: Chunker::default(),
            cache: None,
            resume: None,
            options: IngestOptions::default(),
        }
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: DocumentCache) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_resume_tracker(mut self, tracker: ResumeTracker) -> Self {
        self.resume = Some(tracker);
        self
    }

    #[must_use]
    pub fn with_options(mut self, options: IngestOptions) -> Self {
        self.options = options;
        self
    }

    /// Ingests a batch of documents into `collection`.
    ///
    /// Per-document failures are isolated and reported; configuration
    /// errors (and any error in strict mode) abort the whole batch.
    pub async fn ingest(
        &self,
        documents: &[Document],
        collection: &Collection,
        chunk_size: usize,
    ) -> Result<IngestReport, RagError> {
        if self.provider.model() != collection.embedding_model {
            return Err(RagError::Configuration(format!(
                "collection '{}' declares embedding model '{}' but the provider serves '{}'",
                collection.id,
                collection.embedding_model,
                self.provider.model()
            )));
        }

        let mut report = IngestReport::default();
        for document in documents {
            if let Some(tracker) = &self.resume {
                if tracker.contains(&document.id).await {
                    tracing::debug!(document = %document.id, "skipping, already recorded");
                    report.statuses.push(DocumentStatus::AlreadyIngested {
                        document_id: document.id.clone(),
                    });
                    continue;
                }
            }

            match self.ingest_one(document, collection, chunk_size).await {
                Ok(status) => {
                    // Empty documents stay unmarked so a later re-run with
                    // real content is not skipped as already ingested.
                    if matches!(status, DocumentStatus::Ingested { .. }) {
                        if let Some(tracker) = &self.resume {
                            tracker.mark_processed(&document.id).await?;
                        }
                    }
                    report.statuses.push(status);
                }
                Err(err) if self.options.strict || matches!(err, RagError::Configuration(_)) => {
                    return Err(err);
                }
                Err(err) => {
                    tracing::warn!(document = %document.id, error = %err, "document failed");
                    report.statuses.push(DocumentStatus::Failed {
                        document_id: document.id.clone(),
                        stage: stage_of(&err),
                        error: err.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            collection = %collection.id,
            documents = documents.len(),
            chunks = report.chunks_written(),
            "ingestion batch complete"
        );
        Ok(report)
    }

    async fn ingest_one(
        &self,
        document: &Document,
        collection: &Collection,
        chunk_size: usize,
    ) -> Result<DocumentStatus, RagError> {
        ensure_fetchable(document)?;
        let fetched = with_retry(self.options.retry, || {
            fetch_document(&self.client, document, self.cache.as_ref())
        })
        .await?;

        let text = to_plain_text(&fetched.bytes, &document.content_type)?;
        let chunks = self.chunker.split(&text, chunk_size)?;
        if chunks.is_empty() {
            return Ok(DocumentStatus::Empty {
                document_id: document.id.clone(),
            });
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let embeddings = with_retry(self.options.retry, || {
            let texts = texts.clone();
            let provider = Arc::clone(&self.provider);
            async move { provider.embed_batch(&texts).await }
        })
        .await?;

        if embeddings.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "document '{}': {} chunks but {} embeddings returned",
                document.id,
                chunks.len(),
                embeddings.len()
            )));
        }
        for embedding in &embeddings {
            if embedding.len() != collection.embedding_dimension {
                return Err(RagError::Embedding(format!(
                    "document '{}': embedding dimension {} does not match collection dimension {}",
                    document.id,
                    embedding.len(),
                    collection.embedding_dimension
                )));
            }
        }

        let chunk_count = chunks.len();
        let records: Vec<ChunkRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| {
                ChunkRecord::new(
                    Uuid::new_v4().to_string(),
                    document.id.clone(),
                    chunk.index,
                    chunk.content,
                )
                .with_metadata(document.metadata.clone())
                .with_embedding(embedding)
            })
            .collect();

        self.backend.append_chunks(&collection.id, records).await?;
        Ok(DocumentStatus::Ingested {
            document_id: document.id.clone(),
            chunks: chunk_count,
        })
    }
}

fn stage_of(err: &RagError) -> &'static str {
    match err {
        RagError::Fetch(_) => "fetch",
        RagError::Conversion(_) => "convert",
        RagError::Embedding(_) => "embed",
        RagError::Storage(_) => "store",
        RagError::Io(_) => "io",
        _ => "ingest",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn tracker_persists_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let tracker = ResumeTracker::new(&path);
        tracker.load().await.unwrap();

        assert!(!tracker.contains("doc-1").await);
        tracker.mark_processed("doc-1").await.unwrap();
        assert!(tracker.contains("doc-1").await);

        let tracker_two = ResumeTracker::new(&path);
        tracker_two.load().await.unwrap();
        assert!(tracker_two.contains("doc-1").await);
    }

    #[tokio::test]
    async fn retry_returns_last_error_after_exhaustion() {
        let policy = RetryPolicy {
            attempts: 3,
            base_delay: Duration::ZERO,
        };
        let calls = std::sync::atomic::AtomicU32::new(0);
        let result: Result<(), RagError> = with_retry(policy, || {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Err(RagError::Fetch("unreachable".to_string())) }
        })
        .await;
        assert!(matches!(result, Err(RagError::Fetch(_))));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_stops_on_first_success() {
        let calls = std::sync::atomic::AtomicU32::new(0);
        let result = with_retry(RetryPolicy::none(), || {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            async { Ok(42) }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
