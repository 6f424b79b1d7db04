//! Storage backends for collections and their embedded chunks.
//!
//! The [`Backend`] trait abstracts over the backing store so the collection
//! manager, ingestion pipeline, and retriever can work with any supported
//! implementation.
//!
//! ```text
//!                     ┌─────────────────┐
//!                     │  Backend Trait  │
//!                     │  (async CRUD)   │
//!                     └────────┬────────┘
//!                              │
//!                    ┌─────────┴─────────┐
//!                    ▼                   ▼
//!             ┌─────────────┐     ┌─────────────┐
//!             │   Memory    │     │   SQLite    │
//!             │ cosine scan │     │ sqlite-vec  │
//!             └─────────────┘     └─────────────┘
//! ```
//!
//! Chunk writes are append-only: re-ingesting a document id creates duplicate
//! chunks unless the caller deletes the prior ones first.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::collections::Collection;
use crate::types::RagError;

pub use memory::MemoryVectorStore;
pub use sqlite::SqliteVectorStore;

/// A chunk with its embedding, ready for storage.
///
/// Derived from a document during ingestion; never mutated afterwards.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkRecord {
    /// Unique identifier for this chunk.
    pub id: String,
    /// Identifier of the source document within its batch.
    pub document_id: String,
    /// Zero-based position of this chunk within the source document.
    pub chunk_index: usize,
    /// The chunk text span.
    pub content: String,
    /// Free-form metadata carried over from the source document.
    pub metadata: serde_json::Value,
    /// The embedding vector, once computed.
    pub embedding: Option<Vec<f32>>,
}

impl ChunkRecord {
    /// Create a new chunk record without an embedding.
    pub fn new(
        id: impl Into<String>,
        document_id: impl Into<String>,
        chunk_index: usize,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            document_id: document_id.into(),
            chunk_index,
            content: content.into(),
            metadata: serde_json::Value::Object(Default::default()),
            embedding: None,
        }
    }

    /// Set additional metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the embedding vector.
    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Unified interface for collection and chunk storage.
///
/// Implementations must serialize chunk appends per collection so concurrent
/// ingest calls observe a consistent append order.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Persist collection metadata. Fails with [`RagError::Storage`] if a
    /// collection with the same id already exists.
    async fn create_collection(&self, collection: &Collection) -> Result<(), RagError>;

    /// Look up stored collection metadata by id.
    async fn get_collection(&self, id: &str) -> Result<Option<Collection>, RagError>;

    /// Drop a collection and all of its chunks. Returns `false` when the
    /// collection did not exist.
    async fn drop_collection(&self, id: &str) -> Result<bool, RagError>;

    /// Append chunk records to a collection.
    ///
    /// Every record must carry an embedding whose length equals the
    /// collection's declared dimension; a mismatch fails the whole append
    /// with [`RagError::Embedding`] rather than truncating or padding.
    async fn append_chunks(
        &self,
        collection_id: &str,
        chunks: Vec<ChunkRecord>,
    ) -> Result<(), RagError>;

    /// Retrieve all chunks for a source document, in chunk order.
    async fn get_chunks_by_document(
        &self,
        collection_id: &str,
        document_id: &str,
    ) -> Result<Vec<ChunkRecord>, RagError>;

    /// Delete all chunks for a source document, returning how many were removed.
    async fn delete_chunks_by_document(
        &self,
        collection_id: &str,
        document_id: &str,
    ) -> Result<usize, RagError>;

    /// Nearest-neighbour search with a query embedding.
    ///
    /// Returns chunks ordered most-similar-first, limited to `top_k`.
    async fn search_similar(
        &self,
        collection_id: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>, RagError>;

    /// Total number of chunks stored for a collection.
    async fn count(&self, collection_id: &str) -> Result<usize, RagError>;
}

/// Validates that every record in an append carries a correctly sized embedding.
pub(crate) fn check_dimensions(
    collection: &Collection,
    chunks: &[ChunkRecord],
) -> Result<(), RagError> {
    for chunk in chunks {
        match &chunk.embedding {
            Some(embedding) if embedding.len() == collection.embedding_dimension => {}
            Some(embedding) => {
                return Err(RagError::Embedding(format!(
                    "chunk {} has dimension {} but collection '{}' declares {}",
                    chunk.id,
                    embedding.len(),
                    collection.id,
                    collection.embedding_dimension
                )));
            }
            None => {
                return Err(RagError::Embedding(format!(
                    "chunk {} has no embedding",
                    chunk.id
                )));
            }
        }
    }
    Ok(())
}
