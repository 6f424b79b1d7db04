//! Retrieval-augmented generation plumbing: collection management, a
//! document ingestion pipeline, and a query pipeline with streaming
//! generation, all against pluggable vector-store and model backends.
//!
//! ```text
//! CollectionManager ──► stores::Backend (collection metadata, append-only chunks)
//!
//! Document ──► ingestion::fetch ──► ingestion::convert ──► ingestion::chunk
//!                                                             │
//!                 embeddings::EmbeddingProvider ◄─────────────┘
//!                                │
//!                                ▼
//!                        stores::Backend ──► query::retrieve ──► query::prompt
//!                                                                    │
//!                        query::generate (streaming deltas) ◄────────┘
//! ```
//!
pub mod collections;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod ingestion;
pub mod message;
pub mod query;
pub mod sampling;
pub mod stores;
pub mod types;

pub use collections::{Collection, CollectionManager, CollectionSpec};
pub use config::{EngineDefaults, ProviderConfig};
pub use embeddings::{EmbeddingProvider, HttpEmbeddingProvider, MockEmbeddingProvider};
pub use engine::{QueryOptions, RagAnswer, RagEngine, RagEngineBuilder, StreamingAnswer};
pub use ingestion::{Document, DocumentSource, IngestOptions, IngestReport, IngestionPipeline};
pub use message::ChatMessage;
pub use query::generate::{
    ChatClient, ChatRequest, DeltaStream, HttpChatClient, ResponseDelta, ToolCallDelta,
};
pub use query::retrieve::{RetrievalResult, RetrievedChunk, Retriever};
pub use sampling::SamplingConfig;
pub use types::RagError;
