//! Ingestion pipeline: fetch → convert → chunk → embed → store.
//!
//! * [`fetch`] — source resolution plus a disk-backed document cache.
//! * [`convert`] — raw bytes + MIME type into plain text.
//! * [`chunk`] — tokenization and fixed-size chunk splitting.
//! * [`pipeline`] — batch orchestration with per-document statuses.

pub mod chunk;
pub mod convert;
pub mod fetch;
pub mod pipeline;

pub use chunk::{Chunker, TextChunk, Tokenizer, WordTokenizer};
pub use convert::to_plain_text;
pub use fetch::{Document, DocumentCache, DocumentSource, FetchOutcome, fetch_document};
pub use pipeline::{
    DocumentStatus, IngestOptions, IngestReport, IngestionPipeline, ResumeTracker, RetryPolicy,
};
