//! Top-level facade wiring collections, ingestion, and query together.

use std::sync::Arc;

use crate::collections::{Collection, CollectionManager, CollectionSpec};
use crate::config::EngineDefaults;
use crate::embeddings::EmbeddingProvider;
use crate::ingestion::{
    Chunker, Document, DocumentCache, IngestOptions, IngestReport, IngestionPipeline,
    ResumeTracker,
};
use crate::message::ChatMessage;
use crate::query::{
    ChatClient, ChatRequest, DeltaStream, RetrievalResult, Retriever, assemble_prompt,
};
use crate::sampling::SamplingConfig;
use crate::stores::Backend;
use crate::types::RagError;

/// Per-call overrides for [`RagEngine::answer`] and
/// [`RagEngine::answer_stream`]. Unset fields fall back to the engine's
/// [`EngineDefaults`].
#[derive(Clone, Debug, Default)]
pub struct QueryOptions {
    pub top_k: Option<usize>,
    pub chat_model: Option<String>,
    pub system_prompt: Option<String>,
    pub sampling: Option<SamplingConfig>,
}

impl QueryOptions {
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    #[must_use]
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = Some(model.into());
        self
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    #[must_use]
    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = Some(sampling);
        self
    }
}

/// A grounded answer: the assistant message plus the retrieval that
/// supported it.
#[derive(Clone, Debug)]
pub struct RagAnswer {
    pub message: ChatMessage,
    pub retrieval: RetrievalResult,
}

/// A streaming answer: retrieval completes eagerly, generation is consumed
/// incrementally from `deltas`.
pub struct StreamingAnswer {
    pub deltas: DeltaStream,
    pub retrieval: RetrievalResult,
}

/// Builder assembling a [`RagEngine`] from its three backends.
pub struct RagEngineBuilder {
    backend: Arc<dyn Backend>,
    provider: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatClient>,
    defaults: EngineDefaults,
    chunker: Chunker,
    ingest_options: IngestOptions,
    cache: Option<DocumentCache>,
    resume: Option<ResumeTracker>,
}

impl RagEngineBuilder {
    #[must_use]
    pub fn with_defaults(mut self, defaults: EngineDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    #[must_use]
    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    #[must_use]
    pub fn with_ingest_options(mut self, options: IngestOptions) -> Self {
        self.ingest_options = options;
        self
    }

    #[must_use]
    pub fn with_document_cache(mut self, cache: DocumentCache) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn with_resume_tracker(mut self, tracker: ResumeTracker) -> Self {
        self.resume = Some(tracker);
        self
    }

    pub fn build(self) -> RagEngine {
        let manager = CollectionManager::new(Arc::clone(&self.backend));
        let retriever = Retriever::new(Arc::clone(&self.backend), Arc::clone(&self.provider));
        let mut pipeline =
            IngestionPipeline::new(Arc::clone(&self.backend), Arc::clone(&self.provider))
                .with_chunker(self.chunker)
                .with_options(self.ingest_options);
        if let Some(cache) = self.cache {
            pipeline = pipeline.with_cache(cache);
        }
        if let Some(tracker) = self.resume {
            pipeline = pipeline.with_resume_tracker(tracker);
        }
        RagEngine {
            manager,
            pipeline,
            retriever,
            chat: self.chat,
            defaults: self.defaults,
        }
    }
}

/// Orchestrates the full retrieve-augment-generate flow over one backend,
/// one embedding provider, and one chat client.
pub struct RagEngine {
    manager: CollectionManager,
    pipeline: IngestionPipeline,
    retriever: Retriever,
    chat: Arc<dyn ChatClient>,
    defaults: EngineDefaults,
}

impl RagEngine {
    pub fn builder(
        backend: Arc<dyn Backend>,
        provider: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatClient>,
    ) -> RagEngineBuilder {
        RagEngineBuilder {
            backend,
            provider,
            chat,
            defaults: EngineDefaults::default(),
            chunker: Chunker::default(),
            ingest_options: IngestOptions::default(),
            cache: None,
            resume: None,
        }
    }

    pub fn collections(&self) -> &CollectionManager {
        &self.manager
    }

    /// Registers a collection; idempotent for identical parameters.
    pub async fn register_collection(&self, spec: CollectionSpec) -> Result<Collection, RagError> {
        self.manager.register(spec).await
    }

    /// Drops a collection and its chunks. Returns `false` if it did not exist.
    pub async fn deregister_collection(&self, id: &str) -> Result<bool, RagError> {
        self.manager.deregister(id).await
    }

    /// Ingests documents into the named collection, chunked at the
    /// collection's configured chunk size.
    pub async fn ingest(
        &self,
        documents: &[Document],
        collection_id: &str,
    ) -> Result<IngestReport, RagError> {
        let collection = self.require_collection(collection_id).await?;
        self.pipeline
            .ingest(documents, &collection, collection.chunk_size)
            .await
    }

    /// Retrieves the most relevant chunks for `query` across the named
    /// collections.
    pub async fn retrieve(
        &self,
        query: &str,
        collection_ids: &[&str],
        top_k: Option<usize>,
    ) -> Result<RetrievalResult, RagError> {
        let collections = self.resolve_collections(collection_ids).await?;
        self.retriever
            .retrieve(query, &collections, top_k.unwrap_or(self.defaults.top_k))
            .await
    }

    /// Answers `query` grounded in the named collections: retrieve, assemble
    /// the prompt, and run a blocking chat completion.
    pub async fn answer(
        &self,
        query: &str,
        collection_ids: &[&str],
        options: QueryOptions,
    ) -> Result<RagAnswer, RagError> {
        let (retrieval, request) = self.prepare(query, collection_ids, options).await?;
        let message = self.chat.complete(request).await?;
        Ok(RagAnswer { message, retrieval })
    }

    /// Streaming form of [`RagEngine::answer`]: retrieval runs eagerly, the
    /// completion is returned as a delta stream.
    pub async fn answer_stream(
        &self,
        query: &str,
        collection_ids: &[&str],
        options: QueryOptions,
    ) -> Result<StreamingAnswer, RagError> {
        let (retrieval, request) = self.prepare(query, collection_ids, options).await?;
        let deltas = self.chat.stream(request).await?;
        Ok(StreamingAnswer { deltas, retrieval })
    }

    async fn prepare(
        &self,
        query: &str,
        collection_ids: &[&str],
        options: QueryOptions,
    ) -> Result<(RetrievalResult, ChatRequest), RagError> {
        let collections = self.resolve_collections(collection_ids).await?;
        let top_k = options.top_k.unwrap_or(self.defaults.top_k);
        let retrieval = self.retriever.retrieve(query, &collections, top_k).await?;

        let system_prompt = options
            .system_prompt
            .as_deref()
            .unwrap_or(&self.defaults.system_prompt);
        let messages = assemble_prompt(system_prompt, query, &retrieval.context_text());

        let model = options
            .chat_model
            .unwrap_or_else(|| self.defaults.chat_model.clone());
        let sampling = options.sampling.unwrap_or(self.defaults.sampling);
        let request = ChatRequest::new(messages, model).with_sampling(sampling);
        Ok((retrieval, request))
    }

    async fn require_collection(&self, id: &str) -> Result<Collection, RagError> {
        self.manager.get(id).await?.ok_or_else(|| {
            RagError::Configuration(format!("collection '{id}' is not registered"))
        })
    }

    async fn resolve_collections(&self, ids: &[&str]) -> Result<Vec<Collection>, RagError> {
        let mut collections = Vec::with_capacity(ids.len());
        for id in ids {
            collections.push(self.require_collection(id).await?);
        }
        Ok(collections)
    }
}
