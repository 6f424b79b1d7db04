//! Multi-collection nearest-neighbour retrieval.

use std::sync::Arc;

use crate::collections::Collection;
use crate::embeddings::EmbeddingProvider;
use crate::stores::{Backend, ChunkRecord};
use crate::types::RagError;

/// One matched chunk with its relevance score.
#[derive(Clone, Debug)]
pub struct RetrievedChunk {
    /// Collection the chunk came from.
    pub collection_id: String,
    /// The stored chunk.
    pub record: ChunkRecord,
    /// Similarity score, higher is more relevant.
    pub score: f32,
}

/// Matched chunks in relevance order. Transient; consumed immediately to
/// build a prompt.
#[derive(Clone, Debug, Default)]
pub struct RetrievalResult {
    pub matches: Vec<RetrievedChunk>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// Concatenates matched chunk texts, in relevance order, for prompt
    /// assembly. Empty when nothing matched.
    pub fn context_text(&self) -> String {
        self.matches
            .iter()
            .map(|matched| matched.record.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Embeds queries and searches one or more collections.
pub struct Retriever {
    backend: Arc<dyn Backend>,
    provider: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(backend: Arc<dyn Backend>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { backend, provider }
    }

    /// Retrieves the `top_k` most relevant chunks across `collections`.
    ///
    /// All target collections must declare the same embedding model; the
    /// query is embedded once. Results merge by descending score, ties
    /// broken by the order collections were passed, then by chunk position.
    pub async fn retrieve(
        &self,
        query: &str,
        collections: &[Collection],
        top_k: usize,
    ) -> Result<RetrievalResult, RagError> {
        if collections.is_empty() {
            return Err(RagError::Configuration(
                "retrieve requires at least one collection".to_string(),
            ));
        }
        let model = &collections[0].embedding_model;
        if let Some(other) = collections
            .iter()
            .find(|collection| &collection.embedding_model != model)
        {
            return Err(RagError::Configuration(format!(
                "collections disagree on embedding model: '{model}' vs '{}' ({})",
                other.embedding_model, other.id
            )));
        }
        if self.provider.model() != *model {
            return Err(RagError::Configuration(format!(
                "collections declare embedding model '{model}' but the provider serves '{}'",
                self.provider.model()
            )));
        }

        let embedded = self
            .provider
            .embed_batch(std::slice::from_ref(&query.to_string()))
            .await?;
        let query_embedding = embedded
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("provider returned no query embedding".into()))?;
        for collection in collections {
            if query_embedding.len() != collection.embedding_dimension {
                return Err(RagError::Embedding(format!(
                    "query embedding dimension {} does not match collection '{}' dimension {}",
                    query_embedding.len(),
                    collection.id,
                    collection.embedding_dimension
                )));
            }
        }

        // collection_order carries the tie-break rank for the merge below.
        let mut merged: Vec<(usize, RetrievedChunk)> = Vec::new();
        for (collection_order, collection) in collections.iter().enumerate() {
            let found = self
                .backend
                .search_similar(&collection.id, &query_embedding, top_k)
                .await?;
            tracing::debug!(
                collection = %collection.id,
                matches = found.len(),
                "collection searched"
            );
            for (record, score) in found {
                merged.push((
                    collection_order,
                    RetrievedChunk {
                        collection_id: collection.id.clone(),
                        record,
                        score,
                    },
                ));
            }
        }

        merged.sort_by(|(order_a, a), (order_b, b)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(order_a.cmp(order_b))
                .then(a.record.chunk_index.cmp(&b.record.chunk_index))
        });
        merged.truncate(top_k);

        Ok(RetrievalResult {
            matches: merged.into_iter().map(|(_, matched)| matched).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::{CollectionManager, CollectionSpec};
    use crate::embeddings::MockEmbeddingProvider;
    use crate::stores::MemoryVectorStore;

    fn chunk(id: &str, index: usize, content: &str, embedding: Vec<f32>) -> ChunkRecord {
        ChunkRecord::new(id, "doc", index, content).with_embedding(embedding)
    }

    async fn setup() -> (Arc<MemoryVectorStore>, Vec<Collection>) {
        let backend = Arc::new(MemoryVectorStore::new());
        let manager = CollectionManager::new(backend.clone());
        let c1 = manager
            .register(CollectionSpec::new("c1", "mock-embedder", 2, 64))
            .await
            .unwrap();
        let c2 = manager
            .register(CollectionSpec::new("c2", "mock-embedder", 2, 64))
            .await
            .unwrap();
        (backend, vec![c1, c2])
    }

    #[tokio::test]
    async fn mismatched_models_are_rejected() {
        let backend = Arc::new(MemoryVectorStore::new());
        let manager = CollectionManager::new(backend.clone());
        let c1 = manager
            .register(CollectionSpec::new("c1", "model-a", 2, 64))
            .await
            .unwrap();
        let c2 = manager
            .register(CollectionSpec::new("c2", "model-b", 2, 64))
            .await
            .unwrap();

        let retriever = Retriever::new(backend, Arc::new(MockEmbeddingProvider::new(2)));
        let err = retriever.retrieve("q", &[c1, c2], 4).await.unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));
    }

    #[tokio::test]
    async fn merge_breaks_ties_by_collection_order_then_position() {
        let (backend, collections) = setup().await;
        // Identical vectors produce identical scores; ordering must then
        // follow the collection argument order and chunk position.
        backend
            .append_chunks(
                "c1",
                vec![
                    chunk("a1", 1, "c1 pos1", vec![1.0, 0.0]),
                    chunk("a0", 0, "c1 pos0", vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();
        backend
            .append_chunks("c2", vec![chunk("b0", 0, "c2 pos0", vec![1.0, 0.0])])
            .await
            .unwrap();

        let provider = Arc::new(MockEmbeddingProvider::new(2));
        let retriever = Retriever::new(backend, provider);
        let result = retriever
            .retrieve("anything", &collections, 3)
            .await
            .unwrap();

        let ids: Vec<&str> = result
            .matches
            .iter()
            .map(|m| m.record.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a0", "a1", "b0"]);
    }

    #[tokio::test]
    async fn query_dimension_mismatch_is_an_embedding_error() {
        let (backend, collections) = setup().await;
        backend
            .append_chunks("c1", vec![chunk("a0", 0, "text", vec![1.0, 0.0])])
            .await
            .unwrap();

        // Provider emits 3-dim vectors against 2-dim collections.
        let retriever = Retriever::new(backend, Arc::new(MockEmbeddingProvider::new(3)));
        let err = retriever.retrieve("q", &collections, 4).await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[tokio::test]
    async fn truncates_to_top_k() {
        let (backend, collections) = setup().await;
        backend
            .append_chunks(
                "c1",
                (0..5)
                    .map(|i| chunk(&format!("k{i}"), i, "text", vec![1.0, 0.0]))
                    .collect(),
            )
            .await
            .unwrap();

        let retriever = Retriever::new(backend, Arc::new(MockEmbeddingProvider::new(2)));
        let result = retriever.retrieve("q", &collections, 2).await.unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn empty_collections_yield_empty_result() {
        let (backend, collections) = setup().await;
        let retriever = Retriever::new(backend, Arc::new(MockEmbeddingProvider::new(2)));
        let result = retriever.retrieve("q", &collections, 4).await.unwrap();
        assert!(result.is_empty());
        assert_eq!(result.context_text(), "");
    }
}
