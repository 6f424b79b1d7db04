//! In-memory backend with an exact cosine-similarity scan.
//!
//! Useful for tests and small corpora; appends for a collection happen under
//! one lock so their order matches arrival order.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::collections::Collection;
use crate::types::RagError;

use super::{Backend, ChunkRecord, check_dimensions};

struct CollectionState {
    meta: Collection,
    chunks: Vec<ChunkRecord>,
}

/// Process-local vector store.
#[derive(Default)]
pub struct MemoryVectorStore {
    state: RwLock<HashMap<String, CollectionState>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl Backend for MemoryVectorStore {
    async fn create_collection(&self, collection: &Collection) -> Result<(), RagError> {
        let mut state = self.state.write();
        if state.contains_key(&collection.id) {
            return Err(RagError::Storage(format!(
                "collection '{}' already exists",
                collection.id
            )));
        }
        state.insert(
            collection.id.clone(),
            CollectionState {
                meta: collection.clone(),
                chunks: Vec::new(),
            },
        );
        Ok(())
    }

    async fn get_collection(&self, id: &str) -> Result<Option<Collection>, RagError> {
        Ok(self.state.read().get(id).map(|entry| entry.meta.clone()))
    }

    async fn drop_collection(&self, id: &str) -> Result<bool, RagError> {
        Ok(self.state.write().remove(id).is_some())
    }

    async fn append_chunks(
        &self,
        collection_id: &str,
        chunks: Vec<ChunkRecord>,
    ) -> Result<(), RagError> {
        let mut state = self.state.write();
        let entry = state.get_mut(collection_id).ok_or_else(|| {
            RagError::Storage(format!("unknown collection '{collection_id}'"))
        })?;
        check_dimensions(&entry.meta, &chunks)?;
        entry.chunks.extend(chunks);
        Ok(())
    }

    async fn get_chunks_by_document(
        &self,
        collection_id: &str,
        document_id: &str,
    ) -> Result<Vec<ChunkRecord>, RagError> {
        let state = self.state.read();
        let entry = state.get(collection_id).ok_or_else(|| {
            RagError::Storage(format!("unknown collection '{collection_id}'"))
        })?;
        let mut found: Vec<ChunkRecord> = entry
            .chunks
            .iter()
            .filter(|chunk| chunk.document_id == document_id)
            .cloned()
            .collect();
        found.sort_by_key(|chunk| chunk.chunk_index);
        Ok(found)
    }

    async fn delete_chunks_by_document(
        &self,
        collection_id: &str,
        document_id: &str,
    ) -> Result<usize, RagError> {
        let mut state = self.state.write();
        let entry = state.get_mut(collection_id).ok_or_else(|| {
            RagError::Storage(format!("unknown collection '{collection_id}'"))
        })?;
        let before = entry.chunks.len();
        entry.chunks.retain(|chunk| chunk.document_id != document_id);
        Ok(before - entry.chunks.len())
    }

    async fn search_similar(
        &self,
        collection_id: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>, RagError> {
        let state = self.state.read();
        let entry = state.get(collection_id).ok_or_else(|| {
            RagError::Retrieval(format!("unknown collection '{collection_id}'"))
        })?;
        if query_embedding.len() != entry.meta.embedding_dimension {
            return Err(RagError::Embedding(format!(
                "query dimension {} does not match collection '{collection_id}' dimension {}",
                query_embedding.len(),
                entry.meta.embedding_dimension
            )));
        }
        let mut scored: Vec<(ChunkRecord, f32)> = entry
            .chunks
            .iter()
            .filter_map(|chunk| {
                let embedding = chunk.embedding.as_ref()?;
                Some((chunk.clone(), cosine_similarity(embedding, query_embedding)))
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn count(&self, collection_id: &str) -> Result<usize, RagError> {
        let state = self.state.read();
        let entry = state.get(collection_id).ok_or_else(|| {
            RagError::Storage(format!("unknown collection '{collection_id}'"))
        })?;
        Ok(entry.chunks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(dim: usize) -> Collection {
        Collection {
            id: "c1".to_string(),
            embedding_model: "all-MiniLM-L6-v2".to_string(),
            embedding_dimension: dim,
            chunk_size: 128,
        }
    }

    #[tokio::test]
    async fn append_rejects_dimension_mismatch() {
        let store = MemoryVectorStore::new();
        store.create_collection(&collection(3)).await.unwrap();

        let bad = ChunkRecord::new("k1", "doc", 0, "text").with_embedding(vec![0.1, 0.2]);
        let err = store.append_chunks("c1", vec![bad]).await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
        assert_eq!(store.count("c1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let store = MemoryVectorStore::new();
        store.create_collection(&collection(2)).await.unwrap();
        store
            .append_chunks(
                "c1",
                vec![
                    ChunkRecord::new("a", "doc", 0, "east").with_embedding(vec![1.0, 0.0]),
                    ChunkRecord::new("b", "doc", 1, "north").with_embedding(vec![0.0, 1.0]),
                    ChunkRecord::new("c", "doc", 2, "northeast")
                        .with_embedding(vec![0.7, 0.7]),
                ],
            )
            .await
            .unwrap();

        let results = store.search_similar("c1", &[1.0, 0.1], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.id, "a");
        assert!(results[0].1 >= results[1].1);
    }

    #[tokio::test]
    async fn search_rejects_query_dimension_mismatch() {
        let store = MemoryVectorStore::new();
        store.create_collection(&collection(16)).await.unwrap();
        store
            .append_chunks(
                "c1",
                vec![ChunkRecord::new("a", "doc", 0, "x").with_embedding(vec![0.5; 16])],
            )
            .await
            .unwrap();

        let err = store
            .search_similar("c1", &[1.0, 0.0, 0.0], 4)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[tokio::test]
    async fn delete_by_document_removes_only_that_document() {
        let store = MemoryVectorStore::new();
        store.create_collection(&collection(1)).await.unwrap();
        store
            .append_chunks(
                "c1",
                vec![
                    ChunkRecord::new("a", "doc1", 0, "x").with_embedding(vec![1.0]),
                    ChunkRecord::new("b", "doc2", 0, "y").with_embedding(vec![1.0]),
                ],
            )
            .await
            .unwrap();

        assert_eq!(store.delete_chunks_by_document("c1", "doc1").await.unwrap(), 1);
        assert_eq!(store.count("c1").await.unwrap(), 1);
        let remaining = store.get_chunks_by_document("c1", "doc2").await.unwrap();
        assert_eq!(remaining.len(), 1);
    }
}
