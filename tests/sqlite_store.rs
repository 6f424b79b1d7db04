//! Durable store tests against a real sqlite file with the vec0 extension.

use std::sync::Arc;

use tempfile::tempdir;

use ragline::stores::{Backend, ChunkRecord, SqliteVectorStore};
use ragline::{Collection, RagError};

fn test_collection() -> Collection {
    Collection {
        id: "notes".to_string(),
        embedding_model: "mock-embedder".to_string(),
        embedding_dimension: 2,
        chunk_size: 64,
    }
}

fn chunk(id: &str, document_id: &str, index: usize, content: &str, embedding: Vec<f32>) -> ChunkRecord {
    ChunkRecord::new(id.to_string(), document_id.to_string(), index, content.to_string())
        .with_embedding(embedding)
}

async fn open_store() -> (tempfile::TempDir, Arc<SqliteVectorStore>) {
    let dir = tempdir().unwrap();
    let store = SqliteVectorStore::open(dir.path().join("store.sqlite"))
        .await
        .unwrap();
    (dir, Arc::new(store))
}

#[tokio::test]
async fn collection_metadata_round_trips() {
    let (_dir, store) = open_store().await;
    let collection = test_collection();

    store.create_collection(&collection).await.unwrap();
    let loaded = store.get_collection("notes").await.unwrap().unwrap();
    assert_eq!(loaded, collection);

    // Duplicate creation is a storage error, not a silent overwrite.
    let err = store.create_collection(&collection).await.unwrap_err();
    assert!(matches!(err, RagError::Storage(_)));

    assert!(store.drop_collection("notes").await.unwrap());
    assert!(store.get_collection("notes").await.unwrap().is_none());
    assert!(!store.drop_collection("notes").await.unwrap());
}

#[tokio::test]
async fn search_orders_by_similarity() {
    let (_dir, store) = open_store().await;
    store.create_collection(&test_collection()).await.unwrap();

    store
        .append_chunks(
            "notes",
            vec![
                chunk("c-a", "doc-1", 0, "aligned", vec![1.0, 0.0]),
                chunk("c-b", "doc-1", 1, "orthogonal", vec![0.0, 1.0]),
                chunk("c-c", "doc-1", 2, "diagonal", vec![0.7, 0.7]),
            ],
        )
        .await
        .unwrap();

    let results = store.search_similar("notes", &[1.0, 0.0], 2).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].0.content, "aligned");
    assert_eq!(results[1].0.content, "diagonal");
    assert!(results[0].1 > results[1].1);
    assert!((results[0].1 - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn chunks_are_returned_in_document_order() {
    let (_dir, store) = open_store().await;
    store.create_collection(&test_collection()).await.unwrap();

    store
        .append_chunks(
            "notes",
            vec![
                chunk("c-2", "doc-1", 2, "third", vec![0.0, 1.0]),
                chunk("c-0", "doc-1", 0, "first", vec![1.0, 0.0]),
                chunk("c-1", "doc-1", 1, "second", vec![0.5, 0.5]),
            ],
        )
        .await
        .unwrap();

    let chunks = store.get_chunks_by_document("notes", "doc-1").await.unwrap();
    let contents: Vec<&str> = chunks.iter().map(|record| record.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn append_rejects_dimension_mismatch() {
    let (_dir, store) = open_store().await;
    store.create_collection(&test_collection()).await.unwrap();

    let err = store
        .append_chunks(
            "notes",
            vec![chunk("c-bad", "doc-1", 0, "too wide", vec![1.0, 0.0, 0.0])],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Embedding(_)));
    assert_eq!(store.count("notes").await.unwrap(), 0);
}

#[tokio::test]
async fn delete_by_document_removes_only_that_document() {
    let (_dir, store) = open_store().await;
    store.create_collection(&test_collection()).await.unwrap();

    store
        .append_chunks(
            "notes",
            vec![
                chunk("c-a", "doc-1", 0, "keep me out", vec![1.0, 0.0]),
                chunk("c-b", "doc-1", 1, "me too", vec![0.0, 1.0]),
                chunk("c-c", "doc-2", 0, "survivor", vec![0.5, 0.5]),
            ],
        )
        .await
        .unwrap();

    assert_eq!(store.delete_chunks_by_document("notes", "doc-1").await.unwrap(), 2);
    assert_eq!(store.count("notes").await.unwrap(), 1);

    let remaining = store.search_similar("notes", &[0.5, 0.5], 10).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].0.document_id, "doc-2");
}

#[tokio::test]
async fn store_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.sqlite");

    {
        let store = SqliteVectorStore::open(&path).await.unwrap();
        store.create_collection(&test_collection()).await.unwrap();
        store
            .append_chunks("notes", vec![chunk("c-a", "doc-1", 0, "durable", vec![1.0, 0.0])])
            .await
            .unwrap();
    }

    let reopened = SqliteVectorStore::open(&path).await.unwrap();
    assert_eq!(reopened.get_collection("notes").await.unwrap().unwrap(), test_collection());
    assert_eq!(reopened.count("notes").await.unwrap(), 1);

    let results = reopened.search_similar("notes", &[1.0, 0.0], 1).await.unwrap();
    assert_eq!(results[0].0.content, "durable");
}
