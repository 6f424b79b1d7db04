//! Durable backend on SQLite with vector search via `sqlite-vec`.
//!
//! Collection metadata and chunk rows live in ordinary tables; each
//! collection gets its own `vec0` virtual table for embeddings, joined to
//! `chunks` by rowid. All columns bind as TEXT so reads and writes stay on
//! single-type parameter arrays.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::{Mutex, Once};

use async_trait::async_trait;
use tokio_rusqlite::{Connection, OptionalExtension, ffi};

use crate::collections::Collection;
use crate::types::RagError;

use super::{Backend, ChunkRecord, check_dimensions};

/// SQLite-backed vector store.
///
/// Appends for one collection run inside a single transaction, so concurrent
/// ingest calls observe a serialized per-collection append order.
#[derive(Clone)]
pub struct SqliteVectorStore {
    conn: Connection,
}

impl SqliteVectorStore {
    /// Opens (or creates) the database at `path` and prepares the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RagError> {
        Self::register_sqlite_vec()?;
        let conn = Connection::open(path.as_ref().to_path_buf())
            .await
            .map_err(|err| RagError::Storage(err.to_string()))?;

        // Probe the extension before doing anything else.
        conn.call(|conn| {
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))?;
            Ok(())
        })
        .await
        .map_err(|err| RagError::Storage(err.to_string()))?;

        conn.call(|conn| {
            conn.execute(
                "CREATE TABLE IF NOT EXISTS collections (
                    id TEXT PRIMARY KEY,
                    embedding_model TEXT NOT NULL,
                    embedding_dimension TEXT NOT NULL,
                    chunk_size TEXT NOT NULL
                )",
                [],
            )?;
            conn.execute(
                "CREATE TABLE IF NOT EXISTS chunks (
                    id TEXT PRIMARY KEY,
                    collection_id TEXT NOT NULL,
                    document_id TEXT NOT NULL,
                    chunk_index TEXT NOT NULL,
                    content TEXT NOT NULL,
                    metadata TEXT NOT NULL
                )",
                [],
            )?;
            conn.execute(
                "CREATE INDEX IF NOT EXISTS idx_chunks_collection
                 ON chunks(collection_id, document_id)",
                [],
            )?;
            Ok(())
        })
        .await
        .map_err(|err| RagError::Storage(err.to_string()))?;

        Ok(Self { conn })
    }

    fn register_sqlite_vec() -> Result<(), RagError> {
        static INIT: Once = Once::new();
        static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

        INIT.call_once(|| {
            let result = unsafe {
                type SqliteExtensionInit = unsafe extern "C" fn(
                    *mut ffi::sqlite3,
                    *mut *mut c_char,
                    *const ffi::sqlite3_api_routines,
                ) -> i32;

                let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
                let init_fn: SqliteExtensionInit =
                    transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
                let rc = ffi::sqlite3_auto_extension(Some(init_fn));
                if rc != 0 {
                    Err(format!(
                        "failed to register sqlite-vec extension (code {rc})"
                    ))
                } else {
                    Ok(())
                }
            };
            *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
        });

        INIT_RESULT
            .lock()
            .expect("init result mutex poisoned")
            .clone()
            .expect("init was called but result not set")
            .map_err(RagError::Storage)
    }

    /// Underlying connection, for queries not covered by the [`Backend`] trait.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Embedding table name for a collection, with unsafe characters replaced.
fn vec_table_name(collection_id: &str) -> String {
    let sanitized: String = collection_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("vec_{sanitized}")
}

#[async_trait]
impl Backend for SqliteVectorStore {
    async fn create_collection(&self, collection: &Collection) -> Result<(), RagError> {
        let meta = collection.clone();
        let vec_table = vec_table_name(&meta.id);
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let existing: Option<String> = tx
                    .query_row(
                        "SELECT id FROM collections WHERE id = ?",
                        [&meta.id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if existing.is_some() {
                    return Err(tokio_rusqlite::Error::Other(
                        format!("collection '{}' already exists", meta.id).into(),
                    ));
                }
                tx.execute(
                    "INSERT INTO collections (id, embedding_model, embedding_dimension, chunk_size)
                     VALUES (?, ?, ?, ?)",
                    [
                        &meta.id,
                        &meta.embedding_model,
                        &meta.embedding_dimension.to_string(),
                        &meta.chunk_size.to_string(),
                    ],
                )?;
                tx.execute(
                    &format!(
                        "CREATE VIRTUAL TABLE \"{vec_table}\" USING vec0(embedding float[{}])",
                        meta.embedding_dimension
                    ),
                    [],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    async fn get_collection(&self, id: &str) -> Result<Option<Collection>, RagError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                let found = conn
                    .query_row(
                        "SELECT id, embedding_model, embedding_dimension, chunk_size
                         FROM collections WHERE id = ?",
                        [&id],
                        |row| {
                            Ok(Collection {
                                id: row.get(0)?,
                                embedding_model: row.get(1)?,
                                embedding_dimension: row
                                    .get::<_, String>(2)?
                                    .parse()
                                    .unwrap_or(0),
                                chunk_size: row.get::<_, String>(3)?.parse().unwrap_or(0),
                            })
                        },
                    )
                    .optional()?;
                Ok(found)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    async fn drop_collection(&self, id: &str) -> Result<bool, RagError> {
        let id = id.to_string();
        let vec_table = vec_table_name(&id);
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let removed = tx.execute("DELETE FROM collections WHERE id = ?", [&id])?;
                tx.execute("DELETE FROM chunks WHERE collection_id = ?", [&id])?;
                tx.execute(&format!("DROP TABLE IF EXISTS \"{vec_table}\""), [])?;
                tx.commit()?;
                Ok(removed > 0)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    async fn append_chunks(
        &self,
        collection_id: &str,
        chunks: Vec<ChunkRecord>,
    ) -> Result<(), RagError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let collection = self
            .get_collection(collection_id)
            .await?
            .ok_or_else(|| RagError::Storage(format!("unknown collection '{collection_id}'")))?;
        check_dimensions(&collection, &chunks)?;

        let collection_id = collection_id.to_string();
        let vec_table = vec_table_name(&collection_id);
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                for chunk in chunks {
                    let metadata = chunk.metadata.to_string();
                    tx.execute(
                        "INSERT INTO chunks (id, collection_id, document_id, chunk_index, content, metadata)
                         VALUES (?, ?, ?, ?, ?, ?)",
                        [
                            &chunk.id,
                            &collection_id,
                            &chunk.document_id,
                            &chunk.chunk_index.to_string(),
                            &chunk.content,
                            &metadata,
                        ],
                    )?;
                    let rowid = tx.last_insert_rowid();
                    let embedding = chunk.embedding.unwrap_or_default();
                    let embedding_json = serde_json::to_string(&embedding)
                        .map_err(|err| tokio_rusqlite::Error::Other(err.into()))?;
                    tx.execute(
                        &format!(
                            "INSERT INTO \"{vec_table}\" (rowid, embedding) VALUES ({rowid}, ?)"
                        ),
                        [&embedding_json],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    async fn get_chunks_by_document(
        &self,
        collection_id: &str,
        document_id: &str,
    ) -> Result<Vec<ChunkRecord>, RagError> {
        let collection_id = collection_id.to_string();
        let document_id = document_id.to_string();
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, document_id, chunk_index, content, metadata FROM chunks
                     WHERE collection_id = ? AND document_id = ?
                     ORDER BY CAST(chunk_index AS INTEGER)",
                )?;
                let rows = stmt.query_map([&collection_id, &document_id], |row| {
                    Ok(ChunkRecord {
                        id: row.get(0)?,
                        document_id: row.get(1)?,
                        chunk_index: row.get::<_, String>(2)?.parse().unwrap_or(0),
                        content: row.get(3)?,
                        metadata: row
                            .get::<_, String>(4)
                            .map(|raw| serde_json::from_str(&raw).unwrap_or_default())
                            .unwrap_or_default(),
                        embedding: None,
                    })
                })?;
                let mut results = Vec::new();
                for row in rows {
                    results.push(row?);
                }
                Ok(results)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    async fn delete_chunks_by_document(
        &self,
        collection_id: &str,
        document_id: &str,
    ) -> Result<usize, RagError> {
        let collection_id = collection_id.to_string();
        let document_id = document_id.to_string();
        let vec_table = vec_table_name(&collection_id);
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let rowids: Vec<i64> = {
                    let mut stmt = tx.prepare(
                        "SELECT rowid FROM chunks WHERE collection_id = ? AND document_id = ?",
                    )?;
                    let rows = stmt.query_map([&collection_id, &document_id], |row| row.get(0))?;
                    let mut ids = Vec::new();
                    for row in rows {
                        ids.push(row?);
                    }
                    ids
                };
                for rowid in &rowids {
                    tx.execute(
                        &format!("DELETE FROM \"{vec_table}\" WHERE rowid = {rowid}"),
                        [],
                    )?;
                }
                let deleted = tx.execute(
                    "DELETE FROM chunks WHERE collection_id = ? AND document_id = ?",
                    [&collection_id, &document_id],
                )?;
                tx.commit()?;
                Ok(deleted)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }

    async fn search_similar(
        &self,
        collection_id: &str,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(ChunkRecord, f32)>, RagError> {
        let embedding_json = serde_json::to_string(query_embedding)
            .map_err(|err| RagError::Retrieval(err.to_string()))?;
        let vec_table = vec_table_name(collection_id);
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT c.id, c.document_id, c.chunk_index, c.content, c.metadata, \
                     vec_distance_cosine(e.embedding, vec_f32(?)) as distance \
                     FROM chunks c \
                     JOIN \"{vec_table}\" e ON e.rowid = c.rowid \
                     ORDER BY distance ASC \
                     LIMIT {top_k}"
                ))?;
                let rows = stmt.query_map([&embedding_json], |row| {
                    let record = ChunkRecord {
                        id: row.get(0)?,
                        document_id: row.get(1)?,
                        chunk_index: row.get::<_, String>(2)?.parse().unwrap_or(0),
                        content: row.get(3)?,
                        metadata: row
                            .get::<_, String>(4)
                            .map(|raw| serde_json::from_str(&raw).unwrap_or_default())
                            .unwrap_or_default(),
                        embedding: None,
                    };
                    let distance: f32 = row.get(5)?;
                    // Cosine distance to similarity.
                    Ok((record, 1.0 - distance))
                })?;
                let mut results = Vec::new();
                for row in rows {
                    results.push(row?);
                }
                Ok(results)
            })
            .await
            .map_err(|err| RagError::Retrieval(err.to_string()))
    }

    async fn count(&self, collection_id: &str) -> Result<usize, RagError> {
        let collection_id = collection_id.to_string();
        self.conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM chunks WHERE collection_id = ?",
                    [&collection_id],
                    |row| row.get(0),
                )?;
                Ok(count as usize)
            })
            .await
            .map_err(|err| RagError::Storage(err.to_string()))
    }
}
