//! Collection metadata and the registration surface.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::stores::Backend;
use crate::types::RagError;

/// A named, immutable store of embedded text chunks searchable by vector
/// similarity.
///
/// Created once via [`CollectionManager::register`]; destroyed only by
/// explicit deregistration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Unique identifier.
    pub id: String,
    /// Name of the embedding model all chunks in this collection use.
    pub embedding_model: String,
    /// Dimensionality every chunk embedding must match.
    pub embedding_dimension: usize,
    /// Default token count per chunk for ingestion into this collection.
    pub chunk_size: usize,
}

/// Parameters for registering a new collection.
#[derive(Clone, Debug)]
pub struct CollectionSpec {
    pub id: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub chunk_size: usize,
}

impl CollectionSpec {
    pub fn new(
        id: impl Into<String>,
        embedding_model: impl Into<String>,
        embedding_dimension: usize,
        chunk_size: usize,
    ) -> Self {
        Self {
            id: id.into(),
            embedding_model: embedding_model.into(),
            embedding_dimension,
            chunk_size,
        }
    }

    fn validate(&self) -> Result<(), RagError> {
        if self.id.trim().is_empty() {
            return Err(RagError::Configuration(
                "collection id must not be empty".to_string(),
            ));
        }
        if self.embedding_dimension == 0 {
            return Err(RagError::Configuration(format!(
                "collection '{}': embedding dimension must be positive",
                self.id
            )));
        }
        if self.chunk_size == 0 {
            return Err(RagError::Configuration(format!(
                "collection '{}': chunk size must be positive",
                self.id
            )));
        }
        Ok(())
    }
}

impl From<CollectionSpec> for Collection {
    fn from(spec: CollectionSpec) -> Self {
        Collection {
            id: spec.id,
            embedding_model: spec.embedding_model,
            embedding_dimension: spec.embedding_dimension,
            chunk_size: spec.chunk_size,
        }
    }
}

/// Registers collections on a [`Backend`] and caches their metadata.
///
/// Registration is idempotent only for identical parameters: re-registering
/// an existing id with the same model, dimension, and chunk size returns the
/// stored collection; any difference is a [`RagError::Configuration`].
#[derive(Clone)]
pub struct CollectionManager {
    backend: Arc<dyn Backend>,
    cache: Arc<RwLock<HashMap<String, Collection>>>,
}

impl CollectionManager {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registers a collection, durably creating its metadata on the backend.
    pub async fn register(&self, spec: CollectionSpec) -> Result<Collection, RagError> {
        spec.validate()?;

        if let Some(existing) = self.get(&spec.id).await? {
            let requested: Collection = spec.into();
            if existing == requested {
                return Ok(existing);
            }
            return Err(RagError::Configuration(format!(
                "collection '{}' already exists with incompatible parameters",
                existing.id
            )));
        }

        let collection: Collection = spec.into();
        self.backend.create_collection(&collection).await?;
        tracing::info!(
            collection = %collection.id,
            model = %collection.embedding_model,
            dimension = collection.embedding_dimension,
            "registered collection"
        );
        self.cache
            .write()
            .insert(collection.id.clone(), collection.clone());
        Ok(collection)
    }

    /// Looks up a collection, consulting the cache before the backend.
    pub async fn get(&self, id: &str) -> Result<Option<Collection>, RagError> {
        if let Some(found) = self.cache.read().get(id) {
            return Ok(Some(found.clone()));
        }
        let found = self.backend.get_collection(id).await?;
        if let Some(collection) = &found {
            self.cache.write().insert(id.to_string(), collection.clone());
        }
        Ok(found)
    }

    /// Drops a collection and all of its chunks.
    ///
    /// Returns `false` when no collection with that id existed.
    pub async fn deregister(&self, id: &str) -> Result<bool, RagError> {
        self.cache.write().remove(id);
        let dropped = self.backend.drop_collection(id).await?;
        if dropped {
            tracing::info!(collection = %id, "deregistered collection");
        }
        Ok(dropped)
    }
}
