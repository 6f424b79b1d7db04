//! Source resolution and caching for documents entering the pipeline.

use std::path::{Path, PathBuf};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::fs;
use url::Url;

use crate::types::RagError;

/// Where a document's content comes from.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum DocumentSource {
    /// Fetched over HTTP(S).
    Remote(Url),
    /// Supplied inline by the caller.
    Inline(String),
}

/// A source document submitted for ingestion.
///
/// Immutable once submitted; the id must be unique within a batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    /// Identifier, unique within an ingestion batch.
    pub id: String,
    /// URI or inline content.
    pub source: DocumentSource,
    /// MIME type, e.g. `text/html` or `text/plain`.
    pub content_type: String,
    /// Free-form metadata carried through to every derived chunk.
    pub metadata: serde_json::Value,
}

impl Document {
    /// A document fetched from a remote URL.
    pub fn remote(id: impl Into<String>, url: Url, content_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: DocumentSource::Remote(url),
            content_type: content_type.into(),
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    /// A document whose content is supplied inline.
    pub fn inline(
        id: impl Into<String>,
        content: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: DocumentSource::Inline(content.into()),
            content_type: content_type.into(),
            metadata: serde_json::Value::Object(Default::default()),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Filesystem-backed cache for downloaded documents.
///
/// URLs normalize into deterministic file names so repeated runs reuse
/// previously downloaded content instead of hitting the network.
#[derive(Clone, Debug)]
pub struct DocumentCache {
    root: PathBuf,
}

impl DocumentCache {
    /// Creates a cache rooted at the provided path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the cache root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Computes the cache file path for a specific URL.
    pub fn cache_path(&self, url: &Url) -> PathBuf {
        let mut components: Vec<String> = url
            .path()
            .trim_start_matches('/')
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(sanitize_component)
            .collect();

        if components.is_empty() {
            components.push("index".to_string());
        }

        let mut file_name = components.join("_");

        if let Some(query) = url.query() {
            file_name.push('_');
            file_name.push_str(&sanitize_component(query));
        }

        if Path::new(&file_name).extension().is_none() {
            file_name.push_str(".raw");
        }

        self.root.join(file_name)
    }

    /// Default path for persisting ingestion state (resume tracking).
    pub fn state_file(&self) -> PathBuf {
        self.root.join("ingest_state.json")
    }
}

/// Result of resolving a document source to raw bytes.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub document_id: String,
    pub bytes: Vec<u8>,
    pub cache_path: Option<PathBuf>,
    pub from_cache: bool,
}

/// Checks that a document's source can be resolved at all.
///
/// A non-HTTP(S) scheme can never succeed, so callers should fail fast
/// instead of retrying.
pub(crate) fn ensure_fetchable(document: &Document) -> Result<(), RagError> {
    if let DocumentSource::Remote(url) = &document.source {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RagError::Fetch(format!(
                "document '{}': unsupported scheme '{}'",
                document.id,
                url.scheme()
            )));
        }
    }
    Ok(())
}

/// Resolves a document's source reference to raw bytes.
///
/// Inline sources resolve locally. Remote sources go over the network unless
/// the cache already holds the URL's content; fresh downloads are written
/// back into the cache.
pub async fn fetch_document(
    client: &Client,
    document: &Document,
    cache: Option<&DocumentCache>,
) -> Result<FetchOutcome, RagError> {
    let url = match &document.source {
        DocumentSource::Inline(content) => {
            return Ok(FetchOutcome {
                document_id: document.id.clone(),
                bytes: content.clone().into_bytes(),
                cache_path: None,
                from_cache: false,
            });
        }
        DocumentSource::Remote(url) => url,
    };

    ensure_fetchable(document)?;

    if let Some(cache) = cache {
        let cache_path = cache.cache_path(url);
        if cache_path.exists() {
            let bytes = fs::read(&cache_path).await?;
            tracing::debug!(document = %document.id, path = %cache_path.display(), "cache hit");
            return Ok(FetchOutcome {
                document_id: document.id.clone(),
                bytes,
                cache_path: Some(cache_path),
                from_cache: true,
            });
        }

        let bytes = fetch_from_network(client, url).await?;
        if let Some(parent) = cache_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&cache_path, &bytes).await?;

        return Ok(FetchOutcome {
            document_id: document.id.clone(),
            bytes,
            cache_path: Some(cache_path),
            from_cache: false,
        });
    }

    let bytes = fetch_from_network(client, url).await?;
    Ok(FetchOutcome {
        document_id: document.id.clone(),
        bytes,
        cache_path: None,
        from_cache: false,
    })
}

async fn fetch_from_network(client: &Client, url: &Url) -> Result<Vec<u8>, RagError> {
    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|err| RagError::Fetch(err.to_string()))?
        .error_for_status()
        .map_err(|err| RagError::Fetch(err.to_string()))?;
    let bytes = response
        .bytes()
        .await
        .map_err(|err| RagError::Fetch(err.to_string()))?;
    Ok(bytes.to_vec())
}

fn sanitize_component(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
