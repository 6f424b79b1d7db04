//! Crate-wide error taxonomy.
//!
//! Each pipeline stage maps its failures onto a dedicated variant so callers
//! can tell a bad collection definition apart from a flaky fetch or a
//! mid-stream generation failure. HTTP errors are converted at the call site
//! rather than through a blanket `From` impl; the same `reqwest::Error` means
//! different things in the fetch, embed, and generate stages.

use thiserror::Error;

/// Errors surfaced by the RAG pipelines.
#[derive(Debug, Error)]
pub enum RagError {
    /// Invalid collection parameters or mismatched models across collections.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A document source could not be resolved to raw bytes.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Raw bytes could not be converted to plain text.
    #[error("conversion failed: {0}")]
    Conversion(String),

    /// The embedding backend failed or returned a mismatched dimension.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Nearest-neighbour search against the backing store failed.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// The generation backend failed, possibly mid-stream.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The backing store rejected an operation.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem errors from caching and resume tracking.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for RagError {
    fn from(err: std::io::Error) -> Self {
        RagError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_render_their_stage() {
        let err = RagError::Embedding("dimension mismatch".into());
        assert_eq!(err.to_string(), "embedding failed: dimension mismatch");

        let err = RagError::Configuration("dimension must be positive".into());
        assert!(err.to_string().starts_with("configuration error"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: RagError = io.into();
        assert!(matches!(err, RagError::Io(_)));
    }
}
