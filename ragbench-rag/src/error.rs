//! Error types for the `ragbench-rag` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur in retrieval pipeline operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// A configuration validation error. Raised before any network call.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An error occurred during document chunking.
    #[error("Chunking error: {0}")]
    ChunkingError(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStoreError {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during result reranking.
    #[error("Reranker error ({reranker}): {message}")]
    RerankerError {
        /// The reranker that produced the error.
        reranker: String,
        /// A description of the failure.
        message: String,
    },

    /// The completion service failed to produce text.
    #[error("Completion error ({provider}): {message}")]
    CompletionError {
        /// The completion provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A collaborator answered with a non-success HTTP status.
    #[error("{service} returned HTTP {status}: {message}")]
    HttpStatus {
        /// The collaborator service name.
        service: String,
        /// The HTTP status code.
        status: u16,
        /// Response body or error detail.
        message: String,
    },

    /// The request never produced a response (connect failure, timeout).
    #[error("{service} request failed: {message}")]
    Transport {
        /// The collaborator service name.
        service: String,
        /// A description of the failure.
        message: String,
    },

    /// A collaborator response did not match the expected schema.
    #[error("{service} returned a malformed response: {message}")]
    MalformedResponse {
        /// The collaborator service name.
        service: String,
        /// What was missing or mistyped.
        message: String,
    },

    /// Reading an input file failed.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file that could not be read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// An error in the pipeline orchestration.
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RagError {
    /// Whether this error came from an external collaborator being unavailable
    /// or misbehaving, as opposed to a local configuration problem.
    ///
    /// Collaborator failures are recovered into degraded results by the
    /// pipeline; everything else is surfaced to the caller.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingError { .. }
                | Self::VectorStoreError { .. }
                | Self::RerankerError { .. }
                | Self::CompletionError { .. }
                | Self::HttpStatus { .. }
                | Self::Transport { .. }
                | Self::MalformedResponse { .. }
        )
    }

    /// Shorthand for a [`RagError::MalformedResponse`].
    pub fn malformed(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse { service: service.into(), message: message.into() }
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
