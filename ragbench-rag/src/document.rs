//! Data types for documents, chunks, and scored candidates, plus plain-text
//! document loading.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RagError, Result};

static NUMBERED_DATA_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^data_(\d+)\.txt$").expect("static regex is valid"));

/// Identifier of a source document: a file name or an integer source id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    /// Create an id from any string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derive an id from a file name.
    ///
    /// `data_03.txt` becomes the integer id `3`; any other name is used as-is.
    pub fn from_file_name(name: &str) -> Self {
        NUMBERED_DATA_FILE
            .captures(name)
            .and_then(|c| c.get(1))
            .and_then(|n| n.as_str().parse::<u64>().ok())
            .map(|n| Self(n.to_string()))
            .unwrap_or_else(|| Self(name.to_string()))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<u32> for DocumentId {
    fn from(value: u32) -> Self {
        Self(value.to_string())
    }
}

/// A source document containing text content and metadata.
///
/// Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Identifier for the document.
    pub id: DocumentId,
    /// The text content of the document.
    pub text: String,
    /// Key-value metadata associated with the document.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// Optional URI pointing to the original source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

impl Document {
    /// Create a document with no metadata.
    pub fn new(id: impl Into<DocumentId>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: HashMap::new(), source_uri: None }
    }
}

/// A contiguous span of a [`Document`], optionally carrying its embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk (`{source}_{sequence_index}`).
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The document this chunk was cut from.
    pub source: DocumentId,
    /// Position of this chunk within its document's chunk sequence.
    pub sequence_index: usize,
    /// The vector embedding for this chunk's text. Empty until the pipeline embeds it.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    /// Metadata inherited from the parent document plus chunk-specific fields.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Chunk {
    /// Build the chunk at `sequence_index` of `document`.
    pub fn from_document(document: &Document, sequence_index: usize, text: String) -> Self {
        let mut metadata = document.metadata.clone();
        metadata.insert("chunk_index".to_string(), sequence_index.to_string());
        Self {
            id: format!("{}_{sequence_index}", document.id),
            text,
            source: document.id.clone(),
            sequence_index,
            embedding: Vec::new(),
            metadata,
        }
    }
}

/// A retrieved [`Chunk`] with its first-pass similarity and optional rerank score.
///
/// Created per query and discarded afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// First-pass score (cosine similarity, lexical score, or fused RRF score).
    pub similarity_score: f32,
    /// Second-pass relevance score in `[0, 1]`, if a reranker ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
}

impl ScoredCandidate {
    /// Create a candidate with no rerank score.
    pub fn new(chunk: Chunk, similarity_score: f32) -> Self {
        Self { chunk, similarity_score, rerank_score: None }
    }

    /// The score that orders this candidate: the rerank score when present.
    pub fn final_score(&self) -> f32 {
        self.rerank_score.unwrap_or(self.similarity_score)
    }
}

/// Result of loading a batch of files.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Documents that were read successfully, in input order.
    pub documents: Vec<Document>,
    /// Files that were skipped, with the reason.
    pub skipped: Vec<(PathBuf, String)>,
}

/// Read a UTF-8 text file into a [`Document`] whose id is derived from the file name.
pub async fn load_document(path: &Path) -> Result<Document> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| RagError::Io { path: path.to_path_buf(), source })?;
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let mut document = Document::new(DocumentId::from_file_name(name), text);
    document.metadata.insert("file_name".to_string(), name.to_string());
    document.source_uri = Some(path.display().to_string());
    Ok(document)
}

/// Load every path, skipping files that are missing or unreadable.
pub async fn load_documents(paths: &[PathBuf]) -> LoadReport {
    let mut report = LoadReport::default();
    for path in paths {
        match load_document(path).await {
            Ok(document) => {
                debug!(path = %path.display(), document.id = %document.id, "loaded document");
                report.documents.push(document);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable document");
                report.skipped.push((path.clone(), e.to_string()));
            }
        }
    }
    report
}

/// List the `*.txt` files directly under `dir`, sorted by file name.
pub async fn discover_text_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let io_err = |source| RagError::Io { path: dir.to_path_buf(), source };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "txt") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
