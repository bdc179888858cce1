//! Domain types shared by the chunker, embedder, vector index and ingestion
//! pipeline.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;

/// Open, source-specific metadata (OCR text, image paths, ...).
pub type Meta = BTreeMap<String, serde_json::Value>;

/// Where each kind of document is read from.
pub type SourceDirs = BTreeMap<DocumentKind, PathBuf>;

/// Sentinel file type for names without a usable extension.
pub const UNKNOWN_FILETYPE: &str = "unknown";

/// Category of source document; each kind has its own data directory and loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Image,
    Pdf,
    Docx,
    Markdown,
    Excel,
}

impl DocumentKind {
    /// Every kind, in the order ingestion visits them.
    pub const ALL: [Self; 5] = [Self::Image, Self::Pdf, Self::Docx, Self::Markdown, Self::Excel];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Markdown => "markdown",
            Self::Excel => "excel",
        }
    }

    /// Lower-case file extensions a loader of this kind picks up.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Image => &["png", "jpg", "jpeg"],
            Self::Pdf => &["pdf"],
            Self::Docx => &["docx"],
            Self::Markdown => &["md"],
            Self::Excel => &["xls", "xlsx", "xlsm"],
        }
    }

    pub fn matches(self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| self.extensions().iter().any(|x| x.eq_ignore_ascii_case(e)))
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "image" | "images" => Ok(Self::Image),
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            "markdown" | "md" => Ok(Self::Markdown),
            "excel" | "xls" | "xlsx" => Ok(Self::Excel),
            other => Err(Error::InvalidConfiguration(format!("unsupported filetype '{other}'"))),
        }
    }
}

/// A source file after text extraction. Read-only to the core; dropped once chunked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub filename: String,
    pub kind: DocumentKind,
    pub text: String,
    /// Loader-specific fields copied into every record built from this document.
    #[serde(default)]
    pub extra: Meta,
}

impl Document {
    pub fn new(filename: impl Into<String>, kind: DocumentKind, text: impl Into<String>) -> Self {
        Self { filename: filename.into(), kind, text: text.into(), extra: Meta::new() }
    }

    #[must_use]
    pub fn with_extra(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }
}

/// A contiguous word window of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub chunk_index: usize,
    pub source_file: String,
}

/// Metadata stored next to every vector in the index.
///
/// The fixed fields are always present; anything source-specific lives in
/// `extra` and is flattened into the same JSON object on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub uuid: Uuid,
    pub timestamp: DateTime<Utc>,
    pub filetype: String,
    pub source_file: String,
    pub chunk_index: usize,
    pub text: String,
    #[serde(flatten)]
    pub extra: Meta,
}

/// The unit of storage: one embedded chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub metadata: RecordMetadata,
}

/// One ranked search result. `distance` is squared L2; lower is nearer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub distance: f32,
    pub metadata: RecordMetadata,
}

/// A file a loader could not turn into a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadFailure {
    pub kind: DocumentKind,
    pub path: String,
    pub error: String,
}

/// Everything one loader produced for one directory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadOutcome {
    pub documents: Vec<Document>,
    pub failures: Vec<LoadFailure>,
}

/// Infer a file type from a file name: the lower-cased extension without its
/// dot, or [`UNKNOWN_FILETYPE`].
pub fn filetype_from_name(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map_or_else(|| UNKNOWN_FILETYPE.to_string(), str::to_ascii_lowercase)
}
