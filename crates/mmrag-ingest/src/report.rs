use std::path::PathBuf;

use serde::Serialize;

use mmrag_core::types::LoadFailure;

/// A chunk the embedding backend could not turn into a vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkFailure {
    pub source_file: String,
    pub chunk_index: usize,
    pub error: String,
}

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestionReport {
    pub documents_loaded: usize,
    pub load_failures: Vec<LoadFailure>,
    pub chunks_total: usize,
    pub chunks_embedded: usize,
    pub chunk_failures: Vec<ChunkFailure>,
    pub store_path: PathBuf,
}

impl IngestionReport {
    /// True when every file loaded and every chunk was embedded.
    pub fn is_clean(&self) -> bool {
        self.load_failures.is_empty() && self.chunk_failures.is_empty()
    }
}
