use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

use mmrag_core::error::Result;
use mmrag_core::types::{Meta, SearchHit};
use mmrag_embed::EmbeddingClient;

use crate::index::VectorIndex;

/// `source_file` recorded for query embeddings.
pub const QUERY_SOURCE: &str = "user_query";

/// Query-time entry point: embeds the query text with the same model the
/// index was built with and returns the nearest stored chunks.
pub struct SearchEngine {
    index: VectorIndex,
    client: EmbeddingClient,
    model_id: String,
}

impl SearchEngine {
    pub fn new(index: VectorIndex, client: EmbeddingClient, model_id: impl Into<String>) -> Self {
        Self { index, client, model_id: model_id.into() }
    }

    /// Open the store at `base`, or an empty index of `dimension` when none exists.
    pub fn open(base: &Path, dimension: usize, client: EmbeddingClient, model_id: impl Into<String>) -> Result<Self> {
        let index = VectorIndex::load_or_empty(base, dimension)?;
        info!(path = %base.display(), rows = index.len(), "search engine ready");
        Ok(Self::new(index, client, model_id))
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn search(&self, query_text: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        if self.index.is_empty() || top_k == 0 {
            debug!(top_k, "empty index or zero top_k; skipping query embedding");
            return Ok(Vec::new());
        }
        let mut meta = Meta::new();
        meta.insert("source_file".into(), Value::String(QUERY_SOURCE.into()));
        let query = self.client.embed(query_text, &self.model_id, meta)?;
        let hits = self.index.search(&query.vector, top_k)?;
        debug!(top_k, returned = hits.len(), "search complete");
        Ok(hits)
    }
}
