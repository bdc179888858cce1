//! The embedding client: validates and enriches caller metadata, calls the
//! embedding backend, and packages the result as an [`EmbeddingRecord`].
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use mmrag_core::error::{Error, Result};
use mmrag_core::traits::Embedder;
use mmrag_core::types::{filetype_from_name, EmbeddingRecord, Meta, RecordMetadata};

/// Keys always generated by the client; caller-supplied values are dropped.
const GENERATED_KEYS: [&str; 3] = ["uuid", "timestamp", "filetype"];

#[derive(Clone)]
pub struct EmbeddingClient {
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingClient {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    /// Embed `text` with `model_id`. `metadata` must carry `source_file`.
    ///
    /// Blocks for the duration of the backend call. No retries.
    pub fn embed(&self, text: &str, model_id: &str, metadata: Meta) -> Result<EmbeddingRecord> {
        let metadata = enrich_metadata(text, metadata)?;
        let started = Instant::now();
        let vector = self.embedder.embed(model_id, text).map_err(|e| match e {
            Error::Embedding(_) => e,
            other => Error::Embedding(other.to_string()),
        })?;
        check_vector(&vector)?;
        debug!(
            backend = self.embedder.name(),
            source_file = %metadata.source_file,
            chunk_index = metadata.chunk_index,
            dim = vector.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "chunk embedded"
        );
        Ok(EmbeddingRecord { id: metadata.uuid, vector, metadata })
    }
}

/// Build the stored metadata for one chunk: fresh uuid, UTC timestamp and
/// file type, plus the caller's fields.
pub fn enrich_metadata(text: &str, mut metadata: Meta) -> Result<RecordMetadata> {
    let source_file = match metadata.remove("source_file") {
        Some(Value::String(s)) => s,
        Some(other) => {
            return Err(Error::InvalidMetadata(format!("source_file must be a string, got {other}")));
        }
        None => return Err(Error::InvalidMetadata("metadata with 'source_file' is required".into())),
    };
    let chunk_index = match metadata.remove("chunk_index") {
        None => 0,
        Some(v) => v
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| Error::InvalidMetadata(format!("chunk_index must be a non-negative integer, got {v}")))?,
    };
    let text = match metadata.remove("text") {
        Some(Value::String(s)) => s,
        _ => text.to_string(),
    };
    for key in GENERATED_KEYS {
        metadata.remove(key);
    }

    Ok(RecordMetadata {
        uuid: Uuid::new_v4(),
        timestamp: Utc::now(),
        filetype: filetype_from_name(&source_file),
        source_file,
        chunk_index,
        text,
        extra: metadata,
    })
}

fn check_vector(vector: &[f32]) -> Result<()> {
    if vector.is_empty() {
        return Err(Error::Embedding("model returned an empty vector".into()));
    }
    if let Some(pos) = vector.iter().position(|x| !x.is_finite()) {
        return Err(Error::Embedding(format!("model returned a non-finite value at position {pos}")));
    }
    Ok(())
}
