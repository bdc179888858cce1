//! Full rebuild of the vector store from the data directories.
//!
//! Loading runs one directory at a time on the blocking pool. Embedding runs
//! up to `workers` chunks at once; results come back in submission order and
//! a single consumer appends them to the index, so row order is the order
//! chunks were produced.
use std::path::PathBuf;
use std::time::Instant;

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::Value;
use tracing::{info, warn};

use mmrag_core::chunker::{chunk_document, ChunkingConfig};
use mmrag_core::config::Settings;
use mmrag_core::error::{Error, Result};
use mmrag_core::types::{Chunk, LoadOutcome, Meta, SourceDirs};
use mmrag_embed::{get_default_embedder, EmbeddingClient};
use mmrag_vector::VectorIndex;

use crate::loaders::LoaderRegistry;
use crate::report::{ChunkFailure, IngestionReport};

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub model_id: String,
    pub chunking: ChunkingConfig,
    pub workers: usize,
    pub store_path: PathBuf,
    pub show_progress: bool,
}

impl IngestOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            model_id: settings.embedding.model.clone(),
            chunking: settings.chunking,
            workers: settings.ingest.workers,
            store_path: settings.store.base_path(),
            show_progress: true,
        }
    }
}

pub struct Ingestor {
    registry: LoaderRegistry,
    client: EmbeddingClient,
    options: IngestOptions,
}

impl Ingestor {
    pub fn new(registry: LoaderRegistry, client: EmbeddingClient, options: IngestOptions) -> Result<Self> {
        options.chunking.validate()?;
        if options.workers == 0 {
            return Err(Error::InvalidConfiguration("ingest.workers must be at least 1".into()));
        }
        Ok(Self { registry, client, options })
    }

    /// Loaders, embedding backend and options all taken from `settings`.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = EmbeddingClient::new(get_default_embedder(&settings.embedding));
        Self::new(LoaderRegistry::from_settings(settings), client, IngestOptions::from_settings(settings))
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut IngestOptions {
        &mut self.options
    }

    /// Rebuild `index` from `sources` and save it to the store path.
    ///
    /// Per-file and per-chunk failures are collected in the report. A
    /// dimension mismatch or a failed save aborts the run; the store on disk
    /// is left as it was.
    pub async fn ingest(&self, sources: &SourceDirs, index: &mut VectorIndex) -> Result<IngestionReport> {
        let started = Instant::now();
        *index = VectorIndex::create(index.dimension())?;
        let mut report = IngestionReport { store_path: self.options.store_path.clone(), ..IngestionReport::default() };

        let mut chunks: Vec<(Chunk, Meta)> = Vec::new();
        for (kind, dir) in sources {
            let Some(loader) = self.registry.get(*kind) else {
                warn!(%kind, dir = %dir.display(), "no loader registered; skipping directory");
                continue;
            };
            let dir_owned = dir.clone();
            let outcome: LoadOutcome = tokio::task::spawn_blocking(move || loader.load(&dir_owned))
                .await
                .map_err(|e| Error::Io(std::io::Error::other(format!("{kind} loader task failed: {e}"))))?;
            info!(%kind, dir = %dir.display(), documents = outcome.documents.len(), failures = outcome.failures.len(), "directory loaded");

            report.documents_loaded += outcome.documents.len();
            report.load_failures.extend(outcome.failures);
            for doc in &outcome.documents {
                for chunk in chunk_document(doc, &self.options.chunking)? {
                    chunks.push((chunk, doc.extra.clone()));
                }
            }
        }
        report.chunks_total = chunks.len();
        info!(documents = report.documents_loaded, chunks = report.chunks_total, workers = self.options.workers, "embedding chunks");

        let pb = self.progress_bar(chunks.len());
        let jobs = chunks.into_iter().map(|(chunk, extra)| {
            let client = self.client.clone();
            let model_id = self.options.model_id.clone();
            async move {
                let (source_file, chunk_index) = (chunk.source_file.clone(), chunk.chunk_index);
                let meta = chunk_metadata(&chunk, extra);
                let result = tokio::task::spawn_blocking(move || client.embed(&chunk.text, &model_id, meta))
                    .await
                    .unwrap_or_else(|e| Err(Error::Embedding(format!("embedding task failed: {e}"))));
                (source_file, chunk_index, result)
            }
        });
        let mut results = stream::iter(jobs).buffered(self.options.workers);

        while let Some((source_file, chunk_index, result)) = results.next().await {
            pb.inc(1);
            match result {
                Ok(record) => {
                    index.add_record(record)?;
                    report.chunks_embedded += 1;
                }
                Err(e) => {
                    warn!(%source_file, chunk_index, error = %e, "chunk embedding failed");
                    report.chunk_failures.push(ChunkFailure { source_file, chunk_index, error: e.to_string() });
                }
            }
        }
        pb.finish_and_clear();

        index.save(&self.options.store_path)?;
        info!(
            embedded = report.chunks_embedded,
            failed = report.chunk_failures.len(),
            load_failures = report.load_failures.len(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            store = %self.options.store_path.display(),
            "ingestion finished"
        );
        Ok(report)
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%)")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

/// Metadata handed to the embedding client for one chunk: the document's
/// loader fields plus the chunk position and text.
fn chunk_metadata(chunk: &Chunk, mut extra: Meta) -> Meta {
    extra.insert("source_file".into(), Value::String(chunk.source_file.clone()));
    extra.insert("chunk_index".into(), Value::from(chunk.chunk_index));
    extra.insert("text".into(), Value::String(chunk.text.clone()));
    extra
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn chunk_fields_override_loader_fields() {
        let chunk = Chunk { text: "body".into(), chunk_index: 2, source_file: "valve.png".into() };
        let extra: Meta = serde_json::from_value(json!({"ocr_text": "RESET", "text": "stale"})).expect("meta");
        let meta = chunk_metadata(&chunk, extra);
        assert_eq!(meta["text"], "body");
        assert_eq!(meta["chunk_index"], 2);
        assert_eq!(meta["source_file"], "valve.png");
        assert_eq!(meta["ocr_text"], "RESET");
    }

    #[test]
    fn zero_workers_is_rejected() {
        let options = IngestOptions { workers: 0, ..IngestOptions::from_settings(&Settings::default()) };
        let client = EmbeddingClient::new(std::sync::Arc::new(mmrag_embed::FakeEmbedder::new(8)));
        let err = Ingestor::new(LoaderRegistry::new(), client, options).err().expect("rejected");
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }
}
