//! mmrag-embed
//!
//! Embedding backends and the embedding client that turns a chunk plus its
//! metadata into an [`EmbeddingRecord`](mmrag_core::types::EmbeddingRecord).

use std::sync::Arc;

use tracing::info;

use mmrag_core::config::{EmbeddingBackend, EmbeddingSettings};
use mmrag_core::traits::Embedder;

pub mod client;
pub mod command;
pub mod fake;

pub use client::{enrich_metadata, EmbeddingClient};
pub use command::CommandEmbedder;
pub use fake::FakeEmbedder;

/// `APP_USE_FAKE_EMBEDDINGS=1` (or `true`) forces the fake backend.
pub const FAKE_EMBEDDINGS_ENV: &str = "APP_USE_FAKE_EMBEDDINGS";

fn fake_forced() -> bool {
    std::env::var(FAKE_EMBEDDINGS_ENV)
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Pick the backend named in settings, unless the environment forces the fake one.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Arc<dyn Embedder> {
    if fake_forced() || settings.backend == EmbeddingBackend::Fake {
        info!(dimension = settings.dimension, "using fake embedder");
        return Arc::new(FakeEmbedder::new(settings.dimension));
    }
    info!(program = %settings.command.program, model = %settings.model, "using command embedder");
    Arc::new(CommandEmbedder::new(settings.command.clone(), settings.timeout()))
}
