//! mmrag-ingest
//!
//! Document loaders, the ingestion orchestrator that rebuilds the vector
//! store from the data directories, and the upload helper that drops new
//! files into those directories.

pub mod loaders;
pub mod orchestrator;
pub mod report;
pub mod upload;

pub use loaders::LoaderRegistry;
pub use orchestrator::{IngestOptions, Ingestor};
pub use report::{ChunkFailure, IngestionReport};
pub use upload::upload;
