use std::path::Path;

use crate::error::Result;
use crate::types::{DocumentKind, LoadOutcome};

/// A text embedding backend. Calls block for as long as the model takes.
pub trait Embedder: Send + Sync {
    /// Short backend label used in logs.
    fn name(&self) -> &str;
    fn embed(&self, model_id: &str, text: &str) -> Result<Vec<f32>>;
}

/// Turns the files of one directory into documents.
///
/// Per-file problems are returned in [`LoadOutcome::failures`]; a loader never
/// aborts the whole directory because one file is bad.
pub trait DocumentLoader: Send + Sync {
    fn kind(&self) -> DocumentKind;
    fn load(&self, dir: &Path) -> LoadOutcome;
}
