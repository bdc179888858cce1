//! Loaders turn the files of one data directory into [`Document`]s.
//!
//! Markdown is read directly. Every other format goes through an external
//! converter configured in [`LoaderSettings`](mmrag_core::config::LoaderSettings).

use std::collections::BTreeMap;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use mmrag_core::config::Settings;
use mmrag_core::traits::DocumentLoader;
use mmrag_core::types::{DocumentKind, LoadFailure, LoadOutcome};

pub mod command;
pub mod image;
pub mod markdown;

pub use command::CommandLoader;
pub use image::ImageLoader;
pub use markdown::MarkdownLoader;

/// One loader per document kind.
#[derive(Default, Clone)]
pub struct LoaderRegistry {
    loaders: BTreeMap<DocumentKind, Arc<dyn DocumentLoader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wire every kind to the loader configured in `settings`.
    pub fn from_settings(settings: &Settings) -> Self {
        let loaders = &settings.loaders;
        let mut registry = Self::new();
        registry.register(ImageLoader::from_settings(loaders, &settings.caption));
        registry.register(CommandLoader::new(DocumentKind::Pdf, loaders.pdf.clone(), loaders.timeout()));
        registry.register(CommandLoader::new(DocumentKind::Docx, loaders.docx.clone(), loaders.timeout()));
        registry.register(MarkdownLoader);
        registry.register(CommandLoader::new(DocumentKind::Excel, loaders.excel.clone(), loaders.timeout()));
        registry
    }

    /// Register `loader` for its kind, replacing any previous one.
    pub fn register<L: DocumentLoader + 'static>(&mut self, loader: L) {
        self.loaders.insert(loader.kind(), Arc::new(loader));
    }

    pub fn get(&self, kind: DocumentKind) -> Option<Arc<dyn DocumentLoader>> {
        self.loaders.get(&kind).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = DocumentKind> + '_ {
        self.loaders.keys().copied()
    }
}

/// Files of `kind` directly inside `dir`, sorted by file name.
///
/// A missing directory yields no files.
pub(crate) fn list_files(dir: &Path, kind: DocumentKind) -> Result<Vec<PathBuf>, walkdir::Error> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && kind.matches(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// List `dir` for `kind`, turning a listing error into a single failure.
pub(crate) fn list_or_fail(dir: &Path, kind: DocumentKind) -> Result<Vec<PathBuf>, LoadOutcome> {
    list_files(dir, kind).map_err(|e| LoadOutcome { documents: Vec::new(), failures: vec![failure(kind, dir, e)] })
}

pub(crate) fn failure(kind: DocumentKind, path: &Path, err: impl Display) -> LoadFailure {
    LoadFailure { kind, path: path.display().to_string(), error: err.to_string() }
}

pub(crate) fn file_name(path: &Path) -> String {
    path.file_name().map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}
