use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use mmrag_core::traits::DocumentLoader;
use mmrag_core::types::{Document, DocumentKind, LoadOutcome};

use super::{failure, file_name, list_or_fail};

/// Reads `*.md` files as UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownLoader;

impl DocumentLoader for MarkdownLoader {
    fn kind(&self) -> DocumentKind {
        DocumentKind::Markdown
    }

    fn load(&self, dir: &Path) -> LoadOutcome {
        let files = match list_or_fail(dir, DocumentKind::Markdown) {
            Ok(files) => files,
            Err(outcome) => return outcome,
        };
        let mut outcome = LoadOutcome::default();
        for path in files {
            match fs::read_to_string(&path) {
                Ok(text) => {
                    debug!(file = %path.display(), bytes = text.len(), "markdown loaded");
                    outcome.documents.push(Document::new(file_name(&path), DocumentKind::Markdown, text.trim()));
                }
                Err(e) => {
                    warn!(file = %path.display(), error = %e, "markdown unreadable");
                    outcome.failures.push(failure(DocumentKind::Markdown, &path, e));
                }
            }
        }
        outcome
    }
}
