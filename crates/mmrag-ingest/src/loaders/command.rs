use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use tracing::{debug, warn};

use mmrag_core::command::ToolCommand;
use mmrag_core::error::Error;
use mmrag_core::traits::DocumentLoader;
use mmrag_core::types::{Document, DocumentKind, LoadOutcome};

use super::{failure, file_name, list_or_fail};

/// Extracts text by running a converter that prints the document as plain
/// text. `{path}` in the command is the absolute input path.
#[derive(Debug, Clone)]
pub struct CommandLoader {
    kind: DocumentKind,
    command: ToolCommand,
    timeout: Duration,
}

impl CommandLoader {
    pub fn new(kind: DocumentKind, command: ToolCommand, timeout: Duration) -> Self {
        Self { kind, command, timeout }
    }

    fn extract(&self, path: &Path) -> Result<String, Error> {
        let absolute = fs::canonicalize(path)?;
        let absolute = absolute.to_string_lossy();
        let vars = HashMap::from([("path", absolute.as_ref())]);
        self.command
            .run_stdout(&vars, self.timeout)
            .map_err(|e| Error::Extraction { path: path.to_path_buf(), message: e.to_string() })
    }
}

impl DocumentLoader for CommandLoader {
    fn kind(&self) -> DocumentKind {
        self.kind
    }

    fn load(&self, dir: &Path) -> LoadOutcome {
        let files = match list_or_fail(dir, self.kind) {
            Ok(files) => files,
            Err(outcome) => return outcome,
        };
        let mut outcome = LoadOutcome::default();
        for path in files {
            match self.extract(&path) {
                Ok(text) if text.trim().is_empty() => {
                    debug!(kind = %self.kind, file = %path.display(), "no text extracted; skipping");
                }
                Ok(text) => {
                    debug!(kind = %self.kind, file = %path.display(), bytes = text.len(), "document extracted");
                    outcome.documents.push(Document::new(file_name(&path), self.kind, text.trim()));
                }
                Err(e) => {
                    warn!(kind = %self.kind, file = %path.display(), error = %e, "extraction failed");
                    outcome.failures.push(failure(self.kind, &path, e));
                }
            }
        }
        outcome
    }
}
