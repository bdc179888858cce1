use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use mmrag_core::error::{Error, Result};
use mmrag_core::types::{DocumentKind, SourceDirs};

/// Copy `file` into the data directory for `filetype`, creating it if needed.
/// Returns the destination path. The next ingestion run picks the file up.
pub fn upload(file: &Path, filetype: &str, sources: &SourceDirs) -> Result<PathBuf> {
    let kind: DocumentKind = filetype.parse()?;
    let dir = sources
        .get(&kind)
        .ok_or_else(|| Error::InvalidConfiguration(format!("no data directory configured for {kind}")))?;
    let name = file
        .file_name()
        .ok_or_else(|| Error::InvalidConfiguration(format!("{} has no file name", file.display())))?;
    if !kind.matches(file) {
        warn!(file = %file.display(), %kind, "extension not handled by this kind's loader");
    }

    fs::create_dir_all(dir)?;
    let dest = dir.join(name);
    if dest.exists() && fs::canonicalize(file)? == fs::canonicalize(&dest)? {
        info!(path = %dest.display(), %kind, "file already in its data directory");
        return Ok(dest);
    }
    fs::copy(file, &dest)?;
    info!(from = %file.display(), to = %dest.display(), %kind, "file uploaded");
    Ok(dest)
}
