//! Paired on-disk format for [`VectorIndex`].
//!
//! A store at base path `B` is two files:
//! - `B.index`: `MMRV` magic, format version (u32), dimension (u32), row
//!   count (u64), then `count * dimension` little-endian f32s.
//! - `B.meta`: JSON with the same dimension and count, the blake3 hash of the
//!   `.index` file, and the metadata records in row order.
//!
//! Each file is written to a temp file beside its target, synced, then renamed
//! over it. The hash lets `load` detect a pair whose halves come from
//! different saves.
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{info, warn};

use mmrag_core::error::{Error, Result};
use mmrag_core::types::RecordMetadata;

use crate::index::VectorIndex;

const MAGIC: [u8; 4] = *b"MMRV";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Serialize)]
struct MetaFileRef<'a> {
    version: u32,
    dimension: usize,
    count: usize,
    vectors_blake3: String,
    records: &'a [RecordMetadata],
}

#[derive(Deserialize)]
struct MetaFile {
    version: u32,
    dimension: usize,
    count: usize,
    vectors_blake3: String,
    records: Vec<RecordMetadata>,
}

pub fn vectors_path(base: &Path) -> PathBuf {
    with_suffix(base, ".index")
}

pub fn meta_path(base: &Path) -> PathBuf {
    with_suffix(base, ".meta")
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut s = base.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

impl VectorIndex {
    /// True when either half of a store exists at `base`.
    pub fn exists(base: &Path) -> bool {
        vectors_path(base).exists() || meta_path(base).exists()
    }

    pub fn save(&self, base: &Path) -> Result<()> {
        let (vec_path, meta_path) = (vectors_path(base), meta_path(base));
        let dir = match base.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| Error::persistence(&dir, e))?;

        let blob = self.encode_vectors()?;
        let meta = MetaFileRef {
            version: FORMAT_VERSION,
            dimension: self.dimension,
            count: self.len(),
            vectors_blake3: blake3::hash(&blob).to_hex().to_string(),
            records: &self.metadata,
        };
        let meta_json = serde_json::to_vec_pretty(&meta).map_err(|e| Error::persistence(&meta_path, e))?;

        // Stage both halves before replacing either.
        let vec_tmp = write_staged(&dir, &blob, &vec_path)?;
        let meta_tmp = write_staged(&dir, &meta_json, &meta_path)?;

        vec_tmp.persist(&vec_path).map_err(|e| Error::persistence(&vec_path, e.error))?;
        if let Err(e) = meta_tmp.persist(&meta_path) {
            warn!(path = %meta_path.display(), "vector blob replaced but metadata write failed");
            return Err(Error::persistence(
                &meta_path,
                format!("{}; {} was already replaced, store is inconsistent", e.error, vec_path.display()),
            ));
        }
        info!(path = %base.display(), rows = self.len(), dimension = self.dimension, "index saved");
        Ok(())
    }

    pub fn load(base: &Path) -> Result<Self> {
        let (vec_path, meta_path) = (vectors_path(base), meta_path(base));
        let blob = fs::read(&vec_path).map_err(|e| Error::corrupt(&vec_path, format!("unreadable: {e}")))?;
        let meta_bytes = fs::read(&meta_path).map_err(|e| Error::corrupt(&meta_path, format!("unreadable: {e}")))?;

        let meta: MetaFile = serde_json::from_slice(&meta_bytes)
            .map_err(|e| Error::corrupt(&meta_path, format!("invalid metadata: {e}")))?;
        if meta.version != FORMAT_VERSION {
            return Err(Error::corrupt(&meta_path, format!("unsupported format version {}", meta.version)));
        }
        let (dimension, count, vectors) = decode_vectors(&blob).map_err(|reason| Error::corrupt(&vec_path, reason))?;

        if blake3::hash(&blob).to_hex().as_str() != meta.vectors_blake3 {
            return Err(Error::corrupt(base, "vector blob does not match the metadata checksum"));
        }
        if meta.dimension != dimension {
            return Err(Error::corrupt(
                base,
                format!("dimension {} in metadata, {dimension} in vector blob", meta.dimension),
            ));
        }
        if meta.count != count || meta.records.len() != count {
            return Err(Error::corrupt(
                base,
                format!("{count} vectors but {} metadata records (header says {})", meta.records.len(), meta.count),
            ));
        }

        info!(path = %base.display(), rows = count, dimension, "index loaded");
        Ok(Self { dimension, vectors, metadata: meta.records })
    }

    /// Load the store at `base`, or start empty when there is none.
    ///
    /// A store whose dimension differs from `dimension` is a
    /// `DimensionMismatch`.
    pub fn load_or_empty(base: &Path, dimension: usize) -> Result<Self> {
        if !Self::exists(base) {
            info!(path = %base.display(), "no stored index; starting empty");
            return Self::create(dimension);
        }
        let index = Self::load(base)?;
        if index.dimension != dimension {
            return Err(Error::dimension(dimension, index.dimension));
        }
        Ok(index)
    }

    fn encode_vectors(&self) -> Result<Vec<u8>> {
        let dim = u32::try_from(self.dimension)
            .map_err(|_| Error::InvalidConfiguration(format!("dimension {} too large to store", self.dimension)))?;
        let mut blob = Vec::with_capacity(HEADER_LEN + self.vectors.len() * 4);
        blob.extend_from_slice(&MAGIC);
        blob.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        blob.extend_from_slice(&dim.to_le_bytes());
        blob.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for x in &self.vectors {
            blob.extend_from_slice(&x.to_le_bytes());
        }
        Ok(blob)
    }
}

fn write_staged(dir: &Path, bytes: &[u8], target: &Path) -> Result<NamedTempFile> {
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::persistence(target, e))?;
    tmp.write_all(bytes).map_err(|e| Error::persistence(target, e))?;
    tmp.as_file().sync_all().map_err(|e| Error::persistence(target, e))?;
    Ok(tmp)
}

fn decode_vectors(blob: &[u8]) -> std::result::Result<(usize, usize, Vec<f32>), String> {
    if blob.len() < HEADER_LEN {
        return Err(format!("truncated header ({} bytes)", blob.len()));
    }
    let (header, body) = blob.split_at(HEADER_LEN);
    if header[0..4] != MAGIC {
        return Err("not an mmrag vector file".into());
    }
    let version = u32::from_le_bytes(le_array(&header[4..8]));
    if version != FORMAT_VERSION {
        return Err(format!("unsupported format version {version}"));
    }
    let dimension = u32::from_le_bytes(le_array(&header[8..12])) as usize;
    let count = usize::try_from(u64::from_le_bytes(le_array(&header[12..20])))
        .map_err(|_| "row count does not fit in memory".to_string())?;
    if dimension == 0 {
        return Err("zero dimension".into());
    }
    let expected = count
        .checked_mul(dimension)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| "row count overflows".to_string())?;
    if body.len() != expected {
        return Err(format!("expected {expected} bytes of vector data, found {}", body.len()));
    }
    let vectors = body.chunks_exact(4).map(|b| f32::from_le_bytes(le_array(b))).collect();
    Ok((dimension, count, vectors))
}

fn le_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}
