use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("{}", mismatch_message(.of, .expected, .actual))]
    DimensionMismatch { expected: usize, actual: usize, of: Mismatch },

    #[error("failed to persist {}: {message}", path.display())]
    Persistence { path: PathBuf, message: String },

    #[error("corrupt store at {}: {reason}", path.display())]
    CorruptStore { path: PathBuf, reason: String },

    #[error("external tool `{program}` failed: {message}")]
    Tool { program: String, message: String },

    #[error("failed to extract {}: {message}", path.display())]
    Extraction { path: PathBuf, message: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// What disagreed in a [`Error::DimensionMismatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mismatch {
    /// A vector's length against the index dimension.
    VectorLength,
    /// Vectors against metadata records in one batch.
    BatchLength,
}

fn mismatch_message(of: &Mismatch, expected: &usize, actual: &usize) -> String {
    match of {
        Mismatch::VectorLength => format!("dimension mismatch: expected {expected}, got {actual}"),
        Mismatch::BatchLength => format!("batch length mismatch: {expected} vectors vs {actual} metadata records"),
    }
}

impl Error {
    pub fn dimension(expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch { expected, actual, of: Mismatch::VectorLength }
    }

    pub fn batch_length(vectors: usize, records: usize) -> Self {
        Self::DimensionMismatch { expected: vectors, actual: records, of: Mismatch::BatchLength }
    }

    pub fn persistence(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Persistence { path: path.into(), message: err.to_string() }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptStore { path: path.into(), reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
