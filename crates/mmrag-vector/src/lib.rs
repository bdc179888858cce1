//! mmrag-vector
//!
//! Append-only vector index with parallel metadata, exact L2 search, paired
//! on-disk persistence, and the query and answering services built on top
//! of it.

pub mod answer;
pub mod index;
pub mod search;
pub mod store;

pub use answer::{Answer, Answerer};
pub use index::VectorIndex;
pub use search::SearchEngine;
pub use store::{meta_path, vectors_path};
