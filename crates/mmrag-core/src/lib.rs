#![deny(unused_imports)]
//! mmrag-core
//!
//! Shared domain types, the error taxonomy, configuration, the word-window
//! chunker and the external tool runner used by every other mmrag crate.

pub mod chunker;
pub mod command;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
