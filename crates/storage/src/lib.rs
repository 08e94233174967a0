//! Storage Layer
//!
//! Encodes rendered depth maps and commits them to disk atomically.

mod writer;

pub use writer::{write_atomic, DepthEncoding, DepthPersistenceWriter};

use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("Encoding failed: {0}")]
    EncodingFailed(String),
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
}
