//! Error types for the parts of the crate that can actually fail.
//!
//! Analysis never fails: malformed scripts produce partial results. Only
//! loading documentation and reading files from disk return errors.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid documentation file {file}: {source}")]
    Json {
        file: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("documentation directory not found: {0}")]
    MissingDocs(PathBuf),

    #[error("could not parse signature: {0}")]
    InvalidSignature(String),
}

pub type Result<T> = std::result::Result<T, Error>;
