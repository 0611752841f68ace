//! Error types for the sync engine

use crate::generator::GenerateError;
use duplex_meta::CodecError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Metadata error: {0}")]
    Codec(#[from] CodecError),

    #[error("Generation error: {0}")]
    Generate(#[from] GenerateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Unknown metadata id '{0}'")]
    UnknownId(String),

    #[error("Metadata id '{0}' was deleted in this session and cannot be reused")]
    RetiredId(String),
}
