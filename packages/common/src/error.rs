use thiserror::Error;

/// Errors shared by every duplex crate
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    #[error("Unknown language: {0}")]
    UnknownLanguage(String),
}
