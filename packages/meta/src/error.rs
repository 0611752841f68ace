use duplex_common::TextRange;
use thiserror::Error;

/// Why a metadata payload could not be read
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("marker has no JSON payload")]
    MissingPayload,

    #[error("malformed payload: {0}")]
    Syntax(String),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("payload has no id")]
    MissingId,

    #[error("invalid field: {0}")]
    InvalidField(String),
}

/// Why a record could not be written
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("metadata id must not be empty")]
    EmptyId,

    #[error("coordinates of '{id}' are not finite ({x}, {y})")]
    NonFiniteCoordinates { id: String, x: f64, y: f64 },

    #[error("range {range} is outside the buffer")]
    RangeOutOfBounds { range: TextRange },

    #[error("failed to encode '{id}': {message}")]
    Encode { id: String, message: String },
}

pub type CodecResult<T> = Result<T, CodecError>;
