use duplex_common::{Diagnostic, DiagnosticCode, TextRange};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

/// A recoverable structural problem in the source
///
/// The parser never aborts on these; it records them on the tree and keeps
/// whatever blocks it could recover.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseError {
    #[error("Unexpected `{found}` at {range}")]
    UnexpectedCloser { range: TextRange, found: char },

    #[error("Unclosed `{delimiter}` opened at {range}")]
    Unclosed { range: TextRange, delimiter: char },

    #[error("Unterminated comment starting at {range}")]
    UnterminatedComment { range: TextRange },

    #[error("Unreadable input at {range}")]
    LexerError { range: TextRange },

    #[error("Expected ':' after `{keyword}` header at {range}")]
    MissingColon { range: TextRange, keyword: String },

    #[error("Expected an indented block after `{keyword}` at {range}")]
    MissingBody { range: TextRange, keyword: String },
}

impl ParseError {
    pub fn unexpected_closer(range: TextRange, found: char) -> Self {
        Self::UnexpectedCloser { range, found }
    }

    pub fn unclosed(range: TextRange, delimiter: char) -> Self {
        Self::Unclosed { range, delimiter }
    }

    pub fn lexer_error(range: TextRange) -> Self {
        Self::LexerError { range }
    }

    pub fn missing_colon(range: TextRange, keyword: impl Into<String>) -> Self {
        Self::MissingColon {
            range,
            keyword: keyword.into(),
        }
    }

    pub fn missing_body(range: TextRange, keyword: impl Into<String>) -> Self {
        Self::MissingBody {
            range,
            keyword: keyword.into(),
        }
    }

    pub fn range(&self) -> TextRange {
        match self {
            ParseError::UnexpectedCloser { range, .. }
            | ParseError::Unclosed { range, .. }
            | ParseError::UnterminatedComment { range }
            | ParseError::LexerError { range }
            | ParseError::MissingColon { range, .. }
            | ParseError::MissingBody { range, .. } => *range,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(DiagnosticCode::ParseError, self.to_string()).with_range(self.range())
    }
}
