//! Shared types for the duplex sync engine: languages, byte ranges, line
//! tables and diagnostics.

pub mod diagnostic;
pub mod error;
pub mod language;
pub mod line_index;
pub mod range;

pub use diagnostic::{Diagnostic, DiagnosticCode, DiagnosticLevel};
#[cfg(feature = "pretty-errors")]
pub use diagnostic::format_diagnostics;
pub use error::CommonError;
pub use language::{CommentSyntax, Language};
pub use line_index::LineIndex;
pub use range::TextRange;
