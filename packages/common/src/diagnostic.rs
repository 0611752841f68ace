use crate::range::TextRange;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity level of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Info,
}

/// What went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticCode {
    /// Source could not be fully parsed; the tree is partial
    ParseError,
    /// A metadata comment carries a payload that is not a valid record
    MetaDecodeError,
    /// Two metadata comments share an id; the first one wins
    DuplicateIdError,
    /// Two records claim the same code element; the first one in source order wins
    DuplicateBlockClaim,
    /// A record names an anchor that has no marker inside its block
    MissingAnchor,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::ParseError => "parse-error",
            DiagnosticCode::MetaDecodeError => "meta-decode-error",
            DiagnosticCode::DuplicateIdError => "duplicate-id",
            DiagnosticCode::DuplicateBlockClaim => "duplicate-block-claim",
            DiagnosticCode::MissingAnchor => "missing-anchor",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recoverable problem found while synchronizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity level
    pub level: DiagnosticLevel,

    pub code: DiagnosticCode,

    /// Human-readable message
    pub message: String,

    /// Source location where the issue was found
    pub range: Option<TextRange>,

    /// Metadata id involved, if any
    pub id: Option<String>,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Error, code, message)
    }

    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Warning, code, message)
    }

    pub fn info(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Info, code, message)
    }

    fn new(level: DiagnosticLevel, code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            level,
            code,
            message: message.into(),
            range: None,
            id: None,
        }
    }

    pub fn with_range(mut self, range: TextRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(range) = &self.range {
            write!(f, " at {}", range)?;
        }
        Ok(())
    }
}

/// Pretty-print diagnostics with source context using ariadne
#[cfg(feature = "pretty-errors")]
pub fn format_diagnostics(source: &str, filename: &str, diagnostics: &[Diagnostic]) -> String {
    use ariadne::{Color, Label, Report, ReportKind, Source};

    let mut output = Vec::new();

    for diagnostic in diagnostics {
        let range = diagnostic.range.unwrap_or(TextRange::new(
            source.len().saturating_sub(1),
            source.len(),
        ));

        let (kind, color) = match diagnostic.level {
            DiagnosticLevel::Error => (ReportKind::Error, Color::Red),
            DiagnosticLevel::Warning => (ReportKind::Warning, Color::Yellow),
            DiagnosticLevel::Info => (ReportKind::Advice, Color::Blue),
        };

        let report = Report::build(kind, filename, range.start)
            .with_code(diagnostic.code.as_str())
            .with_message(&diagnostic.message)
            .with_label(
                Label::new((filename, range.as_range()))
                    .with_color(color)
                    .with_message(match &diagnostic.id {
                        Some(id) => format!("record `{}`", id),
                        None => diagnostic.code.to_string(),
                    }),
            )
            .finish();

        if report
            .write((filename, Source::from(source)), &mut output)
            .is_err()
        {
            return "Error formatting failed".to_string();
        }
    }

    String::from_utf8(output).unwrap_or_else(|_| "Error formatting failed".to_string())
}
