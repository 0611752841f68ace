//! Structural parsing for duplex-synchronized source files.
//!
//! `parse` turns source text into a flat, offset-ordered list of blocks
//! (functions, conditionals, loops, types, ...) that the element mapper can
//! attach visual records to. Parsing never fails: problems are recorded on the
//! tree and the rest of the file is still returned.

pub mod ast;
pub mod error;
pub mod formatter;
pub mod grammar;
pub mod parser;
mod python;
pub mod tokenizer;

pub use ast::{kind, Anchor, Block, SyntaxTree};
pub use error::{ParseError, ParseResult};
pub use formatter::{Formatter, FormattingStyle, Indent};
pub use grammar::{BlockRule, BodyForm, Grammar, Template};
pub use parser::{comments, parse, Parser};
pub use tokenizer::{tokenize, Lexeme, SlashKind, Token, Tokenized};
