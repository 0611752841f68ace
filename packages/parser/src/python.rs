//! Indentation-aware structural parser for Python.
//!
//! Blocks are found on logical lines (physical lines joined inside brackets)
//! whose first word is a block keyword. A block runs until the first logical
//! line that is indented no deeper than its header and does not continue it
//! (`elif`, `else`, `except`, `finally`).

use crate::ast::{Block, SyntaxTree};
use crate::error::ParseError;
use crate::grammar::{BlockRule, Grammar};
use duplex_common::{Language, TextRange};
use logos::{Lexer, Logos};
use tracing::debug;

/// Token types for Python
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(skip r"[ \t\f]+")]
#[logos(skip r"\\\r?\n")]
pub enum PyToken<'src> {
    #[regex(r"\r?\n")]
    Newline,

    #[regex(r"#[^\r\n]*")]
    Comment,

    #[regex(r#"[rRbBuUfF]{0,2}""""#, |lex| close_triple(lex, "\"\"\""))]
    #[regex(r#"[rRbBuUfF]{0,2}'''"#, |lex| close_triple(lex, "'''"))]
    LongString,

    #[regex(r#"[rRbBuUfF]{0,2}"([^"\\\r\n]|\\.)*""#)]
    #[regex(r#"[rRbBuUfF]{0,2}'([^'\\\r\n]|\\.)*'"#)]
    String,

    #[regex(r"[\p{L}_][\p{L}\p{N}_]*", |lex| lex.slice())]
    Ident(&'src str),

    #[regex(r"[0-9][0-9a-zA-Z_.]*")]
    Number,

    #[token("(")]
    #[token("[")]
    #[token("{")]
    Open,

    #[token(")")]
    #[token("]")]
    #[token("}")]
    Close,

    #[token(":")]
    Colon,

    #[token(":=")]
    Walrus,

    #[token("@")]
    At,

    #[regex(r"[!%&*+\-./<=>?^|~,;\\]")]
    Punct,
}

/// Consume the body of a triple-quoted string up to `terminator`
fn close_triple<'src>(lex: &mut Lexer<'src, PyToken<'src>>, terminator: &str) -> bool {
    let rest = lex.remainder();
    let mut chars = rest.char_indices();

    while let Some((i, c)) = chars.next() {
        if c == '\\' {
            // the escaped char may be several bytes wide
            chars.next();
            continue;
        }
        if rest[i..].starts_with(terminator) {
            lex.bump(i + terminator.len());
            return true;
        }
    }

    false
}

#[derive(Debug, Clone, Copy)]
struct PyLexeme<'src> {
    token: PyToken<'src>,
    range: TextRange,
}

/// One logical line: tokens `first..=last`, indented `indent` columns
#[derive(Debug, Clone, Copy)]
struct LogicalLine {
    first: usize,
    last: usize,
    indent: usize,
}

pub struct PythonParser<'src> {
    source: &'src str,
    grammar: Grammar,
    tokens: Vec<PyLexeme<'src>>,
    lines: Vec<LogicalLine>,
    tree: SyntaxTree,
}

impl<'src> PythonParser<'src> {
    pub fn new(source: &'src str) -> Self {
        let mut tree = SyntaxTree::new(Language::Python);
        let mut tokens = Vec::new();
        let mut lexer = PyToken::lexer(source);

        while let Some(result) = lexer.next() {
            let span = lexer.span();
            let range = TextRange::new(span.start, span.end);
            match result {
                Ok(PyToken::Comment) => tree.comments.push(range),
                Ok(token) => tokens.push(PyLexeme { token, range }),
                Err(()) => tree.errors.push(ParseError::lexer_error(range)),
            }
        }

        Self {
            source,
            grammar: Grammar::for_language(Language::Python),
            tokens,
            lines: Vec::new(),
            tree,
        }
    }

    pub fn into_comments(self) -> Vec<TextRange> {
        self.tree.comments
    }

    pub fn parse(mut self) -> SyntaxTree {
        self.split_logical_lines();

        for line_idx in 0..self.lines.len() {
            if let Some(block) = self.parse_block(line_idx) {
                self.tree.blocks.push(block);
            }
        }

        self.tree.sort_blocks();
        self.tree.errors.sort_by_key(|e| e.range().start);

        debug!(
            language = %Language::Python,
            blocks = self.tree.blocks.len(),
            errors = self.tree.errors.len(),
            "Parsed source"
        );

        self.tree
    }

    /// Join physical lines inside brackets into logical lines
    fn split_logical_lines(&mut self) {
        let mut depth: usize = 0;
        let mut open_at: Vec<TextRange> = Vec::new();
        let mut first: Option<usize> = None;

        for i in 0..self.tokens.len() {
            match self.tokens[i].token {
                PyToken::Newline => {
                    if depth == 0 {
                        if let Some(start) = first.take() {
                            self.push_line(start, i - 1);
                        }
                    }
                    continue;
                }
                PyToken::Open => {
                    depth += 1;
                    open_at.push(self.tokens[i].range);
                }
                PyToken::Close => {
                    if depth == 0 {
                        let range = self.tokens[i].range;
                        let found = self.source[range.as_range()].chars().next().unwrap_or(')');
                        self.tree.errors.push(ParseError::unexpected_closer(range, found));
                    } else {
                        depth -= 1;
                        open_at.pop();
                    }
                }
                _ => {}
            }
            if first.is_none() {
                first = Some(i);
            }
        }

        if let Some(start) = first {
            let last = self
                .tokens
                .iter()
                .rposition(|t| t.token != PyToken::Newline)
                .unwrap_or(start);
            self.push_line(start, last);
        }

        for range in open_at {
            let delimiter = self.source[range.as_range()].chars().next().unwrap_or('(');
            self.tree.errors.push(ParseError::unclosed(range, delimiter));
        }
    }

    fn push_line(&mut self, first: usize, last: usize) {
        let start = self.tokens[first].range.start;
        let line_start = self.source[..start].rfind('\n').map(|p| p + 1).unwrap_or(0);
        let indent = indent_width(&self.source[line_start..start]);
        self.lines.push(LogicalLine {
            first,
            last,
            indent,
        });
    }

    fn parse_block(&mut self, line_idx: usize) -> Option<Block> {
        let line = self.lines[line_idx];
        let (keyword_at, rule) = self.header_rule(&line)?;

        let Some(colon) = self.header_colon(&line, keyword_at) else {
            if !rule.soft {
                self.tree.errors.push(ParseError::missing_colon(
                    self.line_range(&line),
                    rule.keyword,
                ));
            }
            return None;
        };

        let start = self.decorated_start(line_idx);

        // `if x: return 1` keeps its body on the header line
        if colon < line.last {
            let end = self.last_line_of_chain(line_idx, rule, line_idx);
            return Some(Block::new(rule.kind, TextRange::new(start, end)));
        }

        let has_body = self
            .lines
            .get(line_idx + 1)
            .map(|next| next.indent > line.indent)
            .unwrap_or(false);
        if !has_body {
            self.tree.errors.push(ParseError::missing_body(
                self.line_range(&line),
                rule.keyword,
            ));
            return Some(Block::new(
                rule.kind,
                TextRange::new(start, self.tokens[line.last].range.end),
            ));
        }

        let end = self.last_line_of_chain(line_idx, rule, line_idx + 1);
        Some(Block::new(rule.kind, TextRange::new(start, end)))
    }

    /// The block rule a logical line opens, and the index of its keyword token
    fn header_rule(&self, line: &LogicalLine) -> Option<(usize, &'static BlockRule)> {
        let mut at = line.first;
        let mut word = self.tokens[at].token_ident()?;

        if self.grammar.is_modifier(word) && at < line.last {
            at += 1;
            word = self.tokens[at].token_ident()?;
        }

        self.grammar.rule(word).map(|rule| (at, rule))
    }

    /// First `:` at bracket depth zero after the keyword
    fn header_colon(&self, line: &LogicalLine, keyword_at: usize) -> Option<usize> {
        let mut depth: usize = 0;
        for i in keyword_at + 1..=line.last {
            match self.tokens[i].token {
                PyToken::Open => depth += 1,
                PyToken::Close => depth = depth.saturating_sub(1),
                PyToken::Colon if depth == 0 => return Some(i),
                _ => {}
            }
        }
        None
    }

    /// End offset of the last line belonging to the block that starts at
    /// `header`, scanning from line `from`
    fn last_line_of_chain(&self, header: usize, rule: &BlockRule, from: usize) -> usize {
        let indent = self.lines[header].indent;
        let mut last = self.lines[header].last;

        for line in &self.lines[from.max(header + 1)..] {
            let continues = line.indent == indent
                && self.tokens[line.first]
                    .token_ident()
                    .map(|w| rule.continuations.contains(&w))
                    .unwrap_or(false);

            if line.indent > indent || continues {
                last = line.last;
            } else {
                break;
            }
        }

        self.tokens[last].range.end
    }

    /// Start of the block, including decorators directly above a header
    fn decorated_start(&self, line_idx: usize) -> usize {
        let indent = self.lines[line_idx].indent;
        let mut first_line = line_idx;

        while first_line > 0 {
            let prev = &self.lines[first_line - 1];
            if prev.indent == indent && self.tokens[prev.first].token == PyToken::At {
                first_line -= 1;
            } else {
                break;
            }
        }

        self.tokens[self.lines[first_line].first].range.start
    }

    fn line_range(&self, line: &LogicalLine) -> TextRange {
        TextRange::new(
            self.tokens[line.first].range.start,
            self.tokens[line.last].range.end,
        )
    }
}

impl<'src> PyLexeme<'src> {
    fn token_ident(&self) -> Option<&'src str> {
        match self.token {
            PyToken::Ident(word) => Some(word),
            _ => None,
        }
    }
}

/// Indentation width of a line prefix, with tabs advancing to the next multiple of 8
pub(crate) fn indent_width(prefix: &str) -> usize {
    prefix.chars().fold(0, |width, c| match c {
        '\t' => (width / 8 + 1) * 8,
        _ => width + 1,
    })
}
