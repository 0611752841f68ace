//! Whitespace normalization for generated source.
//!
//! Lines are re-indented from the token structure (bracket depth for the
//! brace family, indentation levels for Python), so running the formatter on
//! its own output changes nothing.

use crate::python::{indent_width, PyToken};
use crate::tokenizer::{tokenize, Token};
use duplex_common::{Language, TextRange};
use logos::Logos;
use serde::{Deserialize, Serialize};

/// Indentation unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Indent {
    Spaces(usize),
    Tabs,
}

impl Default for Indent {
    fn default() -> Self {
        Indent::Spaces(4)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormattingStyle {
    pub indent: Indent,
}

impl FormattingStyle {
    pub fn spaces(width: usize) -> Self {
        Self {
            indent: Indent::Spaces(width),
        }
    }

    pub fn tabs() -> Self {
        Self {
            indent: Indent::Tabs,
        }
    }

    fn render_indent(&self, level: usize, extra: usize) -> String {
        let mut out = match self.indent {
            Indent::Spaces(width) => " ".repeat(width * level),
            Indent::Tabs => "\t".repeat(level),
        };
        out.push_str(&" ".repeat(extra));
        out
    }
}

/// How one physical line is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    /// Starts inside a multi-line string or comment
    Verbatim,
    /// Re-indented to `level` units plus `extra` spaces
    Code { level: usize, extra: usize },
}

#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    text: &'a str,
    start: usize,
    /// Offset of the terminating newline, or end of input
    end: usize,
}

fn split_lines(source: &str) -> Vec<Line<'_>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, _) in source.match_indices('\n') {
        lines.push(Line {
            text: &source[start..i],
            start,
            end: i,
        });
        start = i + 1;
    }
    if start < source.len() {
        lines.push(Line {
            text: &source[start..],
            start,
            end: source.len(),
        });
    }
    lines
}

/// Whether `offset` lies strictly inside one of the sorted, disjoint `spans`
fn strictly_inside(spans: &[TextRange], offset: usize) -> bool {
    let idx = spans.partition_point(|r| r.end <= offset);
    spans
        .get(idx)
        .map(|r| r.start < offset && offset < r.end)
        .unwrap_or(false)
}

pub struct Formatter {
    language: Language,
    style: FormattingStyle,
}

impl Formatter {
    pub fn new(language: Language, style: FormattingStyle) -> Self {
        Self { language, style }
    }

    pub fn style(&self) -> FormattingStyle {
        self.style
    }

    /// Re-indent, strip trailing whitespace, collapse blank runs and end
    /// with a single newline
    pub fn format(&self, source: &str) -> String {
        let lines = split_lines(source);
        let (shapes, opaque) = match self.language {
            Language::Python => python_shapes(source, &lines),
            language => brace_shapes(source, language, &lines),
        };

        let mut out = String::with_capacity(source.len());
        let mut pending_blank = false;

        for (line, shape) in lines.iter().zip(shapes) {
            let keep_trailing = strictly_inside(&opaque, line.end);

            let (indent, body) = match shape {
                Shape::Verbatim => (String::new(), line.text),
                Shape::Code { level, extra } => {
                    let body = line.text.trim_start();
                    if body.trim().is_empty() && !keep_trailing {
                        pending_blank = !out.is_empty();
                        continue;
                    }
                    (self.style.render_indent(level, extra), body)
                }
            };
            let body = if keep_trailing { body } else { body.trim_end() };

            if pending_blank {
                out.push('\n');
                pending_blank = false;
            }
            out.push_str(&indent);
            out.push_str(body);
            out.push('\n');
        }

        out
    }
}

fn brace_shapes(
    source: &str,
    language: Language,
    lines: &[Line<'_>],
) -> (Vec<Shape>, Vec<TextRange>) {
    let tokenized = tokenize(source, language);
    let multiline = |r: &TextRange| source[r.as_range()].contains('\n');

    let mut opaque: Vec<TextRange> = tokenized
        .tokens
        .iter()
        .map(|l| l.range)
        .chain(tokenized.comments.iter().copied())
        .filter(multiline)
        .collect();
    opaque.sort();

    let tokens = &tokenized.tokens;
    let mut depth: usize = 0;
    let mut next = 0;
    let mut shapes = Vec::with_capacity(lines.len());

    for line in lines {
        while next < tokens.len() && tokens[next].range.start < line.start {
            match tokens[next].token {
                Token::LBrace | Token::LParen | Token::LBracket => depth += 1,
                Token::RBrace | Token::RParen | Token::RBracket => {
                    depth = depth.saturating_sub(1)
                }
                _ => {}
            }
            next += 1;
        }

        if strictly_inside(&opaque, line.start) {
            shapes.push(Shape::Verbatim);
            continue;
        }

        let opens_with_closer = tokens
            .get(next)
            .filter(|t| t.range.start < line.end)
            .map(|t| matches!(t.token, Token::RBrace | Token::RParen | Token::RBracket))
            .unwrap_or(false);

        let level = if opens_with_closer {
            depth.saturating_sub(1)
        } else {
            depth
        };
        shapes.push(Shape::Code { level, extra: 0 });
    }

    (shapes, opaque)
}

fn python_shapes(source: &str, lines: &[Line<'_>]) -> (Vec<Shape>, Vec<TextRange>) {
    let mut tokens = Vec::new();
    let mut comments = Vec::new();
    let mut opaque = Vec::new();
    let mut lexer = PyToken::lexer(source);

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let range = TextRange::new(span.start, span.end);
        match result {
            Ok(PyToken::Comment) => comments.push(range),
            Ok(PyToken::LongString) if source[range.as_range()].contains('\n') => {
                opaque.push(range)
            }
            Ok(token @ (PyToken::Open | PyToken::Close)) => tokens.push((token, range)),
            _ => {}
        }
    }

    let mut depth: usize = 0;
    let mut next = 0;
    let mut stack: Vec<usize> = vec![0];
    let mut logical_level = 0;
    let mut logical_width = 0;
    let mut backslash_continued = false;
    let mut shapes = Vec::with_capacity(lines.len());

    for line in lines {
        while next < tokens.len() && tokens[next].1.start < line.start {
            match tokens[next].0 {
                PyToken::Open => depth += 1,
                _ => depth = depth.saturating_sub(1),
            }
            next += 1;
        }

        let continued = std::mem::take(&mut backslash_continued);
        let code = line.text.trim_end_matches('\r');
        if let Some(pos) = code.strip_suffix('\\').map(str::len) {
            let offset = line.start + pos;
            backslash_continued = !comments.iter().any(|r: &TextRange| r.contains(offset));
        }

        if strictly_inside(&opaque, line.start) {
            shapes.push(Shape::Verbatim);
            continue;
        }

        let body = line.text.trim_start();
        let width = indent_width(&line.text[..line.text.len() - body.len()]);

        let shape = if body.trim().is_empty() {
            Shape::Code { level: 0, extra: 0 }
        } else if depth > 0 || continued {
            Shape::Code {
                level: logical_level,
                extra: width.saturating_sub(logical_width),
            }
        } else if body.starts_with('#') {
            let level = stack.iter().filter(|w| **w <= width).count().saturating_sub(1);
            Shape::Code { level, extra: 0 }
        } else {
            while stack.len() > 1 && width < stack[stack.len() - 1] {
                stack.pop();
            }
            if width > stack[stack.len() - 1] {
                stack.push(width);
            }
            logical_level = stack.len() - 1;
            logical_width = width;
            Shape::Code {
                level: logical_level,
                extra: 0,
            }
        };
        shapes.push(shape);
    }

    (shapes, opaque)
}
