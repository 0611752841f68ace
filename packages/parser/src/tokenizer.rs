//! Tokenizer for brace-delimited languages (Rust, Go, JavaScript, TypeScript).
//!
//! The structural parser only needs enough lexical structure to pair braces
//! and recognize block keywords, so literals are kept opaque and comments are
//! split out into their own list for the metadata codec.

use duplex_common::{Language, TextRange};
use logos::{Lexer, Logos};

/// Lexer settings that change how quotes and slashes are read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LexMode {
    /// Rust reads `'a` as a lifetime and `'x'` as a char literal
    pub rust_quotes: bool,
    /// JavaScript and TypeScript have `/.../flags` literals
    pub regex_literals: bool,
    /// The previous token leaves room for an expression
    pub regex_allowed: bool,
}

/// What a single-quote token turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteKind {
    Char,
    Lifetime,
    String,
}

/// What a `/` turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashKind {
    Divide,
    Regex,
}

/// Token types for brace-delimited languages
#[derive(Logos, Debug, Clone, Copy, PartialEq)]
#[logos(extras = LexMode)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token<'src> {
    #[regex(r"//[^\n]*", |lex| lex.slice())]
    LineComment(&'src str),

    #[regex(r"/\*([^*]|\*+[^*/])*\*+/", |lex| lex.slice())]
    BlockComment(&'src str),

    #[regex(r"/\*([^*]|\*+[^*/])*\**")]
    UnterminatedComment,

    #[regex(r"[\p{L}_$][\p{L}\p{N}_$]*", |lex| lex.slice())]
    #[regex(r"r#[\p{L}_][\p{L}\p{N}_]*", |lex| &lex.slice()[2..])]
    Ident(&'src str),

    #[regex(r#"b?"([^"\\]|\\(.|\n))*""#)]
    String,

    #[regex(r##"b?r#*""##, lex_raw_string)]
    RawString,

    #[regex(r"`([^`\\]|\\(.|\n))*`")]
    Template,

    #[token("'", lex_quote)]
    Quote(QuoteKind),

    #[regex(r"[0-9][0-9a-zA-Z_.]*")]
    Number,

    #[token("/", lex_slash)]
    Slash(SlashKind),

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token(";")]
    Semicolon,

    #[token(",")]
    Comma,

    #[token("=>")]
    FatArrow,

    #[token("=")]
    Eq,

    #[token("#")]
    Hash,

    #[regex(r"[!%&*+\-.:<>?@^|~\\]")]
    Punct,
}

impl<'src> Token<'src> {
    pub fn is_comment(&self) -> bool {
        matches!(self, Token::LineComment(_) | Token::BlockComment(_))
    }

    pub fn ident(&self) -> Option<&'src str> {
        match self {
            Token::Ident(name) => Some(name),
            _ => None,
        }
    }
}

/// Closes a raw string literal `r#"..."#` with the same number of hashes
fn lex_raw_string<'src>(lex: &mut Lexer<'src, Token<'src>>) -> bool {
    let hashes = lex.slice().chars().filter(|c| *c == '#').count();
    let terminator = format!("\"{}", "#".repeat(hashes));

    match lex.remainder().find(&terminator) {
        Some(pos) => {
            lex.bump(pos + terminator.len());
            true
        }
        None => false,
    }
}

/// Reads whatever follows a single quote
///
/// Rust distinguishes char literals from lifetimes; the other languages treat
/// single quotes as string delimiters.
fn lex_quote<'src>(lex: &mut Lexer<'src, Token<'src>>) -> Option<QuoteKind> {
    let rest = lex.remainder();

    if lex.extras.rust_quotes {
        let mut chars = rest.char_indices();
        let (_, first) = chars.next()?;

        if first == '\\' {
            let escaped = rest.get(2..)?;
            let end = 2 + escaped.find(|c| c == '\'' || c == '\n')?;
            if rest[end..].starts_with('\'') {
                lex.bump(end + 1);
                return Some(QuoteKind::Char);
            }
            return None;
        }

        let after = first.len_utf8();
        if rest[after..].starts_with('\'') {
            lex.bump(after + 1);
            return Some(QuoteKind::Char);
        }

        if first.is_alphabetic() || first == '_' {
            let len = rest
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            lex.bump(len);
            return Some(QuoteKind::Lifetime);
        }

        return None;
    }

    let mut escaped = false;
    for (i, c) in rest.char_indices() {
        match c {
            '\n' => return None,
            '\\' if !escaped => escaped = true,
            '\'' if !escaped => {
                lex.bump(i + 1);
                return Some(QuoteKind::String);
            }
            _ => escaped = false,
        }
    }

    None
}

/// Reads a regex literal where an expression may start, a plain slash
/// anywhere else
fn lex_slash<'src>(lex: &mut Lexer<'src, Token<'src>>) -> SlashKind {
    if !(lex.extras.regex_literals && lex.extras.regex_allowed) {
        return SlashKind::Divide;
    }

    let rest = lex.remainder();
    let mut in_class = false;
    let mut escaped = false;
    for (i, c) in rest.char_indices() {
        match c {
            '\n' | '\r' => return SlashKind::Divide,
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => {
                let body = i + 1;
                let flags = rest[body..]
                    .find(|c: char| !c.is_ascii_alphabetic())
                    .unwrap_or(rest.len() - body);
                lex.bump(body + flags);
                return SlashKind::Regex;
            }
            _ => {}
        }
    }

    SlashKind::Divide
}

/// Whether a `/` after `token` starts a regex literal rather than dividing
fn regex_may_follow(token: &Token<'_>) -> bool {
    match token {
        Token::Ident(word) => matches!(
            *word,
            "return"
                | "typeof"
                | "instanceof"
                | "case"
                | "do"
                | "else"
                | "in"
                | "of"
                | "new"
                | "delete"
                | "void"
                | "throw"
                | "yield"
                | "await"
        ),
        Token::Number
        | Token::String
        | Token::RawString
        | Token::Template
        | Token::Quote(_)
        | Token::RParen
        | Token::RBracket
        | Token::Slash(SlashKind::Regex) => false,
        _ => true,
    }
}

/// A code token with its byte range
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lexeme<'src> {
    pub token: Token<'src>,
    pub range: TextRange,
}

/// Output of [`tokenize`]: code tokens, comments and lexer failures
#[derive(Debug, Clone, Default)]
pub struct Tokenized<'src> {
    /// Code tokens in source order (comments excluded)
    pub tokens: Vec<Lexeme<'src>>,
    /// Comment ranges in source order
    pub comments: Vec<TextRange>,
    /// Ranges the lexer could not read
    pub errors: Vec<TextRange>,
    /// Range of a block comment that runs to end of input
    pub unterminated_comment: Option<TextRange>,
}

/// Tokenize brace-family source
pub fn tokenize(source: &str, language: Language) -> Tokenized<'_> {
    let regex_literals = matches!(language, Language::JavaScript | Language::TypeScript);
    let mode = LexMode {
        rust_quotes: language == Language::Rust,
        regex_literals,
        regex_allowed: regex_literals,
    };
    let mut lexer = Token::lexer_with_extras(source, mode);
    let mut out = Tokenized::default();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let range = TextRange::new(span.start, span.end);

        match result {
            Ok(token) if token.is_comment() => out.comments.push(range),
            Ok(Token::UnterminatedComment) => {
                out.comments.push(range);
                out.unterminated_comment = Some(range);
            }
            Ok(token) => {
                lexer.extras.regex_allowed = regex_may_follow(&token);
                out.tokens.push(Lexeme { token, range });
            }
            Err(()) => out.errors.push(range),
        }
    }

    out
}
