use crate::ast::{Block, SyntaxTree};
use crate::error::ParseError;
use crate::grammar::{BlockRule, BodyForm, Grammar};
use crate::python::PythonParser;
use crate::tokenizer::{tokenize, Lexeme, QuoteKind, Token};
use duplex_common::{Language, TextRange};
use tracing::debug;

/// How a block's body ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Body {
    /// `{ ... }` starting at token `open`; `close` is `None` when unmatched
    Braced { open: usize, close: Option<usize> },
    /// Declaration ending at token `last`
    Statement { last: usize },
}

/// Structural parser for brace-delimited languages
pub struct Parser<'src> {
    source: &'src str,
    grammar: Grammar,
    tokens: Vec<Lexeme<'src>>,
    /// For each opening delimiter, the index of its closer
    pairs: Vec<Option<usize>>,
    /// Tokens that belong to a block header or an else-chain and must not
    /// open blocks of their own
    skip: Vec<bool>,
    tree: SyntaxTree,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str, language: Language) -> Self {
        let tokenized = tokenize(source, language);
        let mut tree = SyntaxTree::new(language);
        tree.comments = tokenized.comments;
        tree.errors
            .extend(tokenized.errors.into_iter().map(ParseError::lexer_error));
        if let Some(range) = tokenized.unterminated_comment {
            tree.errors.push(ParseError::UnterminatedComment { range });
        }

        let len = tokenized.tokens.len();
        Self {
            source,
            grammar: Grammar::for_language(language),
            tokens: tokenized.tokens,
            pairs: vec![None; len],
            skip: vec![false; len],
            tree,
        }
    }

    /// Parse the whole buffer into a (possibly partial) tree
    pub fn parse(mut self) -> SyntaxTree {
        self.match_delimiters();

        for i in 0..self.tokens.len() {
            if self.skip[i] {
                continue;
            }
            let Some(word) = self.tokens[i].token.ident() else {
                continue;
            };
            let Some(rule) = self.grammar.rule(word) else {
                continue;
            };
            if let Some(block) = self.parse_block(i, rule) {
                self.tree.blocks.push(block);
            }
        }

        self.tree.sort_blocks();
        self.tree.errors.sort_by_key(|e| e.range().start);

        debug!(
            language = %self.grammar.language,
            blocks = self.tree.blocks.len(),
            errors = self.tree.errors.len(),
            "Parsed source"
        );

        self.tree
    }

    /// Pair up `{}`, `()` and `[]`, recording stray or unclosed delimiters
    fn match_delimiters(&mut self) {
        let mut stack: Vec<usize> = Vec::new();

        for i in 0..self.tokens.len() {
            let token = self.tokens[i].token;
            if Self::is_opener(&token) {
                stack.push(i);
                continue;
            }
            let Some(opener) = Self::opener_for(&token) else {
                continue;
            };

            match stack.iter().rposition(|&o| self.tokens[o].token == opener) {
                Some(pos) => {
                    for unclosed in stack.drain(pos + 1..) {
                        self.tree.errors.push(ParseError::unclosed(
                            self.tokens[unclosed].range,
                            self.char_at(unclosed),
                        ));
                    }
                    if let Some(open) = stack.pop() {
                        self.pairs[open] = Some(i);
                    }
                }
                None => {
                    self.tree
                        .errors
                        .push(ParseError::unexpected_closer(self.tokens[i].range, self.char_at(i)));
                }
            }
        }

        for unclosed in stack {
            self.tree.errors.push(ParseError::unclosed(
                self.tokens[unclosed].range,
                self.char_at(unclosed),
            ));
        }
    }

    fn parse_block(&mut self, i: usize, rule: &BlockRule) -> Option<Block> {
        if self.is_member_access(i) || self.is_type_position(i) {
            return None;
        }
        if rule.needs_name && self.token(i + 1).and_then(|t| t.ident()).is_none() {
            return None;
        }

        let body = match rule.form {
            BodyForm::ArrowBinding => self.find_arrow_body(i)?,
            BodyForm::Braced | BodyForm::BracedOrStatement => self.find_body(i, rule.form)?,
            BodyForm::Suite => return None,
        };

        let end = match body {
            Body::Statement { last } => {
                self.mark_header(i, last + 1);
                self.tokens[last].range.end
            }
            Body::Braced { open, close } => {
                self.mark_header(i, open);
                match close {
                    Some(close) => {
                        let last = self.follow_chain(close, rule);
                        self.tokens[last].range.end
                    }
                    None => self.source.len(),
                }
            }
        };

        let start = self.tokens[self.block_start(i)].range.start;
        Some(Block::new(rule.kind, TextRange::new(start, end)))
    }

    /// Scan from a keyword to the `{` that opens its body
    fn find_body(&self, keyword: usize, form: BodyForm) -> Option<Body> {
        let allows_statement = form == BodyForm::BracedOrStatement;
        let mut j = keyword + 1;

        while j < self.tokens.len() {
            if self.grammar.newline_terminates && self.ends_line(j) {
                return allows_statement.then_some(Body::Statement { last: j - 1 });
            }

            match self.tokens[j].token {
                Token::LBrace => {
                    return Some(Body::Braced {
                        open: j,
                        close: self.pairs[j],
                    })
                }
                Token::LParen | Token::LBracket => j = self.pairs[j]? + 1,
                Token::Semicolon if allows_statement => {
                    return Some(Body::Statement { last: j });
                }
                // Go `for i := 0; i < n; i++ {` and `if err := f(); err != nil {`
                Token::Semicolon if self.grammar.newline_terminates => j += 1,
                Token::Semicolon => return None,
                Token::RBrace | Token::RParen | Token::RBracket => return None,
                _ => j += 1,
            }
        }

        None
    }

    /// `const name = (args) => { ... }` or `const name = arg => { ... }`
    fn find_arrow_body(&self, keyword: usize) -> Option<Body> {
        let mut j = keyword + 1;
        self.token(j)?.ident()?;
        j += 1;

        // optional type annotation up to `=`
        while self.token(j)? != Token::Eq {
            match self.tokens[j].token {
                Token::LParen | Token::LBracket => j = self.pairs[j]? + 1,
                Token::Semicolon | Token::LBrace | Token::RBrace | Token::FatArrow => return None,
                _ => j += 1,
            }
        }
        j += 1;

        if self.token(j)?.ident() == Some("async") {
            j += 1;
        }

        match self.token(j)? {
            Token::LParen => j = self.pairs[j]? + 1,
            Token::Ident(_) => j += 1,
            _ => return None,
        }

        // optional return type annotation up to `=>`
        while self.token(j)? != Token::FatArrow {
            match self.tokens[j].token {
                Token::Semicolon | Token::LBrace | Token::RBrace | Token::Eq | Token::Comma => {
                    return None
                }
                Token::LParen | Token::LBracket => j = self.pairs[j]? + 1,
                _ => j += 1,
            }
        }
        j += 1;

        match self.token(j)? {
            Token::LBrace => Some(Body::Braced {
                open: j,
                close: self.pairs[j],
            }),
            _ => None,
        }
    }

    /// Extend an `if` block over its `else if` / `else` continuations
    ///
    /// Returns the index of the last closing brace of the chain.
    fn follow_chain(&mut self, close: usize, rule: &BlockRule) -> usize {
        let mut last = close;

        loop {
            let continues = self
                .token(last + 1)
                .and_then(|t| t.ident())
                .map(|w| rule.continuations.contains(&w))
                .unwrap_or(false);
            if !continues {
                return last;
            }

            let after = last + 2;
            let next_close = match self.token(after) {
                Some(Token::LBrace) => self.pairs[after],
                Some(Token::Ident(word)) if word == rule.keyword => {
                    self.skip[after] = true;
                    match self.find_body(after, BodyForm::Braced) {
                        Some(Body::Braced { open, close }) => {
                            self.mark_header(after, open);
                            close
                        }
                        _ => None,
                    }
                }
                _ => None,
            };

            match next_close {
                Some(c) => last = c,
                None => return last,
            }
        }
    }

    /// Walk back over modifiers that belong to the block
    fn block_start(&self, keyword: usize) -> usize {
        let mut k = keyword;

        while k > 0 {
            let prev = self.tokens[k - 1].token;
            match prev {
                Token::Ident(word) if self.grammar.is_modifier(word) => k -= 1,
                // `pub(crate)`, `pub(super)`
                Token::RParen if self.grammar.language == Language::Rust => {
                    let Some(open) = self.opener_of(k - 1) else { break };
                    if open > 0 && self.tokens[open - 1].token.ident() == Some("pub") {
                        k = open - 1;
                    } else {
                        break;
                    }
                }
                // `extern "C"`
                Token::String if k >= 2 && self.tokens[k - 2].token.ident() == Some("extern") => {
                    k -= 2
                }
                _ => break,
            }
        }

        k
    }

    fn mark_header(&mut self, from: usize, to: usize) {
        for flag in self.skip.iter_mut().take(to).skip(from + 1) {
            *flag = true;
        }
    }

    /// `obj.match(...)`, `x.for`
    fn is_member_access(&self, i: usize) -> bool {
        i > 0 && self.text(i - 1) == "."
    }

    /// Rust `for<'a> Fn(&'a T)` bounds
    fn is_type_position(&self, i: usize) -> bool {
        self.grammar.language == Language::Rust
            && self.tokens[i].token.ident() == Some("for")
            && self.token(i + 1).is_some()
            && self.text(i + 1) == "<"
    }

    /// Go inserts a semicolon at a newline after these tokens
    fn ends_line(&self, j: usize) -> bool {
        if j == 0 {
            return false;
        }
        let prev = &self.tokens[j - 1];
        let gap = &self.source[prev.range.end..self.tokens[j].range.start];
        gap.contains('\n')
            && matches!(
                prev.token,
                Token::Ident(_)
                    | Token::Number
                    | Token::String
                    | Token::RawString
                    | Token::Template
                    | Token::Quote(QuoteKind::String | QuoteKind::Char)
                    | Token::RParen
                    | Token::RBracket
                    | Token::RBrace
            )
    }

    fn opener_of(&self, closer: usize) -> Option<usize> {
        self.pairs.iter().position(|p| *p == Some(closer))
    }

    fn token(&self, i: usize) -> Option<Token<'src>> {
        self.tokens.get(i).map(|l| l.token)
    }

    fn text(&self, i: usize) -> &'src str {
        &self.source[self.tokens[i].range.as_range()]
    }

    fn char_at(&self, i: usize) -> char {
        self.text(i).chars().next().unwrap_or('?')
    }

    fn is_opener(token: &Token) -> bool {
        matches!(token, Token::LBrace | Token::LParen | Token::LBracket)
    }

    fn opener_for(token: &Token<'src>) -> Option<Token<'src>> {
        match token {
            Token::RBrace => Some(Token::LBrace),
            Token::RParen => Some(Token::LParen),
            Token::RBracket => Some(Token::LBracket),
            _ => None,
        }
    }
}

/// Parse `source` into an ordered list of blocks
///
/// Never fails: invalid syntax yields a partial tree with the problems
/// recorded in [`SyntaxTree::errors`].
pub fn parse(source: &str, language: Language) -> SyntaxTree {
    match language {
        Language::Python => PythonParser::new(source).parse(),
        _ => Parser::new(source, language).parse(),
    }
}

/// Comment ranges in source order, without building a tree
pub fn comments(source: &str, language: Language) -> Vec<TextRange> {
    match language {
        Language::Python => PythonParser::new(source).into_comments(),
        _ => tokenize(source, language).comments,
    }
}
