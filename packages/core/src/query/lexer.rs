//! Tokenizer for the query language
//!
//! Built from `chumsky` combinators. Every character lexes as something, so the
//! lexer never fails: an unterminated quote or bracket runs to the end of the input.
//! Whitespace is not a token but every token records whether whitespace came before
//! it, which is how a function call (`state(.)`) is told apart from a parenthesized
//! condition group (`(a and b)`).

use chumsky::prelude::*;
use chumsky::Stream;
use std::fmt;
use std::ops::Range;
use tracing::debug;

pub type Span = Range<usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Bare run of characters: keywords, operators, unbracketed paths, numbers
    Word,
    /// `'...'`, text without the quotes
    Quoted,
    /// `[...]`, text without the brackets
    Bracketed,
    /// `{name}`, text is the variable name
    Variable,
    /// `(` opening a condition group or sub-query
    Open,
    /// `(` directly after a word: a function call
    CallOpen,
    Close,
    Comma,
    /// Statement separator
    Semicolon,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Byte range in the source text
    pub span: Span,
    /// Whitespace (or start of input) precedes the token
    pub spaced: bool,
}

impl Token {
    /// Case-insensitive keyword test for bare words
    pub fn is_word(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_open(&self) -> bool {
        matches!(self.kind, TokenKind::Open | TokenKind::CallOpen)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Word => write!(f, "{}", self.text),
            TokenKind::Quoted => write!(f, "'{}'", self.text),
            TokenKind::Bracketed => write!(f, "[{}]", self.text),
            TokenKind::Variable => write!(f, "{{{}}}", self.text),
            TokenKind::Open | TokenKind::CallOpen => write!(f, "("),
            TokenKind::Close => write!(f, ")"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Semicolon => write!(f, ";"),
        }
    }
}

fn is_word_boundary(c: char) -> bool {
    c.is_whitespace() || matches!(c, '\'' | '[' | ']' | '(' | ')' | ',' | '{' | ';')
}

/// `open ... close` with the inner text; a missing `close` runs to the end
fn enclosed(
    open: char,
    close: char,
    kind: TokenKind,
) -> impl Parser<char, (TokenKind, String), Error = Simple<char>> + Clone {
    just(open)
        .ignore_then(none_of(close).repeated())
        .then_ignore(just(close).or_not())
        .map(move |chars: Vec<char>| (kind, chars.into_iter().collect::<String>()))
}

/// Create the query lexer
pub fn lexer() -> impl Parser<char, Vec<Token>, Error = Simple<char>> {
    let punctuation = choice((
        just('(').to((TokenKind::Open, "(".to_string())),
        just(')').to((TokenKind::Close, ")".to_string())),
        just(',').to((TokenKind::Comma, ",".to_string())),
        just(';').to((TokenKind::Semicolon, ";".to_string())),
        // stray closing bracket, kept as a word so nothing is lost
        just(']').to((TokenKind::Word, "]".to_string())),
    ));

    let word = filter(|c: &char| !is_word_boundary(*c))
        .repeated()
        .at_least(1)
        .map(|chars: Vec<char>| (TokenKind::Word, chars.into_iter().collect::<String>()));

    let token = choice((
        enclosed('\'', '\'', TokenKind::Quoted),
        enclosed('[', ']', TokenKind::Bracketed),
        enclosed('{', '}', TokenKind::Variable),
        punctuation,
        word,
    ));

    // `--` to end of line; must be tried before words, which may start with `-`
    let line_comment = just("--").then(none_of('\n').repeated()).ignored();

    let token_or_skip = line_comment.to(None).or(token
        .map_with_span(|(kind, text): (TokenKind, String), span: Span| Some((kind, text, span))));

    let whitespace = filter(|c: &char| c.is_whitespace()).repeated();

    whitespace
        .clone()
        .then(token_or_skip)
        .repeated()
        .then_ignore(whitespace)
        .then_ignore(end())
        .map(assemble)
}

type Lexed = (Vec<char>, Option<(TokenKind, String, Span)>);

/// Attach the `spaced` flag and tell call parens from group parens
fn assemble(items: Vec<Lexed>) -> Vec<Token> {
    let mut tokens: Vec<Token> = Vec::with_capacity(items.len());
    let mut spaced = true;

    for (whitespace, item) in items {
        spaced |= !whitespace.is_empty();
        let Some((kind, text, span)) = item else {
            spaced = true;
            continue;
        };

        let follows_word = !spaced && tokens.last().map_or(false, |t| t.kind == TokenKind::Word);
        let kind = match kind {
            TokenKind::Open if follows_word => TokenKind::CallOpen,
            other => other,
        };

        tokens.push(Token {
            kind,
            text,
            span,
            spaced,
        });
        spaced = false;
    }
    tokens
}

pub fn tokenize(input: &str) -> Vec<Token> {
    // spans are byte offsets so token text can be sliced back out of the source
    let eoi = input.len()..input.len();
    let chars = input.char_indices().map(|(i, c)| (c, i..i + c.len_utf8()));

    let (tokens, errors) = lexer().parse_recovery(Stream::from_iter(eoi, chars));
    if !errors.is_empty() {
        debug!("{} lexer error(s) in query text", errors.len());
    }
    tokens.unwrap_or_default()
}

/// Statement texts of a query, split on top-level `;`
///
/// Path expressions use `;` inside brackets to list several paths and quoted values may
/// hold one; both lex as part of their token, so only a real separator ends a
/// statement. `--` comments never reach a statement's edges and blank statements are
/// dropped.
pub fn split_statements(input: &str) -> Vec<String> {
    tokenize(input)
        .split(|t| t.kind == TokenKind::Semicolon)
        .filter_map(|statement| {
            let (first, last) = (statement.first()?, statement.last()?);
            input.get(first.span.start..last.span.end).map(str::to_string)
        })
        .collect()
}
