//! Lexer for filter expressions using logos.

use crate::error::{ParseError, ParseErrorKind};
use crate::span::Span;
use logos::Logos;

/// Token types for the filter grammar.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    // Comparison operators
    #[token("eq", ignore(ascii_case))]
    Eq,
    #[token("ne", ignore(ascii_case))]
    Ne,
    #[token("gt", ignore(ascii_case))]
    Gt,
    #[token("ge", ignore(ascii_case))]
    Ge,
    #[token("lt", ignore(ascii_case))]
    Lt,
    #[token("le", ignore(ascii_case))]
    Le,
    #[token("contains", ignore(ascii_case))]
    Contains,
    #[token("in", ignore(ascii_case))]
    In,

    // Logical operators
    #[token("and", ignore(ascii_case))]
    And,
    #[token("or", ignore(ascii_case))]
    Or,

    // Identifier (member code or bare-word literal)
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),

    // String literal (double-quoted)
    #[regex(r#""([^"\\]|\\.)*""#, |lex| {
        let s = lex.slice();
        unescape_string(&s[1..s.len() - 1])
    })]
    String(String),

    // String literal (single-quoted)
    #[regex(r#"'([^'\\]|\\.)*'"#, |lex| {
        let s = lex.slice();
        unescape_string(&s[1..s.len() - 1])
    })]
    StringSingle(String),

    // Numeric literal, kept verbatim so the target member decides its type
    #[regex(r"-?[0-9]+(\.[0-9]+)?", |lex| lex.slice().to_string())]
    Number(String),

    // Punctuation
    #[token(",")]
    Comma,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
}

impl Token {
    /// Short description for error messages.
    pub fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("'{}'", name),
            Token::String(s) | Token::StringSingle(s) => format!("string \"{}\"", s),
            Token::Number(n) => format!("number {}", n),
            Token::Comma => "','".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::LBracket => "'['".to_string(),
            Token::RBracket => "']'".to_string(),
            Token::And => "'and'".to_string(),
            Token::Or => "'or'".to_string(),
            op => format!("operator {:?}", op).to_lowercase(),
        }
    }
}

/// Unescape a string literal, handling common escape sequences.
fn unescape_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => result.push('\n'),
            Some('t') => result.push('\t'),
            Some('\\') => result.push('\\'),
            Some('"') => result.push('"'),
            Some('\'') => result.push('\''),
            Some(other) => {
                result.push('\\');
                result.push(other);
            }
            None => result.push('\\'),
        }
    }

    result
}

/// A token with its span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// Tokenize a filter string.
///
/// Unlike a forgiving REPL lexer, any unrecognised character fails the whole
/// filter: a malformed filter must never silently widen a query.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, ParseError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let span: Span = lexer.span().into();
        match result {
            Ok(token) => tokens.push(SpannedToken { token, span }),
            Err(()) => {
                return Err(ParseError::new(
                    ParseErrorKind::InvalidCharacter,
                    format!("unexpected input '{}'", lexer.slice()),
                    span,
                )
                .with_hint("quote literals containing punctuation, e.g. 'a-b'"));
            }
        }
    }

    Ok(tokens)
}

/// Whether `text` lexes as exactly one identifier, so a filter can name it.
///
/// Keywords in any case are not identifiers.
pub fn is_identifier(text: &str) -> bool {
    let mut lexer = Token::lexer(text);
    matches!(lexer.next(), Some(Ok(Token::Ident(ref name))) if name == text) && lexer.next().is_none()
}
