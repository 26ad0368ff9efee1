//! Tessera filter language.
//!
//! This crate turns a caller-supplied filter string into an untyped,
//! spanned syntax tree. Member names are not resolved here and literals are
//! kept as written; `tessera-core` binds both against the schema catalog.
//!
//! # Syntax
//!
//! ```text
//! price lt 10
//! name contains "wid" and active eq true
//! status eq draft or (status eq published and price ge 5.5)
//! id in [1, 2, 3]
//! published eq "2024-01-31"
//! ```
//!
//! Operators and logical keywords are case-insensitive. `and` binds tighter
//! than `or`; parentheses group. Literals are numbers, quoted strings, or
//! bare words.
//!
//! # Usage
//!
//! ```rust
//! use tessera_lang::{parse, FilterNode};
//!
//! let tree = parse("price lt 10 and active eq true").unwrap().unwrap();
//! assert!(matches!(tree, FilterNode::And(_)));
//! assert!(parse("   ").unwrap().is_none());
//! ```

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;

// Re-export main types
pub use ast::{Comparison, FilterNode, Literal, Operand};
pub use error::{format_span, ParseError, ParseErrorKind};
pub use lexer::{is_identifier, SpannedToken, Token};
pub use span::{Span, Spanned};

/// Parse a filter string into a syntax tree.
///
/// Returns `Ok(None)` when the source is empty or whitespace only.
pub fn parse(source: &str) -> Result<Option<FilterNode>, ParseError> {
    parser::parse(source)
}

/// Tokenize a filter string.
pub fn tokenize(source: &str) -> Result<Vec<SpannedToken>, ParseError> {
    lexer::tokenize(source)
}
