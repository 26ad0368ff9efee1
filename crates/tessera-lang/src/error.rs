//! Error types for filter parsing.

use crate::span::{offset_to_col, Span};
use thiserror::Error;

/// Kinds of parse errors, for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A character no token starts with.
    InvalidCharacter,
    /// A token that does not fit the grammar at this position.
    UnexpectedToken,
    /// Input ended in the middle of an expression.
    UnexpectedEnd,
    /// An identifier in operator position that is not an operator.
    UnknownOperator,
    /// An opening or closing parenthesis/bracket without its partner.
    UnbalancedGroup,
}

/// Error during lexing/parsing.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ParseError {
    /// The error message.
    pub message: String,
    /// Source span where the error occurred.
    pub span: Span,
    /// Error kind.
    pub kind: ParseErrorKind,
    /// Optional hint for fixing the error.
    pub hint: Option<String>,
}

impl ParseError {
    /// Create a new parse error.
    pub fn new(kind: ParseErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
            kind,
            hint: None,
        }
    }

    /// Add a hint to the error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Format the error with a caret under the offending part of the filter.
    pub fn format_with_source(&self, source: &str) -> String {
        format_span(source, self.span, &self.message, self.hint.as_deref())
    }
}

/// Render a message with a caret under `span` in `source`.
pub fn format_span(source: &str, span: Span, message: &str, hint: Option<&str>) -> String {
    let col = offset_to_col(source, span.start);
    let mut result = format!("error: {}\n", message);
    result.push_str(&format!("  --> column {}\n", col));
    result.push_str(&format!("   | {}\n   | ", source));
    result.push_str(&" ".repeat(col - 1));
    result.push('^');

    let width = source[span.start.min(source.len())..span.end.min(source.len())]
        .chars()
        .count();
    if width > 1 {
        result.push_str(&"~".repeat(width - 1));
    }
    result.push('\n');

    if let Some(hint) = hint {
        result.push_str(&format!("   = hint: {}\n", hint));
    }

    result
}
