//! Core error types.

use thiserror::Error;

use tessera_lang::Span;
use tessera_proto::{ClassId, ObjectId, StorageKind};

use crate::coerce::CoercionError;

/// Engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Class, object, member or record absent.
    #[error("{entity} not found: {key}")]
    NotFound {
        /// What was looked up (`class`, `object`, ...).
        entity: &'static str,
        /// The code or id that failed to resolve.
        key: String,
    },

    /// An object id was addressed through the wrong class.
    #[error("object {object_id} belongs to class {actual}, not '{expected}'")]
    ClassMismatch {
        object_id: ObjectId,
        expected: String,
        actual: ClassId,
    },

    /// Malformed filter, sort or paging input.
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryError),

    /// A staged member does not resolve under the open transaction's class.
    #[error("class '{class}' has no member '{member}'")]
    InvalidMember { class: String, member: String },

    /// A staged value could not be coerced or referenced a bad target.
    #[error("invalid value for member '{member}': {reason}")]
    InvalidValue {
        member: String,
        expected: StorageKind,
        literal: String,
        reason: String,
    },

    /// Required members missing at commit.
    #[error("validation failed, required members missing: {}", .members.join(", "))]
    ValidationFailed { members: Vec<String> },

    /// Writer operation called in the wrong state.
    #[error("invalid writer state: {0}")]
    InvalidState(String),

    /// Schema bundle failed validation.
    #[error("invalid schema: {0}")]
    InvalidSchema(String),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] tessera_proto::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for [`Error::NotFound`].
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Error::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Build an [`Error::InvalidValue`] from a coercion failure.
    pub fn invalid_value(member: impl Into<String>, err: CoercionError) -> Self {
        Error::InvalidValue {
            member: member.into(),
            expected: err.expected,
            literal: err.literal,
            reason: err.reason,
        }
    }

    /// Whether the caller caused this error.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound { .. }
                | Error::ClassMismatch { .. }
                | Error::InvalidQuery(_)
                | Error::InvalidMember { .. }
                | Error::InvalidValue { .. }
                | Error::ValidationFailed { .. }
                | Error::InvalidState(_)
        )
    }

    /// HTTP status class for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound { .. } => 404,
            e if e.is_client_error() => 400,
            _ => 500,
        }
    }
}

/// Category of a query compilation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Filter text did not parse.
    Syntax,
    /// Filter or sort references an unknown member.
    UnknownMember,
    /// Operator not legal for the member's storage kind.
    IllegalOperator,
    /// Literal not coercible to the member's storage kind.
    InvalidLiteral,
    /// Exactly one of sort member / sort direction given.
    SortMismatch,
    /// Negative skip or take.
    NegativePaging,
    /// Sort direction other than asc/desc.
    InvalidDirection,
}

/// Query compilation failure.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub message: String,
    /// Byte span in the filter string, for filter errors.
    pub span: Option<Span>,
    /// Message rendered against the filter source.
    pub context: Option<String>,
}

impl QueryError {
    pub fn new(kind: QueryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: None,
            context: None,
        }
    }

    /// Attach a span and render it against the filter source.
    pub fn at(mut self, span: Span, source: &str) -> Self {
        self.context = Some(tessera_lang::format_span(source, span, &self.message, None));
        self.span = Some(span);
        self
    }

    /// Convert a parse error, keeping its rendered context.
    pub fn from_parse(err: &tessera_lang::ParseError, source: &str) -> Self {
        Self {
            kind: QueryErrorKind::Syntax,
            message: err.message.clone(),
            span: Some(err.span),
            context: Some(err.format_with_source(source)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Error::not_found("class", "nope").status_code(), 404);
        assert_eq!(
            Error::ValidationFailed {
                members: vec!["name".into()]
            }
            .status_code(),
            400
        );
        assert_eq!(
            Error::InvalidQuery(QueryError::new(QueryErrorKind::NegativePaging, "skip < 0"))
                .status_code(),
            400
        );
        assert_eq!(Error::Transaction("boom".into()).status_code(), 500);
        assert!(!Error::InvalidSchema("x".into()).is_client_error());
    }

    #[test]
    fn test_messages_carry_context() {
        let err = Error::ValidationFailed {
            members: vec!["name".into(), "sku".into()],
        };
        assert_eq!(
            err.to_string(),
            "validation failed, required members missing: name, sku"
        );

        let err = Error::invalid_value(
            "price",
            CoercionError::new(StorageKind::Decimal, "abc", "not a number"),
        );
        assert_eq!(err.to_string(), "invalid value for member 'price': not a number");
    }

    #[test]
    fn test_query_error_context() {
        let source = "age gt abc";
        let err = QueryError::new(QueryErrorKind::InvalidLiteral, "'abc' is not an integer")
            .at(Span::new(7, 10), source);
        assert_eq!(err.span, Some(Span::new(7, 10)));
        assert!(err.context.unwrap().contains("^~~"));
    }
}
