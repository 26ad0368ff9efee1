//! Encoding error types.

use thiserror::Error;

/// Errors raised while encoding or decoding stored types.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Identifier bytes had the wrong width.
    #[error("invalid identifier encoding: expected 8 bytes, got {0}")]
    InvalidId(usize),
}
