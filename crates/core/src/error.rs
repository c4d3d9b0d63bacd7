//! Domain error model for shared primitives.

use thiserror::Error;

/// Result type used by the primitives in this crate.
pub type DomainResult<T> = Result<T, DomainError>;

/// Failure constructing a primitive value.
///
/// Engine-level failures (insufficient history, bad policy inputs, ...) live in
/// `stockcast-engine`; this type only covers malformed identifiers and values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. empty code, inverted period).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
