//! Domain error model.

use thiserror::Error;

/// Failure of a shared primitive.
///
/// Stock-specific failures (insufficient stock, unknown items) live in
/// `stockledger-inventory`; this enum only carries what the core types
/// themselves can reject.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
