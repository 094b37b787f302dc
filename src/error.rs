//! Error taxonomy for control-plane operations

use thiserror::Error;

/// A failed control-plane operation.
///
/// Bridge calls return `Result<T, String>`; each failure is caught at the
/// call site and converted into a `Bridge` value rather than unwinding.
/// Validation errors are raised locally, before any bridge call is made.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A backend command failed; the message is surfaced verbatim.
    #[error("{0}")]
    Bridge(String),

    /// A local precondition failed before any backend call.
    #[error("{0}")]
    Validation(String),
}

impl Error {
    pub fn bridge(message: impl Into<String>) -> Self {
        Self::Bridge(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
