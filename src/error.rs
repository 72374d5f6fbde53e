//! Error taxonomy for the ticketing core.
//!
//! Every failure a state-changing operation can produce is one of these
//! variants; all of them are recovered at the request boundary and returned
//! as typed failures, never raised into the transport layer.

use thiserror::Error;

/// Errors produced by the ticketing core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad input shape or range (quantity <= 0, missing rejection reason).
    #[error("invalid request: {0}")]
    Validation(String),

    /// Actor is not permitted to perform this transition.
    #[error("not authorized: {0}")]
    Authorization(String),

    /// Not enough remaining inventory for the requested quantity.
    #[error("not enough tickets available")]
    Oversold,

    /// Transition attempted from the wrong status; a no-op failure.
    #[error("conflicting state: {0}")]
    StateConflict(String),

    /// Unknown order/ticket/event/ticket type.
    #[error("{0} not found")]
    NotFound(String),

    /// Ticket reference failed signature verification or decoding.
    #[error("invalid ticket reference: {0}")]
    Signature(String),

    /// Blob upload or store I/O failure. The only retryable kind.
    #[error("storage failure: {0}")]
    Storage(String),
}

impl CoreError {
    /// Whether the caller may safely retry the request without side effects.
    ///
    /// Only [`CoreError::Storage`] qualifies: a storage failure commits
    /// nothing, while every other kind is a terminal verdict on the request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Convenience constructor for [`CoreError::NotFound`].
    #[must_use]
    pub fn not_found(what: impl std::fmt::Display, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{what} {id}"))
    }
}
