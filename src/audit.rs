//! Append-only audit log of gate validation attempts.
//!
//! Every scan, admitted or refused, signed or manual, lands here before
//! the validator returns. Records are never mutated or deleted.

use crate::error::CoreError;
use crate::store::Store;
use crate::types::{
    AttemptId, EventId, TicketId, UserId, ValidationAttempt, ValidationMethod, ValidationOutcome,
};
use chrono::Utc;
use std::sync::Arc;

/// Writer/reader for the validation audit trail.
#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn Store>,
}

impl AuditLog {
    /// Creates an audit log over the shared store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Records one validation attempt.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] on I/O failure.
    pub async fn record(
        &self,
        ticket_id: Option<TicketId>,
        event_id: EventId,
        validator_id: UserId,
        outcome: ValidationOutcome,
        method: ValidationMethod,
        note: impl Into<String>,
    ) -> Result<(), CoreError> {
        let attempt = ValidationAttempt {
            id: AttemptId::new(),
            ticket_id,
            event_id,
            validator_id,
            outcome,
            method,
            note: note.into(),
            recorded_at: Utc::now(),
        };
        metrics::counter!(
            "gate.validation_attempts",
            "outcome" => outcome.as_str(),
            "method" => method.as_str(),
        )
        .increment(1);
        tracing::info!(
            event_id = %attempt.event_id,
            validator_id = %attempt.validator_id,
            outcome = outcome.as_str(),
            method = method.as_str(),
            "Validation attempt recorded"
        );
        self.store.append_attempt(attempt).await
    }

    /// Lists the attempts recorded for an event, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] on I/O failure.
    pub async fn attempts_for_event(
        &self,
        event_id: EventId,
    ) -> Result<Vec<ValidationAttempt>, CoreError> {
        self.store.attempts_for_event(event_id).await
    }
}
