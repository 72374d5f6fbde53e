//! Gate-side ticket validation.
//!
//! Authenticates a presented reference, checks the ticket's status, and
//! performs the one-time `active -> used` transition. Every branch, admitted
//! or refused, appends a [`ValidationAttempt`](crate::types::ValidationAttempt)
//! before returning, so the audit log is a complete record of gate activity.
//!
//! Two paths exist: the signed-reference scan (the trusted path) and a
//! manual lookup by bare ticket id for operator convenience. The manual path
//! skips signature verification and is flagged as such in the audit log.

use crate::audit::AuditLog;
use crate::error::CoreError;
use crate::issuer::ReferenceSigner;
use crate::store::Store;
use crate::types::{
    EventId, Ticket, TicketId, TicketStatus, UserId, ValidationMethod, ValidationOutcome,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

// ============================================================================
// Results
// ============================================================================

/// Display data returned to gate staff alongside a verdict.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TicketSummary {
    /// Ticket identifier.
    pub ticket_id: TicketId,
    /// Human-readable ticket number.
    pub ticket_number: String,
    /// Holder display name.
    pub holder_name: String,
    /// Ticket type display name.
    pub ticket_type_name: String,
    /// When the ticket was consumed, if it has been.
    pub used_at: Option<DateTime<Utc>>,
}

impl From<&Ticket> for TicketSummary {
    fn from(ticket: &Ticket) -> Self {
        Self {
            ticket_id: ticket.id,
            ticket_number: ticket.ticket_number.clone(),
            holder_name: ticket.holder_name.clone(),
            ticket_type_name: ticket.ticket_type_name.clone(),
            used_at: ticket.used_at,
        }
    }
}

/// Why a ticket was refused at the gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Refusal {
    /// The reference failed signature verification.
    InvalidSignature,
    /// The reference belongs to a different event.
    WrongEvent,
    /// No ticket matches the reference/id.
    NotFound,
    /// The ticket was already consumed; `used_at`/`validated_by` tell the
    /// operator who admitted it and when.
    AlreadyUsed {
        /// When the ticket was consumed.
        used_at: Option<DateTime<Utc>>,
        /// Validator who consumed it.
        validated_by: Option<UserId>,
    },
    /// The ticket is cancelled or otherwise not admissible.
    Invalid,
}

/// Verdict of one validation attempt.
///
/// Refusals are results, not errors: the gate endpoint always answers with
/// one of these, and only infrastructure failures surface as [`CoreError`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// Whether the ticket was admitted.
    pub valid: bool,
    /// Refusal reason, absent when admitted.
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub refusal: Option<Refusal>,
    /// Ticket display data, when a ticket was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<TicketSummary>,
}

impl ValidationResult {
    const fn admitted(ticket: TicketSummary) -> Self {
        Self {
            valid: true,
            refusal: None,
            ticket: Some(ticket),
        }
    }

    const fn refused(refusal: Refusal, ticket: Option<TicketSummary>) -> Self {
        Self {
            valid: false,
            refusal: Some(refusal),
            ticket,
        }
    }
}

// ============================================================================
// Validator
// ============================================================================

/// Authenticates references and consumes tickets exactly once.
#[derive(Clone)]
pub struct TicketValidator {
    store: Arc<dyn Store>,
    signer: ReferenceSigner,
    audit: AuditLog,
}

impl TicketValidator {
    /// Creates a validator over the shared store and signing key.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, signer: ReferenceSigner, audit: AuditLog) -> Self {
        Self {
            store,
            signer,
            audit,
        }
    }

    /// Validates a signed reference at the gate (the trusted path).
    ///
    /// Order of checks: signature, embedded event id, ticket lookup,
    /// already-used, cancelled, then the atomic `active -> used` transition.
    /// Each refusal branch records a [`ValidationAttempt`](crate::types::ValidationAttempt)
    /// before returning.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] on store I/O failure; refusals are
    /// returned as `Ok` results.
    pub async fn validate(
        &self,
        reference: &str,
        event_id: EventId,
        validator_id: UserId,
    ) -> Result<ValidationResult, CoreError> {
        let method = ValidationMethod::Scan;

        // 1. Signature.
        let claims = match self.signer.verify(reference) {
            Ok(claims) => claims,
            Err(CoreError::Signature(note)) => {
                self.audit
                    .record(
                        None,
                        event_id,
                        validator_id,
                        ValidationOutcome::InvalidSignature,
                        method,
                        note,
                    )
                    .await?;
                return Ok(ValidationResult::refused(Refusal::InvalidSignature, None));
            }
            Err(other) => return Err(other),
        };

        // 2. Embedded event must match the gate's event.
        if claims.event_id != event_id {
            self.audit
                .record(
                    None,
                    event_id,
                    validator_id,
                    ValidationOutcome::WrongEvent,
                    method,
                    format!("reference was issued for event {}", claims.event_id),
                )
                .await?;
            return Ok(ValidationResult::refused(Refusal::WrongEvent, None));
        }

        // 3. Lookup by stored reference, scoped to the event.
        let Some(ticket) = self.store.ticket_by_reference(event_id, reference).await? else {
            self.audit
                .record(
                    None,
                    event_id,
                    validator_id,
                    ValidationOutcome::NotFound,
                    method,
                    format!("no ticket for order {}", claims.order_id),
                )
                .await?;
            return Ok(ValidationResult::refused(Refusal::NotFound, None));
        };

        // 4-6. Shared with the manual path.
        self.admit_or_refuse(ticket, event_id, validator_id, method)
            .await
    }

    /// Manual fallback: looks a ticket up by bare id, skipping signature
    /// verification. Intentionally weaker trust; flagged in the audit log
    /// with `method = manual`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] on store I/O failure.
    pub async fn validate_manual(
        &self,
        ticket_id: TicketId,
        event_id: EventId,
        validator_id: UserId,
    ) -> Result<ValidationResult, CoreError> {
        let method = ValidationMethod::Manual;

        let Some(ticket) = self.store.ticket(ticket_id).await? else {
            self.audit
                .record(
                    None,
                    event_id,
                    validator_id,
                    ValidationOutcome::NotFound,
                    method,
                    format!("no ticket with id {ticket_id}"),
                )
                .await?;
            return Ok(ValidationResult::refused(Refusal::NotFound, None));
        };

        if ticket.event_id != event_id {
            self.audit
                .record(
                    Some(ticket.id),
                    event_id,
                    validator_id,
                    ValidationOutcome::WrongEvent,
                    method,
                    format!("ticket {} belongs to event {}", ticket.ticket_number, ticket.event_id),
                )
                .await?;
            return Ok(ValidationResult::refused(Refusal::WrongEvent, None));
        }

        self.admit_or_refuse(ticket, event_id, validator_id, method)
            .await
    }

    /// Steps 4-6 of the validation algorithm: already-used, cancelled, then
    /// the compare-and-set consumption.
    async fn admit_or_refuse(
        &self,
        ticket: Ticket,
        event_id: EventId,
        validator_id: UserId,
        method: ValidationMethod,
    ) -> Result<ValidationResult, CoreError> {
        // 4. Already consumed: report who/when, never re-mark.
        if ticket.is_used {
            return self.refuse_used(&ticket, event_id, validator_id, method).await;
        }

        // 5. Administratively voided.
        if ticket.status == TicketStatus::Cancelled {
            self.audit
                .record(
                    Some(ticket.id),
                    event_id,
                    validator_id,
                    ValidationOutcome::Invalid,
                    method,
                    format!("ticket {} is cancelled", ticket.ticket_number),
                )
                .await?;
            return Ok(ValidationResult::refused(
                Refusal::Invalid,
                Some(TicketSummary::from(&ticket)),
            ));
        }

        // 6. Atomic consumption: compare-and-set on is_used, so of two
        // simultaneous scans exactly one wins.
        match self.store.use_ticket(ticket.id, validator_id, Utc::now()).await {
            Ok(used) => {
                self.audit
                    .record(
                        Some(used.id),
                        event_id,
                        validator_id,
                        ValidationOutcome::Admitted,
                        method,
                        format!("ticket {} admitted", used.ticket_number),
                    )
                    .await?;
                Ok(ValidationResult::admitted(TicketSummary::from(&used)))
            }
            Err(CoreError::StateConflict(_)) => {
                // Lost the race; re-read for the who/when context.
                let current = self
                    .store
                    .ticket(ticket.id)
                    .await?
                    .ok_or_else(|| CoreError::not_found("ticket", ticket.id))?;
                if current.status == TicketStatus::Cancelled {
                    self.audit
                        .record(
                            Some(current.id),
                            event_id,
                            validator_id,
                            ValidationOutcome::Invalid,
                            method,
                            format!("ticket {} is cancelled", current.ticket_number),
                        )
                        .await?;
                    return Ok(ValidationResult::refused(
                        Refusal::Invalid,
                        Some(TicketSummary::from(&current)),
                    ));
                }
                self.refuse_used(&current, event_id, validator_id, method).await
            }
            Err(other) => Err(other),
        }
    }

    async fn refuse_used(
        &self,
        ticket: &Ticket,
        event_id: EventId,
        validator_id: UserId,
        method: ValidationMethod,
    ) -> Result<ValidationResult, CoreError> {
        self.audit
            .record(
                Some(ticket.id),
                event_id,
                validator_id,
                ValidationOutcome::AlreadyUsed,
                method,
                format!("ticket {} was already used", ticket.ticket_number),
            )
            .await?;
        Ok(ValidationResult::refused(
            Refusal::AlreadyUsed {
                used_at: ticket.used_at,
                validated_by: ticket.validated_by,
            },
            Some(TicketSummary::from(ticket)),
        ))
    }
}
