//! Gate validation API endpoints.
//!
//! - `POST /api/tickets/validate` - Validate a scanned signed reference
//! - `POST /api/tickets/:id/validate-manual` - Manual lookup by ticket id
//!
//! Refusals are 200 responses with `valid: false` and a `reason`; only
//! infrastructure failures produce error statuses. The caller's resolved
//! identity is recorded as the validator on every attempt.

use crate::server::auth::Caller;
use crate::server::error::ApiError;
use crate::server::state::AppState;
use crate::types::{EventId, TicketId};
use crate::validator::ValidationResult;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

/// Request to validate a scanned reference.
#[derive(Debug, Deserialize)]
pub struct ValidateTicketRequest {
    /// The signed reference from the ticket.
    pub reference: String,
    /// Event the gate is admitting to.
    pub event_id: Uuid,
}

/// Request body for the manual validation fallback.
#[derive(Debug, Deserialize)]
pub struct ValidateManualRequest {
    /// Event the gate is admitting to.
    pub event_id: Uuid,
}

/// Validate a scanned signed reference.
///
/// Runs the full check sequence (signature, event, lookup, already-used,
/// cancelled, atomic consumption) and records an audit attempt for every
/// outcome.
pub async fn validate_ticket(
    Caller(validator): Caller,
    State(state): State<AppState>,
    Json(request): Json<ValidateTicketRequest>,
) -> Result<Json<ValidationResult>, ApiError> {
    let result = state
        .validator
        .validate(
            &request.reference,
            EventId::from_uuid(request.event_id),
            validator.user_id,
        )
        .await?;
    Ok(Json(result))
}

/// Validate a ticket by bare id (manual fallback).
///
/// Skips signature verification; the audit record is flagged with
/// `method = manual`.
pub async fn validate_ticket_manual(
    Caller(validator): Caller,
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
    Json(request): Json<ValidateManualRequest>,
) -> Result<Json<ValidationResult>, ApiError> {
    let result = state
        .validator
        .validate_manual(
            TicketId::from_uuid(ticket_id),
            EventId::from_uuid(request.event_id),
            validator.user_id,
        )
        .await?;
    Ok(Json(result))
}
