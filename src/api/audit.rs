//! Validation audit trail API endpoints.
//!
//! - `GET /api/events/:id/validation-attempts` - List gate attempts for an
//!   event (organizer only)

use crate::server::auth::Caller;
use crate::server::error::ApiError;
use crate::server::state::AppState;
use crate::types::{EventId, ValidationAttempt, ValidationMethod, ValidationOutcome};
use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// One recorded validation attempt.
#[derive(Debug, Serialize)]
pub struct AttemptResponse {
    /// Attempt id.
    pub id: Uuid,
    /// Ticket involved, if one was found.
    pub ticket_id: Option<Uuid>,
    /// Gate validator who performed the scan.
    pub validator_id: Uuid,
    /// Scan outcome.
    pub outcome: ValidationOutcome,
    /// Presentation method.
    pub method: ValidationMethod,
    /// Free-text context.
    pub note: String,
    /// When the attempt was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl From<&ValidationAttempt> for AttemptResponse {
    fn from(attempt: &ValidationAttempt) -> Self {
        Self {
            id: *attempt.id.as_uuid(),
            ticket_id: attempt.ticket_id.map(|t| *t.as_uuid()),
            validator_id: *attempt.validator_id.as_uuid(),
            outcome: attempt.outcome,
            method: attempt.method,
            note: attempt.note.clone(),
            recorded_at: attempt.recorded_at,
        }
    }
}

/// Validation attempts recorded for an event.
#[derive(Debug, Serialize)]
pub struct ListAttemptsResponse {
    /// The attempts, oldest first.
    pub attempts: Vec<AttemptResponse>,
    /// Total count.
    pub total: usize,
}

/// List the validation attempts for an event; organizer only.
pub async fn list_validation_attempts(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Json<ListAttemptsResponse>, ApiError> {
    let event_id = EventId::from_uuid(event_id);
    let event = state.directory.event(event_id).await?;
    if event.organizer_id != actor.user_id {
        return Err(ApiError::forbidden(
            "only the event organizer may view the validation log",
        ));
    }
    let attempts = state.audit.attempts_for_event(event_id).await?;
    Ok(Json(ListAttemptsResponse {
        total: attempts.len(),
        attempts: attempts.iter().map(AttemptResponse::from).collect(),
    }))
}
