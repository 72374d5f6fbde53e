//! Order lifecycle API endpoints.
//!
//! - `POST /api/orders` - Create an order (holds inventory)
//! - `GET /api/orders/:id` - Fetch an order (buyer or organizer)
//! - `POST /api/orders/:id/proof` - Attach payment details and a proof image
//! - `POST /api/orders/:id/verify` - Organizer approves or rejects the payment
//! - `GET /api/orders/:id/tickets` - List tickets minted for a paid order

use crate::server::auth::Caller;
use crate::server::error::ApiError;
use crate::server::state::AppState;
use crate::types::{
    EventId, Order, OrderId, OrderStatus, PaymentDetails, PaymentMethodId, Ticket, TicketStatus,
    TicketTypeId,
};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request to create an order.
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    /// Event to buy tickets for.
    pub event_id: Uuid,
    /// Ticket type to purchase.
    pub ticket_type_id: Uuid,
    /// Payment method the buyer will use.
    pub payment_method_id: Uuid,
    /// Number of tickets (>= 1).
    pub quantity: u32,
}

/// Order details returned by every order endpoint.
#[derive(Debug, Serialize)]
pub struct OrderResponse {
    /// Order id.
    pub id: Uuid,
    /// Event id.
    pub event_id: Uuid,
    /// Ticket type id.
    pub ticket_type_id: Uuid,
    /// Number of tickets.
    pub quantity: u32,
    /// Lifecycle status.
    pub status: OrderStatus,
    /// Whether a payment proof has been uploaded.
    pub proof_uploaded: bool,
    /// Organizer's reason, present on rejected orders.
    pub rejection_reason: Option<String>,
    /// When the order was created.
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: *order.id.as_uuid(),
            event_id: *order.event_id.as_uuid(),
            ticket_type_id: *order.ticket_type_id.as_uuid(),
            quantity: order.quantity,
            status: order.status,
            proof_uploaded: order.proof_key.is_some(),
            rejection_reason: order.rejection_reason.clone(),
            created_at: order.created_at,
        }
    }
}

/// Request to attach payment details and a proof image.
#[derive(Debug, Deserialize)]
pub struct SubmitProofRequest {
    /// Transaction/reference id from the buyer's payment channel.
    pub transaction_id: Option<String>,
    /// When the buyer says they paid.
    pub paid_at: Option<DateTime<Utc>>,
    /// Anything else the buyer wants the organizer to see.
    pub notes: Option<String>,
    /// Proof image bytes, base64-encoded.
    pub proof: String,
}

/// Organizer's verification decision.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Approve the payment; mints tickets.
    Approve,
    /// Reject the payment; releases inventory.
    Reject,
}

/// Request to decide a pending order.
#[derive(Debug, Deserialize)]
pub struct VerifyOrderRequest {
    /// Approve or reject.
    pub action: Decision,
    /// Required when rejecting.
    pub reason: Option<String>,
}

/// A minted ticket as returned to the buyer.
#[derive(Debug, Serialize)]
pub struct TicketResponse {
    /// Ticket id.
    pub id: Uuid,
    /// Human-readable ticket number.
    pub ticket_number: String,
    /// Signed reference to present at the gate.
    pub reference: String,
    /// Holder display name.
    pub holder_name: String,
    /// Ticket type display name.
    pub ticket_type_name: String,
    /// Current status.
    pub status: TicketStatus,
    /// When the ticket was minted.
    pub issued_at: DateTime<Utc>,
}

impl From<&Ticket> for TicketResponse {
    fn from(ticket: &Ticket) -> Self {
        Self {
            id: *ticket.id.as_uuid(),
            ticket_number: ticket.ticket_number.clone(),
            reference: ticket.reference.clone(),
            holder_name: ticket.holder_name.clone(),
            ticket_type_name: ticket.ticket_type_name.clone(),
            status: ticket.status,
            issued_at: ticket.issued_at,
        }
    }
}

/// Response to a verification decision.
#[derive(Debug, Serialize)]
pub struct VerifyOrderResponse {
    /// The decided order.
    pub order: OrderResponse,
    /// Tickets minted on approval; empty on rejection.
    pub tickets: Vec<TicketResponse>,
}

/// Tickets minted for an order.
#[derive(Debug, Serialize)]
pub struct ListTicketsResponse {
    /// The tickets.
    pub tickets: Vec<TicketResponse>,
    /// Total count.
    pub total: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a new order.
///
/// Requires authentication. Atomically holds inventory for the requested
/// quantity; responds 409 when not enough tickets remain.
pub async fn create_order(
    Caller(buyer): Caller,
    State(state): State<AppState>,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let order = state
        .orders
        .create_order(
            &buyer,
            EventId::from_uuid(request.event_id),
            TicketTypeId::from_uuid(request.ticket_type_id),
            PaymentMethodId::from_uuid(request.payment_method_id),
            request.quantity,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&order))))
}

/// Get order details; buyer and event organizer only.
pub async fn get_order(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order = state
        .orders
        .order_for(&actor, OrderId::from_uuid(order_id))
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// Attach payment details and a proof image; buyer only.
///
/// Responds 503 when the blob upload fails; the order stays in
/// `pending_payment` and the request can be retried as-is.
pub async fn submit_proof(
    Caller(buyer): Caller,
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<SubmitProofRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let proof = STANDARD
        .decode(&request.proof)
        .map_err(|_| ApiError::bad_request("payment proof must be valid base64"))?;
    let details = PaymentDetails {
        transaction_id: request.transaction_id,
        paid_at: request.paid_at,
        notes: request.notes,
    };
    let order = state
        .orders
        .submit_proof(&buyer, OrderId::from_uuid(order_id), details, proof)
        .await?;
    Ok(Json(OrderResponse::from(&order)))
}

/// Approve or reject a pending payment; event organizer only.
///
/// Approval mints tickets in the same atomic commit as the status change;
/// rejection requires a reason and releases the held inventory.
pub async fn verify_order(
    Caller(organizer): Caller,
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<VerifyOrderRequest>,
) -> Result<Json<VerifyOrderResponse>, ApiError> {
    let order_id = OrderId::from_uuid(order_id);
    let (order, tickets) = match request.action {
        Decision::Approve => state.orders.approve(&organizer, order_id).await?,
        Decision::Reject => {
            let reason = request.reason.unwrap_or_default();
            let order = state.orders.reject(&organizer, order_id, reason).await?;
            (order, Vec::new())
        }
    };
    Ok(Json(VerifyOrderResponse {
        order: OrderResponse::from(&order),
        tickets: tickets.iter().map(TicketResponse::from).collect(),
    }))
}

/// List the tickets minted for an order; buyer and event organizer only.
pub async fn list_order_tickets(
    Caller(actor): Caller,
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ListTicketsResponse>, ApiError> {
    let tickets = state
        .orders
        .tickets_for_order(&actor, OrderId::from_uuid(order_id))
        .await?;
    Ok(Json(ListTicketsResponse {
        total: tickets.len(),
        tickets: tickets.iter().map(TicketResponse::from).collect(),
    }))
}
