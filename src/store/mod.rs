//! Transactional persistence for the ticketing core.
//!
//! Every state-changing operation here is atomic with respect to concurrent
//! callers: the in-memory store serializes writers behind a single lock, the
//! Postgres store uses row locks and conditional updates. No caller may cache
//! `sold_count` or `is_used` across requests; each check-then-act sequence
//! re-reads inside the atomic section it writes in.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::error::CoreError;
use crate::types::{
    EventId, Order, OrderId, OrderStatus, PaymentMethod, PaymentMethodId, Ticket, TicketId,
    TicketType, TicketTypeId, UserId, ValidationAttempt,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// The shared relational store behind the ledger, order state machine,
/// issuer, validator, and audit log.
///
/// `Order.status` and `Ticket.status`/`is_used` are the only fields other
/// subsystems branch on; both are guarded by compare-and-set operations so a
/// failed transition never leaves a row in an intermediate state.
#[async_trait]
pub trait Store: Send + Sync {
    // ------------------------------------------------------------------
    // Ticket types (inventory counters)
    // ------------------------------------------------------------------

    /// Inserts a ticket type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] on I/O failure.
    async fn insert_ticket_type(&self, ticket_type: TicketType) -> Result<(), CoreError>;

    /// Fetches a ticket type.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown id.
    async fn ticket_type(&self, id: TicketTypeId) -> Result<TicketType, CoreError>;

    /// Atomically reserves `quantity` units: re-reads `sold_count`, checks
    /// the sale window against `now` and `sold_count + quantity <=
    /// total_quantity`, and increments, all inside one atomic section.
    /// Concurrent reservations for the same ticket type serialize; no two
    /// successes may together exceed `total_quantity`.
    ///
    /// # Errors
    ///
    /// [`CoreError::Oversold`] when remaining inventory is insufficient,
    /// [`CoreError::Validation`] when the sale window excludes `now`,
    /// [`CoreError::NotFound`] for an unknown ticket type.
    async fn reserve(
        &self,
        id: TicketTypeId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError>;

    /// Compensating decrement for a reservation that never became an order:
    /// subtracts `quantity` from `sold_count`, clamped at zero. Rejected
    /// orders release through [`Store::reject_order`] instead, atomically
    /// with the status transition.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown ticket type.
    async fn release(&self, id: TicketTypeId, quantity: u32) -> Result<(), CoreError>;

    // ------------------------------------------------------------------
    // Payment methods
    // ------------------------------------------------------------------

    /// Inserts an organizer-configured payment method.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] on I/O failure.
    async fn insert_payment_method(&self, method: PaymentMethod) -> Result<(), CoreError>;

    /// Fetches a payment method.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown id.
    async fn payment_method(&self, id: PaymentMethodId) -> Result<PaymentMethod, CoreError>;

    // ------------------------------------------------------------------
    // Orders
    // ------------------------------------------------------------------

    /// Inserts a freshly created order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] on I/O failure.
    async fn insert_order(&self, order: Order) -> Result<(), CoreError>;

    /// Fetches an order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown id.
    async fn order(&self, id: OrderId) -> Result<Order, CoreError>;

    /// Replaces an order, conditioned on its stored status still being
    /// `expected` (compare-and-set on the status column).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StateConflict`] when the stored status has moved
    /// on, [`CoreError::NotFound`] for an unknown order.
    async fn update_order(&self, order: Order, expected: OrderStatus) -> Result<(), CoreError>;

    /// Approval commit: the order update (CAS on `expected`) and the minted
    /// tickets land in one atomic section: either everything commits or
    /// nothing does.
    ///
    /// # Errors
    ///
    /// Same as [`Store::update_order`].
    async fn approve_order(
        &self,
        order: Order,
        expected: OrderStatus,
        tickets: Vec<Ticket>,
    ) -> Result<(), CoreError>;

    /// Rejection commit: the order update (CAS on `expected`) and the
    /// inventory decrement for `order.quantity` (clamped at zero) land in one
    /// atomic section, so a fault can never leave the order rejected with its
    /// units still held.
    ///
    /// # Errors
    ///
    /// Same as [`Store::update_order`].
    async fn reject_order(&self, order: Order, expected: OrderStatus) -> Result<(), CoreError>;

    // ------------------------------------------------------------------
    // Tickets
    // ------------------------------------------------------------------

    /// Fetches a ticket by primary key (the manual validation path).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] on I/O failure.
    async fn ticket(&self, id: TicketId) -> Result<Option<Ticket>, CoreError>;

    /// Fetches a ticket by its stored signed reference, scoped to an event.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] on I/O failure.
    async fn ticket_by_reference(
        &self,
        event_id: EventId,
        reference: &str,
    ) -> Result<Option<Ticket>, CoreError>;

    /// Lists all tickets minted for an order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] on I/O failure.
    async fn tickets_for_order(&self, order_id: OrderId) -> Result<Vec<Ticket>, CoreError>;

    /// One-shot consumption: compare-and-set on `is_used = false` (and
    /// `status = active`), stamping `used_at` and `validated_by`. Exactly one
    /// of two simultaneous scans can win.
    ///
    /// # Errors
    ///
    /// [`CoreError::StateConflict`] when the ticket is already used or not
    /// active, [`CoreError::NotFound`] for an unknown ticket.
    async fn use_ticket(
        &self,
        id: TicketId,
        validator: UserId,
        now: DateTime<Utc>,
    ) -> Result<Ticket, CoreError>;

    /// Administrative void of an unused ticket.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StateConflict`] for a used ticket (immutable once
    /// used), [`CoreError::NotFound`] for an unknown ticket.
    async fn cancel_ticket(&self, id: TicketId) -> Result<(), CoreError>;

    // ------------------------------------------------------------------
    // Validation audit log
    // ------------------------------------------------------------------

    /// Appends a validation attempt. Attempts are never mutated or deleted.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] on I/O failure.
    async fn append_attempt(&self, attempt: ValidationAttempt) -> Result<(), CoreError>;

    /// Lists validation attempts for an event, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] on I/O failure.
    async fn attempts_for_event(&self, event_id: EventId)
        -> Result<Vec<ValidationAttempt>, CoreError>;
}
