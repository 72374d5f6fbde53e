//! Inventory ledger: atomic reserve/release over ticket-type counters.
//!
//! The ledger exclusively owns `sold_count`. Availability is never computed
//! from a cached value: the store re-reads the counter inside the same
//! atomic section that increments it, so concurrent reservations for one
//! ticket type serialize and can never jointly exceed `total_quantity`.

use crate::error::CoreError;
use crate::store::Store;
use crate::types::{Reservation, ReservationId, TicketTypeId};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Atomic reserve/release operations on ticket-type inventory.
#[derive(Clone)]
pub struct InventoryLedger {
    store: Arc<dyn Store>,
}

impl InventoryLedger {
    /// Creates a ledger over the shared store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Atomically holds `quantity` units of a ticket type and returns the
    /// reservation receipt. The check (sale window, remaining capacity) and
    /// the increment happen in one isolated transaction.
    ///
    /// # Errors
    ///
    /// [`CoreError::Validation`] for a non-positive quantity or a closed
    /// sale window, [`CoreError::Oversold`] when remaining inventory is
    /// insufficient (the caller must not create an order in this case),
    /// [`CoreError::NotFound`] for an unknown ticket type.
    pub async fn reserve(
        &self,
        ticket_type_id: TicketTypeId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<Reservation, CoreError> {
        if quantity == 0 {
            return Err(CoreError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }
        self.store.reserve(ticket_type_id, quantity, now).await?;

        metrics::counter!("ledger.reservations", "result" => "reserved").increment(1);
        tracing::debug!(%ticket_type_id, quantity, "Inventory reserved");
        Ok(Reservation {
            id: ReservationId::new(),
            ticket_type_id,
            quantity,
        })
    }

    /// Compensating action for a reservation with no order behind it:
    /// returns the held units to the pool, clamped at zero. Rejected orders
    /// release through the store's rejection commit instead, atomically with
    /// the status transition.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown ticket type.
    pub async fn release(
        &self,
        ticket_type_id: TicketTypeId,
        quantity: u32,
    ) -> Result<(), CoreError> {
        self.store.release(ticket_type_id, quantity).await?;

        metrics::counter!("ledger.reservations", "result" => "released").increment(1);
        tracing::debug!(%ticket_type_id, quantity, "Inventory released");
        Ok(())
    }
}
