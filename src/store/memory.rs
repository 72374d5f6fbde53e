//! In-memory store used by the test suite and the default server mode.
//!
//! A single `RwLock` guards all tables; every state-changing operation takes
//! the write guard for its whole check-then-act sequence, so writers
//! serialize exactly like row-locked transactions do in the relational
//! store.

use crate::error::CoreError;
use crate::store::Store;
use crate::types::{
    EventId, Order, OrderId, OrderStatus, PaymentMethod, PaymentMethodId, Ticket, TicketId,
    TicketStatus, TicketType, TicketTypeId, UserId, ValidationAttempt,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    ticket_types: HashMap<TicketTypeId, TicketType>,
    payment_methods: HashMap<PaymentMethodId, PaymentMethod>,
    orders: HashMap<OrderId, Order>,
    tickets: HashMap<TicketId, Ticket>,
    /// (event, reference) -> ticket, the gate-scan lookup index.
    by_reference: HashMap<(EventId, String), TicketId>,
    attempts: Vec<ValidationAttempt>,
}

/// In-memory [`Store`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_ticket_type(&self, ticket_type: TicketType) -> Result<(), CoreError> {
        self.tables
            .write()
            .await
            .ticket_types
            .insert(ticket_type.id, ticket_type);
        Ok(())
    }

    async fn ticket_type(&self, id: TicketTypeId) -> Result<TicketType, CoreError> {
        self.tables
            .read()
            .await
            .ticket_types
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("ticket type", id))
    }

    async fn reserve(
        &self,
        id: TicketTypeId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        let ticket_type = tables
            .ticket_types
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("ticket type", id))?;
        if !ticket_type.sale_open(now) {
            return Err(CoreError::Validation(
                "ticket sales are not open for this ticket type".to_string(),
            ));
        }
        if ticket_type.remaining() < quantity {
            return Err(CoreError::Oversold);
        }
        ticket_type.sold_count += quantity;
        Ok(())
    }

    async fn release(&self, id: TicketTypeId, quantity: u32) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        let ticket_type = tables
            .ticket_types
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("ticket type", id))?;
        ticket_type.sold_count = ticket_type.sold_count.saturating_sub(quantity);
        Ok(())
    }

    async fn insert_payment_method(&self, method: PaymentMethod) -> Result<(), CoreError> {
        self.tables
            .write()
            .await
            .payment_methods
            .insert(method.id, method);
        Ok(())
    }

    async fn payment_method(&self, id: PaymentMethodId) -> Result<PaymentMethod, CoreError> {
        self.tables
            .read()
            .await
            .payment_methods
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("payment method", id))
    }

    async fn insert_order(&self, order: Order) -> Result<(), CoreError> {
        self.tables.write().await.orders.insert(order.id, order);
        Ok(())
    }

    async fn order(&self, id: OrderId) -> Result<Order, CoreError> {
        self.tables
            .read()
            .await
            .orders
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("order", id))
    }

    async fn update_order(&self, order: Order, expected: OrderStatus) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        cas_order(&mut tables, order, expected)
    }

    async fn approve_order(
        &self,
        order: Order,
        expected: OrderStatus,
        tickets: Vec<Ticket>,
    ) -> Result<(), CoreError> {
        // One write guard covers both the status CAS and the ticket inserts,
        // mirroring the relational store's single transaction.
        let mut tables = self.tables.write().await;
        cas_order(&mut tables, order, expected)?;
        for ticket in tickets {
            tables
                .by_reference
                .insert((ticket.event_id, ticket.reference.clone()), ticket.id);
            tables.tickets.insert(ticket.id, ticket);
        }
        Ok(())
    }

    async fn reject_order(&self, order: Order, expected: OrderStatus) -> Result<(), CoreError> {
        // One write guard covers both the status CAS and the inventory
        // decrement, mirroring the relational store's single transaction.
        let mut tables = self.tables.write().await;
        if !tables.ticket_types.contains_key(&order.ticket_type_id) {
            return Err(CoreError::not_found("ticket type", order.ticket_type_id));
        }
        let (ticket_type_id, quantity) = (order.ticket_type_id, order.quantity);
        cas_order(&mut tables, order, expected)?;
        if let Some(ticket_type) = tables.ticket_types.get_mut(&ticket_type_id) {
            ticket_type.sold_count = ticket_type.sold_count.saturating_sub(quantity);
        }
        Ok(())
    }

    async fn ticket(&self, id: TicketId) -> Result<Option<Ticket>, CoreError> {
        Ok(self.tables.read().await.tickets.get(&id).cloned())
    }

    async fn ticket_by_reference(
        &self,
        event_id: EventId,
        reference: &str,
    ) -> Result<Option<Ticket>, CoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_reference
            .get(&(event_id, reference.to_string()))
            .and_then(|id| tables.tickets.get(id))
            .cloned())
    }

    async fn tickets_for_order(&self, order_id: OrderId) -> Result<Vec<Ticket>, CoreError> {
        let tables = self.tables.read().await;
        let mut tickets: Vec<Ticket> = tables
            .tickets
            .values()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect();
        tickets.sort_by(|a, b| a.ticket_number.cmp(&b.ticket_number));
        Ok(tickets)
    }

    async fn use_ticket(
        &self,
        id: TicketId,
        validator: UserId,
        now: DateTime<Utc>,
    ) -> Result<Ticket, CoreError> {
        let mut tables = self.tables.write().await;
        let ticket = tables
            .tickets
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("ticket", id))?;
        // The compare-and-set: re-checked under the write guard, so two
        // simultaneous scans cannot both pass.
        if ticket.is_used || ticket.status != TicketStatus::Active {
            return Err(CoreError::StateConflict(format!(
                "ticket {} is not active",
                ticket.ticket_number
            )));
        }
        ticket.is_used = true;
        ticket.status = TicketStatus::Used;
        ticket.used_at = Some(now);
        ticket.validated_by = Some(validator);
        Ok(ticket.clone())
    }

    async fn cancel_ticket(&self, id: TicketId) -> Result<(), CoreError> {
        let mut tables = self.tables.write().await;
        let ticket = tables
            .tickets
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("ticket", id))?;
        if ticket.is_used {
            return Err(CoreError::StateConflict(format!(
                "ticket {} is already used and cannot be cancelled",
                ticket.ticket_number
            )));
        }
        ticket.status = TicketStatus::Cancelled;
        Ok(())
    }

    async fn append_attempt(&self, attempt: ValidationAttempt) -> Result<(), CoreError> {
        self.tables.write().await.attempts.push(attempt);
        Ok(())
    }

    async fn attempts_for_event(
        &self,
        event_id: EventId,
    ) -> Result<Vec<ValidationAttempt>, CoreError> {
        Ok(self
            .tables
            .read()
            .await
            .attempts
            .iter()
            .filter(|a| a.event_id == event_id)
            .cloned()
            .collect())
    }
}

fn cas_order(tables: &mut Tables, order: Order, expected: OrderStatus) -> Result<(), CoreError> {
    let stored = tables
        .orders
        .get(&order.id)
        .ok_or_else(|| CoreError::not_found("order", order.id))?;
    if stored.status != expected {
        return Err(CoreError::StateConflict(format!(
            "order {} is in status {}, expected {}",
            order.id, stored.status, expected
        )));
    }
    tables.orders.insert(order.id, order);
    Ok(())
}
