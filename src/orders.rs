//! Order lifecycle: creation, proof submission, and payment verification.
//!
//! An order moves `pending_payment -> pending_verification -> paid |
//! rejected`, and only through [`OrderStatus::apply`]. Every transition is
//! committed with a compare-and-set on the stored status, so a concurrent
//! decision wins exactly once: approval mints tickets in the same atomic
//! section as the status change, rejection releases the held inventory
//! exactly once.

use crate::directory::{BlobStore, EventDirectory, Identity};
use crate::error::CoreError;
use crate::issuer::TicketIssuer;
use crate::ledger::InventoryLedger;
use crate::store::Store;
use crate::types::{
    EventId, Order, OrderAction, OrderId, OrderStatus, PaymentDetails, PaymentMethodId, Ticket,
    TicketTypeId, UserRole,
};
use chrono::Utc;
use std::sync::Arc;

/// Coordinates the order state machine over the store, ledger, and issuer.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    ledger: InventoryLedger,
    directory: Arc<dyn EventDirectory>,
    blobs: Arc<dyn BlobStore>,
    issuer: TicketIssuer,
}

impl OrderService {
    /// Creates the service over its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        ledger: InventoryLedger,
        directory: Arc<dyn EventDirectory>,
        blobs: Arc<dyn BlobStore>,
        issuer: TicketIssuer,
    ) -> Self {
        Self {
            store,
            ledger,
            directory,
            blobs,
            issuer,
        }
    }

    /// Creates an order in `pending_payment`, holding inventory for it.
    ///
    /// The reservation is taken before the order row is written; if the
    /// insert fails the held units are returned. A failed reservation never
    /// creates an order.
    ///
    /// # Errors
    ///
    /// [`CoreError::Validation`] for a zero quantity, a ticket type or
    /// payment method that does not belong to the event, or a closed sale
    /// window; [`CoreError::Authorization`] when the buyer is not eligible;
    /// [`CoreError::Oversold`] when inventory is insufficient;
    /// [`CoreError::NotFound`] for unknown ids.
    pub async fn create_order(
        &self,
        buyer: &Identity,
        event_id: EventId,
        ticket_type_id: TicketTypeId,
        payment_method_id: PaymentMethodId,
        quantity: u32,
    ) -> Result<Order, CoreError> {
        if quantity == 0 {
            return Err(CoreError::Validation(
                "quantity must be at least 1".to_string(),
            ));
        }

        let event = self.directory.event(event_id).await?;
        if buyer.user_id == event.organizer_id {
            return Err(CoreError::Authorization(
                "the event organizer cannot buy tickets to their own event".to_string(),
            ));
        }
        if buyer.role == UserRole::Organizer {
            return Err(CoreError::Authorization(
                "organizer accounts cannot buy tickets".to_string(),
            ));
        }
        if let Some(required) = event.restricted_to {
            if buyer.role != required {
                return Err(CoreError::Authorization(format!(
                    "this event is restricted to {} accounts",
                    required.as_str()
                )));
            }
        }

        let ticket_type = self.store.ticket_type(ticket_type_id).await?;
        if ticket_type.event_id != event_id {
            return Err(CoreError::Validation(
                "ticket type does not belong to this event".to_string(),
            ));
        }
        let method = self.store.payment_method(payment_method_id).await?;
        if method.event_id != event_id {
            return Err(CoreError::Validation(
                "payment method does not belong to this event".to_string(),
            ));
        }
        if ticket_type.unit_price.checked_multiply(quantity).is_none() {
            return Err(CoreError::Validation("order total overflows".to_string()));
        }

        let reservation = self
            .ledger
            .reserve(ticket_type_id, quantity, Utc::now())
            .await?;

        let order = Order {
            id: OrderId::new(),
            event_id,
            ticket_type_id,
            buyer_id: buyer.user_id,
            buyer_name: buyer.display_name.clone(),
            quantity,
            payment_method_id,
            reservation_id: reservation.id,
            status: OrderStatus::PendingPayment,
            payment_details: None,
            proof_key: None,
            rejection_reason: None,
            verified_by: None,
            verified_at: None,
            ticket_code: None,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.insert_order(order.clone()).await {
            // Return the held units; the reservation has no order to back it.
            if let Err(release_err) = self.ledger.release(ticket_type_id, quantity).await {
                tracing::error!(
                    %ticket_type_id,
                    quantity,
                    error = %release_err,
                    "Failed to release reservation after order insert failure"
                );
            }
            return Err(e);
        }

        metrics::counter!("orders.transitions", "action" => "created").increment(1);
        tracing::info!(
            order_id = %order.id,
            event_id = %event_id,
            buyer_id = %buyer.user_id,
            quantity,
            "Order created"
        );
        Ok(order)
    }

    /// Attaches payment details and a proof blob, moving the order to
    /// `pending_verification`.
    ///
    /// The blob is uploaded before the status update and outside any store
    /// lock: an upload failure leaves the order in `pending_payment` and the
    /// buyer retries; an upload success followed by a store failure leaves
    /// an orphaned blob and the order unchanged.
    ///
    /// # Errors
    ///
    /// [`CoreError::Authorization`] when the caller is not the buyer,
    /// [`CoreError::StateConflict`] when the order is not in
    /// `pending_payment`, [`CoreError::Validation`] for an empty proof,
    /// [`CoreError::Storage`] (retryable) on blob upload failure.
    pub async fn submit_proof(
        &self,
        buyer: &Identity,
        order_id: OrderId,
        details: PaymentDetails,
        proof: Vec<u8>,
    ) -> Result<Order, CoreError> {
        let order = self.store.order(order_id).await?;
        if order.buyer_id != buyer.user_id {
            return Err(CoreError::Authorization(
                "only the buyer may submit payment proof".to_string(),
            ));
        }
        // Check the transition before uploading so an obviously conflicted
        // request does not orphan a blob.
        let next = order.status.apply(OrderAction::SubmitProof)?;
        if proof.is_empty() {
            return Err(CoreError::Validation(
                "payment proof must not be empty".to_string(),
            ));
        }

        let proof_key = self.blobs.put(proof).await?;

        let updated = Order {
            status: next,
            payment_details: Some(details),
            proof_key: Some(proof_key),
            ..order
        };
        self.store
            .update_order(updated.clone(), OrderStatus::PendingPayment)
            .await?;

        metrics::counter!("orders.transitions", "action" => "proof_submitted").increment(1);
        tracing::info!(order_id = %updated.id, "Payment proof submitted");
        Ok(updated)
    }

    /// Organizer approval: moves the order to `paid` and mints its tickets.
    ///
    /// The status compare-and-set and the ticket inserts commit in one atomic
    /// section, so a concurrent approve/reject wins exactly once and a `paid`
    /// order always has its tickets.
    ///
    /// # Errors
    ///
    /// [`CoreError::Authorization`] when the caller is not the event's
    /// organizer, [`CoreError::StateConflict`] when the order is not in
    /// `pending_verification`.
    pub async fn approve(
        &self,
        organizer: &Identity,
        order_id: OrderId,
    ) -> Result<(Order, Vec<Ticket>), CoreError> {
        let order = self.store.order(order_id).await?;
        self.authorize_organizer(organizer, &order).await?;
        let next = order.status.apply(OrderAction::Approve)?;

        let ticket_type = self.store.ticket_type(order.ticket_type_id).await?;
        let now = Utc::now();
        let updated = Order {
            status: next,
            verified_by: Some(organizer.user_id),
            verified_at: Some(now),
            ticket_code: Some(TicketIssuer::new_ticket_code()),
            ..order
        };
        let tickets = self.issuer.issue(&updated, &ticket_type.name, now)?;
        self.store
            .approve_order(updated.clone(), OrderStatus::PendingVerification, tickets.clone())
            .await?;

        metrics::counter!("orders.transitions", "action" => "approved").increment(1);
        tracing::info!(
            order_id = %updated.id,
            verified_by = %organizer.user_id,
            tickets = tickets.len(),
            "Order approved"
        );
        Ok((updated, tickets))
    }

    /// Organizer rejection: moves the order to `rejected` and returns the
    /// held inventory.
    ///
    /// The status compare-and-set and the inventory release commit in one
    /// atomic section, mirroring approval's ticket minting: a fault never
    /// leaves a rejected order with its units still held, and since the
    /// transition out of `pending_verification` wins at most once, the
    /// inventory is released exactly once per order.
    ///
    /// # Errors
    ///
    /// [`CoreError::Validation`] for an empty reason,
    /// [`CoreError::Authorization`] when the caller is not the event's
    /// organizer, [`CoreError::StateConflict`] when the order is not in
    /// `pending_verification`.
    pub async fn reject(
        &self,
        organizer: &Identity,
        order_id: OrderId,
        reason: String,
    ) -> Result<Order, CoreError> {
        if reason.trim().is_empty() {
            return Err(CoreError::Validation(
                "a rejection reason is required".to_string(),
            ));
        }

        let order = self.store.order(order_id).await?;
        self.authorize_organizer(organizer, &order).await?;
        let next = order.status.apply(OrderAction::Reject)?;

        let updated = Order {
            status: next,
            rejection_reason: Some(reason),
            verified_by: Some(organizer.user_id),
            verified_at: Some(Utc::now()),
            ..order
        };
        self.store
            .reject_order(updated.clone(), OrderStatus::PendingVerification)
            .await?;

        metrics::counter!("ledger.reservations", "result" => "released").increment(1);
        metrics::counter!("orders.transitions", "action" => "rejected").increment(1);
        tracing::info!(
            order_id = %updated.id,
            verified_by = %organizer.user_id,
            "Order rejected"
        );
        Ok(updated)
    }

    /// Fetches an order for its buyer or the event's organizer.
    ///
    /// # Errors
    ///
    /// [`CoreError::Authorization`] for any other caller,
    /// [`CoreError::NotFound`] for an unknown order.
    pub async fn order_for(
        &self,
        actor: &Identity,
        order_id: OrderId,
    ) -> Result<Order, CoreError> {
        let order = self.store.order(order_id).await?;
        if order.buyer_id != actor.user_id {
            let event = self.directory.event(order.event_id).await?;
            if event.organizer_id != actor.user_id {
                return Err(CoreError::Authorization(
                    "only the buyer or the event organizer may view this order".to_string(),
                ));
            }
        }
        Ok(order)
    }

    /// Lists the tickets minted for an order, for its buyer or the event's
    /// organizer.
    ///
    /// # Errors
    ///
    /// Same as [`OrderService::order_for`].
    pub async fn tickets_for_order(
        &self,
        actor: &Identity,
        order_id: OrderId,
    ) -> Result<Vec<Ticket>, CoreError> {
        self.order_for(actor, order_id).await?;
        self.store.tickets_for_order(order_id).await
    }

    async fn authorize_organizer(
        &self,
        actor: &Identity,
        order: &Order,
    ) -> Result<(), CoreError> {
        let event = self.directory.event(order.event_id).await?;
        if event.organizer_id != actor.user_id {
            return Err(CoreError::Authorization(
                "only the event organizer may verify payments".to_string(),
            ));
        }
        Ok(())
    }
}
