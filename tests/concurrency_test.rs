//! Concurrency tests for the inventory ledger and one-time ticket use.
//!
//! Races many tasks against the same ticket type / ticket and checks the
//! two core guarantees: reservations never jointly exceed capacity, and a
//! ticket is consumed by exactly one of any number of simultaneous scans.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use boxoffice::error::CoreError;
use boxoffice::issuer::{ReferenceSigner, TicketIssuer};
use boxoffice::ledger::InventoryLedger;
use boxoffice::store::{MemoryStore, Store};
use boxoffice::types::{
    EventId, Money, Order, OrderId, OrderStatus, PaymentMethodId, ReservationId, TicketType,
    TicketTypeId, UserId,
};
use boxoffice::validator::{Refusal, TicketValidator};
use boxoffice::AuditLog;
use chrono::Utc;
use std::sync::Arc;

async fn seed_ticket_type(store: &Arc<dyn Store>, total_quantity: u32) -> TicketTypeId {
    let id = TicketTypeId::new();
    store
        .insert_ticket_type(TicketType {
            id,
            event_id: EventId::new(),
            name: "GA".to_string(),
            unit_price: Money::from_cents(1000),
            total_quantity,
            sold_count: 0,
            sale_starts_at: None,
            sale_ends_at: None,
        })
        .await
        .unwrap();
    id
}

/// Twenty concurrent single-unit reservations against five units: exactly
/// five succeed, the rest refuse as oversold, and the counter never exceeds
/// the cap.
#[tokio::test]
async fn concurrent_reservations_never_oversell() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let ticket_type_id = seed_ticket_type(&store, 5).await;
    let ledger = InventoryLedger::new(Arc::clone(&store));

    let mut handles = Vec::new();
    for _ in 0..20 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger.reserve(ticket_type_id, 1, Utc::now()).await
        }));
    }

    let mut reserved = 0;
    let mut oversold = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => reserved += 1,
            Err(CoreError::Oversold) => oversold += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(reserved, 5);
    assert_eq!(oversold, 15);
    let stored = store.ticket_type(ticket_type_id).await.unwrap();
    assert_eq!(stored.sold_count, 5);
    assert_eq!(stored.remaining(), 0);
}

/// Multi-unit reservations racing for the tail of the inventory: whatever
/// interleaving wins, sold never passes total.
#[tokio::test]
async fn concurrent_multi_unit_reservations_respect_the_cap() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let ticket_type_id = seed_ticket_type(&store, 10).await;
    let ledger = InventoryLedger::new(Arc::clone(&store));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger.reserve(ticket_type_id, 3, Utc::now()).await
        }));
    }
    let mut reserved_units = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            reserved_units += 3;
        }
    }

    // 3 of the 8 requests fit (9 units); the 4th would need 12.
    assert_eq!(reserved_units, 9);
    let stored = store.ticket_type(ticket_type_id).await.unwrap();
    assert_eq!(stored.sold_count, 9);
}

/// Release is the exact inverse of reserve: capacity returns and can be
/// re-reserved in full.
#[tokio::test]
async fn release_restores_capacity() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let ticket_type_id = seed_ticket_type(&store, 5).await;
    let ledger = InventoryLedger::new(Arc::clone(&store));

    ledger.reserve(ticket_type_id, 3, Utc::now()).await.unwrap();
    assert!(matches!(
        ledger.reserve(ticket_type_id, 3, Utc::now()).await,
        Err(CoreError::Oversold)
    ));

    ledger.release(ticket_type_id, 3).await.unwrap();
    assert_eq!(store.ticket_type(ticket_type_id).await.unwrap().sold_count, 0);

    // The full capacity is available again.
    ledger.reserve(ticket_type_id, 5, Utc::now()).await.unwrap();
}

/// Release clamps at zero rather than underflowing.
#[tokio::test]
async fn release_clamps_at_zero() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let ticket_type_id = seed_ticket_type(&store, 5).await;
    let ledger = InventoryLedger::new(Arc::clone(&store));

    ledger.reserve(ticket_type_id, 1, Utc::now()).await.unwrap();
    ledger.release(ticket_type_id, 4).await.unwrap();
    assert_eq!(store.ticket_type(ticket_type_id).await.unwrap().sold_count, 0);
}

/// Ten validators scan the same ticket at once: exactly one is admitted,
/// the rest see already_used, and the audit log holds all ten attempts.
#[tokio::test]
async fn simultaneous_scans_admit_exactly_once() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let signer = ReferenceSigner::new("concurrency-test-secret");
    let issuer = TicketIssuer::new(signer.clone());
    let audit = AuditLog::new(Arc::clone(&store));
    let validator = TicketValidator::new(Arc::clone(&store), signer, audit.clone());

    // Mint one ticket through an approved order.
    let event_id = EventId::new();
    let paid = Order {
        id: OrderId::new(),
        event_id,
        ticket_type_id: TicketTypeId::new(),
        buyer_id: UserId::new(),
        buyer_name: "Billie Buyer".to_string(),
        quantity: 1,
        payment_method_id: PaymentMethodId::new(),
        reservation_id: ReservationId::new(),
        status: OrderStatus::Paid,
        payment_details: None,
        proof_key: None,
        rejection_reason: None,
        verified_by: Some(UserId::new()),
        verified_at: Some(Utc::now()),
        ticket_code: Some(TicketIssuer::new_ticket_code()),
        created_at: Utc::now(),
    };
    let pending = Order {
        status: OrderStatus::PendingVerification,
        ..paid.clone()
    };
    store.insert_order(pending).await.unwrap();
    let tickets = issuer.issue(&paid, "GA", Utc::now()).unwrap();
    store
        .approve_order(paid, OrderStatus::PendingVerification, tickets.clone())
        .await
        .unwrap();
    let reference = tickets[0].reference.clone();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let validator = validator.clone();
        let reference = reference.clone();
        handles.push(tokio::spawn(async move {
            validator.validate(&reference, event_id, UserId::new()).await
        }));
    }

    let mut admitted = 0;
    let mut already_used = 0;
    for handle in handles {
        let result = handle.await.unwrap().unwrap();
        if result.valid {
            admitted += 1;
        } else {
            assert!(matches!(result.refusal, Some(Refusal::AlreadyUsed { .. })));
            already_used += 1;
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(already_used, 9);

    let attempts = audit.attempts_for_event(event_id).await.unwrap();
    assert_eq!(attempts.len(), 10);
}
