//! End-to-end order lifecycle tests over the in-memory store.
//!
//! Walks the full flow: reserve inventory at order creation, attach a
//! payment proof, organizer approval minting signed tickets, rejection
//! releasing inventory, and the failure paths around each transition.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

use boxoffice::directory::{
    BlobStore, EventDirectory, EventInfo, FailingBlobStore, Identity, MemoryBlobStore,
};
use boxoffice::error::CoreError;
use boxoffice::issuer::{ReferenceSigner, TicketIssuer};
use boxoffice::ledger::InventoryLedger;
use boxoffice::orders::OrderService;
use boxoffice::store::{MemoryStore, Store};
use boxoffice::types::{
    EventId, Money, Order, OrderId, OrderStatus, PaymentDetails, PaymentMethod, PaymentMethodId,
    PaymentMethodKind, Ticket, TicketId, TicketStatus, TicketType, TicketTypeId, UserId,
    UserRole, ValidationAttempt,
};
use async_trait::async_trait;
use boxoffice::validator::{Refusal, TicketValidator};
use boxoffice::AuditLog;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct World {
    store: Arc<dyn Store>,
    directory: Arc<boxoffice::directory::StaticEventDirectory>,
    orders: OrderService,
    validator: TicketValidator,
    organizer: Identity,
    buyer: Identity,
}

impl World {
    async fn new() -> Self {
        Self::with_blobs(Arc::new(MemoryBlobStore::new())).await
    }

    async fn with_blobs(blobs: Arc<dyn BlobStore>) -> Self {
        Self::build(Arc::new(MemoryStore::new()), blobs).await
    }

    async fn build(store: Arc<dyn Store>, blobs: Arc<dyn BlobStore>) -> Self {
        let directory = Arc::new(boxoffice::directory::StaticEventDirectory::new());
        let signer = ReferenceSigner::new("order-flow-test-secret");
        let issuer = TicketIssuer::new(signer.clone());
        let ledger = InventoryLedger::new(Arc::clone(&store));
        let audit = AuditLog::new(Arc::clone(&store));
        let validator = TicketValidator::new(Arc::clone(&store), signer, audit);
        let orders = OrderService::new(
            Arc::clone(&store),
            ledger,
            directory.clone(),
            blobs,
            issuer,
        );
        let organizer = Identity {
            user_id: UserId::new(),
            role: UserRole::Organizer,
            display_name: "Olga Organizer".to_string(),
        };
        let buyer = Identity {
            user_id: UserId::new(),
            role: UserRole::Viewer,
            display_name: "Billie Buyer".to_string(),
        };
        Self {
            store,
            directory,
            orders,
            validator,
            organizer,
            buyer,
        }
    }

    /// Seeds an event with one ticket type and one payment method.
    async fn seed_event(
        &self,
        total_quantity: u32,
        restricted_to: Option<UserRole>,
    ) -> (EventId, TicketTypeId, PaymentMethodId) {
        let event_id = EventId::new();
        self.directory
            .insert(EventInfo {
                id: event_id,
                name: "City Marathon".to_string(),
                organizer_id: self.organizer.user_id,
                restricted_to,
            })
            .await;

        let ticket_type_id = TicketTypeId::new();
        self.store
            .insert_ticket_type(TicketType {
                id: ticket_type_id,
                event_id,
                name: "General Admission".to_string(),
                unit_price: Money::from_cents(2500),
                total_quantity,
                sold_count: 0,
                sale_starts_at: None,
                sale_ends_at: None,
            })
            .await
            .unwrap();

        let payment_method_id = PaymentMethodId::new();
        self.store
            .insert_payment_method(PaymentMethod {
                id: payment_method_id,
                event_id,
                kind: PaymentMethodKind::BankTransfer {
                    bank_name: "First National".to_string(),
                    account_name: "City Marathon LLC".to_string(),
                    account_number: "12345678".to_string(),
                },
            })
            .await
            .unwrap();

        (event_id, ticket_type_id, payment_method_id)
    }
}

fn details() -> PaymentDetails {
    PaymentDetails {
        transaction_id: Some("TXN-42".to_string()),
        paid_at: Some(Utc::now()),
        notes: None,
    }
}

/// Store wrapper that fails the next armed operation once, then delegates.
/// Used to exercise the fault paths around order transitions.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_next_update: AtomicBool,
    fail_next_reject: AtomicBool,
}

impl FlakyStore {
    fn storage_fault() -> CoreError {
        CoreError::Storage("order write timed out".to_string())
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn insert_ticket_type(&self, ticket_type: TicketType) -> Result<(), CoreError> {
        self.inner.insert_ticket_type(ticket_type).await
    }

    async fn ticket_type(&self, id: TicketTypeId) -> Result<TicketType, CoreError> {
        self.inner.ticket_type(id).await
    }

    async fn reserve(
        &self,
        id: TicketTypeId,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.inner.reserve(id, quantity, now).await
    }

    async fn release(&self, id: TicketTypeId, quantity: u32) -> Result<(), CoreError> {
        self.inner.release(id, quantity).await
    }

    async fn insert_payment_method(&self, method: PaymentMethod) -> Result<(), CoreError> {
        self.inner.insert_payment_method(method).await
    }

    async fn payment_method(&self, id: PaymentMethodId) -> Result<PaymentMethod, CoreError> {
        self.inner.payment_method(id).await
    }

    async fn insert_order(&self, order: Order) -> Result<(), CoreError> {
        self.inner.insert_order(order).await
    }

    async fn order(&self, id: OrderId) -> Result<Order, CoreError> {
        self.inner.order(id).await
    }

    async fn update_order(&self, order: Order, expected: OrderStatus) -> Result<(), CoreError> {
        if self.fail_next_update.swap(false, Ordering::SeqCst) {
            return Err(Self::storage_fault());
        }
        self.inner.update_order(order, expected).await
    }

    async fn approve_order(
        &self,
        order: Order,
        expected: OrderStatus,
        tickets: Vec<Ticket>,
    ) -> Result<(), CoreError> {
        self.inner.approve_order(order, expected, tickets).await
    }

    async fn reject_order(&self, order: Order, expected: OrderStatus) -> Result<(), CoreError> {
        if self.fail_next_reject.swap(false, Ordering::SeqCst) {
            return Err(Self::storage_fault());
        }
        self.inner.reject_order(order, expected).await
    }

    async fn ticket(&self, id: TicketId) -> Result<Option<Ticket>, CoreError> {
        self.inner.ticket(id).await
    }

    async fn ticket_by_reference(
        &self,
        event_id: EventId,
        reference: &str,
    ) -> Result<Option<Ticket>, CoreError> {
        self.inner.ticket_by_reference(event_id, reference).await
    }

    async fn tickets_for_order(&self, order_id: OrderId) -> Result<Vec<Ticket>, CoreError> {
        self.inner.tickets_for_order(order_id).await
    }

    async fn use_ticket(
        &self,
        id: TicketId,
        validator: UserId,
        now: DateTime<Utc>,
    ) -> Result<Ticket, CoreError> {
        self.inner.use_ticket(id, validator, now).await
    }

    async fn cancel_ticket(&self, id: TicketId) -> Result<(), CoreError> {
        self.inner.cancel_ticket(id).await
    }

    async fn append_attempt(&self, attempt: ValidationAttempt) -> Result<(), CoreError> {
        self.inner.append_attempt(attempt).await
    }

    async fn attempts_for_event(
        &self,
        event_id: EventId,
    ) -> Result<Vec<ValidationAttempt>, CoreError> {
        self.inner.attempts_for_event(event_id).await
    }
}

/// The complete happy path: create, submit proof, approve, then the first
/// gate scan admits and the second refuses as already used.
#[tokio::test]
async fn full_purchase_and_admission_flow() {
    let world = World::new().await;
    let (event_id, ticket_type_id, payment_method_id) = world.seed_event(5, None).await;

    // Create: inventory is held immediately.
    let order = world
        .orders
        .create_order(&world.buyer, event_id, ticket_type_id, payment_method_id, 2)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::PendingPayment);
    assert_eq!(world.store.ticket_type(ticket_type_id).await.unwrap().sold_count, 2);

    // Submit proof: moves to pending_verification.
    let order = world
        .orders
        .submit_proof(&world.buyer, order.id, details(), b"png bytes".to_vec())
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::PendingVerification);
    assert!(order.proof_key.is_some());

    // Approve: mints one signed ticket per unit, atomically with the status.
    let (order, tickets) = world.orders.approve(&world.organizer, order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::Paid);
    assert_eq!(order.verified_by, Some(world.organizer.user_id));
    assert_eq!(tickets.len(), 2);
    let code = order.ticket_code.clone().unwrap();
    assert_eq!(tickets[0].ticket_number, format!("{code}-1"));
    assert_eq!(tickets[1].ticket_number, format!("{code}-2"));
    assert!(tickets.iter().all(|t| t.status == TicketStatus::Active && !t.is_used));
    assert!(tickets.iter().all(|t| t.holder_name == "Billie Buyer"));

    // First scan admits.
    let gate = UserId::new();
    let result = world
        .validator
        .validate(&tickets[0].reference, event_id, gate)
        .await
        .unwrap();
    assert!(result.valid);
    assert_eq!(result.ticket.unwrap().ticket_number, tickets[0].ticket_number);

    // Second scan of the same ticket refuses with who/when.
    let result = world
        .validator
        .validate(&tickets[0].reference, event_id, UserId::new())
        .await
        .unwrap();
    assert!(!result.valid);
    match result.refusal.unwrap() {
        Refusal::AlreadyUsed { used_at, validated_by } => {
            assert!(used_at.is_some());
            assert_eq!(validated_by, Some(gate));
        }
        other => panic!("expected already_used, got {other:?}"),
    }

    // The sibling ticket is unaffected.
    let result = world
        .validator
        .validate(&tickets[1].reference, event_id, gate)
        .await
        .unwrap();
    assert!(result.valid);
}

/// Rejection returns the held units and stores the reason; the order row
/// survives as the audit trail.
#[tokio::test]
async fn rejection_releases_inventory_exactly_once() {
    let world = World::new().await;
    let (event_id, ticket_type_id, payment_method_id) = world.seed_event(5, None).await;

    let order = world
        .orders
        .create_order(&world.buyer, event_id, ticket_type_id, payment_method_id, 3)
        .await
        .unwrap();
    let order = world
        .orders
        .submit_proof(&world.buyer, order.id, details(), b"blurry photo".to_vec())
        .await
        .unwrap();
    assert_eq!(world.store.ticket_type(ticket_type_id).await.unwrap().sold_count, 3);

    let order = world
        .orders
        .reject(&world.organizer, order.id, "amount does not match".to_string())
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Rejected);
    assert_eq!(order.rejection_reason.as_deref(), Some("amount does not match"));
    assert_eq!(world.store.ticket_type(ticket_type_id).await.unwrap().sold_count, 0);

    // A second decision on the same order conflicts and releases nothing.
    let err = world
        .orders
        .reject(&world.organizer, order.id, "again".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::StateConflict(_)));
    assert_eq!(world.store.ticket_type(ticket_type_id).await.unwrap().sold_count, 0);

    // The order row is still readable.
    let stored = world.store.order(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Rejected);
}

/// A storage fault during rejection leaves no intermediate state: the order
/// is never rejected with its units still held, and a retried rejection
/// lands and returns the capacity.
#[tokio::test]
async fn faulted_rejection_leaves_no_intermediate_state() {
    let flaky = Arc::new(FlakyStore::default());
    let world = World::build(flaky.clone(), Arc::new(MemoryBlobStore::new())).await;
    let (event_id, ticket_type_id, payment_method_id) = world.seed_event(1, None).await;

    let order = world
        .orders
        .create_order(&world.buyer, event_id, ticket_type_id, payment_method_id, 1)
        .await
        .unwrap();
    let order = world
        .orders
        .submit_proof(&world.buyer, order.id, details(), b"proof".to_vec())
        .await
        .unwrap();

    flaky.fail_next_reject.store(true, Ordering::SeqCst);
    let err = world
        .orders
        .reject(&world.organizer, order.id, "no matching transfer".to_string())
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    // The transition did not land, so nothing was released either.
    let stored = world.store.order(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::PendingVerification);
    assert_eq!(world.store.ticket_type(ticket_type_id).await.unwrap().sold_count, 1);

    // The retry rejects and releases in one commit; the capacity is usable.
    let order = world
        .orders
        .reject(&world.organizer, order.id, "no matching transfer".to_string())
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::Rejected);
    assert_eq!(world.store.ticket_type(ticket_type_id).await.unwrap().sold_count, 0);
    world
        .orders
        .create_order(&world.buyer, event_id, ticket_type_id, payment_method_id, 1)
        .await
        .unwrap();
}

/// A rejection must carry a reason; without one nothing changes.
#[tokio::test]
async fn rejection_requires_a_reason() {
    let world = World::new().await;
    let (event_id, ticket_type_id, payment_method_id) = world.seed_event(5, None).await;

    let order = world
        .orders
        .create_order(&world.buyer, event_id, ticket_type_id, payment_method_id, 1)
        .await
        .unwrap();
    let order = world
        .orders
        .submit_proof(&world.buyer, order.id, details(), b"proof".to_vec())
        .await
        .unwrap();

    let err = world
        .orders
        .reject(&world.organizer, order.id, "   ".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let stored = world.store.order(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::PendingVerification);
    assert_eq!(world.store.ticket_type(ticket_type_id).await.unwrap().sold_count, 1);
}

/// A failed proof upload is retryable: the order stays in pending_payment
/// and an identical retry can succeed later.
#[tokio::test]
async fn failed_proof_upload_leaves_order_pending_payment() {
    let world = World::with_blobs(Arc::new(FailingBlobStore)).await;
    let (event_id, ticket_type_id, payment_method_id) = world.seed_event(5, None).await;

    let order = world
        .orders
        .create_order(&world.buyer, event_id, ticket_type_id, payment_method_id, 1)
        .await
        .unwrap();
    let err = world
        .orders
        .submit_proof(&world.buyer, order.id, details(), b"proof".to_vec())
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    let stored = world.store.order(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::PendingPayment);
    assert!(stored.proof_key.is_none());
}

/// The upload-then-update boundary is not atomic: an upload that succeeds
/// right before a store fault orphans the blob and leaves the order in
/// pending_payment, and an identical retry lands.
#[tokio::test]
async fn store_fault_after_upload_orphans_the_blob() {
    let flaky = Arc::new(FlakyStore::default());
    let blobs = Arc::new(MemoryBlobStore::new());
    let world = World::build(flaky.clone(), blobs.clone()).await;
    let (event_id, ticket_type_id, payment_method_id) = world.seed_event(5, None).await;

    let order = world
        .orders
        .create_order(&world.buyer, event_id, ticket_type_id, payment_method_id, 1)
        .await
        .unwrap();

    flaky.fail_next_update.store(true, Ordering::SeqCst);
    let err = world
        .orders
        .submit_proof(&world.buyer, order.id, details(), b"proof".to_vec())
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    // The blob landed before the fault and is now orphaned; the order is
    // untouched and still accepts the retry.
    assert_eq!(blobs.len().await, 1);
    let stored = world.store.order(order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::PendingPayment);
    assert!(stored.proof_key.is_none());

    let order = world
        .orders
        .submit_proof(&world.buyer, order.id, details(), b"proof".to_vec())
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::PendingVerification);
    assert!(order.proof_key.is_some());
    assert_eq!(blobs.len().await, 2);
}

/// Guard rails around who may do what.
#[tokio::test]
async fn transition_guards_enforce_actors() {
    let world = World::new().await;
    let (event_id, ticket_type_id, payment_method_id) = world.seed_event(5, None).await;

    let order = world
        .orders
        .create_order(&world.buyer, event_id, ticket_type_id, payment_method_id, 1)
        .await
        .unwrap();

    // Approving before proof submission conflicts.
    let err = world.orders.approve(&world.organizer, order.id).await.unwrap_err();
    assert!(matches!(err, CoreError::StateConflict(_)));

    // A stranger cannot submit proof.
    let stranger = Identity {
        user_id: UserId::new(),
        role: UserRole::Viewer,
        display_name: "Stranger".to_string(),
    };
    let err = world
        .orders
        .submit_proof(&stranger, order.id, details(), b"proof".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Authorization(_)));

    // The buyer cannot decide their own order.
    let order = world
        .orders
        .submit_proof(&world.buyer, order.id, details(), b"proof".to_vec())
        .await
        .unwrap();
    let err = world.orders.approve(&world.buyer, order.id).await.unwrap_err();
    assert!(matches!(err, CoreError::Authorization(_)));

    // Once decided, the other decision conflicts.
    world.orders.approve(&world.organizer, order.id).await.unwrap();
    let err = world
        .orders
        .reject(&world.organizer, order.id, "too late".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::StateConflict(_)));
}

/// Buyer eligibility: organizers never buy, and restricted events only
/// admit the matching role.
#[tokio::test]
async fn buyer_eligibility_checks() {
    let world = World::new().await;
    let (event_id, ticket_type_id, payment_method_id) =
        world.seed_event(5, Some(UserRole::Athlete)).await;

    // The organizer cannot buy tickets to their own event.
    let err = world
        .orders
        .create_order(&world.organizer, event_id, ticket_type_id, payment_method_id, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Authorization(_)));

    // A viewer cannot buy into an athlete-restricted event.
    let err = world
        .orders
        .create_order(&world.buyer, event_id, ticket_type_id, payment_method_id, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Authorization(_)));

    // An athlete can.
    let athlete = Identity {
        user_id: UserId::new(),
        role: UserRole::Athlete,
        display_name: "Asha Athlete".to_string(),
    };
    let order = world
        .orders
        .create_order(&athlete, event_id, ticket_type_id, payment_method_id, 1)
        .await
        .unwrap();
    assert_eq!(order.status, OrderStatus::PendingPayment);

    // No eligibility failure held any inventory.
    assert_eq!(world.store.ticket_type(ticket_type_id).await.unwrap().sold_count, 1);
}

/// Cross-event references are rejected at creation.
#[tokio::test]
async fn ticket_type_and_payment_method_must_belong_to_the_event() {
    let world = World::new().await;
    let (event_id, ticket_type_id, payment_method_id) = world.seed_event(5, None).await;
    let (other_event, other_type, other_method) = world.seed_event(5, None).await;

    let err = world
        .orders
        .create_order(&world.buyer, event_id, other_type, payment_method_id, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    let err = world
        .orders
        .create_order(&world.buyer, event_id, ticket_type_id, other_method, 1)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));

    // Matching pairs on the other event still work.
    world
        .orders
        .create_order(&world.buyer, other_event, other_type, other_method, 1)
        .await
        .unwrap();
}

/// A zero quantity is refused before anything is reserved.
#[tokio::test]
async fn zero_quantity_is_invalid() {
    let world = World::new().await;
    let (event_id, ticket_type_id, payment_method_id) = world.seed_event(5, None).await;

    let err = world
        .orders
        .create_order(&world.buyer, event_id, ticket_type_id, payment_method_id, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(_)));
    assert_eq!(world.store.ticket_type(ticket_type_id).await.unwrap().sold_count, 0);
}

/// Requesting more than the remaining inventory never creates an order.
#[tokio::test]
async fn oversell_refuses_and_creates_nothing() {
    let world = World::new().await;
    let (event_id, ticket_type_id, payment_method_id) = world.seed_event(2, None).await;

    let err = world
        .orders
        .create_order(&world.buyer, event_id, ticket_type_id, payment_method_id, 3)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Oversold));
    assert_eq!(world.store.ticket_type(ticket_type_id).await.unwrap().sold_count, 0);
}
