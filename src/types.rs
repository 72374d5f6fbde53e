//! Domain types for the ticketing core.
//!
//! Value objects, entities, and status enums for inventory reservation,
//! order verification, and ticket validation. Status transitions are
//! expressed as explicit tables (exhaustive matches) rather than ad hoc
//! branching, so an illegal transition is unrepresentable rather than a
//! forgotten `if`.

use crate::error::CoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing `Uuid`.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner `Uuid`.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an event (owned by the event directory).
    EventId
);
uuid_id!(
    /// Unique identifier for a ticket type.
    TicketTypeId
);
uuid_id!(
    /// Unique identifier for an order.
    OrderId
);
uuid_id!(
    /// Unique identifier for an issued ticket.
    TicketId
);
uuid_id!(
    /// Unique identifier for a user (buyer, organizer, or gate validator).
    UserId
);
uuid_id!(
    /// Unique identifier for an organizer-configured payment method.
    PaymentMethodId
);
uuid_id!(
    /// Unique identifier for an inventory reservation.
    ReservationId
);
uuid_id!(
    /// Unique identifier for a validation attempt record.
    AttemptId
);

// ============================================================================
// Money (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in cents to avoid floating-point arithmetic errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Creates a `Money` value from cents.
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents.
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Multiplies a unit price by a quantity with overflow checking.
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(total) => Some(Self(total)),
            None => None,
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// User roles
// ============================================================================

/// Role of an account, as resolved by the identity provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// Runs events; verifies payments and configures payment methods.
    Organizer,
    /// Athlete account (eligible for athlete-restricted events).
    Athlete,
    /// Reporter account (eligible for press-restricted events).
    Reporter,
    /// General audience account.
    Viewer,
}

impl UserRole {
    /// Returns this role as its wire string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Organizer => "organizer",
            Self::Athlete => "athlete",
            Self::Reporter => "reporter",
            Self::Viewer => "viewer",
        }
    }
}

// ============================================================================
// Ticket types (inventory)
// ============================================================================

/// A priced category of admission for one event, with a fixed inventory cap.
///
/// `sold_count` is exclusively owned by the inventory ledger: it only moves
/// through `reserve` (increment) and `release` (clamped decrement), both
/// performed inside the store's atomic section. The invariant
/// `0 <= sold_count <= total_quantity` holds even under concurrent writers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketType {
    /// Unique ticket type identifier.
    pub id: TicketTypeId,
    /// Event this ticket type belongs to.
    pub event_id: EventId,
    /// Display name (e.g., "General Admission", "VIP").
    pub name: String,
    /// Price per unit.
    pub unit_price: Money,
    /// Inventory cap.
    pub total_quantity: u32,
    /// Units held by reservations (monotonic except for releases).
    pub sold_count: u32,
    /// Sale window start (inclusive), if configured.
    pub sale_starts_at: Option<DateTime<Utc>>,
    /// Sale window end (exclusive), if configured.
    pub sale_ends_at: Option<DateTime<Utc>>,
}

impl TicketType {
    /// Returns the number of units still available.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.total_quantity.saturating_sub(self.sold_count)
    }

    /// Checks whether the sale window (if configured) contains `now`.
    #[must_use]
    pub fn sale_open(&self, now: DateTime<Utc>) -> bool {
        if let Some(start) = self.sale_starts_at {
            if now < start {
                return false;
            }
        }
        if let Some(end) = self.sale_ends_at {
            if now >= end {
                return false;
            }
        }
        true
    }
}

/// Receipt for an atomic inventory decrement, held until approval or release.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Unique reservation identifier (stored on the order).
    pub id: ReservationId,
    /// Ticket type the units were taken from.
    pub ticket_type_id: TicketTypeId,
    /// Number of units held.
    pub quantity: u32,
}

// ============================================================================
// Payment methods
// ============================================================================

/// Organizer-configured descriptor of how buyers should pay.
///
/// Read-only from the buyer's perspective; scoped to one event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    /// Unique payment method identifier.
    pub id: PaymentMethodId,
    /// Event this method is configured for.
    pub event_id: EventId,
    /// Channel-specific details.
    pub kind: PaymentMethodKind,
}

/// Payment channel, with the sub-fields each channel actually requires.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethodKind {
    /// Direct bank transfer.
    BankTransfer {
        /// Receiving bank name.
        bank_name: String,
        /// Account holder name.
        account_name: String,
        /// Account number buyers transfer to.
        account_number: String,
    },
    /// Mobile wallet transfer.
    MobileWallet {
        /// Wallet provider name.
        provider: String,
        /// Wallet number buyers transfer to.
        wallet_number: String,
    },
    /// Cash handed over in person.
    Cash {
        /// Where/when to pay (free text shown to the buyer).
        instructions: String,
    },
}

// ============================================================================
// Orders
// ============================================================================

/// Lifecycle status of an order.
///
/// `PendingPayment -> PendingVerification -> Paid | Rejected`. `Paid` is the
/// single terminal success state; no other vocabulary is used for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created; inventory is held, buyer has not submitted proof yet.
    PendingPayment,
    /// Proof submitted; awaiting the organizer's decision.
    PendingVerification,
    /// Approved; tickets issued. Terminal.
    Paid,
    /// Rejected; inventory released. Terminal.
    Rejected,
}

impl OrderStatus {
    /// Whether this status admits no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Rejected)
    }

    /// Returns this status as its stored/wire string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::PendingVerification => "pending_verification",
            Self::Paid => "paid",
            Self::Rejected => "rejected",
        }
    }

    /// Parses a stored status string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] for an unknown status value, since that
    /// can only come from a corrupted row.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "pending_payment" => Ok(Self::PendingPayment),
            "pending_verification" => Ok(Self::PendingVerification),
            "paid" => Ok(Self::Paid),
            "rejected" => Ok(Self::Rejected),
            other => Err(CoreError::Storage(format!("unknown order status: {other}"))),
        }
    }

    /// The order transition table: `status x action -> new status`.
    ///
    /// Every pair not listed here is a [`CoreError::StateConflict`]; a failed
    /// transition has no side effect.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StateConflict`] when `action` is not permitted
    /// from this status.
    pub fn apply(self, action: OrderAction) -> Result<Self, CoreError> {
        match (self, action) {
            (Self::PendingPayment, OrderAction::SubmitProof) => Ok(Self::PendingVerification),
            (Self::PendingVerification, OrderAction::Approve) => Ok(Self::Paid),
            (Self::PendingVerification, OrderAction::Reject) => Ok(Self::Rejected),
            (status, action) => Err(CoreError::StateConflict(format!(
                "cannot {action} an order in status {}",
                status.as_str()
            ))),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions that drive the order state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderAction {
    /// Buyer attaches payment details and a proof blob.
    SubmitProof,
    /// Organizer approves the payment.
    Approve,
    /// Organizer rejects the payment.
    Reject,
}

impl fmt::Display for OrderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SubmitProof => "submit proof for",
            Self::Approve => "approve",
            Self::Reject => "reject",
        })
    }
}

/// Free-form payment details attached by the buyer with the proof upload.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// Transaction/reference id from the buyer's payment channel.
    pub transaction_id: Option<String>,
    /// When the buyer says they paid.
    pub paid_at: Option<DateTime<Utc>>,
    /// Anything else the buyer wants the organizer to see.
    pub notes: Option<String>,
}

/// One purchase attempt, tracked through payment approval.
///
/// Orders are never deleted; a rejected order is the audit trail of the
/// transaction. Mutated only by the buyer (proof submission) and the event's
/// organizer (approve/reject), always through the status transition table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier.
    pub id: OrderId,
    /// Event the tickets admit to.
    pub event_id: EventId,
    /// Ticket type purchased.
    pub ticket_type_id: TicketTypeId,
    /// Buyer (resolved identity, never a caller-supplied claim).
    pub buyer_id: UserId,
    /// Buyer display name, carried onto issued tickets.
    pub buyer_name: String,
    /// Number of units purchased (>= 1).
    pub quantity: u32,
    /// Payment method the buyer chose.
    pub payment_method_id: PaymentMethodId,
    /// Inventory reservation held for this order.
    pub reservation_id: ReservationId,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Details attached at proof submission.
    pub payment_details: Option<PaymentDetails>,
    /// Blob key of the uploaded payment proof.
    pub proof_key: Option<String>,
    /// Organizer's reason, set on rejection.
    pub rejection_reason: Option<String>,
    /// Organizer who decided the order.
    pub verified_by: Option<UserId>,
    /// When the decision was made.
    pub verified_at: Option<DateTime<Utc>>,
    /// Per-order ticket code, set on approval; ticket numbers derive from it.
    pub ticket_code: Option<String>,
    /// When the order was created.
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Tickets
// ============================================================================

/// Status of an issued admission unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Valid for entry.
    Active,
    /// Consumed at the gate. Immutable from here.
    Used,
    /// Administratively voided.
    Cancelled,
}

impl TicketStatus {
    /// Returns this status as its stored/wire string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Used => "used",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a stored status string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] for an unknown status value.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "active" => Ok(Self::Active),
            "used" => Ok(Self::Used),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(CoreError::Storage(format!("unknown ticket status: {other}"))),
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physical admission unit, minted on order approval.
///
/// Created only by the ticket issuer; mutated exactly once by the ticket
/// validator (`Active -> Used` under a compare-and-set on `is_used`), or
/// administratively to `Cancelled`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Unique ticket identifier.
    pub id: TicketId,
    /// Order this unit belongs to.
    pub order_id: OrderId,
    /// Event this ticket admits to.
    pub event_id: EventId,
    /// Ticket type purchased.
    pub ticket_type_id: TicketTypeId,
    /// Buyer the ticket was issued to.
    pub holder_id: UserId,
    /// Human-readable unique number (e.g., "4F2A9C1B-2").
    pub ticket_number: String,
    /// Signed opaque reference presented at the gate.
    pub reference: String,
    /// Holder display name shown to gate staff.
    pub holder_name: String,
    /// Ticket type display name shown to gate staff.
    pub ticket_type_name: String,
    /// Current status.
    pub status: TicketStatus,
    /// One-shot consumption flag; the compare-and-set target.
    pub is_used: bool,
    /// When the ticket was consumed.
    pub used_at: Option<DateTime<Utc>>,
    /// Gate validator who consumed it.
    pub validated_by: Option<UserId>,
    /// When the ticket was minted.
    pub issued_at: DateTime<Utc>,
}

// ============================================================================
// Validation audit records
// ============================================================================

/// Outcome of one gate-scan attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationOutcome {
    /// Ticket accepted and consumed.
    Admitted,
    /// Reference signature failed verification.
    InvalidSignature,
    /// Reference belongs to a different event.
    WrongEvent,
    /// No ticket matches the reference/id.
    NotFound,
    /// Ticket was already consumed.
    AlreadyUsed,
    /// Ticket is cancelled or otherwise not admissible.
    Invalid,
}

impl ValidationOutcome {
    /// Returns this outcome as its stored/wire string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admitted => "admitted",
            Self::InvalidSignature => "invalid_signature",
            Self::WrongEvent => "wrong_event",
            Self::NotFound => "not_found",
            Self::AlreadyUsed => "already_used",
            Self::Invalid => "invalid",
        }
    }

    /// Parses a stored outcome string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] for an unknown outcome value.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "admitted" => Ok(Self::Admitted),
            "invalid_signature" => Ok(Self::InvalidSignature),
            "wrong_event" => Ok(Self::WrongEvent),
            "not_found" => Ok(Self::NotFound),
            "already_used" => Ok(Self::AlreadyUsed),
            "invalid" => Ok(Self::Invalid),
            other => Err(CoreError::Storage(format!(
                "unknown validation outcome: {other}"
            ))),
        }
    }
}

/// How the ticket was presented at the gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMethod {
    /// Signed reference scanned from the ticket (the trusted path).
    Scan,
    /// Bare ticket id typed in by an operator (weaker trust path).
    Manual,
}

impl ValidationMethod {
    /// Returns this method as its stored/wire string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Manual => "manual",
        }
    }

    /// Parses a stored method string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] for an unknown method value.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "scan" => Ok(Self::Scan),
            "manual" => Ok(Self::Manual),
            other => Err(CoreError::Storage(format!(
                "unknown validation method: {other}"
            ))),
        }
    }
}

/// Immutable audit record of one gate-scan outcome. Never mutated or deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationAttempt {
    /// Unique attempt identifier.
    pub id: AttemptId,
    /// Ticket involved, if one was found.
    pub ticket_id: Option<TicketId>,
    /// Event the scan was performed for.
    pub event_id: EventId,
    /// Gate validator who performed the scan.
    pub validator_id: UserId,
    /// Scan outcome.
    pub outcome: ValidationOutcome,
    /// Presentation method.
    pub method: ValidationMethod,
    /// Free-text operator context.
    pub note: String,
    /// When the attempt was recorded.
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn transition_table_accepts_listed_transitions() {
        assert_eq!(
            OrderStatus::PendingPayment
                .apply(OrderAction::SubmitProof)
                .unwrap(),
            OrderStatus::PendingVerification
        );
        assert_eq!(
            OrderStatus::PendingVerification
                .apply(OrderAction::Approve)
                .unwrap(),
            OrderStatus::Paid
        );
        assert_eq!(
            OrderStatus::PendingVerification
                .apply(OrderAction::Reject)
                .unwrap(),
            OrderStatus::Rejected
        );
    }

    #[test]
    fn transition_table_rejects_everything_else() {
        let all = [
            OrderStatus::PendingPayment,
            OrderStatus::PendingVerification,
            OrderStatus::Paid,
            OrderStatus::Rejected,
        ];
        let actions = [
            OrderAction::SubmitProof,
            OrderAction::Approve,
            OrderAction::Reject,
        ];
        let listed = [
            (OrderStatus::PendingPayment, OrderAction::SubmitProof),
            (OrderStatus::PendingVerification, OrderAction::Approve),
            (OrderStatus::PendingVerification, OrderAction::Reject),
        ];
        for status in all {
            for action in actions {
                let result = status.apply(action);
                if listed.contains(&(status, action)) {
                    assert!(result.is_ok(), "{status} x {action:?} should be allowed");
                } else {
                    assert!(
                        matches!(result, Err(CoreError::StateConflict(_))),
                        "{status} x {action:?} should conflict"
                    );
                }
            }
        }
    }

    #[test]
    fn sale_window_bounds_are_inclusive_start_exclusive_end() {
        let start = Utc::now();
        let end = start + chrono::Duration::hours(2);
        let tt = TicketType {
            id: TicketTypeId::new(),
            event_id: EventId::new(),
            name: "GA".to_string(),
            unit_price: Money::from_cents(1500),
            total_quantity: 10,
            sold_count: 0,
            sale_starts_at: Some(start),
            sale_ends_at: Some(end),
        };
        assert!(tt.sale_open(start));
        assert!(tt.sale_open(start + chrono::Duration::hours(1)));
        assert!(!tt.sale_open(start - chrono::Duration::seconds(1)));
        assert!(!tt.sale_open(end));
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            OrderStatus::PendingPayment,
            OrderStatus::PendingVerification,
            OrderStatus::Paid,
            OrderStatus::Rejected,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()).unwrap(), status);
        }
        for status in [TicketStatus::Active, TicketStatus::Used, TicketStatus::Cancelled] {
            assert_eq!(TicketStatus::parse(status.as_str()).unwrap(), status);
        }
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let tt = TicketType {
            id: TicketTypeId::new(),
            event_id: EventId::new(),
            name: "GA".to_string(),
            unit_price: Money::from_cents(100),
            total_quantity: 3,
            sold_count: 3,
            sale_starts_at: None,
            sale_ends_at: None,
        };
        assert_eq!(tt.remaining(), 0);
    }
}
