//! Ticket issuance and signed references.
//!
//! On order approval the issuer mints one ticket per purchased unit. Each
//! ticket carries a self-contained signed reference: the claims (order,
//! event, buyer, per-unit sequence, issuance time) are URL-safe base64, and
//! an HMAC-SHA256 over them, keyed with a server-side secret, makes the
//! reference tamper-evident without any relational lookup, so gates can
//! verify offline.

use crate::error::CoreError;
use crate::types::{EventId, Order, OrderId, Ticket, TicketId, TicketStatus, UserId};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

// ============================================================================
// Reference claims
// ============================================================================

/// The fields embedded in a signed ticket reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReferenceClaims {
    /// Order the ticket belongs to.
    pub order_id: OrderId,
    /// Event the ticket admits to.
    pub event_id: EventId,
    /// Buyer the ticket was issued to.
    pub buyer_id: UserId,
    /// Per-unit sequence number within the order (1-based).
    pub sequence: u32,
    /// Issuance timestamp (second precision).
    pub issued_at: DateTime<Utc>,
}

impl ReferenceClaims {
    fn encode(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.order_id,
            self.event_id,
            self.buyer_id,
            self.sequence,
            self.issued_at.timestamp()
        )
    }

    fn decode(payload: &str) -> Result<Self, CoreError> {
        let bad = || CoreError::Signature("malformed reference payload".to_string());
        let mut parts = payload.split(':');
        let order_id = parts.next().and_then(parse_uuid).ok_or_else(bad)?;
        let event_id = parts.next().and_then(parse_uuid).ok_or_else(bad)?;
        let buyer_id = parts.next().and_then(parse_uuid).ok_or_else(bad)?;
        let sequence: u32 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(bad)?;
        let timestamp: i64 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(bad)?;
        if parts.next().is_some() {
            return Err(bad());
        }
        let issued_at = DateTime::from_timestamp(timestamp, 0).ok_or_else(bad)?;
        Ok(Self {
            order_id: OrderId::from_uuid(order_id),
            event_id: EventId::from_uuid(event_id),
            buyer_id: UserId::from_uuid(buyer_id),
            sequence,
            issued_at,
        })
    }
}

fn parse_uuid(s: &str) -> Option<Uuid> {
    Uuid::parse_str(s).ok()
}

// ============================================================================
// Reference signer
// ============================================================================

/// Signs and verifies ticket references with a server-side HMAC key.
#[derive(Clone)]
pub struct ReferenceSigner {
    key: Arc<Vec<u8>>,
}

impl ReferenceSigner {
    /// Creates a signer from the configured secret.
    #[must_use]
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: Arc::new(secret.as_ref().to_vec()),
        }
    }

    /// Produces a signed reference: `base64(claims) "." hex(hmac)`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Signature`] if the key is rejected by the MAC
    /// (cannot happen for HMAC, which accepts any key length).
    pub fn sign(&self, claims: &ReferenceClaims) -> Result<String, CoreError> {
        let payload = URL_SAFE_NO_PAD.encode(claims.encode().as_bytes());
        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        let digest = hex::encode(mac.finalize().into_bytes());
        Ok(format!("{payload}.{digest}"))
    }

    /// Verifies a reference and returns its embedded claims.
    ///
    /// Verification is constant-time on the digest. Any structural defect
    /// (missing separator, bad base64, bad hex, short digest) fails the same
    /// way a forged digest does.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Signature`] when the reference is malformed or
    /// the digest does not match.
    pub fn verify(&self, reference: &str) -> Result<ReferenceClaims, CoreError> {
        let (payload, digest) = reference
            .split_once('.')
            .ok_or_else(|| CoreError::Signature("missing signature".to_string()))?;
        let digest = hex::decode(digest)
            .map_err(|_| CoreError::Signature("malformed signature".to_string()))?;

        let mut mac = self.mac()?;
        mac.update(payload.as_bytes());
        mac.verify_slice(&digest)
            .map_err(|_| CoreError::Signature("signature mismatch".to_string()))?;

        let decoded = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| CoreError::Signature("malformed reference payload".to_string()))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| CoreError::Signature("malformed reference payload".to_string()))?;
        ReferenceClaims::decode(&decoded)
    }

    fn mac(&self) -> Result<HmacSha256, CoreError> {
        HmacSha256::new_from_slice(&self.key)
            .map_err(|_| CoreError::Signature("invalid signing key".to_string()))
    }
}

// ============================================================================
// Ticket issuer
// ============================================================================

/// Mints signed tickets for an approved order.
#[derive(Clone)]
pub struct TicketIssuer {
    signer: ReferenceSigner,
}

impl TicketIssuer {
    /// Creates an issuer over the given signer.
    #[must_use]
    pub const fn new(signer: ReferenceSigner) -> Self {
        Self { signer }
    }

    /// The signer, shared with the gate validator.
    #[must_use]
    pub const fn signer(&self) -> &ReferenceSigner {
        &self.signer
    }

    /// Generates a per-order ticket code; ticket numbers derive from it.
    #[must_use]
    pub fn new_ticket_code() -> String {
        let raw = Uuid::new_v4().simple().to_string();
        raw[..8].to_uppercase()
    }

    /// Mints `order.quantity` active tickets, one per purchased unit, each
    /// with a unique ticket number and a signed reference.
    ///
    /// The order must already carry its ticket code (set by the approval
    /// transition before issuance).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StateConflict`] when the order has no ticket
    /// code, [`CoreError::Signature`] on a signing failure.
    pub fn issue(
        &self,
        order: &Order,
        ticket_type_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Ticket>, CoreError> {
        let code = order.ticket_code.as_deref().ok_or_else(|| {
            CoreError::StateConflict(format!("order {} has no ticket code", order.id))
        })?;

        let mut tickets = Vec::with_capacity(order.quantity as usize);
        for sequence in 1..=order.quantity {
            let claims = ReferenceClaims {
                order_id: order.id,
                event_id: order.event_id,
                buyer_id: order.buyer_id,
                sequence,
                issued_at: now,
            };
            tickets.push(Ticket {
                id: TicketId::new(),
                order_id: order.id,
                event_id: order.event_id,
                ticket_type_id: order.ticket_type_id,
                holder_id: order.buyer_id,
                ticket_number: format!("{code}-{sequence}"),
                reference: self.signer.sign(&claims)?,
                holder_name: order.buyer_name.clone(),
                ticket_type_name: ticket_type_name.to_string(),
                status: TicketStatus::Active,
                is_used: false,
                used_at: None,
                validated_by: None,
                issued_at: now,
            });
        }

        metrics::counter!("issuer.tickets_issued").increment(u64::from(order.quantity));
        tracing::info!(
            order_id = %order.id,
            event_id = %order.event_id,
            quantity = order.quantity,
            "Tickets issued"
        );
        Ok(tickets)
    }
}
