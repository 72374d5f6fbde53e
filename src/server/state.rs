//! Shared application state for Axum handlers.

use crate::audit::AuditLog;
use crate::directory::{BlobStore, EventDirectory, IdentityProvider};
use crate::issuer::TicketIssuer;
use crate::ledger::InventoryLedger;
use crate::orders::OrderService;
use crate::store::Store;
use crate::validator::TicketValidator;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Everything in here is cheaply cloneable (`Arc`s and thin service handles
/// over them), so Axum can clone the state per request.
#[derive(Clone)]
pub struct AppState {
    /// Resolves bearer credentials to identities.
    pub identity: Arc<dyn IdentityProvider>,
    /// Order lifecycle service.
    pub orders: OrderService,
    /// Gate-side ticket validator.
    pub validator: TicketValidator,
    /// Validation audit trail.
    pub audit: AuditLog,
    /// Event directory, used for organizer checks on read endpoints.
    pub directory: Arc<dyn EventDirectory>,
}

impl AppState {
    /// Wires the full service graph over a store and its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        identity: Arc<dyn IdentityProvider>,
        directory: Arc<dyn EventDirectory>,
        blobs: Arc<dyn BlobStore>,
        issuer: TicketIssuer,
    ) -> Self {
        let ledger = InventoryLedger::new(Arc::clone(&store));
        let audit = AuditLog::new(Arc::clone(&store));
        let validator = TicketValidator::new(
            Arc::clone(&store),
            issuer.signer().clone(),
            audit.clone(),
        );
        let orders = OrderService::new(
            store,
            ledger,
            Arc::clone(&directory),
            blobs,
            issuer,
        );
        Self {
            identity,
            orders,
            validator,
            audit,
            directory,
        }
    }
}
