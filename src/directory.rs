//! External collaborators consumed by the core.
//!
//! Identity resolution, event lookup, and blob storage are owned by the
//! surrounding application; the core consumes them as opaque services behind
//! these traits and trusts only what they return, never client-supplied
//! user or role fields.

use crate::error::CoreError;
use crate::types::{EventId, UserId, UserRole};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

// ============================================================================
// Identity provider
// ============================================================================

/// A resolved actor: the only identity the core ever acts on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Resolved user id.
    pub user_id: UserId,
    /// Resolved account role.
    pub role: UserRole,
    /// Display name, carried onto issued tickets.
    pub display_name: String,
}

/// Resolves a bearer credential to a user id and role.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves `bearer` to an identity.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Authorization`] for an unknown or expired
    /// credential.
    async fn resolve(&self, bearer: &str) -> Result<Identity, CoreError>;
}

/// Identity provider backed by a fixed token table.
///
/// Used by the test suite and the demo server mode; a real deployment plugs
/// in the application's session service here.
#[derive(Clone, Default)]
pub struct StaticIdentityProvider {
    tokens: Arc<RwLock<HashMap<String, Identity>>>,
}

impl StaticIdentityProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an identity and returns the bearer token that resolves to it.
    pub async fn register(&self, identity: Identity) -> String {
        let token = format!("tok-{}", Uuid::new_v4().simple());
        self.tokens.write().await.insert(token.clone(), identity);
        token
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn resolve(&self, bearer: &str) -> Result<Identity, CoreError> {
        self.tokens
            .read()
            .await
            .get(bearer)
            .cloned()
            .ok_or_else(|| CoreError::Authorization("unknown credential".to_string()))
    }
}

// ============================================================================
// Event directory
// ============================================================================

/// Read-only view of an event, used to authorize organizer actions and
/// enforce buyer eligibility.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventInfo {
    /// Event identifier.
    pub id: EventId,
    /// Event display name.
    pub name: String,
    /// The organizer account that owns the event.
    pub organizer_id: UserId,
    /// Audience restriction: only accounts of this role may buy, if set.
    pub restricted_to: Option<UserRole>,
}

/// Read-only lookup of an event's organizer and audience restriction.
#[async_trait]
pub trait EventDirectory: Send + Sync {
    /// Fetches the event owning a ticket type or order.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown event.
    async fn event(&self, id: EventId) -> Result<EventInfo, CoreError>;
}

/// Event directory backed by a fixed table.
#[derive(Clone, Default)]
pub struct StaticEventDirectory {
    events: Arc<RwLock<HashMap<EventId, EventInfo>>>,
}

impl StaticEventDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an event to the directory.
    pub async fn insert(&self, event: EventInfo) {
        self.events.write().await.insert(event.id, event);
    }
}

#[async_trait]
impl EventDirectory for StaticEventDirectory {
    async fn event(&self, id: EventId) -> Result<EventInfo, CoreError> {
        self.events
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("event", id))
    }
}

// ============================================================================
// Blob store
// ============================================================================

/// Opaque binary storage for payment-proof images.
///
/// Failures surface as the retryable [`CoreError::Storage`]. Uploads are
/// never performed while holding store locks; a successful upload followed
/// by a failed status update leaves an orphaned blob and the order
/// unchanged, and the client retries.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores a binary blob and returns its retrieval key.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] on upload failure (retryable).
    async fn put(&self, bytes: Vec<u8>) -> Result<String, CoreError>;

    /// Returns a retrievable URL for a stored blob.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown key and
    /// [`CoreError::Storage`] on I/O failure.
    async fn url(&self, key: &str) -> Result<String, CoreError>;
}

/// In-memory blob store for tests and the demo server mode.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    /// Creates an empty blob store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored blobs.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    /// Returns whether the store holds no blobs.
    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<String, CoreError> {
        let key = format!("proofs/{}", Uuid::new_v4().simple());
        self.blobs.write().await.insert(key.clone(), bytes);
        Ok(key)
    }

    async fn url(&self, key: &str) -> Result<String, CoreError> {
        if self.blobs.read().await.contains_key(key) {
            Ok(format!("memory://{key}"))
        } else {
            Err(CoreError::not_found("blob", key))
        }
    }
}

/// Blob store that fails every upload; used to exercise the retryable
/// storage-error path in tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailingBlobStore;

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn put(&self, _bytes: Vec<u8>) -> Result<String, CoreError> {
        Err(CoreError::Storage("blob upload timed out".to_string()))
    }

    async fn url(&self, _key: &str) -> Result<String, CoreError> {
        Err(CoreError::Storage("blob store unavailable".to_string()))
    }
}
