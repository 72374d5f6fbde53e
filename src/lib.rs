//! Ticket inventory reservation, payment verification, and gate validation.
//!
//! The core tracks a fixed per-ticket-type inventory through atomic
//! reserve/release operations, walks each order through a manual payment
//! verification state machine (`pending_payment -> pending_verification ->
//! paid | rejected`), mints HMAC-signed tickets on approval, and consumes
//! them exactly once at the gate, with every validation attempt recorded in
//! an append-only audit log.
//!
//! # Layout
//!
//! - [`types`]: domain entities, value objects, and status transition tables
//! - [`error`]: the [`error::CoreError`] taxonomy
//! - [`store`]: the [`store::Store`] trait with in-memory and Postgres
//!   implementations
//! - [`ledger`]: atomic inventory reserve/release
//! - [`orders`]: the order lifecycle service
//! - [`issuer`]: signed reference generation and ticket minting
//! - [`validator`]: gate-side validation with one-time consumption
//! - [`audit`]: the validation attempt log
//! - [`directory`]: identity, event, and blob-storage collaborators
//! - [`server`] / [`api`]: the Axum HTTP surface

pub mod api;
pub mod audit;
pub mod config;
pub mod directory;
pub mod error;
pub mod issuer;
pub mod ledger;
pub mod orders;
pub mod server;
pub mod store;
pub mod types;
pub mod validator;

pub use audit::AuditLog;
pub use error::CoreError;
pub use issuer::{ReferenceSigner, TicketIssuer};
pub use ledger::InventoryLedger;
pub use orders::OrderService;
pub use server::{build_router, AppState};
pub use store::{MemoryStore, PostgresStore, Store};
pub use validator::{TicketValidator, ValidationResult};
