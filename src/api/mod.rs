//! HTTP API handlers, organized by domain:
//! - Orders: creation, proof submission, payment verification
//! - Tickets: gate validation (scan and manual fallback)
//! - Audit: the validation attempt log

pub mod audit;
pub mod orders;
pub mod tickets;

pub use audit::list_validation_attempts;
pub use orders::{create_order, get_order, list_order_tickets, submit_proof, verify_order};
pub use tickets::{validate_ticket, validate_ticket_manual};
