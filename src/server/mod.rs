//! Axum HTTP server.
//!
//! Application state, bearer-credential extraction, error mapping, health
//! checks, and router configuration.

pub mod auth;
pub mod error;
pub mod health;
pub mod routes;
pub mod state;

pub use auth::Caller;
pub use error::ApiError;
pub use routes::build_router;
pub use state::AppState;
