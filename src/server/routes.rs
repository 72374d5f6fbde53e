//! Router configuration.

use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::api::{audit, orders, tickets};
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Builds the Axum router over the application state.
///
/// Health checks are unauthenticated; everything under `/api` resolves the
/// caller from its bearer credential.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Order lifecycle
        .route("/orders", post(orders::create_order))
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/proof", post(orders::submit_proof))
        .route("/orders/:id/verify", post(orders::verify_order))
        .route("/orders/:id/tickets", get(orders::list_order_tickets))
        // Gate validation
        .route("/tickets/validate", post(tickets::validate_ticket))
        .route(
            "/tickets/:id/validate-manual",
            post(tickets::validate_ticket_manual),
        )
        // Audit trail
        .route(
            "/events/:id/validation-attempts",
            get(audit::list_validation_attempts),
        );

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
