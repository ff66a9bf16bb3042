use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{
    add_tier, checkout, create_event, get_event, get_ticket, get_transaction, health_check,
    list_events, my_events, my_tickets, payment_callback, register_user, scan_ticket,
    session_expired,
};
use crate::state::AppState;

pub fn create_routes(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/users", post(register_user))
        .route("/users/me/tickets", get(my_tickets))
        .route("/users/me/events", get(my_events))
        .route("/events", get(list_events).post(create_event))
        .route("/events/:id", get(get_event))
        .route("/events/:id/tiers", post(add_tier))
        .route("/events/:id/checkout", post(checkout))
        .route("/events/:id/scan", post(scan_ticket))
        .route("/checkout/callback/:session_id", get(payment_callback))
        .route("/checkout/expired/:session_id", post(session_expired))
        .route("/tickets/:id", get(get_ticket))
        .route("/transactions/:id", get(get_transaction))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(config))
        .layer(create_cors_layer(&config.cors_allowed_origins))
}
