use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::utils::response::success;

pub mod checkout;
pub mod events;
pub mod tickets;
pub mod users;

pub use checkout::{checkout, payment_callback, session_expired};
pub use events::{add_tier, create_event, get_event, list_events};
pub use tickets::{get_ticket, get_transaction, scan_ticket};
pub use users::{my_events, my_tickets, register_user};

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "boxoffice-api",
    };

    success(payload, "Health check successful").into_response()
}
