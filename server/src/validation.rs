//! Door-scan ticket validation.
//!
//! A scan both checks and consumes the ticket: the first successful scan
//! stamps `used_at`, every later scan of the same ticket is refused.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::models::Ticket;
use crate::store::{ScanOutcome, StoreError, TicketStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanRejection {
    NotFound,
    WrongEvent,
    AlreadyUsed,
}

impl ScanRejection {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ScanRejection::NotFound => StatusCode::NOT_FOUND,
            ScanRejection::WrongEvent => StatusCode::BAD_REQUEST,
            ScanRejection::AlreadyUsed => StatusCode::CONFLICT,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<ScanRejection>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<Ticket>,
}

impl ScanResult {
    fn admitted(ticket: Ticket) -> Self {
        Self {
            valid: true,
            reason: None,
            message: "Ticket is valid".to_string(),
            ticket: Some(ticket),
        }
    }

    fn rejected(reason: ScanRejection, message: String) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            message,
            ticket: None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.reason
            .map_or(StatusCode::OK, |reason| reason.status_code())
    }
}

fn used_message(used_at: Option<DateTime<Utc>>) -> String {
    match used_at {
        Some(at) => format!("Ticket already used at {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => "Ticket already used".to_string(),
    }
}

pub async fn validate_ticket(
    store: &dyn TicketStore,
    event_id: Uuid,
    ticket_id: Uuid,
) -> Result<ScanResult, StoreError> {
    let result = match store.admit_ticket(event_id, ticket_id, Utc::now()).await? {
        ScanOutcome::Admitted(ticket) => {
            info!(event_id = %event_id, ticket_id = %ticket_id, "Ticket admitted");
            ScanResult::admitted(ticket)
        }
        ScanOutcome::NotFound => {
            ScanResult::rejected(ScanRejection::NotFound, "Invalid ticket ID".to_string())
        }
        ScanOutcome::WrongEvent(_) => ScanResult::rejected(
            ScanRejection::WrongEvent,
            "Ticket does not belong to this event".to_string(),
        ),
        ScanOutcome::AlreadyUsed(ticket) => {
            ScanResult::rejected(ScanRejection::AlreadyUsed, used_message(ticket.used_at))
        }
    };

    if let Some(reason) = result.reason {
        info!(event_id = %event_id, ticket_id = %ticket_id, reason = ?reason, "Ticket refused");
    }
    Ok(result)
}
