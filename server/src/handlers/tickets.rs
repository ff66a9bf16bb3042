use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::extract::CallerId;
use crate::utils::response::success;
use crate::validation::validate_ticket;

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub ticket_id: Uuid,
}

/// Visible to the ticket's buyer and to the event's organizer.
pub async fn get_ticket(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(ticket_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let not_found = || AppError::NotFound(format!("Ticket '{ticket_id}' was not found"));
    let ticket = state.store.ticket(ticket_id).await?.ok_or_else(not_found)?;

    if ticket.buyer_id != caller {
        let organizer = state
            .store
            .event_with_tiers(ticket.event_id)
            .await?
            .map(|event| event.event.organizer_id);
        if organizer != Some(caller) {
            return Err(not_found());
        }
    }

    Ok(success(ticket, "Ticket retrieved").into_response())
}

pub async fn get_transaction(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(transaction_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let receipt = state
        .store
        .receipt(transaction_id)
        .await?
        .filter(|receipt| receipt.transaction.buyer_id == caller)
        .ok_or_else(|| {
            AppError::NotFound(format!("Transaction '{transaction_id}' was not found"))
        })?;

    Ok(success(receipt, "Transaction retrieved").into_response())
}

/// Door scan. Only the event's organizer may admit tickets.
pub async fn scan_ticket(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(event_id): Path<Uuid>,
    body: Result<Json<ScanRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(request) = body?;

    let event = state
        .store
        .event_with_tiers(event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event '{event_id}' was not found")))?;
    if event.event.organizer_id != caller {
        return Err(AppError::Forbidden(
            "Only the organizer can scan tickets for this event".to_string(),
        ));
    }

    let result = validate_ticket(state.store.as_ref(), event_id, request.ticket_id).await?;
    Ok((result.status_code(), Json(result)).into_response())
}
