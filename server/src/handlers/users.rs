use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::info;

use crate::models::NewUser;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::extract::CallerId;
use crate::utils::response::{created, success};

pub async fn register_user(
    State(state): State<AppState>,
    body: Result<Json<NewUser>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(new_user) = body?;
    new_user.validate().map_err(AppError::ValidationError)?;

    let email = new_user.email.trim().to_lowercase();
    let user = state
        .store
        .create_user(new_user.name.trim(), &email)
        .await?;
    info!(user_id = %user.id, "User registered");

    Ok(created(user, "User registered").into_response())
}

/// Tickets the caller bought, with their tier and event.
pub async fn my_tickets(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
) -> Result<Response, AppError> {
    let tickets = state.store.tickets_for_buyer(caller).await?;
    Ok(success(tickets, "Tickets retrieved successfully").into_response())
}

/// Events the caller organizes.
pub async fn my_events(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
) -> Result<Response, AppError> {
    let events = state.store.events_by_organizer(caller).await?;
    Ok(success(events, "Events retrieved successfully").into_response())
}
