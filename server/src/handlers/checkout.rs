use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use uuid::Uuid;

use crate::models::CheckoutRequest;
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::extract::CallerId;
use crate::utils::response::empty_success;

/// Authorizes the cart and sends the buyer to the hosted payment page.
pub async fn checkout(
    State(state): State<AppState>,
    CallerId(buyer_id): CallerId,
    Path(event_id): Path<Uuid>,
    body: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Redirect, AppError> {
    let Json(request) = body?;
    let redirect = state
        .authorizer
        .authorize(event_id, buyer_id, request)
        .await?;
    Ok(Redirect::to(&redirect.url))
}

/// Where the processor returns the buyer after paying.
pub async fn payment_callback(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Redirect, AppError> {
    let receipt = state.confirmation.confirm(&session_id).await?;
    Ok(Redirect::to(&format!(
        "/transactions/{}",
        receipt.transaction.id
    )))
}

pub async fn session_expired(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, AppError> {
    let message = if state.confirmation.release(&session_id).await? {
        "Checkout hold released"
    } else {
        "Nothing to release"
    };
    Ok(empty_success(message).into_response())
}
