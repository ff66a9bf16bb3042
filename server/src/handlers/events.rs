use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::cart::Cart;
use crate::models::{EventWithTiers, NewEvent, NewTier};
use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::extract::CallerId;
use crate::utils::response::{created, success};

/// What the event page loads: the event and a fresh cart over its tiers.
#[derive(Serialize)]
pub struct EventPage {
    pub event: EventWithTiers,
    pub cart: Cart,
}

pub async fn list_events(State(state): State<AppState>) -> Result<Response, AppError> {
    let events = state.store.list_events().await?;
    Ok(success(events, "Events retrieved").into_response())
}

pub async fn create_event(
    State(state): State<AppState>,
    CallerId(organizer_id): CallerId,
    body: Result<Json<NewEvent>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(new_event) = body?;
    new_event.validate().map_err(AppError::ValidationError)?;

    if state.store.user(organizer_id).await?.is_none() {
        return Err(AppError::AuthError("Unknown user".to_string()));
    }

    let event = state.store.create_event(organizer_id, new_event).await?;
    info!(
        event_id = %event.event.id,
        organizer_id = %organizer_id,
        tiers = event.tiers.len(),
        "Event created"
    );
    Ok(created(event, "Event created").into_response())
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(event_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let event = state
        .store
        .event_with_tiers(event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event '{event_id}' was not found")))?;

    let cart = Cart::initialize(&event.tiers);
    Ok(success(EventPage { event, cart }, "Event retrieved").into_response())
}

pub async fn add_tier(
    State(state): State<AppState>,
    CallerId(caller): CallerId,
    Path(event_id): Path<Uuid>,
    body: Result<Json<NewTier>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(new_tier) = body?;
    new_tier.validate().map_err(AppError::ValidationError)?;

    let event = state
        .store
        .event_with_tiers(event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event '{event_id}' was not found")))?;
    if event.event.organizer_id != caller {
        return Err(AppError::Forbidden(
            "Only the organizer can add ticket tiers".to_string(),
        ));
    }

    let tier = state.store.add_tier(event_id, new_tier).await?;
    info!(event_id = %event_id, tier_id = %tier.id, "Ticket tier added");
    Ok(created(tier, "Ticket tier added").into_response())
}
