//! Persistence seam.
//!
//! Every mutation of a tier's sold or held count goes through
//! [`TicketStore::hold_capacity`], [`TicketStore::complete_purchase`] or
//! [`TicketStore::release_hold`], and each of those is atomic across all the
//! tiers it touches.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    CheckoutHold, CheckoutLine, Event, EventWithTiers, NewEvent, NewTier, OwnedTicket, Receipt,
    Ticket, TicketTier, User,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryTicketStore;
pub use postgres::PgTicketStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("email {0} is already registered")]
    DuplicateEmail(String),

    #[error("{entity} {id} was not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}

/// Result of trying to take capacity for a checkout.
#[derive(Debug, Clone)]
pub enum HoldOutcome {
    Held(CheckoutHold),
    /// The tier does not belong to the event.
    UnknownTier(Uuid),
    /// The tier no longer has room for `quantity`; `tier` carries the counts that blocked it.
    Rejected { tier: TicketTier, quantity: u32 },
}

/// A paid checkout session, ready to be turned into tickets.
#[derive(Debug, Clone)]
pub struct CompletedPurchase {
    pub hold_id: Uuid,
    pub event_id: Uuid,
    pub buyer_id: Uuid,
    pub payment_id: String,
    pub lines: Vec<CheckoutLine>,
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub enum CompletionOutcome {
    Issued(Receipt),
    /// The payment was already turned into tickets by an earlier callback.
    AlreadyIssued(Receipt),
    HoldReleased,
    /// The purchase does not describe the hold it names.
    Mismatch(String),
}

#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Admitted(Ticket),
    NotFound,
    WrongEvent(Ticket),
    AlreadyUsed(Ticket),
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn create_user(&self, name: &str, email: &str) -> Result<User, StoreError>;

    async fn user(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    /// Stores the processor customer id unless one is already set; returns the user as stored.
    async fn set_payment_customer(
        &self,
        user_id: Uuid,
        customer_id: &str,
    ) -> Result<User, StoreError>;

    async fn create_event(
        &self,
        organizer_id: Uuid,
        event: NewEvent,
    ) -> Result<EventWithTiers, StoreError>;

    async fn list_events(&self) -> Result<Vec<Event>, StoreError>;

    async fn events_by_organizer(&self, organizer_id: Uuid) -> Result<Vec<Event>, StoreError>;

    async fn event_with_tiers(&self, event_id: Uuid)
        -> Result<Option<EventWithTiers>, StoreError>;

    async fn add_tier(&self, event_id: Uuid, tier: NewTier) -> Result<TicketTier, StoreError>;

    /// Takes `lines` out of the event's tiers and records an open hold, or changes nothing.
    async fn hold_capacity(
        &self,
        event_id: Uuid,
        buyer_id: Uuid,
        lines: &[CheckoutLine],
        expires_at: DateTime<Utc>,
    ) -> Result<HoldOutcome, StoreError>;

    async fn attach_session(&self, hold_id: Uuid, session_id: &str) -> Result<(), StoreError>;

    async fn hold(&self, hold_id: Uuid) -> Result<Option<CheckoutHold>, StoreError>;

    /// Returns held capacity to its tiers. `false` when the hold was not open.
    async fn release_hold(&self, hold_id: Uuid) -> Result<bool, StoreError>;

    /// Releases every open hold that expired before `cutoff`; returns the released hold ids.
    async fn release_expired_holds(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError>;

    /// Issues one ticket per unit and moves the hold's units from held to sold.
    async fn complete_purchase(
        &self,
        purchase: CompletedPurchase,
    ) -> Result<CompletionOutcome, StoreError>;

    async fn receipt(&self, transaction_id: Uuid) -> Result<Option<Receipt>, StoreError>;

    async fn ticket(&self, ticket_id: Uuid) -> Result<Option<Ticket>, StoreError>;

    /// Every ticket the buyer owns, soonest event first.
    async fn tickets_for_buyer(&self, buyer_id: Uuid) -> Result<Vec<OwnedTicket>, StoreError>;

    /// Stamps `used_at` if the ticket belongs to `event_id` and was never used.
    async fn admit_ticket(
        &self,
        event_id: Uuid,
        ticket_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<ScanOutcome, StoreError>;
}
