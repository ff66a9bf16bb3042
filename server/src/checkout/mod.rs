//! Checkout: capacity authorization before payment, ticket issuance after.

use std::collections::BTreeMap;

use thiserror::Error;
use uuid::Uuid;

use crate::models::CheckoutLine;
use crate::payment::PaymentError;
use crate::store::StoreError;

pub mod authorizer;
pub mod confirmation;
pub mod sweeper;

pub use authorizer::{CheckoutAuthorizer, CheckoutRedirect, CheckoutSettings};
pub use confirmation::PaymentConfirmation;
pub use sweeper::HoldSweeper;

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("No tickets were selected")]
    EmptyCart,

    #[error("Ticket quantity for tier {tier_id} must be between 1 and {max} per order")]
    InvalidQuantity { tier_id: Uuid, max: u32 },

    #[error("Order total is above the {max} the payment processor accepts")]
    OrderTooLarge { max: i64 },

    #[error("Event {0} was not found")]
    EventNotFound(Uuid),

    #[error("Buyer {0} was not found")]
    BuyerNotFound(Uuid),

    #[error("Invalid ticket type {tier_id} for event “{event_title}”")]
    UnknownTier { tier_id: Uuid, event_title: String },

    #[error("Ticket “{tier_name}” is sold out")]
    SoldOut { tier_id: Uuid, tier_name: String },

    #[error(
        "{requested} tickets of type “{tier_name}” were requested, but only {remaining} are available"
    )]
    InsufficientCapacity {
        tier_id: Uuid,
        tier_name: String,
        requested: u32,
        remaining: u32,
    },

    #[error("Payment for checkout session {session_id} is `{status}`")]
    PaymentNotConfirmed { session_id: String, status: String },

    #[error("Checkout session {session_id} has malformed metadata: {reason}")]
    MalformedMetadata { session_id: String, reason: String },

    #[error("Checkout hold {0} was released before the payment was confirmed")]
    HoldReleased(Uuid),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

const HOLD_ID_KEY: &str = "hold_id";
const EVENT_ID_KEY: &str = "event_id";
const BUYER_ID_KEY: &str = "buyer_id";
const LINES_KEY: &str = "lines";

/// What a payment session was opened for, carried in the session's metadata
/// so the confirmation callback never has to trust client input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTag {
    pub hold_id: Uuid,
    pub event_id: Uuid,
    pub buyer_id: Uuid,
    pub lines: Vec<CheckoutLine>,
}

impl SessionTag {
    pub fn to_metadata(&self) -> Result<BTreeMap<String, String>, serde_json::Error> {
        Ok(BTreeMap::from([
            (HOLD_ID_KEY.to_string(), self.hold_id.to_string()),
            (EVENT_ID_KEY.to_string(), self.event_id.to_string()),
            (BUYER_ID_KEY.to_string(), self.buyer_id.to_string()),
            (LINES_KEY.to_string(), serde_json::to_string(&self.lines)?),
        ]))
    }

    pub fn from_metadata(
        session_id: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Result<Self, CheckoutError> {
        let malformed = |reason: String| CheckoutError::MalformedMetadata {
            session_id: session_id.to_string(),
            reason,
        };
        let field = |key: &str| {
            metadata
                .get(key)
                .ok_or_else(|| malformed(format!("missing `{key}`")))
        };
        let uuid = |key: &str| {
            field(key)?
                .parse::<Uuid>()
                .map_err(|e| malformed(format!("`{key}` is not a UUID: {e}")))
        };

        let lines: Vec<CheckoutLine> = serde_json::from_str(field(LINES_KEY)?)
            .map_err(|e| malformed(format!("`{LINES_KEY}` is not valid: {e}")))?;
        if lines.is_empty() {
            return Err(malformed(format!("`{LINES_KEY}` is empty")));
        }

        Ok(Self {
            hold_id: uuid(HOLD_ID_KEY)?,
            event_id: uuid(EVENT_ID_KEY)?,
            buyer_id: uuid(BUYER_ID_KEY)?,
            lines,
        })
    }
}
