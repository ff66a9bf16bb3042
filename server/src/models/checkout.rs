use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One requested tier and quantity, as submitted by the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub id: Uuid,
    pub quantity: u32,
}

/// The checkout payload: a JSON array of `{id, quantity}` objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckoutRequest(pub Vec<CheckoutLine>);

impl CheckoutRequest {
    pub fn lines(&self) -> &[CheckoutLine] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    Open,
    Completed,
    Released,
}

impl HoldStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HoldStatus::Open => "open",
            HoldStatus::Completed => "completed",
            HoldStatus::Released => "released",
        }
    }
}

impl fmt::Display for HoldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HoldStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "open" => Ok(HoldStatus::Open),
            "completed" => Ok(HoldStatus::Completed),
            "released" => Ok(HoldStatus::Released),
            other => Err(format!("unknown hold status `{other}`")),
        }
    }
}

/// Capacity taken out of one or more tiers while the buyer is at the payment page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutHold {
    pub id: Uuid,
    pub event_id: Uuid,
    pub buyer_id: Uuid,
    pub session_id: Option<String>,
    pub lines: Vec<CheckoutLine>,
    pub status: HoldStatus,
    /// After this the payment session can no longer be paid and the hold may be released.
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
