use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::ticket::{NewTier, TicketTier};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub organizer_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An event together with its tiers, with sold and held counts as of the read.
#[derive(Debug, Clone, Serialize)]
pub struct EventWithTiers {
    #[serde(flatten)]
    pub event: Event,
    pub tiers: Vec<TicketTier>,
}

impl EventWithTiers {
    pub fn tier(&self, tier_id: Uuid) -> Option<&TicketTier> {
        self.tiers.iter().find(|tier| tier.id == tier_id)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub location: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tiers: Vec<NewTier>,
}

impl NewEvent {
    /// Returns a user-facing reason when the event cannot be created as submitted.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("Event title must not be empty".to_string());
        }
        if self.location.trim().is_empty() {
            return Err("Event location must not be empty".to_string());
        }
        if let Some(end_time) = self.end_time {
            if end_time < self.start_time {
                return Err("Event cannot end before it starts".to_string());
            }
        }
        self.tiers.iter().try_for_each(NewTier::validate)
    }
}
