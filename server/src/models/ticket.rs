use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Largest unit price the payment processor accepts, in minor units.
pub const MAX_UNIT_PRICE: i64 = 99_999_999;

/// A priced category of ticket for one event.
///
/// `price` is in currency minor units. `capacity` of `None` means unlimited.
/// `held_count` is capacity taken by checkout sessions that have not been paid
/// or released yet; `sold_count + held_count` never exceeds `capacity`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TicketTier {
    pub id: Uuid,
    pub event_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub capacity: Option<i32>,
    pub sold_count: i32,
    pub held_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Outcome of checking a requested quantity against a tier's capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityCheck {
    Available,
    SoldOut,
    Insufficient { remaining: u32 },
}

impl TicketTier {
    /// Units still purchasable, or `None` for an unlimited tier.
    pub fn available(&self) -> Option<u32> {
        self.capacity.map(|capacity| {
            let taken = i64::from(self.sold_count) + i64::from(self.held_count);
            u32::try_from(i64::from(capacity) - taken).unwrap_or(0)
        })
    }

    pub fn check_capacity(&self, quantity: u32) -> CapacityCheck {
        match self.available() {
            None => CapacityCheck::Available,
            Some(0) => CapacityCheck::SoldOut,
            Some(remaining) if quantity > remaining => CapacityCheck::Insufficient { remaining },
            Some(_) => CapacityCheck::Available,
        }
    }

    /// Whether `quantity` more units can be held without passing the limit or
    /// overflowing the counters. Unlimited tiers are bounded by `i32::MAX`.
    pub fn can_hold(&self, quantity: u32) -> bool {
        let taken = i64::from(self.sold_count) + i64::from(self.held_count) + i64::from(quantity);
        taken <= i64::from(self.capacity.unwrap_or(i32::MAX))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTier {
    pub name: String,
    pub description: Option<String>,
    pub price: i64,
    pub capacity: Option<i32>,
}

impl NewTier {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Ticket tier name must not be empty".to_string());
        }
        if self.price < 0 {
            return Err(format!("Ticket tier “{}” has a negative price", self.name));
        }
        if self.price > MAX_UNIT_PRICE {
            return Err(format!(
                "Ticket tier “{}” costs more than the maximum of {MAX_UNIT_PRICE}",
                self.name
            ));
        }
        if matches!(self.capacity, Some(capacity) if capacity < 0) {
            return Err(format!(
                "Ticket tier “{}” has a negative capacity",
                self.name
            ));
        }
        Ok(())
    }
}

/// One issued ticket. `used_at` is stamped the first time it is scanned at the door.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub event_id: Uuid,
    pub tier_id: Uuid,
    pub buyer_id: Uuid,
    pub transaction_id: Uuid,
    pub payment_id: String,
    pub used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A ticket with the tier and event it admits to, as listed for its buyer.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OwnedTicket {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub ticket: Ticket,
    pub tier_name: String,
    pub event_title: String,
    pub event_start_time: DateTime<Utc>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn tier(capacity: Option<i32>, sold_count: i32) -> TicketTier {
        let now = Utc::now();
        TicketTier {
            id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            name: "General Admission".to_string(),
            description: None,
            price: 2500,
            capacity,
            sold_count,
            held_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_last_unit_is_available() {
        let tier = tier(Some(10), 9);
        assert_eq!(tier.check_capacity(1), CapacityCheck::Available);
        assert_eq!(
            tier.check_capacity(2),
            CapacityCheck::Insufficient { remaining: 1 }
        );
    }

    #[test]
    fn test_full_tier_is_sold_out() {
        let tier = tier(Some(5), 5);
        assert_eq!(tier.check_capacity(1), CapacityCheck::SoldOut);
        assert_eq!(tier.available(), Some(0));
    }

    #[test]
    fn test_held_units_count_against_capacity() {
        let mut tier = tier(Some(4), 1);
        tier.held_count = 2;
        assert_eq!(tier.available(), Some(1));
        assert_eq!(
            tier.check_capacity(3),
            CapacityCheck::Insufficient { remaining: 1 }
        );
    }

    #[test]
    fn test_unlimited_tier_accepts_anything() {
        let tier = tier(None, 1_000_000);
        assert_eq!(tier.available(), None);
        assert_eq!(tier.check_capacity(u32::MAX), CapacityCheck::Available);
    }

    #[test]
    fn test_hold_never_overflows_counters() {
        let mut unlimited = tier(None, i32::MAX - 5);
        assert!(unlimited.can_hold(5));
        assert!(!unlimited.can_hold(6));
        unlimited.held_count = 5;
        assert!(!unlimited.can_hold(1));

        let limited = tier(Some(10), 9);
        assert!(limited.can_hold(1));
        assert!(!limited.can_hold(2));
        assert!(!limited.can_hold(u32::MAX));
    }

    #[test]
    fn test_new_tier_rejects_price_above_processor_limit() {
        let mut new_tier = NewTier {
            name: "Gold".to_string(),
            description: None,
            price: MAX_UNIT_PRICE,
            capacity: Some(10),
        };
        assert!(new_tier.validate().is_ok());
        new_tier.price = i64::MAX / 2;
        assert!(new_tier.validate().is_err());
    }

    #[test]
    fn test_new_tier_rejects_negative_capacity() {
        let tier = NewTier {
            name: "VIP".to_string(),
            description: None,
            price: 10_000,
            capacity: Some(-1),
        };
        assert!(tier.validate().is_err());
    }
}
