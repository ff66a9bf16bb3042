//! In-memory cart for one visit to an event page.
//!
//! The remaining-capacity figure on each line is a snapshot taken when the cart
//! was built. It drives the "add" button and nothing else: the checkout
//! authorizer re-reads live counts and is the only place capacity is enforced.

use serde::Serialize;
use uuid::Uuid;

use crate::models::{CheckoutLine, CheckoutRequest, TicketTier};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub id: Uuid,
    pub name: String,
    pub price: i64,
    /// Units left when the cart was built, `None` when the tier is unlimited.
    pub remaining: Option<u32>,
    pub quantity: u32,
}

impl CartLine {
    pub fn is_available(&self) -> bool {
        self.remaining.map_or(true, |remaining| remaining > 0)
    }

    pub fn can_increment(&self) -> bool {
        self.remaining
            .map_or(true, |remaining| self.quantity < remaining)
    }

    pub fn subtotal(&self) -> i64 {
        self.price.saturating_mul(i64::from(self.quantity))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Cart {
    lines: Vec<CartLine>,
    quantity: u32,
    total: i64,
}

impl Cart {
    pub fn initialize(tiers: &[TicketTier]) -> Self {
        let lines = tiers
            .iter()
            .map(|tier| CartLine {
                id: tier.id,
                name: tier.name.clone(),
                price: tier.price,
                remaining: tier.available(),
                quantity: 0,
            })
            .collect();

        Self {
            lines,
            quantity: 0,
            total: 0,
        }
    }

    /// Adds one unit of a tier. Returns `false` if the tier is not in the cart
    /// or the cart's counters would overflow.
    ///
    /// Overflow past the snapshot is not blocked here; callers that want the
    /// advisory limit check [`Cart::can_increment`] first.
    pub fn increment(&mut self, tier_id: Uuid) -> bool {
        let (Some(quantity), Some(total)) = (self.quantity.checked_add(1), self.total_after(tier_id))
        else {
            return false;
        };
        let Some(line) = self.line_mut(tier_id) else {
            return false;
        };
        let Some(line_quantity) = line.quantity.checked_add(1) else {
            return false;
        };
        line.quantity = line_quantity;

        self.quantity = quantity;
        self.total = total;
        true
    }

    fn total_after(&self, tier_id: Uuid) -> Option<i64> {
        self.total.checked_add(self.line(tier_id)?.price)
    }

    /// Removes one unit of a tier. Returns `false` if nothing was removed.
    pub fn decrement(&mut self, tier_id: Uuid) -> bool {
        let Some(line) = self.line_mut(tier_id) else {
            return false;
        };
        if line.quantity == 0 {
            return false;
        }
        line.quantity -= 1;
        let price = line.price;

        self.quantity -= 1;
        self.total -= price;
        true
    }

    pub fn can_increment(&self, tier_id: Uuid) -> bool {
        self.line(tier_id).is_some_and(CartLine::can_increment)
    }

    /// The checkout payload: every line with a positive quantity, reduced to `{id, quantity}`.
    pub fn snapshot_non_zero(&self) -> CheckoutRequest {
        CheckoutRequest(
            self.lines
                .iter()
                .filter(|line| line.quantity > 0)
                .map(|line| CheckoutLine {
                    id: line.id,
                    quantity: line.quantity,
                })
                .collect(),
        )
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn line(&self, tier_id: Uuid) -> Option<&CartLine> {
        self.lines.iter().find(|line| line.id == tier_id)
    }

    pub fn total_quantity(&self) -> u32 {
        self.quantity
    }

    pub fn total_price(&self) -> i64 {
        self.total
    }

    fn line_mut(&mut self, tier_id: Uuid) -> Option<&mut CartLine> {
        self.lines.iter_mut().find(|line| line.id == tier_id)
    }
}
