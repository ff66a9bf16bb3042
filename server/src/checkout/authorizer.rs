use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{CheckoutError, SessionTag};
use crate::config::Config;
use crate::models::{
    CapacityCheck, CheckoutLine, CheckoutRequest, EventWithTiers, TicketTier, MAX_UNIT_PRICE,
};
use crate::payment::{LineItem, PaymentError, PaymentProcessor, SessionRequest};
use crate::store::{HoldOutcome, TicketStore};

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Public base URL the processor redirects buyers back to.
    pub website_url: String,
    pub currency: String,
    /// Lifetime of a capacity hold and of the payment session opened for it.
    pub hold_ttl: Duration,
    /// Most tickets a single checkout may ask for, across all tiers.
    pub max_tickets_per_order: u32,
}

impl CheckoutSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            website_url: config.website_url.clone(),
            currency: config.currency.clone(),
            hold_ttl: Duration::minutes(i64::from(config.hold_ttl_minutes)),
            max_tickets_per_order: config.max_tickets_per_order,
        }
    }

    fn success_url(&self) -> String {
        format!(
            "{}/checkout/callback/{{CHECKOUT_SESSION_ID}}",
            self.website_url
        )
    }

    fn cancel_url(&self, event_id: Uuid) -> String {
        format!("{}/events/{}", self.website_url, event_id)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRedirect {
    pub hold_id: Uuid,
    pub session_id: String,
    pub url: String,
}

/// Decides whether a checkout may proceed and opens the payment session.
///
/// The cart's capacity figures are a page-load snapshot; this is where the
/// limit is enforced. Capacity is taken with one atomic store call before the
/// payment session exists, so two buyers racing for the last unit cannot both
/// reach the payment page.
pub struct CheckoutAuthorizer {
    store: Arc<dyn TicketStore>,
    processor: Arc<dyn PaymentProcessor>,
    settings: CheckoutSettings,
}

impl CheckoutAuthorizer {
    pub fn new(
        store: Arc<dyn TicketStore>,
        processor: Arc<dyn PaymentProcessor>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            store,
            processor,
            settings,
        }
    }

    pub async fn authorize(
        &self,
        event_id: Uuid,
        buyer_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<CheckoutRedirect, CheckoutError> {
        let lines = normalize_lines(request.lines(), self.settings.max_tickets_per_order)?;
        let event = self
            .store
            .event_with_tiers(event_id)
            .await?
            .ok_or(CheckoutError::EventNotFound(event_id))?;

        let line_items = price_lines(&event, &lines)?;
        let customer_id = self.payment_customer(buyer_id).await?;

        let hold = match self
            .store
            .hold_capacity(event_id, buyer_id, &lines, Utc::now() + self.settings.hold_ttl)
            .await?
        {
            HoldOutcome::Held(hold) => hold,
            HoldOutcome::UnknownTier(tier_id) => {
                return Err(CheckoutError::UnknownTier {
                    tier_id,
                    event_title: event.event.title,
                })
            }
            HoldOutcome::Rejected { tier, quantity } => {
                warn!(
                    event_id = %event_id,
                    tier_id = %tier.id,
                    quantity,
                    "Capacity taken by a concurrent checkout"
                );
                return Err(capacity_error(&tier, quantity));
            }
        };

        let tag = SessionTag {
            hold_id: hold.id,
            event_id,
            buyer_id,
            lines,
        };
        let (session_id, url) = match self
            .open_session(&tag, customer_id, line_items, hold.expires_at)
            .await
        {
            Ok(opened) => opened,
            Err(err) => {
                // No payment page exists for this hold, so give the capacity back.
                if let Err(release_err) = self.store.release_hold(hold.id).await {
                    error!(
                        hold_id = %hold.id,
                        error = %release_err,
                        "Failed to release hold after payment session error"
                    );
                }
                return Err(err);
            }
        };

        // The session already exists and its metadata names the hold, so the
        // callback and the sweeper both still find it without the stored id.
        if let Err(err) = self.store.attach_session(hold.id, &session_id).await {
            error!(
                hold_id = %hold.id,
                session_id = %session_id,
                error = %err,
                "Failed to record payment session on hold"
            );
        }
        info!(
            event_id = %event_id,
            buyer_id = %buyer_id,
            hold_id = %hold.id,
            session_id = %session_id,
            "Checkout authorized"
        );

        Ok(CheckoutRedirect {
            hold_id: hold.id,
            session_id,
            url,
        })
    }

    /// Returns the buyer's processor customer id, creating and storing one on first use.
    async fn payment_customer(&self, buyer_id: Uuid) -> Result<String, CheckoutError> {
        let buyer = self
            .store
            .user(buyer_id)
            .await?
            .ok_or(CheckoutError::BuyerNotFound(buyer_id))?;
        if let Some(customer_id) = buyer.payment_customer_id {
            return Ok(customer_id);
        }

        let created = self.processor.create_customer(&buyer.email).await?;
        let stored = self.store.set_payment_customer(buyer_id, &created).await?;
        info!(buyer_id = %buyer_id, "Payment customer created");
        Ok(stored.payment_customer_id.unwrap_or(created))
    }

    /// Opens the hosted payment session; returns its id and redirect url.
    async fn open_session(
        &self,
        tag: &SessionTag,
        customer_id: String,
        line_items: Vec<LineItem>,
        expires_at: chrono::DateTime<Utc>,
    ) -> Result<(String, String), CheckoutError> {
        let metadata = tag
            .to_metadata()
            .map_err(|e| PaymentError::Unavailable(format!("cannot encode metadata: {e}")))?;

        let request = SessionRequest {
            customer_id,
            client_reference_id: tag.buyer_id.to_string(),
            success_url: self.settings.success_url(),
            cancel_url: self.settings.cancel_url(tag.event_id),
            currency: self.settings.currency.clone(),
            line_items,
            metadata,
            expires_at,
        };

        let session = self.processor.create_checkout_session(request).await?;
        match session.url {
            Some(url) => Ok((session.id, url)),
            None => Err(
                PaymentError::Unavailable(format!("session {} has no url", session.id)).into(),
            ),
        }
    }
}

/// Rejects empty carts, zero quantities and orders over `max_per_order`
/// tickets, and merges repeated tiers.
///
/// The result is ordered by tier id.
pub fn normalize_lines(
    lines: &[CheckoutLine],
    max_per_order: u32,
) -> Result<Vec<CheckoutLine>, CheckoutError> {
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let mut merged: BTreeMap<Uuid, u32> = BTreeMap::new();
    let mut order_total: u64 = 0;
    for line in lines {
        let invalid = CheckoutError::InvalidQuantity {
            tier_id: line.id,
            max: max_per_order,
        };
        if line.quantity == 0 {
            return Err(invalid);
        }
        order_total += u64::from(line.quantity);
        if order_total > u64::from(max_per_order) {
            return Err(invalid);
        }
        // Bounded by `order_total`, which is at most `max_per_order`.
        *merged.entry(line.id).or_insert(0) += line.quantity;
    }

    Ok(merged
        .into_iter()
        .map(|(id, quantity)| CheckoutLine { id, quantity })
        .collect())
}

pub fn check_line(tier: &TicketTier, quantity: u32) -> Result<(), CheckoutError> {
    match tier.check_capacity(quantity) {
        CapacityCheck::Available => Ok(()),
        _ => Err(capacity_error(tier, quantity)),
    }
}

fn capacity_error(tier: &TicketTier, quantity: u32) -> CheckoutError {
    match tier.check_capacity(quantity) {
        CapacityCheck::Insufficient { remaining } => CheckoutError::InsufficientCapacity {
            tier_id: tier.id,
            tier_name: tier.name.clone(),
            requested: quantity,
            remaining,
        },
        // A refusal from the store with counts that now look fine still means
        // the units were gone at the time of the hold.
        CapacityCheck::SoldOut | CapacityCheck::Available => CheckoutError::SoldOut {
            tier_id: tier.id,
            tier_name: tier.name.clone(),
        },
    }
}

/// Validates every line against the event's current counts and prices it.
fn price_lines(
    event: &EventWithTiers,
    lines: &[CheckoutLine],
) -> Result<Vec<LineItem>, CheckoutError> {
    let items = lines
        .iter()
        .map(|line| {
            let tier = event
                .tier(line.id)
                .ok_or_else(|| CheckoutError::UnknownTier {
                    tier_id: line.id,
                    event_title: event.event.title.clone(),
                })?;
            check_line(tier, line.quantity)?;

            Ok(LineItem {
                product_name: event.event.title.clone(),
                description: tier.name.clone(),
                unit_amount: tier.price,
                quantity: line.quantity,
            })
        })
        .collect::<Result<Vec<_>, CheckoutError>>()?;

    let too_large = CheckoutError::OrderTooLarge {
        max: MAX_UNIT_PRICE,
    };
    if items.iter().any(|item| item.unit_amount > MAX_UNIT_PRICE) {
        return Err(too_large);
    }
    items
        .iter()
        .try_fold(0i64, |total, item| total.checked_add(item.amount()?))
        .ok_or(too_large)?;
    Ok(items)
}
