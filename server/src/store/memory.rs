//! Single-lock in-memory store for tests and local runs without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    CompletedPurchase, CompletionOutcome, HoldOutcome, ScanOutcome, StoreError, TicketStore,
};
use crate::models::{
    CheckoutHold, CheckoutLine, Event, EventWithTiers, HoldStatus, NewEvent, NewTier,
    OwnedTicket, Receipt, Ticket, TicketTier, TransactionGroup, User,
};

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    events: HashMap<Uuid, Event>,
    tiers: Vec<TicketTier>,
    holds: HashMap<Uuid, CheckoutHold>,
    transactions: Vec<TransactionGroup>,
    tickets: Vec<Ticket>,
}

impl State {
    fn tier_mut(&mut self, tier_id: Uuid) -> Option<&mut TicketTier> {
        self.tiers.iter_mut().find(|tier| tier.id == tier_id)
    }

    fn receipt(&self, transaction: &TransactionGroup) -> Receipt {
        Receipt {
            transaction: transaction.clone(),
            tickets: self
                .tickets
                .iter()
                .filter(|ticket| ticket.transaction_id == transaction.id)
                .cloned()
                .collect(),
        }
    }

    fn shift_held(&mut self, lines: &[CheckoutLine], to_sold: bool) -> Result<(), StoreError> {
        let now = Utc::now();
        for line in lines {
            let quantity = quantity(line)?;
            let tier = self.tier_mut(line.id).ok_or(StoreError::NotFound {
                entity: "ticket tier",
                id: line.id,
            })?;
            let out_of_range = || {
                StoreError::Corrupt(format!(
                    "moving {} units out of tier {} leaves its counts out of range",
                    line.quantity, line.id
                ))
            };
            let held = tier
                .held_count
                .checked_sub(quantity)
                .filter(|held| *held >= 0)
                .ok_or_else(out_of_range)?;
            let sold = if to_sold {
                tier.sold_count
                    .checked_add(quantity)
                    .ok_or_else(out_of_range)?
            } else {
                tier.sold_count
            };
            tier.held_count = held;
            tier.sold_count = sold;
            tier.updated_at = now;
        }
        Ok(())
    }

    fn release(&mut self, hold_id: Uuid) -> Result<bool, StoreError> {
        let Some(hold) = self.holds.get(&hold_id).cloned() else {
            return Err(StoreError::NotFound {
                entity: "checkout hold",
                id: hold_id,
            });
        };
        if hold.status != HoldStatus::Open {
            return Ok(false);
        }

        self.shift_held(&hold.lines, false)?;
        if let Some(hold) = self.holds.get_mut(&hold_id) {
            hold.status = HoldStatus::Released;
        }
        Ok(true)
    }
}

fn quantity(line: &CheckoutLine) -> Result<i32, StoreError> {
    i32::try_from(line.quantity)
        .map_err(|_| StoreError::Corrupt(format!("quantity {} too large", line.quantity)))
}

#[derive(Default)]
pub struct MemoryTicketStore {
    state: Mutex<State>,
}

impl MemoryTicketStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn tier_from(event_id: Uuid, tier: NewTier, now: DateTime<Utc>) -> TicketTier {
    TicketTier {
        id: Uuid::new_v4(),
        event_id,
        name: tier.name,
        description: tier.description,
        price: tier.price,
        capacity: tier.capacity,
        sold_count: 0,
        held_count: 0,
        created_at: now,
        updated_at: now,
    }
}

#[async_trait]
impl TicketStore for MemoryTicketStore {
    async fn create_user(&self, name: &str, email: &str) -> Result<User, StoreError> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|user| user.email == email) {
            return Err(StoreError::DuplicateEmail(email.to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            payment_customer_id: None,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn set_payment_customer(
        &self,
        user_id: Uuid,
        customer_id: &str,
    ) -> Result<User, StoreError> {
        let mut state = self.state.lock().await;
        let user = state.users.get_mut(&user_id).ok_or(StoreError::NotFound {
            entity: "user",
            id: user_id,
        })?;
        if user.payment_customer_id.is_none() {
            user.payment_customer_id = Some(customer_id.to_string());
            user.updated_at = Utc::now();
        }
        Ok(user.clone())
    }

    async fn create_event(
        &self,
        organizer_id: Uuid,
        event: NewEvent,
    ) -> Result<EventWithTiers, StoreError> {
        let now = Utc::now();
        let stored = Event {
            id: Uuid::new_v4(),
            organizer_id,
            title: event.title,
            description: event.description,
            location: event.location,
            start_time: event.start_time,
            end_time: event.end_time,
            created_at: now,
            updated_at: now,
        };
        let tiers: Vec<TicketTier> = event
            .tiers
            .into_iter()
            .map(|tier| tier_from(stored.id, tier, now))
            .collect();

        let mut state = self.state.lock().await;
        state.events.insert(stored.id, stored.clone());
        state.tiers.extend(tiers.iter().cloned());

        Ok(EventWithTiers {
            event: stored,
            tiers,
        })
    }

    async fn list_events(&self) -> Result<Vec<Event>, StoreError> {
        let mut events: Vec<Event> = self.state.lock().await.events.values().cloned().collect();
        events.sort_by_key(|event| event.start_time);
        Ok(events)
    }

    async fn events_by_organizer(&self, organizer_id: Uuid) -> Result<Vec<Event>, StoreError> {
        let mut events: Vec<Event> = self
            .state
            .lock()
            .await
            .events
            .values()
            .filter(|event| event.organizer_id == organizer_id)
            .cloned()
            .collect();
        events.sort_by_key(|event| event.start_time);
        Ok(events)
    }

    async fn event_with_tiers(
        &self,
        event_id: Uuid,
    ) -> Result<Option<EventWithTiers>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.events.get(&event_id).map(|event| EventWithTiers {
            event: event.clone(),
            tiers: state
                .tiers
                .iter()
                .filter(|tier| tier.event_id == event_id)
                .cloned()
                .collect(),
        }))
    }

    async fn add_tier(&self, event_id: Uuid, tier: NewTier) -> Result<TicketTier, StoreError> {
        let mut state = self.state.lock().await;
        if !state.events.contains_key(&event_id) {
            return Err(StoreError::NotFound {
                entity: "event",
                id: event_id,
            });
        }
        let tier = tier_from(event_id, tier, Utc::now());
        state.tiers.push(tier.clone());
        Ok(tier)
    }

    async fn hold_capacity(
        &self,
        event_id: Uuid,
        buyer_id: Uuid,
        lines: &[CheckoutLine],
        expires_at: DateTime<Utc>,
    ) -> Result<HoldOutcome, StoreError> {
        let mut state = self.state.lock().await;

        // Check every line before touching any count so a rejection changes nothing.
        for line in lines {
            let Some(tier) = state
                .tiers
                .iter()
                .find(|tier| tier.id == line.id && tier.event_id == event_id)
            else {
                return Ok(HoldOutcome::UnknownTier(line.id));
            };
            if !tier.can_hold(line.quantity) {
                return Ok(HoldOutcome::Rejected {
                    tier: tier.clone(),
                    quantity: line.quantity,
                });
            }
        }

        let now = Utc::now();
        for line in lines {
            let quantity = quantity(line)?;
            if let Some(tier) = state.tier_mut(line.id) {
                tier.held_count = tier.held_count.checked_add(quantity).ok_or_else(|| {
                    StoreError::Corrupt(format!("held count of tier {} overflowed", line.id))
                })?;
                tier.updated_at = now;
            }
        }

        let hold = CheckoutHold {
            id: Uuid::new_v4(),
            event_id,
            buyer_id,
            session_id: None,
            lines: lines.to_vec(),
            status: HoldStatus::Open,
            expires_at,
            created_at: now,
        };
        state.holds.insert(hold.id, hold.clone());
        Ok(HoldOutcome::Held(hold))
    }

    async fn attach_session(&self, hold_id: Uuid, session_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let hold = state.holds.get_mut(&hold_id).ok_or(StoreError::NotFound {
            entity: "checkout hold",
            id: hold_id,
        })?;
        hold.session_id = Some(session_id.to_string());
        Ok(())
    }

    async fn hold(&self, hold_id: Uuid) -> Result<Option<CheckoutHold>, StoreError> {
        Ok(self.state.lock().await.holds.get(&hold_id).cloned())
    }

    async fn release_hold(&self, hold_id: Uuid) -> Result<bool, StoreError> {
        self.state.lock().await.release(hold_id)
    }

    async fn release_expired_holds(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let mut state = self.state.lock().await;
        let expired: Vec<Uuid> = state
            .holds
            .values()
            .filter(|hold| hold.status == HoldStatus::Open && hold.expires_at < cutoff)
            .map(|hold| hold.id)
            .collect();

        let mut released = Vec::with_capacity(expired.len());
        for hold_id in expired {
            if state.release(hold_id)? {
                released.push(hold_id);
            }
        }
        Ok(released)
    }

    async fn complete_purchase(
        &self,
        purchase: CompletedPurchase,
    ) -> Result<CompletionOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let Some(hold) = state.holds.get(&purchase.hold_id).cloned() else {
            return Err(StoreError::NotFound {
                entity: "checkout hold",
                id: purchase.hold_id,
            });
        };

        if let Some(existing) = state
            .transactions
            .iter()
            .find(|transaction| transaction.payment_id == purchase.payment_id)
        {
            return Ok(CompletionOutcome::AlreadyIssued(state.receipt(existing)));
        }

        match hold.status {
            HoldStatus::Released => return Ok(CompletionOutcome::HoldReleased),
            HoldStatus::Completed => {
                return Ok(CompletionOutcome::Mismatch(format!(
                    "hold {} was completed by another payment",
                    hold.id
                )))
            }
            HoldStatus::Open => {}
        }
        if hold.event_id != purchase.event_id
            || hold.buyer_id != purchase.buyer_id
            || hold.lines != purchase.lines
        {
            return Ok(CompletionOutcome::Mismatch(format!(
                "purchase does not match hold {}",
                hold.id
            )));
        }

        state.shift_held(&hold.lines, true)?;

        let now = Utc::now();
        let transaction = TransactionGroup {
            id: Uuid::new_v4(),
            event_id: hold.event_id,
            buyer_id: hold.buyer_id,
            hold_id: hold.id,
            payment_id: purchase.payment_id,
            amount: purchase.amount,
            currency: purchase.currency,
            created_at: now,
        };
        for line in &hold.lines {
            for _ in 0..line.quantity {
                state.tickets.push(Ticket {
                    id: Uuid::new_v4(),
                    event_id: hold.event_id,
                    tier_id: line.id,
                    buyer_id: hold.buyer_id,
                    transaction_id: transaction.id,
                    payment_id: transaction.payment_id.clone(),
                    used_at: None,
                    created_at: now,
                });
            }
        }
        if let Some(hold) = state.holds.get_mut(&purchase.hold_id) {
            hold.status = HoldStatus::Completed;
        }
        state.transactions.push(transaction.clone());

        Ok(CompletionOutcome::Issued(state.receipt(&transaction)))
    }

    async fn receipt(&self, transaction_id: Uuid) -> Result<Option<Receipt>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .transactions
            .iter()
            .find(|transaction| transaction.id == transaction_id)
            .map(|transaction| state.receipt(transaction)))
    }

    async fn ticket(&self, ticket_id: Uuid) -> Result<Option<Ticket>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .tickets
            .iter()
            .find(|ticket| ticket.id == ticket_id)
            .cloned())
    }

    async fn tickets_for_buyer(&self, buyer_id: Uuid) -> Result<Vec<OwnedTicket>, StoreError> {
        let state = self.state.lock().await;
        let mut owned: Vec<OwnedTicket> = state
            .tickets
            .iter()
            .filter(|ticket| ticket.buyer_id == buyer_id)
            .filter_map(|ticket| {
                let event = state.events.get(&ticket.event_id)?;
                let tier = state.tiers.iter().find(|tier| tier.id == ticket.tier_id)?;
                Some(OwnedTicket {
                    ticket: ticket.clone(),
                    tier_name: tier.name.clone(),
                    event_title: event.title.clone(),
                    event_start_time: event.start_time,
                })
            })
            .collect();
        owned.sort_by_key(|owned| (owned.event_start_time, owned.ticket.created_at));
        Ok(owned)
    }

    async fn admit_ticket(
        &self,
        event_id: Uuid,
        ticket_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<ScanOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let Some(ticket) = state.tickets.iter_mut().find(|ticket| ticket.id == ticket_id) else {
            return Ok(ScanOutcome::NotFound);
        };

        if ticket.event_id != event_id {
            return Ok(ScanOutcome::WrongEvent(ticket.clone()));
        }
        if ticket.used_at.is_some() {
            return Ok(ScanOutcome::AlreadyUsed(ticket.clone()));
        }
        ticket.used_at = Some(at);
        Ok(ScanOutcome::Admitted(ticket.clone()))
    }
}
