use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    CompletedPurchase, CompletionOutcome, HoldOutcome, ScanOutcome, StoreError, TicketStore,
};
use crate::models::{
    CheckoutHold, CheckoutLine, Event, EventWithTiers, HoldStatus, NewEvent, NewTier, OwnedTicket,
    Receipt, Ticket, TicketTier, TransactionGroup, User,
};

const USER_COLUMNS: &str = "id, name, email, payment_customer_id, created_at, updated_at";
const EVENT_COLUMNS: &str =
    "id, organizer_id, title, description, location, start_time, end_time, created_at, updated_at";
const TIER_COLUMNS: &str = "id, event_id, name, description, price, capacity, sold_count, \
     held_count, created_at, updated_at";
const HOLD_COLUMNS: &str =
    "id, event_id, buyer_id, session_id, lines, status, expires_at, created_at";
const TRANSACTION_COLUMNS: &str =
    "id, event_id, buyer_id, hold_id, payment_id, amount, currency, created_at";
const TICKET_COLUMNS: &str =
    "id, event_id, tier_id, buyer_id, transaction_id, payment_id, used_at, created_at";

#[derive(FromRow)]
struct HoldRow {
    id: Uuid,
    event_id: Uuid,
    buyer_id: Uuid,
    session_id: Option<String>,
    lines: Json<Vec<CheckoutLine>>,
    status: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<HoldRow> for CheckoutHold {
    type Error = StoreError;

    fn try_from(row: HoldRow) -> Result<Self, Self::Error> {
        Ok(CheckoutHold {
            id: row.id,
            event_id: row.event_id,
            buyer_id: row.buyer_id,
            session_id: row.session_id,
            lines: row.lines.0,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }
}

/// PostgreSQL-backed store.
///
/// Capacity is taken with a conditional `UPDATE` per tier, so concurrent
/// holds on the same tier serialize on its row lock and re-check the limit
/// against the committed counts.
#[derive(Clone)]
pub struct PgTicketStore {
    pool: PgPool,
}

impl PgTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!("Successfully connected to database");
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!().run(&self.pool).await?;
        info!("Migrations run successfully");
        Ok(())
    }
}

fn quantity_param(line: &CheckoutLine) -> Result<i32, StoreError> {
    i32::try_from(line.quantity)
        .map_err(|_| StoreError::Corrupt(format!("quantity {} too large", line.quantity)))
}

/// Lines in tier id order, so multi-tier transactions lock rows in a consistent order.
fn lock_order(lines: &[CheckoutLine]) -> Vec<CheckoutLine> {
    let mut ordered = lines.to_vec();
    ordered.sort_by_key(|line| line.id);
    ordered
}

async fn tickets_for(
    conn: &mut PgConnection,
    transaction_id: Uuid,
) -> Result<Vec<Ticket>, StoreError> {
    let tickets = sqlx::query_as::<_, Ticket>(&format!(
        "SELECT {TICKET_COLUMNS} FROM tickets WHERE transaction_id = $1 ORDER BY tier_id, id"
    ))
    .bind(transaction_id)
    .fetch_all(conn)
    .await?;
    Ok(tickets)
}

async fn insert_tier(
    conn: &mut PgConnection,
    event_id: Uuid,
    tier: NewTier,
) -> Result<TicketTier, StoreError> {
    let tier = sqlx::query_as::<_, TicketTier>(&format!(
        "INSERT INTO ticket_tiers (id, event_id, name, description, price, capacity) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {TIER_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(event_id)
    .bind(tier.name)
    .bind(tier.description)
    .bind(tier.price)
    .bind(tier.capacity)
    .fetch_one(conn)
    .await?;
    Ok(tier)
}

#[async_trait]
impl TicketStore for PgTicketStore {
    async fn create_user(&self, name: &str, email: &str) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, name, email) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| match err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::DuplicateEmail(email.to_string())
            }
            err => StoreError::Database(err),
        })?;
        Ok(user)
    }

    async fn user(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let user =
            sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user)
    }

    async fn set_payment_customer(
        &self,
        user_id: Uuid,
        customer_id: &str,
    ) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE users \
             SET payment_customer_id = COALESCE(payment_customer_id, $2), updated_at = now() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(user_id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "user",
            id: user_id,
        })
    }

    async fn create_event(
        &self,
        organizer_id: Uuid,
        event: NewEvent,
    ) -> Result<EventWithTiers, StoreError> {
        let mut tx = self.pool.begin().await?;

        let stored = sqlx::query_as::<_, Event>(&format!(
            "INSERT INTO events (id, organizer_id, title, description, location, start_time, end_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {EVENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(organizer_id)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(event.start_time)
        .bind(event.end_time)
        .fetch_one(&mut *tx)
        .await?;

        let mut tiers = Vec::with_capacity(event.tiers.len());
        for tier in event.tiers {
            tiers.push(insert_tier(&mut tx, stored.id, tier).await?);
        }

        tx.commit().await?;
        Ok(EventWithTiers {
            event: stored,
            tiers,
        })
    }

    async fn list_events(&self) -> Result<Vec<Event>, StoreError> {
        let events = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events ORDER BY start_time"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn events_by_organizer(&self, organizer_id: Uuid) -> Result<Vec<Event>, StoreError> {
        let events = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE organizer_id = $1 ORDER BY start_time"
        ))
        .bind(organizer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    async fn event_with_tiers(
        &self,
        event_id: Uuid,
    ) -> Result<Option<EventWithTiers>, StoreError> {
        let Some(event) = sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"
        ))
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?
        else {
            return Ok(None);
        };

        let tiers = sqlx::query_as::<_, TicketTier>(&format!(
            "SELECT {TIER_COLUMNS} FROM ticket_tiers WHERE event_id = $1 ORDER BY created_at, id"
        ))
        .bind(event_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(EventWithTiers { event, tiers }))
    }

    async fn add_tier(&self, event_id: Uuid, tier: NewTier) -> Result<TicketTier, StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_tier(&mut conn, event_id, tier).await
    }

    async fn hold_capacity(
        &self,
        event_id: Uuid,
        buyer_id: Uuid,
        lines: &[CheckoutLine],
        expires_at: DateTime<Utc>,
    ) -> Result<HoldOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        for line in lock_order(lines) {
            let quantity = quantity_param(&line)?;
            let taken = sqlx::query(
                "UPDATE ticket_tiers \
                 SET held_count = held_count + $1, updated_at = now() \
                 WHERE id = $2 AND event_id = $3 \
                   AND sold_count::bigint + held_count + $1 <= COALESCE(capacity, 2147483647)",
            )
            .bind(quantity)
            .bind(line.id)
            .bind(event_id)
            .execute(&mut *tx)
            .await?;

            if taken.rows_affected() == 0 {
                let tier = sqlx::query_as::<_, TicketTier>(&format!(
                    "SELECT {TIER_COLUMNS} FROM ticket_tiers WHERE id = $1 AND event_id = $2"
                ))
                .bind(line.id)
                .bind(event_id)
                .fetch_optional(&mut *tx)
                .await?;
                tx.rollback().await?;

                debug!(tier_id = %line.id, quantity = line.quantity, "Capacity hold refused");
                return Ok(match tier {
                    None => HoldOutcome::UnknownTier(line.id),
                    Some(tier) => HoldOutcome::Rejected {
                        tier,
                        quantity: line.quantity,
                    },
                });
            }
        }

        let row = sqlx::query_as::<_, HoldRow>(&format!(
            "INSERT INTO checkout_holds (id, event_id, buyer_id, lines, status, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {HOLD_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(event_id)
        .bind(buyer_id)
        .bind(Json(lines.to_vec()))
        .bind(HoldStatus::Open.as_str())
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(HoldOutcome::Held(row.try_into()?))
    }

    async fn attach_session(&self, hold_id: Uuid, session_id: &str) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE checkout_holds SET session_id = $2, updated_at = now() WHERE id = $1",
        )
        .bind(hold_id)
        .bind(session_id)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "checkout hold",
                id: hold_id,
            });
        }
        Ok(())
    }

    async fn hold(&self, hold_id: Uuid) -> Result<Option<CheckoutHold>, StoreError> {
        sqlx::query_as::<_, HoldRow>(&format!(
            "SELECT {HOLD_COLUMNS} FROM checkout_holds WHERE id = $1"
        ))
        .bind(hold_id)
        .fetch_optional(&self.pool)
        .await?
        .map(CheckoutHold::try_from)
        .transpose()
    }

    async fn release_hold(&self, hold_id: Uuid) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let hold: CheckoutHold = sqlx::query_as::<_, HoldRow>(&format!(
            "SELECT {HOLD_COLUMNS} FROM checkout_holds WHERE id = $1 FOR UPDATE"
        ))
        .bind(hold_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "checkout hold",
            id: hold_id,
        })?
        .try_into()?;

        if hold.status != HoldStatus::Open {
            return Ok(false);
        }

        for line in lock_order(&hold.lines) {
            sqlx::query(
                "UPDATE ticket_tiers \
                 SET held_count = held_count - $1, updated_at = now() \
                 WHERE id = $2",
            )
            .bind(quantity_param(&line)?)
            .bind(line.id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE checkout_holds SET status = $2, updated_at = now() WHERE id = $1")
            .bind(hold_id)
            .bind(HoldStatus::Released.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn release_expired_holds(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError> {
        let expired: Vec<Uuid> = sqlx::query_scalar(
            "SELECT id FROM checkout_holds \
             WHERE status = $1 AND expires_at < $2 ORDER BY expires_at",
        )
        .bind(HoldStatus::Open.as_str())
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        // Each release re-checks the status under its own row lock, so a
        // confirmation that lands in between wins.
        let mut released = Vec::with_capacity(expired.len());
        for hold_id in expired {
            if self.release_hold(hold_id).await? {
                released.push(hold_id);
            }
        }
        Ok(released)
    }

    async fn complete_purchase(
        &self,
        purchase: CompletedPurchase,
    ) -> Result<CompletionOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Locking the hold first serializes duplicate callbacks for the same session.
        let hold: CheckoutHold = sqlx::query_as::<_, HoldRow>(&format!(
            "SELECT {HOLD_COLUMNS} FROM checkout_holds WHERE id = $1 FOR UPDATE"
        ))
        .bind(purchase.hold_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound {
            entity: "checkout hold",
            id: purchase.hold_id,
        })?
        .try_into()?;

        let existing = sqlx::query_as::<_, TransactionGroup>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE payment_id = $1"
        ))
        .bind(&purchase.payment_id)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(transaction) = existing {
            let tickets = tickets_for(&mut tx, transaction.id).await?;
            return Ok(CompletionOutcome::AlreadyIssued(Receipt {
                transaction,
                tickets,
            }));
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

        for line in lock_order(&hold.lines) {
            let moved = sqlx::query(
                "UPDATE ticket_tiers \
                 SET held_count = held_count - $1, sold_count = sold_count + $1, updated_at = now() \
                 WHERE id = $2 AND held_count >= $1",
            )
            .bind(quantity_param(&line)?)
            .bind(line.id)
            .execute(&mut *tx)
            .await?;
            if moved.rows_affected() == 0 {
                return Err(StoreError::Corrupt(format!(
                    "tier {} holds fewer than {} units for hold {}",
                    line.id, line.quantity, hold.id
                )));
            }
        }

        let transaction = sqlx::query_as::<_, TransactionGroup>(&format!(
            "INSERT INTO transactions (id, event_id, buyer_id, hold_id, payment_id, amount, currency) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {TRANSACTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(hold.event_id)
        .bind(hold.buyer_id)
        .bind(hold.id)
        .bind(&purchase.payment_id)
        .bind(purchase.amount)
        .bind(&purchase.currency)
        .fetch_one(&mut *tx)
        .await?;

        for line in &hold.lines {
            sqlx::query(
                "INSERT INTO tickets (id, event_id, tier_id, buyer_id, transaction_id, payment_id) \
                 SELECT gen_random_uuid(), $1, $2, $3, $4, $5 FROM generate_series(1, $6)",
            )
            .bind(hold.event_id)
            .bind(line.id)
            .bind(hold.buyer_id)
            .bind(transaction.id)
            .bind(&transaction.payment_id)
            .bind(quantity_param(line)?)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE checkout_holds SET status = $2, updated_at = now() WHERE id = $1")
            .bind(hold.id)
            .bind(HoldStatus::Completed.as_str())
            .execute(&mut *tx)
            .await?;

        let tickets = tickets_for(&mut tx, transaction.id).await?;
        tx.commit().await?;

        Ok(CompletionOutcome::Issued(Receipt {
            transaction,
            tickets,
        }))
    }

    async fn receipt(&self, transaction_id: Uuid) -> Result<Option<Receipt>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let Some(transaction) = sqlx::query_as::<_, TransactionGroup>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(transaction_id)
        .fetch_optional(&mut *conn)
        .await?
        else {
            return Ok(None);
        };

        let tickets = tickets_for(&mut conn, transaction.id).await?;
        Ok(Some(Receipt {
            transaction,
            tickets,
        }))
    }

    async fn ticket(&self, ticket_id: Uuid) -> Result<Option<Ticket>, StoreError> {
        let ticket = sqlx::query_as::<_, Ticket>(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"
        ))
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ticket)
    }

    async fn tickets_for_buyer(&self, buyer_id: Uuid) -> Result<Vec<OwnedTicket>, StoreError> {
        let owned = sqlx::query_as::<_, OwnedTicket>(
            "SELECT t.id, t.event_id, t.tier_id, t.buyer_id, t.transaction_id, t.payment_id, \
                    t.used_at, t.created_at, \
                    tt.name AS tier_name, e.title AS event_title, e.start_time AS event_start_time \
             FROM tickets t \
             JOIN ticket_tiers tt ON tt.id = t.tier_id \
             JOIN events e ON e.id = t.event_id \
             WHERE t.buyer_id = $1 \
             ORDER BY e.start_time, t.created_at, t.id",
        )
        .bind(buyer_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(owned)
    }

    async fn admit_ticket(
        &self,
        event_id: Uuid,
        ticket_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<ScanOutcome, StoreError> {
        let admitted = sqlx::query_as::<_, Ticket>(&format!(
            "UPDATE tickets SET used_at = $3 \
             WHERE id = $1 AND event_id = $2 AND used_at IS NULL \
             RETURNING {TICKET_COLUMNS}"
        ))
        .bind(ticket_id)
        .bind(event_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(ticket) = admitted {
            return Ok(ScanOutcome::Admitted(ticket));
        }

        Ok(match self.ticket(ticket_id).await? {
            None => ScanOutcome::NotFound,
            Some(ticket) if ticket.event_id != event_id => ScanOutcome::WrongEvent(ticket),
            Some(ticket) => ScanOutcome::AlreadyUsed(ticket),
        })
    }
}
