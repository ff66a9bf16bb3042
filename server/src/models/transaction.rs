use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::ticket::Ticket;

/// Groups the tickets issued for one confirmed payment.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TransactionGroup {
    pub id: Uuid,
    pub event_id: Uuid,
    pub buyer_id: Uuid,
    pub hold_id: Uuid,
    pub payment_id: String,
    pub amount: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub transaction: TransactionGroup,
    pub tickets: Vec<Ticket>,
}
