//! Hosted payment processor seam.
//!
//! The service never sees card data: it creates a hosted checkout session,
//! redirects the buyer there, and later reads the session back to learn
//! whether it was paid.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod mock;
pub mod stripe;

pub use mock::MockPaymentProcessor;
pub use stripe::StripeClient;

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment processor request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("payment processor rejected the request ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("checkout session {0} was not found")]
    SessionNotFound(String),

    #[error("payment processor is unavailable: {0}")]
    Unavailable(String),
}

/// One priced line on the hosted payment page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub product_name: String,
    pub description: String,
    pub unit_amount: i64,
    pub quantity: u32,
}

#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub customer_id: String,
    pub client_reference_id: String,
    pub success_url: String,
    pub cancel_url: String,
    pub currency: String,
    pub line_items: Vec<LineItem>,
    pub metadata: BTreeMap<String, String>,
    /// The processor closes the session at this time.
    pub expires_at: DateTime<Utc>,
}

impl LineItem {
    pub fn amount(&self) -> Option<i64> {
        self.unit_amount.checked_mul(i64::from(self.quantity))
    }
}

impl SessionRequest {
    /// `None` when the total does not fit in an `i64`.
    pub fn amount_total(&self) -> Option<i64> {
        self.line_items
            .iter()
            .try_fold(0i64, |total, item| total.checked_add(item.amount()?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::NoPaymentRequired => "no_payment_required",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Complete,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub status: SessionStatus,
    pub payment_status: PaymentStatus,
    pub payment_intent: Option<String>,
    pub customer: Option<String>,
    pub amount_total: Option<i64>,
    /// Unix timestamp.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Creates a customer record at the processor and returns its id.
    async fn create_customer(&self, email: &str) -> Result<String, PaymentError>;

    async fn create_checkout_session(
        &self,
        request: SessionRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, PaymentError>;
}
