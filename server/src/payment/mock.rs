//! In-process payment processor for local development and tests.
//!
//! Sessions stay `open`/`unpaid` until [`MockPaymentProcessor::complete_payment`]
//! or [`MockPaymentProcessor::expire_session`] is called, standing in for the
//! buyer finishing or abandoning the hosted page.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    CheckoutSession, PaymentError, PaymentProcessor, PaymentStatus, SessionRequest, SessionStatus,
};

const MOCK_CHECKOUT_BASE: &str = "https://checkout.mock.local/pay";

#[derive(Default)]
pub struct MockPaymentProcessor {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
    customers_created: AtomicU64,
    fail_sessions: AtomicBool,
}

impl MockPaymentProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Makes every following session creation fail until switched back off.
    pub fn fail_session_creation(&self, fail: bool) {
        self.fail_sessions.store(fail, Ordering::SeqCst);
    }

    pub fn customers_created(&self) -> u64 {
        self.customers_created.load(Ordering::SeqCst)
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Marks the session paid, as the processor would after a successful card charge.
    pub async fn complete_payment(&self, session_id: &str) -> Result<(), PaymentError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| PaymentError::SessionNotFound(session_id.to_string()))?;

        session.status = SessionStatus::Complete;
        session.payment_status = PaymentStatus::Paid;
        session.payment_intent = Some(format!("mock_pi_{}", Uuid::new_v4().simple()));
        tracing::info!(session_id, "Mock payment completed");
        Ok(())
    }

    pub async fn expire_session(&self, session_id: &str) -> Result<(), PaymentError> {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| PaymentError::SessionNotFound(session_id.to_string()))?;

        session.status = SessionStatus::Expired;
        session.url = None;
        Ok(())
    }
}

#[async_trait]
impl PaymentProcessor for MockPaymentProcessor {
    async fn create_customer(&self, email: &str) -> Result<String, PaymentError> {
        self.customers_created.fetch_add(1, Ordering::SeqCst);
        let customer_id = format!("mock_cus_{}", Uuid::new_v4().simple());
        tracing::info!(email, customer_id = %customer_id, "Mock customer created");
        Ok(customer_id)
    }

    async fn create_checkout_session(
        &self,
        request: SessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        if self.fail_sessions.load(Ordering::SeqCst) {
            return Err(PaymentError::Unavailable(
                "mock processor configured to fail".to_string(),
            ));
        }

        let id = format!("mock_cs_{}", Uuid::new_v4().simple());
        let session = CheckoutSession {
            url: Some(format!("{MOCK_CHECKOUT_BASE}/{id}")),
            id: id.clone(),
            status: SessionStatus::Open,
            payment_status: PaymentStatus::Unpaid,
            payment_intent: None,
            customer: Some(request.customer_id.clone()),
            amount_total: request.amount_total(),
            expires_at: Some(request.expires_at.timestamp()),
            metadata: request.metadata,
        };

        self.sessions.lock().await.insert(id, session.clone());
        Ok(session)
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, PaymentError> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| PaymentError::SessionNotFound(session_id.to_string()))
    }
}
