use std::sync::Arc;

use tracing::{error, info, warn};

use super::{CheckoutError, SessionTag};
use crate::models::Receipt;
use crate::payment::{PaymentProcessor, PaymentStatus, SessionStatus};
use crate::store::{CompletedPurchase, CompletionOutcome, TicketStore};

/// Turns paid checkout sessions into tickets and expired ones back into capacity.
pub struct PaymentConfirmation {
    store: Arc<dyn TicketStore>,
    processor: Arc<dyn PaymentProcessor>,
    currency: String,
}

impl PaymentConfirmation {
    pub fn new(
        store: Arc<dyn TicketStore>,
        processor: Arc<dyn PaymentProcessor>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            store,
            processor,
            currency: currency.into(),
        }
    }

    /// Issues tickets for a paid session. Repeat calls return the same receipt.
    pub async fn confirm(&self, session_id: &str) -> Result<Receipt, CheckoutError> {
        let session = self.processor.retrieve_checkout_session(session_id).await?;
        if session.payment_status != PaymentStatus::Paid {
            return Err(CheckoutError::PaymentNotConfirmed {
                session_id: session.id,
                status: session.payment_status.as_str().to_string(),
            });
        }

        let tag = SessionTag::from_metadata(&session.id, &session.metadata)?;
        let purchase = CompletedPurchase {
            hold_id: tag.hold_id,
            event_id: tag.event_id,
            buyer_id: tag.buyer_id,
            payment_id: session.payment_intent.unwrap_or_else(|| session.id.clone()),
            lines: tag.lines,
            amount: session.amount_total.unwrap_or_default(),
            currency: self.currency.clone(),
        };

        match self.store.complete_purchase(purchase).await? {
            CompletionOutcome::Issued(receipt) => {
                info!(
                    session_id = %session.id,
                    transaction_id = %receipt.transaction.id,
                    tickets = receipt.tickets.len(),
                    "Tickets issued"
                );
                Ok(receipt)
            }
            CompletionOutcome::AlreadyIssued(receipt) => {
                info!(
                    session_id = %session.id,
                    transaction_id = %receipt.transaction.id,
                    "Payment already confirmed"
                );
                Ok(receipt)
            }
            CompletionOutcome::HoldReleased => {
                error!(
                    session_id = %session.id,
                    hold_id = %tag.hold_id,
                    "Paid session refers to a released hold; needs manual follow-up"
                );
                Err(CheckoutError::HoldReleased(tag.hold_id))
            }
            CompletionOutcome::Mismatch(reason) => Err(CheckoutError::MalformedMetadata {
                session_id: session.id,
                reason,
            }),
        }
    }

    /// Returns the capacity of an expired session. `false` when there was nothing to release.
    pub async fn release(&self, session_id: &str) -> Result<bool, CheckoutError> {
        let session = self.processor.retrieve_checkout_session(session_id).await?;
        if session.status != SessionStatus::Expired {
            warn!(
                session_id = %session.id,
                status = ?session.status,
                "Ignoring release for a session that has not expired"
            );
            return Ok(false);
        }

        let tag = SessionTag::from_metadata(&session.id, &session.metadata)?;
        let released = self.store.release_hold(tag.hold_id).await?;
        if released {
            info!(session_id = %session.id, hold_id = %tag.hold_id, "Hold released");
        }
        Ok(released)
    }
}
