use std::sync::Arc;

use crate::checkout::{CheckoutAuthorizer, CheckoutSettings, PaymentConfirmation};
use crate::config::Config;
use crate::payment::PaymentProcessor;
use crate::store::TicketStore;

/// Shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TicketStore>,
    pub authorizer: Arc<CheckoutAuthorizer>,
    pub confirmation: Arc<PaymentConfirmation>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn TicketStore>,
        processor: Arc<dyn PaymentProcessor>,
        config: &Config,
    ) -> Self {
        let authorizer = CheckoutAuthorizer::new(
            Arc::clone(&store),
            Arc::clone(&processor),
            CheckoutSettings::from_config(config),
        );
        let confirmation =
            PaymentConfirmation::new(Arc::clone(&store), processor, config.currency.clone());

        Self {
            store,
            authorizer: Arc::new(authorizer),
            confirmation: Arc::new(confirmation),
        }
    }
}
