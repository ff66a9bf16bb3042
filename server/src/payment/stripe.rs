use std::time::Duration;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{CheckoutSession, PaymentError, PaymentProcessor, SessionRequest};

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com/v1";

const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Stripe Checkout client. Requests are form encoded, responses are JSON.
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
}

#[derive(Deserialize)]
struct CustomerObject {
    id: String,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

impl StripeClient {
    pub fn new(
        secret_key: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Result<Self, PaymentError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, PaymentError> {
        let response = request
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let message = match response.json::<ApiErrorEnvelope>().await {
            Ok(envelope) => envelope.error.message,
            Err(e) => {
                debug!(error = %e, "Stripe error body could not be decoded");
                None
            }
        }
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });

        warn!(status = status.as_u16(), message = %message, "Stripe request failed");
        Err(PaymentError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

/// Flattens a session request into Stripe's bracketed form field names.
pub(crate) fn session_form(request: &SessionRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
        ("customer".to_string(), request.customer_id.clone()),
        (
            "client_reference_id".to_string(),
            request.client_reference_id.clone(),
        ),
        ("allow_promotion_codes".to_string(), "true".to_string()),
        ("payment_method_types[0]".to_string(), "card".to_string()),
        (
            "expires_at".to_string(),
            request.expires_at.timestamp().to_string(),
        ),
    ];

    for (index, item) in request.line_items.iter().enumerate() {
        let prefix = format!("line_items[{index}]");
        form.push((
            format!("{prefix}[price_data][currency]"),
            request.currency.clone(),
        ));
        form.push((
            format!("{prefix}[price_data][product_data][name]"),
            item.product_name.clone(),
        ));
        form.push((
            format!("{prefix}[price_data][product_data][description]"),
            item.description.clone(),
        ));
        form.push((
            format!("{prefix}[price_data][unit_amount]"),
            item.unit_amount.to_string(),
        ));
        form.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
    }

    for (key, value) in &request.metadata {
        form.push((format!("metadata[{key}]"), value.clone()));
    }

    form
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn create_customer(&self, email: &str) -> Result<String, PaymentError> {
        let request = self
            .http
            .post(self.url("customers"))
            .form(&[("email", email)]);
        let customer: CustomerObject = self.send(request).await?;
        Ok(customer.id)
    }

    async fn create_checkout_session(
        &self,
        request: SessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let form = session_form(&request);
        let request = self.http.post(self.url("checkout/sessions")).form(&form);
        self.send(request).await
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, PaymentError> {
        let request = self
            .http
            .get(self.url(&format!("checkout/sessions/{session_id}")));
        match self.send(request).await {
            Err(PaymentError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Err(PaymentError::SessionNotFound(session_id.to_string()))
            }
            other => other,
        }
    }
}
