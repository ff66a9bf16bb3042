use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};

use crate::checkout::CheckoutError;
use crate::payment::PaymentError;
use crate::store::StoreError;
use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::ValidationError(rejection.body_text())
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Checkout(e) => checkout_status(e),
            AppError::Store(e) => store_status(e),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Checkout(e) => checkout_code(e),
            AppError::Store(e) => store_code(e),
        }
    }

    /// Message returned to the client. Server-side failures never leak their cause.
    pub fn public_message(&self) -> String {
        if self.status_code().is_server_error() {
            return match self {
                AppError::Checkout(CheckoutError::Payment(_)) => {
                    "The payment processor could not be reached, please try again".to_string()
                }
                AppError::Checkout(CheckoutError::MalformedMetadata { .. }) => {
                    "The payment could not be matched to a checkout, please contact support"
                        .to_string()
                }
                _ => "Something went wrong, please try again".to_string(),
            };
        }

        match self {
            AppError::ValidationError(msg)
            | AppError::AuthError(msg)
            | AppError::Forbidden(msg)
            | AppError::NotFound(msg) => msg.clone(),
            other => other.to_string(),
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::Checkout(CheckoutError::InsufficientCapacity {
                tier_id,
                requested,
                remaining,
                ..
            }) => Some(json!({
                "tier_id": tier_id,
                "requested": requested,
                "remaining": remaining,
            })),
            AppError::Checkout(CheckoutError::InvalidQuantity { tier_id, max }) => {
                Some(json!({ "tier_id": tier_id, "max": max }))
            }
            AppError::Checkout(
                CheckoutError::SoldOut { tier_id, .. } | CheckoutError::UnknownTier { tier_id, .. },
            ) => Some(json!({ "tier_id": tier_id })),
            AppError::Checkout(CheckoutError::OrderTooLarge { max }) => {
                Some(json!({ "max_unit_amount": max }))
            }
            _ => None,
        }
    }

    fn log(&self) {
        if self.status_code().is_server_error() {
            error!(error = %self, code = self.code(), "Request failed");
        } else {
            warn!(error = %self, code = self.code(), "Request rejected");
        }
    }
}

fn checkout_status(error: &CheckoutError) -> StatusCode {
    match error {
        CheckoutError::EmptyCart
        | CheckoutError::InvalidQuantity { .. }
        | CheckoutError::OrderTooLarge { .. }
        | CheckoutError::UnknownTier { .. }
        | CheckoutError::PaymentNotConfirmed { .. } => StatusCode::BAD_REQUEST,
        CheckoutError::EventNotFound(_) | CheckoutError::BuyerNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        CheckoutError::SoldOut { .. }
        | CheckoutError::InsufficientCapacity { .. }
        | CheckoutError::HoldReleased(_) => StatusCode::CONFLICT,
        CheckoutError::Payment(PaymentError::SessionNotFound(_)) => StatusCode::NOT_FOUND,
        CheckoutError::Payment(_) | CheckoutError::MalformedMetadata { .. } => {
            StatusCode::BAD_GATEWAY
        }
        CheckoutError::Store(e) => store_status(e),
    }
}

fn checkout_code(error: &CheckoutError) -> &'static str {
    match error {
        CheckoutError::EmptyCart => "EMPTY_CART",
        CheckoutError::InvalidQuantity { .. } => "INVALID_QUANTITY",
        CheckoutError::OrderTooLarge { .. } => "ORDER_TOO_LARGE",
        CheckoutError::EventNotFound(_) => "EVENT_NOT_FOUND",
        CheckoutError::BuyerNotFound(_) => "BUYER_NOT_FOUND",
        CheckoutError::UnknownTier { .. } => "UNKNOWN_TIER",
        CheckoutError::SoldOut { .. } => "SOLD_OUT",
        CheckoutError::InsufficientCapacity { .. } => "INSUFFICIENT_CAPACITY",
        CheckoutError::PaymentNotConfirmed { .. } => "PAYMENT_NOT_CONFIRMED",
        CheckoutError::HoldReleased(_) => "HOLD_RELEASED",
        CheckoutError::Payment(PaymentError::SessionNotFound(_)) => "SESSION_NOT_FOUND",
        CheckoutError::Payment(_) => "EXTERNAL_SERVICE_ERROR",
        CheckoutError::MalformedMetadata { .. } => "PAYMENT_MISMATCH",
        CheckoutError::Store(e) => store_code(e),
    }
}

fn store_status(error: &StoreError) -> StatusCode {
    match error {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::DuplicateEmail(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn store_code(error: &StoreError) -> &'static str {
    match error {
        StoreError::NotFound { .. } => "NOT_FOUND",
        StoreError::DuplicateEmail(_) => "EMAIL_TAKEN",
        _ => "DATABASE_ERROR",
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        error_response(
            self.code(),
            self.public_message(),
            self.details(),
            self.status_code(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_capacity_errors_are_conflicts_with_details() {
        let tier_id = Uuid::new_v4();
        let err = AppError::from(CheckoutError::InsufficientCapacity {
            tier_id,
            tier_name: "Floor".to_string(),
            requested: 3,
            remaining: 1,
        });

        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "INSUFFICIENT_CAPACITY");
        let details = err.details().unwrap();
        assert_eq!(details["remaining"], 1);
        assert_eq!(details["tier_id"], tier_id.to_string());
        assert!(err.public_message().contains("only 1 are available"));
    }

    #[test]
    fn test_server_errors_hide_their_cause() {
        let err = AppError::from(StoreError::Corrupt("bad status `???`".to_string()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.public_message().contains("???"));

        let err = AppError::from(CheckoutError::Payment(PaymentError::Api {
            status: 500,
            message: "secret upstream detail".to_string(),
        }));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(!err.public_message().contains("secret"));
    }

    #[test]
    fn test_unpaid_session_is_client_error() {
        let err = AppError::from(CheckoutError::PaymentNotConfirmed {
            session_id: "cs_1".to_string(),
            status: "unpaid".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "PAYMENT_NOT_CONFIRMED");
    }

    #[test]
    fn test_mismatched_payment_does_not_blame_the_processor() {
        let err = AppError::from(CheckoutError::MalformedMetadata {
            session_id: "cs_1".to_string(),
            reason: "missing `hold_id`".to_string(),
        });
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.code(), "PAYMENT_MISMATCH");
        let message = err.public_message();
        assert!(!message.contains("could not be reached"));
        assert!(!message.contains("hold_id"));
        assert!(message.contains("contact support"));
    }

    #[test]
    fn test_duplicate_email_is_conflict() {
        let err = AppError::from(StoreError::DuplicateEmail("ada@example.com".to_string()));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "EMAIL_TAKEN");
        assert!(err.public_message().contains("already registered"));
    }

    #[test]
    fn test_oversized_order_is_client_error() {
        let err = AppError::from(CheckoutError::InvalidQuantity {
            tier_id: Uuid::nil(),
            max: 50,
        });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.details().unwrap()["max"], 50);

        let err = AppError::from(CheckoutError::OrderTooLarge { max: 99_999_999 });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "ORDER_TOO_LARGE");
    }

    #[test]
    fn test_missing_store_entity_is_not_found() {
        let err = AppError::from(StoreError::NotFound {
            entity: "event",
            id: Uuid::nil(),
        });
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
