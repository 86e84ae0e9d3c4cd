//! Payment Error Types

use std::time::Duration;

use market_core::MarketError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Stripe API error
    #[error("Stripe error: {0}")]
    Stripe(String),

    /// Gateway did not answer within the configured bound
    #[error("Payment gateway timed out after {0:?}")]
    Timeout(Duration),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            Self::Stripe(_) | Self::Timeout(_) => "Payment processing failed. Please try again.",
            Self::WebhookSignature(_) | Self::WebhookParse(_) => "Invalid payment notification.",
            Self::Config(_) => "Payment service configuration error.",
        }
    }
}

impl From<PaymentError> for MarketError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::WebhookSignature(_) | PaymentError::WebhookParse(_) => {
                Self::Validation(err.to_string())
            }
            PaymentError::Stripe(_) | PaymentError::Timeout(_) | PaymentError::Config(_) => {
                Self::ExternalService(err.to_string())
            }
        }
    }
}
