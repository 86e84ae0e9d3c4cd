//! Payment Gateway Seam
//!
//! The checkout flow talks to the payment processor only through
//! [`PaymentGateway`]. [`StripeClient`](crate::StripeClient) is the
//! production implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use market_core::{Cadence, CheckoutId, TierId, UserId};

use crate::error::Result;

/// Metadata keys carried on the processor session and echoed back in events
pub mod metadata_keys {
    pub const CHECKOUT_ID: &str = "checkout_id";
    pub const TIER_ID: &str = "tier_id";
    pub const CUSTOMER_ID: &str = "customer_id";
}

/// Everything the processor needs to collect one payment
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub checkout_id: CheckoutId,
    pub tier_id: TierId,
    pub tier_name: String,
    pub tier_description: String,
    pub customer_id: UserId,
    pub customer_email: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub cadence: Cadence,

    /// Maintainer's connected account; `None` settles to the platform
    pub connected_account: Option<String>,
    pub success_url: String,
    pub cancel_url: String,
}

/// Processor-side session created for a [`PaymentRequest`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewaySession {
    /// Processor session id
    pub id: String,

    /// Where to send the customer to enter payment details
    pub redirect_url: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Submit a payment intent. Returns as soon as the processor has accepted
    /// it; settlement is reported later through events.
    async fn create_session(&self, request: &PaymentRequest) -> Result<GatewaySession>;

    /// Gateway name for logs
    fn name(&self) -> &str;
}
