//! Payment Events
//!
//! Processor notifications reduced to what the ledger needs. The event id is
//! the idempotency key: applying the same event twice changes nothing.

use serde::{Deserialize, Serialize};

use market_core::{CheckoutId, SubscriptionStatus, TierId, UserId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    /// Processor event id
    pub id: String,
    pub kind: PaymentEventKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentEventKind {
    /// Payment captured for a checkout
    Succeeded {
        checkout_id: Option<CheckoutId>,
        tier_id: TierId,
        customer: UserId,
        amount_cents: i64,

        /// Set for recurring tiers
        external_subscription_id: Option<String>,
    },

    /// Payment declined, abandoned or expired
    Failed {
        checkout_id: Option<CheckoutId>,
        tier_id: Option<TierId>,
        reason: String,
    },

    /// Recurring billing moved a subscription along its lifecycle
    SubscriptionStatusChanged {
        external_subscription_id: String,
        status: SubscriptionStatus,
    },
}

impl PaymentEvent {
    pub fn new(id: impl Into<String>, kind: PaymentEventKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub const fn kind_name(&self) -> &'static str {
        match self.kind {
            PaymentEventKind::Succeeded { .. } => "succeeded",
            PaymentEventKind::Failed { .. } => "failed",
            PaymentEventKind::SubscriptionStatusChanged { .. } => "subscription_status_changed",
        }
    }
}
