//! Checkout State Machine
//!
//! ```text
//! Unauthenticated ──sign in──▶ AwaitingPaymentMethod ──submit──▶ PaymentProcessing
//!                                     │                              │      │
//!                                     └────── gateway error ─────┐   │      │
//!                                                                ▼   ▼      ▼
//!                                                              Failed    Success
//! ```
//!
//! `PaymentProcessing` is left only by a payment event, never by the request
//! that submitted the payment.

use serde::{Deserialize, Serialize};

use market_catalog::ContractRef;
use market_core::{
    Charge, Checkout, CheckoutId, CheckoutStatus, MarketError, Result, Subscription, TierId,
    UserId,
};

/// Ledger row written by a successful payment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEntry {
    Charge(Charge),
    Subscription(Subscription),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CheckoutState {
    /// Visitor picked a tier but has not signed in
    Unauthenticated { tier_id: TierId },

    /// Signed in; contract shown and awaiting acceptance plus payment details
    AwaitingPaymentMethod {
        tier_id: TierId,
        customer: UserId,
        contract: ContractRef,
        contract_accepted: bool,
    },

    /// Submitted to the processor; waiting for its event
    PaymentProcessing {
        checkout_id: CheckoutId,
        tier_id: TierId,
        customer: UserId,
    },

    /// Ledger row written
    Success {
        checkout_id: CheckoutId,
        tier_id: TierId,
    },

    /// No ledger row; the tier is kept so the visitor can retry directly
    Failed { tier_id: TierId, reason: String },
}

impl CheckoutState {
    pub const fn new(tier_id: TierId) -> Self {
        Self::Unauthenticated { tier_id }
    }

    pub const fn tier_id(&self) -> TierId {
        match self {
            Self::Unauthenticated { tier_id }
            | Self::AwaitingPaymentMethod { tier_id, .. }
            | Self::PaymentProcessing { tier_id, .. }
            | Self::Success { tier_id, .. }
            | Self::Failed { tier_id, .. } => *tier_id,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Unauthenticated { .. } => "unauthenticated",
            Self::AwaitingPaymentMethod { .. } => "awaiting_payment_method",
            Self::PaymentProcessing { .. } => "payment_processing",
            Self::Success { .. } => "success",
            Self::Failed { .. } => "failed",
        }
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Success { .. } | Self::Failed { .. })
    }

    fn invalid(&self, action: &str) -> MarketError {
        MarketError::validation(format!("cannot {action} while checkout is {}", self.name()))
    }

    /// The auth collaborator verified the visitor
    pub fn authenticated(self, customer: UserId, contract: ContractRef) -> Result<Self> {
        match self {
            Self::Unauthenticated { tier_id } => Ok(Self::AwaitingPaymentMethod {
                tier_id,
                customer,
                contract,
                contract_accepted: false,
            }),
            other => Err(other.invalid("sign in")),
        }
    }

    /// Visitor accepted the displayed contract
    pub fn accept_contract(self) -> Result<Self> {
        match self {
            Self::AwaitingPaymentMethod {
                tier_id,
                customer,
                contract,
                ..
            } => Ok(Self::AwaitingPaymentMethod {
                tier_id,
                customer,
                contract,
                contract_accepted: true,
            }),
            other => Err(other.invalid("accept the contract")),
        }
    }

    /// Payment details submitted to the processor
    pub fn submit_payment(self, checkout_id: CheckoutId) -> Result<Self> {
        match self {
            Self::AwaitingPaymentMethod {
                tier_id,
                customer,
                contract_accepted: true,
                ..
            } => Ok(Self::PaymentProcessing {
                checkout_id,
                tier_id,
                customer,
            }),
            Self::AwaitingPaymentMethod {
                contract_accepted: false,
                ..
            } => Err(MarketError::validation(
                "the contract must be accepted before paying",
            )),
            other => Err(other.invalid("submit payment")),
        }
    }

    /// Processor reported a captured payment
    pub fn succeed(self) -> Result<Self> {
        match self {
            Self::PaymentProcessing {
                checkout_id,
                tier_id,
                ..
            } => Ok(Self::Success {
                checkout_id,
                tier_id,
            }),
            other => Err(other.invalid("complete payment")),
        }
    }

    /// Processor declined, timed out or the session expired
    pub fn fail(self, reason: impl Into<String>) -> Result<Self> {
        match self {
            Self::AwaitingPaymentMethod { tier_id, .. }
            | Self::PaymentProcessing { tier_id, .. } => Ok(Self::Failed {
                tier_id,
                reason: reason.into(),
            }),
            other => Err(other.invalid("fail payment")),
        }
    }

    /// Rebuild the post-submission state from a persisted checkout
    pub fn from_record(checkout: &Checkout) -> Self {
        match checkout.status {
            CheckoutStatus::Processing => Self::PaymentProcessing {
                checkout_id: checkout.id,
                tier_id: checkout.tier_id,
                customer: checkout.customer,
            },
            CheckoutStatus::Succeeded => Self::Success {
                checkout_id: checkout.id,
                tier_id: checkout.tier_id,
            },
            CheckoutStatus::Failed => Self::Failed {
                tier_id: checkout.tier_id,
                reason: checkout
                    .failure_reason
                    .clone()
                    .unwrap_or_else(|| "payment failed".into()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_catalog::StandardAgreement;

    fn standard() -> ContractRef {
        ContractRef::Standard(StandardAgreement::new("https://market.dev/terms"))
    }

    #[test]
    fn test_happy_path() {
        let tier = TierId::new();
        let checkout = CheckoutId::new();
        let state = CheckoutState::new(tier)
            .authenticated(UserId::new(), standard())
            .unwrap()
            .accept_contract()
            .unwrap()
            .submit_payment(checkout)
            .unwrap();
        assert_eq!(state.name(), "payment_processing");
        assert!(!state.is_terminal());

        let done = state.succeed().unwrap();
        assert_eq!(
            done,
            CheckoutState::Success {
                checkout_id: checkout,
                tier_id: tier
            }
        );
        assert!(done.is_terminal());
    }

    #[test]
    fn test_payment_requires_accepted_contract() {
        let state = CheckoutState::new(TierId::new())
            .authenticated(UserId::new(), standard())
            .unwrap();
        let err = state.submit_payment(CheckoutId::new()).unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
    }

    #[test]
    fn test_cannot_pay_unauthenticated() {
        let err = CheckoutState::new(TierId::new())
            .submit_payment(CheckoutId::new())
            .unwrap_err();
        assert!(err.to_string().contains("unauthenticated"));
    }

    #[test]
    fn test_failure_keeps_tier() {
        let tier = TierId::new();
        let failed = CheckoutState::new(tier)
            .authenticated(UserId::new(), standard())
            .unwrap()
            .accept_contract()
            .unwrap()
            .submit_payment(CheckoutId::new())
            .unwrap()
            .fail("card_declined")
            .unwrap();
        assert_eq!(failed.tier_id(), tier);
        assert!(failed.clone().succeed().is_err());
        assert!(failed.fail("again").is_err());
    }

    #[test]
    fn test_from_record() {
        let mut record = Checkout::new(TierId::new(), UserId::new());
        assert_eq!(CheckoutState::from_record(&record).name(), "payment_processing");

        record.status = CheckoutStatus::Failed;
        record.failure_reason = Some("expired".into());
        assert_eq!(
            CheckoutState::from_record(&record),
            CheckoutState::Failed {
                tier_id: record.tier_id,
                reason: "expired".into()
            }
        );
    }
}
