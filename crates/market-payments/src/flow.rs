//! Checkout Flow
//!
//! Two phases joined only by ids:
//!
//! 1. [`CheckoutFlow::initiate`] validates the purchase, records a checkout
//!    and submits a payment request to the gateway under a timeout. It
//!    returns a [`PendingCheckout`] as soon as the gateway accepts.
//! 2. [`CheckoutFlow::apply_event`] consumes processor events. The event id
//!    is unique in the ledger, so redelivery never writes a second row.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use market_catalog::{ContractRef, ContractResolver};
use market_core::{
    Charge, Checkout, CheckoutId, CheckoutStatus, MarketError, RequestContext, Result, Store,
    Subscription, Tier, TierId,
};

use crate::error::PaymentError;
use crate::event::{PaymentEvent, PaymentEventKind};
use crate::gateway::{PaymentGateway, PaymentRequest};
use crate::state::{CheckoutState, LedgerEntry};

/// Default bound on a single gateway call
pub const DEFAULT_PAYMENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug)]
pub struct FlowConfig {
    /// Bound on the gateway call; on expiry the checkout fails
    pub payment_timeout: Duration,

    /// Public origin used to build return URLs
    pub public_base_url: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            payment_timeout: DEFAULT_PAYMENT_TIMEOUT,
            public_base_url: "http://localhost:3000".into(),
        }
    }
}

/// What the checkout page renders before payment
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutView {
    pub tier: Tier,
    pub state: CheckoutState,

    /// Always present; falls back to the standard agreement
    pub contract: ContractRef,
}

/// Request to start paying for a tier
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InitiateCheckout {
    pub tier_id: TierId,

    /// The visitor ticked "I accept" for the displayed contract
    #[serde(default)]
    pub accept_contract: bool,
}

/// Handle returned by phase one
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingCheckout {
    pub checkout_id: CheckoutId,
    pub tier_id: TierId,
    pub state: CheckoutState,
    pub contract: ContractRef,

    /// Processor page collecting payment details
    pub redirect_url: String,
}

/// Result of applying one processor event
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EventOutcome {
    /// A new ledger row was written
    Applied { entry: LedgerEntry },

    /// The event (or its checkout) was already applied; nothing changed
    AlreadyApplied,

    /// Checkout failed; the tier is kept for retry
    Failed { tier_id: Option<TierId> },

    /// Subscription moved to a new status
    StatusChanged { external_subscription_id: String },

    /// Nothing to do
    Ignored { reason: String },
}

/// Where the visitor stands after submitting payment
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutOutcome {
    pub checkout_id: CheckoutId,
    pub tier_id: TierId,
    pub state: CheckoutState,

    /// `None` while the processor has not reported back
    pub redirect: Option<String>,
}

/// Orchestrates checkout across the store, contract resolver and gateway
#[derive(Clone)]
pub struct CheckoutFlow {
    store: Arc<dyn Store>,
    contracts: ContractResolver,
    gateway: Arc<dyn PaymentGateway>,
    config: FlowConfig,
}

impl CheckoutFlow {
    pub fn new(
        store: Arc<dyn Store>,
        contracts: ContractResolver,
        gateway: Arc<dyn PaymentGateway>,
        config: FlowConfig,
    ) -> Self {
        Self {
            store,
            contracts,
            gateway,
            config,
        }
    }

    async fn purchasable_tier(&self, tier_id: TierId) -> Result<Tier> {
        let tier = self
            .store
            .get_tier(tier_id)
            .await?
            .ok_or_else(|| MarketError::not_found("tier", tier_id))?;
        if !tier.published {
            return Err(MarketError::validation("this tier is not available for purchase"));
        }
        Ok(tier)
    }

    /// State and contract for rendering the checkout page
    pub async fn prepare(&self, ctx: &RequestContext, tier_id: TierId) -> Result<CheckoutView> {
        let tier = self.purchasable_tier(tier_id).await?;
        let contract = self.contracts.resolve_contract_for_tier(&tier).await?;
        let state = match ctx.actor {
            Some(customer) => {
                CheckoutState::new(tier.id).authenticated(customer, contract.clone())?
            }
            None => CheckoutState::new(tier.id),
        };
        Ok(CheckoutView {
            tier,
            state,
            contract,
        })
    }

    /// Phase one: submit payment and return immediately
    pub async fn initiate(
        &self,
        ctx: &RequestContext,
        request: InitiateCheckout,
    ) -> Result<PendingCheckout> {
        let customer = ctx.require_actor()?;
        let tier = self.purchasable_tier(request.tier_id).await?;
        if tier.owner == customer {
            return Err(MarketError::validation("you cannot buy your own tier"));
        }

        let contract = self.contracts.resolve_contract_for_tier(&tier).await?;
        let mut state = CheckoutState::new(tier.id).authenticated(customer, contract.clone())?;
        if request.accept_contract {
            state = state.accept_contract()?;
        }

        let mut checkout = Checkout::new(tier.id, customer);
        let state = state.submit_payment(checkout.id)?;
        self.store.insert_checkout(&checkout).await?;

        let maintainer = self.store.get_user(tier.owner).await?;
        let buyer = self.store.get_user(customer).await?;
        let base = self.config.public_base_url.trim_end_matches('/');
        let payment = PaymentRequest {
            checkout_id: checkout.id,
            tier_id: tier.id,
            tier_name: tier.name.clone(),
            tier_description: tier.description.clone(),
            customer_id: customer,
            customer_email: buyer.map(|u| u.email),
            amount_cents: tier.price_cents,
            currency: tier.currency.clone(),
            cadence: tier.cadence,
            connected_account: maintainer.and_then(|u| u.payment_account_id),
            success_url: format!("{base}/checkout/{}/complete", checkout.id),
            cancel_url: format!("{base}/checkout/{}?canceled=true", tier.id),
        };

        tracing::info!(
            request_id = %ctx.request_id,
            checkout_id = %checkout.id,
            tier_id = %tier.id,
            gateway = self.gateway.name(),
            amount_cents = payment.amount_cents,
            "Submitting payment"
        );

        // Never retried: the processor owns retries for submitted payments
        let submitted = tokio::time::timeout(
            self.config.payment_timeout,
            self.gateway.create_session(&payment),
        )
        .await
        .unwrap_or(Err(PaymentError::Timeout(self.config.payment_timeout)));

        match submitted {
            Ok(session) => {
                checkout.external_session_id = Some(session.id);
                checkout.updated_at = Utc::now();
                self.store.update_checkout(&checkout).await?;
                Ok(PendingCheckout {
                    checkout_id: checkout.id,
                    tier_id: tier.id,
                    state,
                    contract,
                    redirect_url: session.redirect_url,
                })
            }
            Err(err) => {
                tracing::error!(
                    request_id = %ctx.request_id,
                    checkout_id = %checkout.id,
                    error = %err,
                    "Payment submission failed"
                );
                let failed = state.fail(err.to_string())?;
                self.mark_failed(&mut checkout, &failed).await?;
                Err(err.into())
            }
        }
    }

    async fn mark_failed(&self, checkout: &mut Checkout, state: &CheckoutState) -> Result<()> {
        if let CheckoutState::Failed { reason, .. } = state {
            checkout.failure_reason = Some(reason.clone());
        }
        checkout.status = CheckoutStatus::Failed;
        checkout.updated_at = Utc::now();
        self.store.update_checkout(checkout).await
    }

    async fn settle_checkout(&self, mut checkout: Checkout, event_id: &str) -> Result<()> {
        if checkout.status == CheckoutStatus::Failed {
            // Money was captured after the session was written off
            tracing::warn!(
                event_id = %event_id,
                checkout_id = %checkout.id,
                "Late success for failed checkout"
            );
            checkout.failure_reason = None;
        }
        checkout.status = CheckoutStatus::Succeeded;
        checkout.updated_at = Utc::now();
        self.store.update_checkout(&checkout).await
    }

    /// Phase two: apply a processor event exactly once
    pub async fn apply_event(&self, event: &PaymentEvent) -> Result<EventOutcome> {
        tracing::info!(event_id = %event.id, kind = event.kind_name(), "Applying payment event");

        match &event.kind {
            PaymentEventKind::Succeeded {
                checkout_id,
                tier_id,
                customer,
                amount_cents,
                external_subscription_id,
            } => {
                let checkout = match checkout_id {
                    Some(id) => self.store.get_checkout(*id).await?,
                    None => None,
                };
                if checkout
                    .as_ref()
                    .is_some_and(|c| c.status == CheckoutStatus::Succeeded)
                {
                    tracing::info!(event_id = %event.id, "Checkout already settled");
                    return Ok(EventOutcome::AlreadyApplied);
                }

                let tier = self
                    .store
                    .get_tier(*tier_id)
                    .await?
                    .ok_or_else(|| MarketError::not_found("tier", tier_id))?;
                if *amount_cents != tier.price_cents {
                    tracing::warn!(
                        event_id = %event.id,
                        tier_id = %tier.id,
                        paid = amount_cents,
                        listed = tier.price_cents,
                        "Paid amount differs from tier price"
                    );
                }

                let entry = if tier.cadence.is_recurring() {
                    LedgerEntry::Subscription(Subscription::new(
                        *customer,
                        &tier,
                        *amount_cents,
                        &event.id,
                        external_subscription_id.clone(),
                    )?)
                } else {
                    LedgerEntry::Charge(Charge::new(*customer, &tier, *amount_cents, &event.id)?)
                };

                let inserted = match &entry {
                    LedgerEntry::Charge(charge) => self.store.insert_charge(charge).await,
                    LedgerEntry::Subscription(sub) => self.store.insert_subscription(sub).await,
                };
                match inserted {
                    Ok(()) => {}
                    Err(MarketError::Conflict(msg)) => {
                        // The ledger row may have landed on an earlier delivery
                        // whose checkout update failed
                        tracing::info!(
                            event_id = %event.id,
                            detail = %msg,
                            "Duplicate payment event ignored"
                        );
                        if let Some(checkout) = checkout {
                            self.settle_checkout(checkout, &event.id).await?;
                        }
                        return Ok(EventOutcome::AlreadyApplied);
                    }
                    Err(err) => return Err(err),
                }

                if let Some(checkout) = checkout {
                    self.settle_checkout(checkout, &event.id).await?;
                }

                tracing::info!(
                    event_id = %event.id,
                    tier_id = %tier.id,
                    customer = %customer,
                    recurring = tier.cadence.is_recurring(),
                    "Recorded payment"
                );
                Ok(EventOutcome::Applied { entry })
            }

            PaymentEventKind::Failed {
                checkout_id,
                tier_id,
                reason,
            } => {
                let Some(id) = checkout_id else {
                    return Ok(EventOutcome::Failed { tier_id: *tier_id });
                };
                let Some(mut checkout) = self.store.get_checkout(*id).await? else {
                    tracing::warn!(
                        event_id = %event.id,
                        checkout_id = %id,
                        "Failure for unknown checkout"
                    );
                    return Ok(EventOutcome::Failed { tier_id: *tier_id });
                };
                match CheckoutState::from_record(&checkout).fail(reason.as_str()) {
                    Ok(failed) => {
                        self.mark_failed(&mut checkout, &failed).await?;
                        tracing::info!(
                            event_id = %event.id,
                            checkout_id = %id,
                            reason = %reason,
                            "Checkout failed"
                        );
                        Ok(EventOutcome::Failed {
                            tier_id: Some(checkout.tier_id),
                        })
                    }
                    Err(_) => Ok(EventOutcome::Ignored {
                        reason: format!("checkout {id} already settled"),
                    }),
                }
            }

            PaymentEventKind::SubscriptionStatusChanged {
                external_subscription_id,
                status,
            } => {
                let Some(subscription) = self
                    .store
                    .subscription_by_external_id(external_subscription_id)
                    .await?
                else {
                    return Ok(EventOutcome::Ignored {
                        reason: format!("unknown subscription {external_subscription_id}"),
                    });
                };

                if subscription.status == *status {
                    return Ok(EventOutcome::AlreadyApplied);
                }
                if !subscription.status.can_transition_to(*status) {
                    tracing::warn!(
                        event_id = %event.id,
                        subscription = %external_subscription_id,
                        from = subscription.status.as_str(),
                        to = status.as_str(),
                        "Rejected subscription transition"
                    );
                    return Ok(EventOutcome::Ignored {
                        reason: format!(
                            "subscription is {}, cannot become {}",
                            subscription.status.as_str(),
                            status.as_str()
                        ),
                    });
                }

                self.store
                    .set_subscription_status(external_subscription_id, *status)
                    .await?;
                Ok(EventOutcome::StatusChanged {
                    external_subscription_id: external_subscription_id.clone(),
                })
            }
        }
    }

    /// Where to send the customer after the processor redirects back
    pub async fn checkout_outcome(
        &self,
        ctx: &RequestContext,
        checkout_id: CheckoutId,
    ) -> Result<CheckoutOutcome> {
        let checkout = self
            .store
            .get_checkout(checkout_id)
            .await?
            .ok_or_else(|| MarketError::not_found("checkout", checkout_id))?;
        ctx.require_owner(checkout.customer, "checkout")?;

        let redirect = match checkout.status {
            CheckoutStatus::Processing => None,
            CheckoutStatus::Succeeded => Some(format!("/subscriptions?checkout={checkout_id}")),
            CheckoutStatus::Failed => Some(format!(
                "/checkout/{}?error=payment_failed",
                checkout.tier_id
            )),
        };

        Ok(CheckoutOutcome {
            checkout_id,
            tier_id: checkout.tier_id,
            state: CheckoutState::from_record(&checkout),
            redirect,
        })
    }
}
