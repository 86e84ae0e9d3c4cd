//! Stripe Webhook Handling
//!
//! Verifies the `Stripe-Signature` header, reduces the Stripe event to a
//! [`PaymentEvent`] and hands it to [`CheckoutFlow::apply_event`]. The Stripe
//! event id becomes the ledger idempotency key.

use std::collections::HashMap;

use stripe::{CheckoutSessionPaymentStatus, Event, EventObject, EventType, Webhook};

use market_core::{CheckoutId, MarketError, SubscriptionStatus, TierId, UserId};

use crate::error::{PaymentError, Result};
use crate::event::{PaymentEvent, PaymentEventKind};
use crate::flow::{CheckoutFlow, EventOutcome};
use crate::gateway::metadata_keys;

/// Ids carried in checkout session metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionMetadata {
    pub checkout_id: Option<CheckoutId>,
    pub tier_id: TierId,
    pub customer: UserId,
}

impl SessionMetadata {
    /// Parse the metadata written by [`StripeClient`](crate::StripeClient)
    pub fn from_map(metadata: &HashMap<String, String>) -> Result<Self> {
        let field = |key: &str| {
            metadata.get(key).ok_or_else(|| {
                PaymentError::WebhookParse(format!("session metadata missing {key}"))
            })
        };
        let parse_err = |e: MarketError| PaymentError::WebhookParse(e.to_string());

        let checkout_id = metadata
            .get(metadata_keys::CHECKOUT_ID)
            .map(|id| CheckoutId::parse(id))
            .transpose()
            .map_err(parse_err)?;
        let tier_id = TierId::parse(field(metadata_keys::TIER_ID)?).map_err(parse_err)?;
        let customer = UserId::parse(field(metadata_keys::CUSTOMER_ID)?).map_err(parse_err)?;

        Ok(Self {
            checkout_id,
            tier_id,
            customer,
        })
    }
}

/// Webhook handler
pub struct WebhookHandler {
    flow: CheckoutFlow,
    secret: String,
}

impl WebhookHandler {
    pub fn new(flow: CheckoutFlow, secret: impl Into<String>) -> Self {
        Self {
            flow,
            secret: secret.into(),
        }
    }

    /// Verify webhook signature and parse event
    pub fn parse_event(&self, payload: &str, signature: &str) -> Result<Event> {
        Webhook::construct_event(payload, signature, &self.secret)
            .map_err(|e| PaymentError::WebhookSignature(e.to_string()))
    }

    /// Verify, translate and apply one webhook delivery
    pub async fn handle(
        &self,
        payload: &str,
        signature: &str,
    ) -> market_core::Result<EventOutcome> {
        let event = self.parse_event(payload, signature)?;
        tracing::info!(
            event_id = %event.id,
            event_type = ?event.type_,
            "Processing Stripe webhook"
        );

        match translate(&event)? {
            Some(payment_event) => self.flow.apply_event(&payment_event).await,
            None => {
                tracing::debug!(event_type = ?event.type_, "Unhandled webhook event");
                Ok(EventOutcome::Ignored {
                    reason: format!("unhandled event type {:?}", event.type_),
                })
            }
        }
    }
}

/// Checkout session fields the ledger reads
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionFields {
    pub metadata: HashMap<String, String>,
    pub amount_total: Option<i64>,
    pub subscription: Option<String>,
}

impl SessionFields {
    fn from_session(session: &stripe::CheckoutSession) -> Self {
        Self {
            metadata: session.metadata.clone().unwrap_or_default(),
            amount_total: session.amount_total,
            subscription: session.subscription.as_ref().map(|s| s.id().to_string()),
        }
    }
}

/// A Stripe notification the ledger acts on, detached from the Stripe types
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    SessionCompleted { paid: bool, session: SessionFields },
    SessionAsyncPaymentSucceeded(SessionFields),
    SessionAsyncPaymentFailed(SessionFields),
    SessionExpired(SessionFields),
    SubscriptionUpdated { id: String, status: String },
    SubscriptionDeleted { id: String },
    InvoicePaymentFailed { subscription: Option<String> },
}

fn checkout_session(event: &Event) -> Result<SessionFields> {
    match &event.data.object {
        EventObject::CheckoutSession(session) => Ok(SessionFields::from_session(session)),
        _ => Err(PaymentError::WebhookParse("Invalid checkout session data".into())),
    }
}

impl Notice {
    /// Pull the fields we need out of a Stripe event; `None` for event
    /// types the ledger ignores
    pub fn from_event(event: &Event) -> Result<Option<Self>> {
        let notice = match event.type_ {
            EventType::CheckoutSessionCompleted => {
                let EventObject::CheckoutSession(session) = &event.data.object else {
                    return Err(PaymentError::WebhookParse("Invalid checkout session data".into()));
                };
                Self::SessionCompleted {
                    paid: session.payment_status != CheckoutSessionPaymentStatus::Unpaid,
                    session: SessionFields::from_session(session),
                }
            }
            EventType::CheckoutSessionAsyncPaymentSucceeded => {
                Self::SessionAsyncPaymentSucceeded(checkout_session(event)?)
            }
            EventType::CheckoutSessionAsyncPaymentFailed => {
                Self::SessionAsyncPaymentFailed(checkout_session(event)?)
            }
            EventType::CheckoutSessionExpired => Self::SessionExpired(checkout_session(event)?),
            EventType::CustomerSubscriptionUpdated | EventType::CustomerSubscriptionDeleted => {
                let EventObject::Subscription(sub) = &event.data.object else {
                    return Err(PaymentError::WebhookParse("Invalid subscription data".into()));
                };
                let id = sub.id.to_string();
                if event.type_ == EventType::CustomerSubscriptionDeleted {
                    Self::SubscriptionDeleted { id }
                } else {
                    Self::SubscriptionUpdated {
                        id,
                        status: sub.status.to_string(),
                    }
                }
            }
            EventType::InvoicePaymentFailed => {
                let EventObject::Invoice(invoice) = &event.data.object else {
                    return Err(PaymentError::WebhookParse("Invalid invoice data".into()));
                };
                Self::InvoicePaymentFailed {
                    subscription: invoice.subscription.as_ref().map(|s| s.id().to_string()),
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(notice))
    }

    /// Reduce to a [`PaymentEvent`] keyed by the Stripe event id
    pub fn into_payment_event(self, id: impl Into<String>) -> Result<Option<PaymentEvent>> {
        let kind = match self {
            // Delayed payment methods complete the session before the money
            // arrives; the async_payment_succeeded event follows.
            Self::SessionCompleted { paid: false, .. } => return Ok(None),
            Self::SessionCompleted {
                paid: true,
                session,
            }
            | Self::SessionAsyncPaymentSucceeded(session) => {
                let ids = SessionMetadata::from_map(&session.metadata)?;
                PaymentEventKind::Succeeded {
                    checkout_id: ids.checkout_id,
                    tier_id: ids.tier_id,
                    customer: ids.customer,
                    amount_cents: session.amount_total.unwrap_or_default(),
                    external_subscription_id: session.subscription,
                }
            }
            Self::SessionAsyncPaymentFailed(session) => failed(&session, "payment_failed"),
            Self::SessionExpired(session) => failed(&session, "checkout_expired"),
            Self::SubscriptionUpdated { id, status } => match status.parse() {
                Ok(status) => PaymentEventKind::SubscriptionStatusChanged {
                    external_subscription_id: id,
                    status,
                },
                Err(_) => {
                    tracing::debug!(status = %status, "Subscription status not tracked");
                    return Ok(None);
                }
            },
            Self::SubscriptionDeleted { id } => PaymentEventKind::SubscriptionStatusChanged {
                external_subscription_id: id,
                status: SubscriptionStatus::Canceled,
            },
            Self::InvoicePaymentFailed { subscription } => {
                let Some(subscription) = subscription else {
                    return Ok(None);
                };
                PaymentEventKind::SubscriptionStatusChanged {
                    external_subscription_id: subscription,
                    status: SubscriptionStatus::PastDue,
                }
            }
        };
        Ok(Some(PaymentEvent::new(id, kind)))
    }
}

fn failed(session: &SessionFields, reason: &str) -> PaymentEventKind {
    // Metadata is best effort here: an unknown session still fails cleanly
    let ids = SessionMetadata::from_map(&session.metadata).ok();
    PaymentEventKind::Failed {
        checkout_id: ids.as_ref().and_then(|m| m.checkout_id),
        tier_id: ids.map(|m| m.tier_id),
        reason: reason.into(),
    }
}

/// Reduce a Stripe event to a [`PaymentEvent`]; `None` for events the ledger
/// does not care about
pub fn translate(event: &Event) -> Result<Option<PaymentEvent>> {
    match Notice::from_event(event)? {
        Some(notice) => notice.into_payment_event(event.id.to_string()),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(pairs: &[(&str, String)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_session_metadata_roundtrip() {
        let checkout = CheckoutId::new();
        let tier = TierId::new();
        let customer = UserId::new();
        let map = metadata(&[
            (metadata_keys::CHECKOUT_ID, checkout.to_string()),
            (metadata_keys::TIER_ID, tier.to_string()),
            (metadata_keys::CUSTOMER_ID, customer.to_string()),
        ]);

        let parsed = SessionMetadata::from_map(&map).unwrap();
        assert_eq!(
            parsed,
            SessionMetadata {
                checkout_id: Some(checkout),
                tier_id: tier,
                customer,
            }
        );
    }

    fn paid_session() -> (SessionFields, CheckoutId, TierId, UserId) {
        let checkout = CheckoutId::new();
        let tier = TierId::new();
        let customer = UserId::new();
        let session = SessionFields {
            metadata: metadata(&[
                (metadata_keys::CHECKOUT_ID, checkout.to_string()),
                (metadata_keys::TIER_ID, tier.to_string()),
                (metadata_keys::CUSTOMER_ID, customer.to_string()),
            ]),
            amount_total: Some(1000),
            subscription: Some("sub_123".into()),
        };
        (session, checkout, tier, customer)
    }

    fn kind_of(notice: Notice) -> Option<PaymentEventKind> {
        notice.into_payment_event("evt_1").unwrap().map(|e| e.kind)
    }

    #[test]
    fn test_paid_session_becomes_success() {
        let (session, checkout, tier, customer) = paid_session();
        let event = Notice::SessionCompleted {
            paid: true,
            session,
        }
        .into_payment_event("evt_paid")
        .unwrap()
        .unwrap();

        assert_eq!(event.id, "evt_paid");
        assert_eq!(
            event.kind,
            PaymentEventKind::Succeeded {
                checkout_id: Some(checkout),
                tier_id: tier,
                customer,
                amount_cents: 1000,
                external_subscription_id: Some("sub_123".into()),
            }
        );
    }

    #[test]
    fn test_unpaid_session_waits_for_async_payment() {
        let (session, ..) = paid_session();
        assert_eq!(
            kind_of(Notice::SessionCompleted {
                paid: false,
                session: session.clone(),
            }),
            None
        );
        assert!(matches!(
            kind_of(Notice::SessionAsyncPaymentSucceeded(session)),
            Some(PaymentEventKind::Succeeded { amount_cents: 1000, .. })
        ));
    }

    #[test]
    fn test_paid_session_without_metadata_is_rejected() {
        let notice = Notice::SessionCompleted {
            paid: true,
            session: SessionFields::default(),
        };
        assert!(matches!(
            notice.into_payment_event("evt_1"),
            Err(PaymentError::WebhookParse(_))
        ));
    }

    #[test]
    fn test_failed_and_expired_sessions() {
        let (session, checkout, tier, _) = paid_session();
        assert_eq!(
            kind_of(Notice::SessionExpired(session.clone())),
            Some(PaymentEventKind::Failed {
                checkout_id: Some(checkout),
                tier_id: Some(tier),
                reason: "checkout_expired".into(),
            })
        );
        assert_eq!(
            kind_of(Notice::SessionAsyncPaymentFailed(SessionFields::default())),
            Some(PaymentEventKind::Failed {
                checkout_id: None,
                tier_id: None,
                reason: "payment_failed".into(),
            })
        );
    }

    #[test]
    fn test_subscription_notices() {
        let status_change = |status| {
            Some(PaymentEventKind::SubscriptionStatusChanged {
                external_subscription_id: "sub_123".into(),
                status,
            })
        };

        assert_eq!(
            kind_of(Notice::SubscriptionUpdated {
                id: "sub_123".into(),
                status: "past_due".into(),
            }),
            status_change(SubscriptionStatus::PastDue)
        );
        assert_eq!(
            kind_of(Notice::SubscriptionUpdated {
                id: "sub_123".into(),
                status: "paused".into(),
            }),
            None
        );
        assert_eq!(
            kind_of(Notice::SubscriptionDeleted {
                id: "sub_123".into()
            }),
            status_change(SubscriptionStatus::Canceled)
        );
        assert_eq!(
            kind_of(Notice::InvoicePaymentFailed {
                subscription: Some("sub_123".into()),
            }),
            status_change(SubscriptionStatus::PastDue)
        );
        assert_eq!(
            kind_of(Notice::InvoicePaymentFailed { subscription: None }),
            None
        );
    }

    #[test]
    fn test_session_metadata_requires_tier() {
        let map = metadata(&[(metadata_keys::CUSTOMER_ID, UserId::new().to_string())]);
        assert!(matches!(
            SessionMetadata::from_map(&map),
            Err(PaymentError::WebhookParse(_))
        ));
    }

    #[test]
    fn test_session_metadata_rejects_bad_uuid() {
        let map = metadata(&[
            (metadata_keys::TIER_ID, "gold".to_string()),
            (metadata_keys::CUSTOMER_ID, UserId::new().to_string()),
        ]);
        assert!(SessionMetadata::from_map(&map).is_err());
    }
}
