//! Stripe Checkout Integration
//!
//! Implements [`PaymentGateway`] with Stripe's hosted Checkout. One-time
//! tiers open a `payment` session, recurring tiers a `subscription` session.
//! Sessions for maintainers with a connected account are created on that
//! account.

use std::collections::HashMap;

use async_trait::async_trait;
use stripe::{
    AccountId, CheckoutSession as StripeCheckoutSession, CheckoutSessionMode, Client,
    CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionLineItemsPriceData, CreateCheckoutSessionLineItemsPriceDataProductData,
    CreateCheckoutSessionLineItemsPriceDataRecurring,
    CreateCheckoutSessionLineItemsPriceDataRecurringInterval, Currency,
};

use market_core::Cadence;

use crate::error::{PaymentError, Result};
use crate::gateway::{GatewaySession, PaymentGateway, PaymentRequest, metadata_keys};

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
    webhook_secret: String,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str, webhook_secret: &str) -> Self {
        Self {
            client: Client::new(secret_key),
            webhook_secret: webhook_secret.to_string(),
        }
    }

    /// Get the webhook secret
    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }

    fn client_for(&self, connected_account: Option<&str>) -> Result<Client> {
        match connected_account {
            Some(account) => {
                let id: AccountId = account.parse().map_err(|e| {
                    PaymentError::Config(format!("invalid connected account {account}: {e}"))
                })?;
                Ok(self.client.clone().with_stripe_account(id))
            }
            None => Ok(self.client.clone()),
        }
    }
}

/// Lowercase ISO codes accepted for tier prices; all use two minor-unit digits
pub const SUPPORTED_CURRENCIES: &[&str] = &["usd", "eur", "gbp", "cad", "aud"];

/// Stripe currency for a tier's ISO code
fn stripe_currency(code: &str) -> Result<Currency> {
    match code.to_lowercase().as_str() {
        "usd" => Ok(Currency::USD),
        "eur" => Ok(Currency::EUR),
        "gbp" => Ok(Currency::GBP),
        "cad" => Ok(Currency::CAD),
        "aud" => Ok(Currency::AUD),
        other => Err(PaymentError::Config(format!("unsupported currency {other}"))),
    }
}

/// Session mode and recurring interval for a cadence
fn billing_for(
    cadence: Cadence,
) -> (
    CheckoutSessionMode,
    Option<CreateCheckoutSessionLineItemsPriceDataRecurring>,
) {
    let recurring = |interval, interval_count| {
        Some(CreateCheckoutSessionLineItemsPriceDataRecurring {
            interval,
            interval_count: Some(interval_count),
        })
    };
    match cadence {
        Cadence::Once => (CheckoutSessionMode::Payment, None),
        Cadence::Month => (
            CheckoutSessionMode::Subscription,
            recurring(CreateCheckoutSessionLineItemsPriceDataRecurringInterval::Month, 1),
        ),
        Cadence::Quarter => (
            CheckoutSessionMode::Subscription,
            recurring(CreateCheckoutSessionLineItemsPriceDataRecurringInterval::Month, 3),
        ),
        Cadence::Year => (
            CheckoutSessionMode::Subscription,
            recurring(CreateCheckoutSessionLineItemsPriceDataRecurringInterval::Year, 1),
        ),
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    /// Create a Stripe Checkout session (Hosted approach)
    async fn create_session(&self, request: &PaymentRequest) -> Result<GatewaySession> {
        let client = self.client_for(request.connected_account.as_deref())?;
        let currency = stripe_currency(&request.currency)?;
        let (mode, recurring) = billing_for(request.cadence);
        let checkout_id = request.checkout_id.to_string();

        let mut params = CreateCheckoutSession::new();
        params.client_reference_id = Some(&checkout_id);
        params.customer_email = request.customer_email.as_deref();
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.mode = Some(mode);

        // Echoed back on webhook events
        let mut metadata = HashMap::new();
        metadata.insert(metadata_keys::CHECKOUT_ID.to_string(), checkout_id.clone());
        metadata.insert(metadata_keys::TIER_ID.to_string(), request.tier_id.to_string());
        metadata.insert(
            metadata_keys::CUSTOMER_ID.to_string(),
            request.customer_id.to_string(),
        );
        params.metadata = Some(metadata);

        let description = (!request.tier_description.is_empty())
            .then(|| request.tier_description.clone());
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            quantity: Some(1),
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency,
                unit_amount: Some(request.amount_cents),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: request.tier_name.clone(),
                    description,
                    ..Default::default()
                }),
                recurring,
                ..Default::default()
            }),
            ..Default::default()
        }]);

        let session = StripeCheckoutSession::create(&client, params)
            .await
            .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        let redirect_url = session
            .url
            .ok_or_else(|| PaymentError::Stripe("No checkout URL returned".into()))?;

        tracing::debug!(
            session_id = %session.id,
            checkout_id = %checkout_id,
            "Created Stripe checkout session"
        );

        Ok(GatewaySession {
            id: session.id.to_string(),
            redirect_url,
        })
    }

    fn name(&self) -> &str {
        "stripe"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_once_is_payment_mode() {
        let (mode, recurring) = billing_for(Cadence::Once);
        assert_eq!(mode, CheckoutSessionMode::Payment);
        assert!(recurring.is_none());
    }

    #[test]
    fn test_quarter_bills_every_three_months() {
        let (mode, recurring) = billing_for(Cadence::Quarter);
        assert_eq!(mode, CheckoutSessionMode::Subscription);
        let recurring = recurring.unwrap();
        assert_eq!(
            recurring.interval,
            CreateCheckoutSessionLineItemsPriceDataRecurringInterval::Month
        );
        assert_eq!(recurring.interval_count, Some(3));
    }

    #[test]
    fn test_currency_mapping() {
        assert_eq!(stripe_currency("USD").unwrap(), Currency::USD);
        assert!(stripe_currency("xyz").is_err());
        for code in SUPPORTED_CURRENCIES {
            assert!(stripe_currency(code).is_ok(), "{code} has no Stripe mapping");
        }
    }

    #[test]
    fn test_invalid_connected_account_is_config_error() {
        let client = StripeClient::new("sk_test_123", "whsec_123");
        assert!(matches!(
            client.client_for(Some("not-an-account")),
            Err(PaymentError::Config(_))
        ));
        assert!(client.client_for(None).is_ok());
    }
}
