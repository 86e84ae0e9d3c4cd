//! Server Configuration
//!
//! Read once at startup from the process environment (after `.env` is
//! loaded). A malformed `PAYMENT_TIMEOUT_SECS` or an unsupported `CURRENCY`
//! fails startup; everything else has a default, and missing Stripe keys
//! disable payments.

use std::time::Duration;

use thiserror::Error;

use market_payments::{DEFAULT_PAYMENT_TIMEOUT, SUPPORTED_CURRENCIES};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a positive number of seconds, got '{value}'")]
    InvalidTimeout { name: &'static str, value: String },

    #[error(
        "CURRENCY '{0}' is not supported, expected one of {supported:?}",
        supported = SUPPORTED_CURRENCIES
    )]
    UnsupportedCurrency(String),
}

/// Stripe credentials; both keys are required to enable payments
#[derive(Clone, Debug)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_addr: String,
    pub stripe: Option<StripeConfig>,
    pub payment_timeout: Duration,

    /// Origin used for checkout return URLs
    pub public_base_url: String,

    /// Link for the standard agreement shown when a tier has no contract
    pub standard_agreement_url: String,
    pub currency: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let stripe = match (get("STRIPE_SECRET_KEY"), get("STRIPE_WEBHOOK_SECRET")) {
            (Some(secret_key), Some(webhook_secret)) => Some(StripeConfig {
                secret_key,
                webhook_secret,
            }),
            _ => None,
        };

        let payment_timeout = match get("PAYMENT_TIMEOUT_SECS") {
            Some(value) => match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidTimeout {
                        name: "PAYMENT_TIMEOUT_SECS",
                        value,
                    });
                }
            },
            None => DEFAULT_PAYMENT_TIMEOUT,
        };

        let public_base_url = get("PUBLIC_BASE_URL")
            .unwrap_or_else(|| "http://localhost:3000".into())
            .trim_end_matches('/')
            .to_string();
        let standard_agreement_url = get("STANDARD_AGREEMENT_URL")
            .unwrap_or_else(|| format!("{public_base_url}/terms/standard-msa"));

        let currency = get("CURRENCY")
            .map_or_else(|| "usd".into(), |c| c.trim().to_lowercase());
        if !SUPPORTED_CURRENCIES.contains(&currency.as_str()) {
            return Err(ConfigError::UnsupportedCurrency(currency));
        }

        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".into()),
            stripe,
            payment_timeout,
            public_base_url,
            standard_agreement_url,
            currency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert!(config.stripe.is_none());
        assert_eq!(config.payment_timeout, Duration::from_secs(10));
        assert_eq!(
            config.standard_agreement_url,
            "http://localhost:3000/terms/standard-msa"
        );
        assert_eq!(config.currency, "usd");
    }

    #[test]
    fn test_stripe_needs_both_keys() {
        let partial = config(&[("STRIPE_SECRET_KEY", "sk_test_1")]).unwrap();
        assert!(partial.stripe.is_none());

        let full = config(&[
            ("STRIPE_SECRET_KEY", "sk_test_1"),
            ("STRIPE_WEBHOOK_SECRET", "whsec_1"),
        ])
        .unwrap();
        assert_eq!(full.stripe.unwrap().webhook_secret, "whsec_1");
    }

    #[test]
    fn test_base_url_feeds_agreement_link() {
        let config = config(&[("PUBLIC_BASE_URL", "https://market.dev/")]).unwrap();
        assert_eq!(config.public_base_url, "https://market.dev");
        assert_eq!(
            config.standard_agreement_url,
            "https://market.dev/terms/standard-msa"
        );
    }

    #[test]
    fn test_invalid_timeout() {
        let err = config(&[("PAYMENT_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidTimeout { .. }));
        assert!(config(&[("PAYMENT_TIMEOUT_SECS", "0")]).is_err());
        assert_eq!(
            config(&[("PAYMENT_TIMEOUT_SECS", "3")]).unwrap().payment_timeout,
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_currency_must_be_chargeable() {
        assert_eq!(config(&[("CURRENCY", "EUR")]).unwrap().currency, "eur");
        assert_eq!(
            config(&[("CURRENCY", "jpy")]).unwrap_err(),
            ConfigError::UnsupportedCurrency("jpy".into())
        );
    }
}
