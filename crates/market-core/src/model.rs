//! Domain Models
//!
//! Typed entities for the sponsorship marketplace. Constructors validate
//! invariants so an invalid row can never be built, and money is carried as
//! integer minor units (cents) the way the payment processor expects it.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MarketError, Result};
use crate::ids::{
    ChargeId, CheckoutId, ContractId, FeatureId, PageId, ProspectId, SubscriptionId, TierId,
    UserId,
};

/// Default ISO currency for tiers
pub const DEFAULT_CURRENCY: &str = "usd";

/// A maintainer, a customer, or both
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub company: Option<String>,

    /// Connected payment account receiving this maintainer's payouts
    pub payment_account_id: Option<String>,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
            email: email.into(),
            company: None,
            payment_account_id: None,
        }
    }

    /// Stand-in for a customer whose profile row is missing. Keeps the id so
    /// billing rows still join against it.
    pub fn placeholder(id: UserId) -> Self {
        Self {
            id,
            name: "Unknown customer".into(),
            email: String::new(),
            company: None,
            payment_account_id: None,
        }
    }

    #[must_use]
    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    #[must_use]
    pub fn with_payment_account(mut self, account_id: impl Into<String>) -> Self {
        self.payment_account_id = Some(account_id.into());
        self
    }
}

/// Billing frequency of a tier
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Month,
    Quarter,
    Year,
    Once,
}

impl Cadence {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::Year => "year",
            Self::Once => "once",
        }
    }

    /// `Once` tiers settle as a single Charge; everything else subscribes
    pub const fn is_recurring(&self) -> bool {
        !matches!(self, Self::Once)
    }

    /// Length of one billing period in months
    pub const fn period_months(&self) -> Option<u32> {
        match self {
            Self::Month => Some(1),
            Self::Quarter => Some(3),
            Self::Year => Some(12),
            Self::Once => None,
        }
    }
}

impl FromStr for Cadence {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "month" | "monthly" => Ok(Self::Month),
            "quarter" | "quarterly" => Ok(Self::Quarter),
            "year" | "yearly" | "annual" => Ok(Self::Year),
            "once" | "one-time" => Ok(Self::Once),
            other => Err(MarketError::validation(format!(
                "invalid cadence '{other}', expected month, quarter, year or once"
            ))),
        }
    }
}

impl std::fmt::Display for Cadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A priced offering owned by one maintainer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tier {
    pub id: TierId,
    pub owner: UserId,
    pub name: String,
    pub description: String,
    pub tagline: String,
    pub cadence: Cadence,

    /// Price per period (or the one-time price) in cents
    pub price_cents: i64,
    pub currency: String,

    /// Unpublished tiers are drafts, hidden from the public site and embeds
    pub published: bool,

    /// Contract the maintainer requires at checkout, if any
    pub contract_id: Option<ContractId>,
    pub created_at: DateTime<Utc>,
}

impl Tier {
    pub fn new(
        owner: UserId,
        name: impl Into<String>,
        cadence: Cadence,
        price_cents: i64,
    ) -> Result<Self> {
        let name = name.into();
        validate_tier_fields(&name, price_cents)?;
        Ok(Self {
            id: TierId::new(),
            owner,
            name: name.trim().to_string(),
            description: String::new(),
            tagline: String::new(),
            cadence,
            price_cents,
            currency: DEFAULT_CURRENCY.into(),
            published: true,
            contract_id: None,
            created_at: Utc::now(),
        })
    }

    #[must_use]
    pub fn with_copy(mut self, description: impl Into<String>, tagline: impl Into<String>) -> Self {
        self.description = description.into();
        self.tagline = tagline.into();
        self
    }

    /// Human-readable price, e.g. `$10.00/month` or `EUR 250.00 once`.
    /// Prices are stored in minor units of a two-decimal currency.
    pub fn display_price(&self) -> String {
        let major = self.price_cents / 100;
        let minor = self.price_cents % 100;
        let amount = if self.currency == DEFAULT_CURRENCY {
            format!("${major}.{minor:02}")
        } else {
            format!("{} {major}.{minor:02}", self.currency.to_uppercase())
        };
        match self.cadence {
            Cadence::Once => format!("{amount} once"),
            cadence => format!("{amount}/{cadence}"),
        }
    }
}

/// Shared by construction and edits
pub fn validate_tier_fields(name: &str, price_cents: i64) -> Result<()> {
    if name.trim().is_empty() {
        return Err(MarketError::validation("tier name is required"));
    }
    if price_cents < 0 {
        return Err(MarketError::validation("tier price cannot be negative"));
    }
    Ok(())
}

/// Capability flag attachable to any of the owner's tiers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub id: FeatureId,
    pub owner: UserId,
    pub name: String,
}

impl Feature {
    pub fn new(owner: UserId, name: impl Into<String>) -> Result<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(MarketError::validation("feature name is required"));
        }
        Ok(Self {
            id: FeatureId::new(),
            owner,
            name,
        })
    }
}

/// Maintainer-supplied legal terms shown at checkout
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub owner: UserId,
    pub name: String,
    pub attachment_url: String,
    pub created_at: DateTime<Utc>,
}

impl Contract {
    pub fn new(
        owner: UserId,
        name: impl Into<String>,
        attachment_url: impl Into<String>,
    ) -> Result<Self> {
        let name = name.into();
        let attachment_url = attachment_url.into();
        if name.trim().is_empty() {
            return Err(MarketError::validation("contract name is required"));
        }
        if !(attachment_url.starts_with("https://") || attachment_url.starts_with("http://")) {
            return Err(MarketError::validation(
                "contract attachment must be an http(s) URL",
            ));
        }
        Ok(Self {
            id: ContractId::new(),
            owner,
            name: name.trim().to_string(),
            attachment_url,
            created_at: Utc::now(),
        })
    }
}

/// Settlement state of a one-time payment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    Succeeded,
}

/// Completed one-time payment. Immutable once written.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charge {
    pub id: ChargeId,
    pub customer: UserId,
    pub tier_id: TierId,
    pub amount_cents: i64,
    pub currency: String,
    pub status: ChargeStatus,

    /// Processor event that produced this row; unique across the ledger
    pub external_event_id: String,
    pub created_at: DateTime<Utc>,
}

impl Charge {
    pub fn new(
        customer: UserId,
        tier: &Tier,
        amount_cents: i64,
        external_event_id: impl Into<String>,
    ) -> Result<Self> {
        if tier.cadence.is_recurring() {
            return Err(MarketError::validation(format!(
                "tier {} bills every {}, charges are for one-time tiers",
                tier.id, tier.cadence
            )));
        }
        Ok(Self {
            id: ChargeId::new(),
            customer,
            tier_id: tier.id,
            amount_cents,
            currency: tier.currency.clone(),
            status: ChargeStatus::Succeeded,
            external_event_id: external_event_id.into(),
            created_at: Utc::now(),
        })
    }
}

/// Lifecycle of a recurring relationship
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
        }
    }

    /// `Canceled` is terminal; a past-due subscription may recover
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Active, Self::PastDue | Self::Canceled)
                | (Self::PastDue, Self::Active | Self::Canceled)
        )
    }
}

impl FromStr for SubscriptionStatus {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" | "trialing" => Ok(Self::Active),
            "past_due" | "unpaid" | "incomplete" => Ok(Self::PastDue),
            "canceled" | "cancelled" | "incomplete_expired" => Ok(Self::Canceled),
            other => Err(MarketError::validation(format!(
                "unknown subscription status '{other}'"
            ))),
        }
    }
}

/// Recurring payment relationship between a customer and a tier
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub customer: UserId,
    pub tier_id: TierId,
    pub status: SubscriptionStatus,
    pub cadence: Cadence,
    pub amount_cents: i64,

    /// Processor event that produced this row; unique across the ledger
    pub external_event_id: String,

    /// Processor-side subscription id, used by later status events
    pub external_subscription_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(
        customer: UserId,
        tier: &Tier,
        amount_cents: i64,
        external_event_id: impl Into<String>,
        external_subscription_id: Option<String>,
    ) -> Result<Self> {
        if !tier.cadence.is_recurring() {
            return Err(MarketError::validation(format!(
                "tier {} is a one-time purchase and cannot be subscribed to",
                tier.id
            )));
        }
        let now = Utc::now();
        Ok(Self {
            id: SubscriptionId::new(),
            customer,
            tier_id: tier.id,
            status: SubscriptionStatus::Active,
            cadence: tier.cadence,
            amount_cents,
            external_event_id: external_event_id.into(),
            external_subscription_id,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Pre-purchase lead a maintainer is tracking
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prospect {
    pub id: ProspectId,
    pub maintainer: UserId,
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub tier_ids: BTreeSet<TierId>,
    pub shortlisted: bool,
    pub created_at: DateTime<Utc>,
}

impl Prospect {
    pub fn new(maintainer: UserId, name: impl Into<String>) -> Result<Self> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(MarketError::validation("prospect name is required"));
        }
        Ok(Self {
            id: ProspectId::new(),
            maintainer,
            name,
            company: None,
            email: None,
            tier_ids: BTreeSet::new(),
            shortlisted: false,
            created_at: Utc::now(),
        })
    }
}

/// Page on a maintainer's site
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    pub owner: UserId,
    pub title: String,
    pub slug: String,
    pub draft: bool,
    pub created_at: DateTime<Utc>,
}

impl Page {
    pub fn new(owner: UserId, title: impl Into<String>, slug: impl Into<String>) -> Result<Self> {
        let title = title.into().trim().to_string();
        let slug = slug.into().trim().trim_matches('/').to_lowercase();
        if title.is_empty() {
            return Err(MarketError::validation("page title is required"));
        }
        if slug.is_empty()
            || !slug
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '/')
        {
            return Err(MarketError::validation(format!(
                "invalid page slug '{slug}': use letters, digits, '-' and '/'"
            )));
        }
        Ok(Self {
            id: PageId::new(),
            owner,
            title,
            slug,
            draft: true,
            created_at: Utc::now(),
        })
    }
}

/// Progress of an initiated checkout
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    Processing,
    Succeeded,
    Failed,
}

/// Persisted link between phase one (initiate) and phase two (payment event)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkout {
    pub id: CheckoutId,
    pub tier_id: TierId,
    pub customer: UserId,
    pub status: CheckoutStatus,
    pub external_session_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkout {
    pub fn new(tier_id: TierId, customer: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: CheckoutId::new(),
            tier_id,
            customer,
            status: CheckoutStatus::Processing,
            external_session_id: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cadence_parsing() {
        assert_eq!("month".parse::<Cadence>().unwrap(), Cadence::Month);
        assert_eq!("Quarter".parse::<Cadence>().unwrap(), Cadence::Quarter);
        assert_eq!("once".parse::<Cadence>().unwrap(), Cadence::Once);
        let err = "weekly".parse::<Cadence>().unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_tier_validation() {
        let owner = UserId::new();
        assert!(Tier::new(owner, "  ", Cadence::Month, 1000).is_err());
        assert!(Tier::new(owner, "Gold", Cadence::Month, -1).is_err());

        let tier = Tier::new(owner, "Gold", Cadence::Month, 1000).unwrap();
        assert!(tier.published);
        assert_eq!(tier.display_price(), "$10.00/month");
    }

    #[test]
    fn test_display_price_names_other_currencies() {
        let mut audit = Tier::new(UserId::new(), "Audit", Cadence::Once, 250_005).unwrap();
        audit.currency = "eur".into();
        assert_eq!(audit.display_price(), "EUR 2500.05 once");
    }

    #[test]
    fn test_once_tiers_cannot_subscribe() {
        let owner = UserId::new();
        let once = Tier::new(owner, "Audit", Cadence::Once, 50_000).unwrap();
        let monthly = Tier::new(owner, "Gold", Cadence::Month, 1000).unwrap();
        let customer = UserId::new();

        assert!(Subscription::new(customer, &once, 50_000, "evt_1", None).is_err());
        assert!(Charge::new(customer, &once, 50_000, "evt_1").is_ok());
        assert!(Charge::new(customer, &monthly, 1000, "evt_2").is_err());
    }

    #[test]
    fn test_subscription_lifecycle() {
        use SubscriptionStatus::*;
        assert!(Active.can_transition_to(PastDue));
        assert!(PastDue.can_transition_to(Canceled));
        assert!(PastDue.can_transition_to(Active));
        assert!(!Canceled.can_transition_to(Active));
        assert!(!Canceled.can_transition_to(PastDue));
    }

    #[test]
    fn test_page_slug_normalised() {
        let page = Page::new(UserId::new(), "About", "/About-Us/").unwrap();
        assert_eq!(page.slug, "about-us");
        assert!(page.draft);
        assert!(Page::new(UserId::new(), "About", "about us").is_err());
    }

    #[test]
    fn test_contract_requires_url() {
        let owner = UserId::new();
        assert!(Contract::new(owner, "MSA", "ftp://x").is_err());
        assert!(Contract::new(owner, "MSA", "https://example.com/msa.pdf").is_ok());
    }
}
