//! Customer & Lead Dashboards
//!
//! Read-only projections for a maintainer's dashboard. Billing rows are
//! always filtered through the maintainer's own tier ids first, so another
//! maintainer's charges and subscriptions can never appear.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use market_core::{
    Charge, MarketError, Prospect, ProspectId, RequestContext, Result, Store, Subscription, Tier,
    TierId, User, UserId, retry_read,
};

/// A customer with their billing rows on one maintainer's tiers
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomerView {
    pub customer: User,
    pub charges: Vec<Charge>,
    pub subscriptions: Vec<Subscription>,

    /// Sum of charges plus one period of every subscription, in dollars
    pub lifetime_value: Decimal,
}

/// A shortlisted lead and the tiers it is interested in
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LeadView {
    pub prospect: Prospect,
    pub tiers: Vec<Tier>,
}

/// Input for tracking a new lead
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewProspect {
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub tier_ids: Vec<TierId>,
}

/// Dashboard projections and prospect bookkeeping
#[derive(Clone)]
pub struct CustomerDirectory {
    store: Arc<dyn Store>,
}

fn cents_to_dollars(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

impl CustomerDirectory {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn owned_tiers(&self, maintainer: UserId) -> Result<Vec<Tier>> {
        retry_read("tiers_by_owner", || self.store.tiers_by_owner(maintainer)).await
    }

    /// Customers of `maintainer` joined with their charges and subscriptions
    pub async fn get_customers_with_charges_and_subscriptions(
        &self,
        maintainer: UserId,
    ) -> Result<Vec<CustomerView>> {
        let tier_ids: Vec<TierId> = self
            .owned_tiers(maintainer)
            .await?
            .iter()
            .map(|t| t.id)
            .collect();
        if tier_ids.is_empty() {
            return Ok(Vec::new());
        }

        let charges =
            retry_read("charges_for_tiers", || self.store.charges_for_tiers(&tier_ids)).await?;
        let subscriptions =
            retry_read("subscriptions_for_tiers", || self.store.subscriptions_for_tiers(&tier_ids))
                .await?;

        // BTreeMap keeps the dashboard order stable between requests
        let mut by_customer: BTreeMap<UserId, (Vec<Charge>, Vec<Subscription>)> = BTreeMap::new();
        for charge in charges.into_iter().filter(|c| tier_ids.contains(&c.tier_id)) {
            by_customer.entry(charge.customer).or_default().0.push(charge);
        }
        for sub in subscriptions
            .into_iter()
            .filter(|s| tier_ids.contains(&s.tier_id))
        {
            by_customer.entry(sub.customer).or_default().1.push(sub);
        }

        let ids: Vec<UserId> = by_customer.keys().copied().collect();
        let users: HashMap<UserId, User> = self
            .store
            .get_users(&ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        let mut views = Vec::with_capacity(by_customer.len());
        for (id, (charges, subscriptions)) in by_customer {
            let customer = users.get(&id).cloned().unwrap_or_else(|| {
                tracing::warn!(customer = %id, "Ledger references unknown customer");
                User::placeholder(id)
            });
            let lifetime_value = charges
                .iter()
                .map(|c| cents_to_dollars(c.amount_cents))
                .chain(subscriptions.iter().map(|s| cents_to_dollars(s.amount_cents)))
                .sum();
            views.push(CustomerView {
                customer,
                charges,
                subscriptions,
                lifetime_value,
            });
        }

        tracing::debug!(maintainer = %maintainer, customers = views.len(), "Built customer view");
        Ok(views)
    }

    /// Shortlisted prospects with the maintainer's tiers they want
    pub async fn get_shortlisted_leads(&self, maintainer: UserId) -> Result<Vec<LeadView>> {
        let tiers: HashMap<TierId, Tier> = self
            .owned_tiers(maintainer)
            .await?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let prospects =
            retry_read("prospects_by_owner", || self.store.prospects_by_owner(maintainer)).await?;

        Ok(prospects
            .into_iter()
            .filter(|p| p.shortlisted)
            .map(|prospect| {
                let tiers = prospect
                    .tier_ids
                    .iter()
                    .filter_map(|id| tiers.get(id).cloned())
                    .collect();
                LeadView { prospect, tiers }
            })
            .collect())
    }

    /// Track a new lead for the acting maintainer
    pub async fn add_prospect(&self, ctx: &RequestContext, input: NewProspect) -> Result<Prospect> {
        let maintainer = ctx.require_actor()?;
        let mut prospect = Prospect::new(maintainer, input.name)?;
        prospect.company = input.company;
        prospect.email = input.email;

        for tier_id in input.tier_ids {
            let tier = self
                .store
                .get_tier(tier_id)
                .await?
                .ok_or_else(|| MarketError::not_found("tier", tier_id))?;
            ctx.require_owner(tier.owner, "tier")?;
            prospect.tier_ids.insert(tier_id);
        }

        self.store.insert_prospect(&prospect).await?;
        tracing::info!(prospect_id = %prospect.id, maintainer = %maintainer, "Added prospect");
        Ok(prospect)
    }

    /// Flag or unflag a lead as shortlisted
    pub async fn set_shortlisted(
        &self,
        ctx: &RequestContext,
        prospect_id: ProspectId,
        shortlisted: bool,
    ) -> Result<Prospect> {
        let mut prospect = self
            .store
            .get_prospect(prospect_id)
            .await?
            .ok_or_else(|| MarketError::not_found("prospect", prospect_id))?;
        ctx.require_owner(prospect.maintainer, "prospect")?;

        prospect.shortlisted = shortlisted;
        self.store.update_prospect(&prospect).await?;
        Ok(prospect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::{Cadence, MemoryStore};
    use rust_decimal_macros::dec;

    struct Fixture {
        store: Arc<MemoryStore>,
        directory: CustomerDirectory,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            Self {
                directory: CustomerDirectory::new(store.clone()),
                store,
            }
        }

        async fn user(&self, name: &str) -> User {
            let user = User::new(name, format!("{name}@example.com"));
            self.store.insert_user(&user).await.unwrap();
            user
        }

        async fn tier(&self, owner: UserId, cadence: Cadence, price: i64) -> Tier {
            let tier = Tier::new(owner, "Tier", cadence, price).unwrap();
            self.store.insert_tier(&tier).await.unwrap();
            tier
        }
    }

    #[tokio::test]
    async fn test_customers_scoped_to_maintainer() {
        let fx = Fixture::new();
        let alice = fx.user("alice").await;
        let bob = fx.user("bob").await;
        let carol = fx.user("carol").await;

        let alice_once = fx.tier(alice.id, Cadence::Once, 25_000).await;
        let alice_monthly = fx.tier(alice.id, Cadence::Month, 1000).await;
        let bob_monthly = fx.tier(bob.id, Cadence::Month, 9900).await;

        fx.store
            .insert_charge(&Charge::new(carol.id, &alice_once, 25_000, "evt_a1").unwrap())
            .await
            .unwrap();
        fx.store
            .insert_subscription(
                &Subscription::new(carol.id, &alice_monthly, 1000, "evt_a2", None).unwrap(),
            )
            .await
            .unwrap();
        fx.store
            .insert_subscription(
                &Subscription::new(carol.id, &bob_monthly, 9900, "evt_b1", None).unwrap(),
            )
            .await
            .unwrap();

        let views = fx
            .directory
            .get_customers_with_charges_and_subscriptions(alice.id)
            .await
            .unwrap();
        assert_eq!(views.len(), 1);
        let carol_view = &views[0];
        assert_eq!(carol_view.customer.id, carol.id);
        assert_eq!(carol_view.charges.len(), 1);
        assert_eq!(carol_view.subscriptions.len(), 1);
        assert!(carol_view
            .subscriptions
            .iter()
            .all(|s| s.tier_id != bob_monthly.id));
        assert_eq!(carol_view.lifetime_value, dec!(260.00));

        let bob_views = fx
            .directory
            .get_customers_with_charges_and_subscriptions(bob.id)
            .await
            .unwrap();
        assert_eq!(bob_views.len(), 1);
        assert!(bob_views[0].charges.is_empty());
        assert_eq!(bob_views[0].subscriptions[0].tier_id, bob_monthly.id);
    }

    #[tokio::test]
    async fn test_customer_without_profile_still_listed() {
        let fx = Fixture::new();
        let maintainer = fx.user("maintainer").await;
        let gold = fx.tier(maintainer.id, Cadence::Once, 5000).await;
        let ghost = UserId::new();

        fx.store
            .insert_charge(&Charge::new(ghost, &gold, 5000, "evt_ghost").unwrap())
            .await
            .unwrap();

        let views = fx
            .directory
            .get_customers_with_charges_and_subscriptions(maintainer.id)
            .await
            .unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].customer.id, ghost);
        assert_eq!(views[0].customer.name, "Unknown customer");
        assert_eq!(views[0].charges.len(), 1);
        assert_eq!(views[0].lifetime_value, dec!(50.00));
    }

    #[tokio::test]
    async fn test_maintainer_without_tiers_has_no_customers() {
        let fx = Fixture::new();
        let views = fx
            .directory
            .get_customers_with_charges_and_subscriptions(UserId::new())
            .await
            .unwrap();
        assert!(views.is_empty());
    }

    #[tokio::test]
    async fn test_shortlisted_leads_with_tiers() {
        let fx = Fixture::new();
        let maintainer = fx.user("maintainer").await;
        let ctx = RequestContext::for_user(maintainer.id);
        let gold = fx.tier(maintainer.id, Cadence::Month, 1000).await;

        let acme = fx
            .directory
            .add_prospect(
                &ctx,
                NewProspect {
                    name: "Acme".into(),
                    company: Some("Acme Corp".into()),
                    tier_ids: vec![gold.id],
                    ..NewProspect::default()
                },
            )
            .await
            .unwrap();
        fx.directory
            .add_prospect(
                &ctx,
                NewProspect {
                    name: "Initech".into(),
                    ..NewProspect::default()
                },
            )
            .await
            .unwrap();

        assert!(fx
            .directory
            .get_shortlisted_leads(maintainer.id)
            .await
            .unwrap()
            .is_empty());

        fx.directory.set_shortlisted(&ctx, acme.id, true).await.unwrap();
        let leads = fx.directory.get_shortlisted_leads(maintainer.id).await.unwrap();
        assert_eq!(leads.len(), 1);
        assert_eq!(leads[0].prospect.name, "Acme");
        assert_eq!(leads[0].tiers.len(), 1);
        assert_eq!(leads[0].tiers[0].id, gold.id);
    }

    #[tokio::test]
    async fn test_prospect_cannot_reference_foreign_tier() {
        let fx = Fixture::new();
        let other_tier = fx.tier(UserId::new(), Cadence::Year, 12_000).await;
        let ctx = RequestContext::for_user(UserId::new());
        let err = fx
            .directory
            .add_prospect(
                &ctx,
                NewProspect {
                    name: "Sneaky".into(),
                    tier_ids: vec![other_tier.id],
                    ..NewProspect::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Authorization(_)));
    }
}
