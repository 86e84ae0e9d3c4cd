//! Store Abstraction
//!
//! The relational store is reached only through [`Store`]. Each method maps
//! to one query or one statement; uniqueness (ledger event ids, page slugs,
//! feature links) is enforced by the store, as a database constraint would.

use std::collections::{BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::{MarketError, Result};
use crate::ids::{CheckoutId, ContractId, FeatureId, PageId, ProspectId, TierId, UserId};
use crate::model::{
    Charge, Checkout, Contract, Feature, Page, Prospect, Subscription, SubscriptionStatus, Tier,
    User,
};

/// Relational store seam
#[async_trait]
pub trait Store: Send + Sync {
    // Users
    async fn insert_user(&self, user: &User) -> Result<()>;
    async fn get_user(&self, id: UserId) -> Result<Option<User>>;
    async fn get_users(&self, ids: &[UserId]) -> Result<Vec<User>>;

    // Tiers
    async fn insert_tier(&self, tier: &Tier) -> Result<()>;
    async fn update_tier(&self, tier: &Tier) -> Result<()>;
    async fn get_tier(&self, id: TierId) -> Result<Option<Tier>>;
    async fn tiers_by_owner(&self, owner: UserId) -> Result<Vec<Tier>>;

    // Features and the tier/feature join
    async fn insert_feature(&self, feature: &Feature) -> Result<()>;
    async fn get_feature(&self, id: FeatureId) -> Result<Option<Feature>>;
    async fn features_for_tier(&self, tier: TierId) -> Result<Vec<Feature>>;

    /// Returns `true` when the link was newly created
    async fn link_feature(&self, tier: TierId, feature: FeatureId) -> Result<bool>;

    /// Returns `true` when a link was removed
    async fn unlink_feature(&self, tier: TierId, feature: FeatureId) -> Result<bool>;

    // Contracts
    async fn insert_contract(&self, contract: &Contract) -> Result<()>;
    async fn get_contract(&self, id: ContractId) -> Result<Option<Contract>>;
    async fn contracts_by_owner(&self, owner: UserId) -> Result<Vec<Contract>>;

    // Ledger. Inserts fail with `Conflict` when the external event id exists.
    async fn insert_charge(&self, charge: &Charge) -> Result<()>;
    async fn insert_subscription(&self, subscription: &Subscription) -> Result<()>;
    async fn charges_for_tiers(&self, tiers: &[TierId]) -> Result<Vec<Charge>>;
    async fn subscriptions_for_tiers(&self, tiers: &[TierId]) -> Result<Vec<Subscription>>;
    async fn subscription_by_external_id(&self, external_id: &str)
    -> Result<Option<Subscription>>;
    async fn set_subscription_status(
        &self,
        external_id: &str,
        status: SubscriptionStatus,
    ) -> Result<()>;

    // Prospects
    async fn insert_prospect(&self, prospect: &Prospect) -> Result<()>;
    async fn update_prospect(&self, prospect: &Prospect) -> Result<()>;
    async fn get_prospect(&self, id: ProspectId) -> Result<Option<Prospect>>;
    async fn prospects_by_owner(&self, maintainer: UserId) -> Result<Vec<Prospect>>;

    // Pages
    async fn insert_page(&self, page: &Page) -> Result<()>;
    async fn update_page(&self, page: &Page) -> Result<()>;
    async fn get_page(&self, id: PageId) -> Result<Option<Page>>;
    async fn pages_by_owner(&self, owner: UserId) -> Result<Vec<Page>>;

    // Checkouts
    async fn insert_checkout(&self, checkout: &Checkout) -> Result<()>;
    async fn update_checkout(&self, checkout: &Checkout) -> Result<()>;
    async fn get_checkout(&self, id: CheckoutId) -> Result<Option<Checkout>>;
}

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    tiers: Vec<Tier>,
    features: HashMap<FeatureId, Feature>,
    tier_features: HashMap<TierId, BTreeSet<FeatureId>>,
    contracts: Vec<Contract>,
    charges: Vec<Charge>,
    subscriptions: Vec<Subscription>,
    ledger_event_ids: HashSet<String>,
    prospects: Vec<Prospect>,
    pages: Vec<Page>,
    checkouts: HashMap<CheckoutId, Checkout>,
}

/// In-memory store (for development and tests)
///
/// A single lock over all tables keeps multi-table checks such as the
/// ledger uniqueness constraint atomic. Row vectors keep insertion order,
/// standing in for an auto-increment key.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        self.tables.write().await.users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn get_users(&self, ids: &[UserId]) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(ids.iter().filter_map(|id| tables.users.get(id).cloned()).collect())
    }

    async fn insert_tier(&self, tier: &Tier) -> Result<()> {
        self.tables.write().await.tiers.push(tier.clone());
        Ok(())
    }

    async fn update_tier(&self, tier: &Tier) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.tiers.iter_mut().find(|t| t.id == tier.id) {
            Some(row) => {
                *row = tier.clone();
                Ok(())
            }
            None => Err(MarketError::not_found("tier", tier.id)),
        }
    }

    async fn get_tier(&self, id: TierId) -> Result<Option<Tier>> {
        let tables = self.tables.read().await;
        Ok(tables.tiers.iter().find(|t| t.id == id).cloned())
    }

    async fn tiers_by_owner(&self, owner: UserId) -> Result<Vec<Tier>> {
        let tables = self.tables.read().await;
        Ok(tables.tiers.iter().filter(|t| t.owner == owner).cloned().collect())
    }

    async fn insert_feature(&self, feature: &Feature) -> Result<()> {
        self.tables
            .write()
            .await
            .features
            .insert(feature.id, feature.clone());
        Ok(())
    }

    async fn get_feature(&self, id: FeatureId) -> Result<Option<Feature>> {
        Ok(self.tables.read().await.features.get(&id).cloned())
    }

    async fn features_for_tier(&self, tier: TierId) -> Result<Vec<Feature>> {
        let tables = self.tables.read().await;
        let Some(links) = tables.tier_features.get(&tier) else {
            return Ok(Vec::new());
        };
        let mut features: Vec<Feature> = links
            .iter()
            .filter_map(|id| tables.features.get(id).cloned())
            .collect();
        features.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(features)
    }

    async fn link_feature(&self, tier: TierId, feature: FeatureId) -> Result<bool> {
        Ok(self
            .tables
            .write()
            .await
            .tier_features
            .entry(tier)
            .or_default()
            .insert(feature))
    }

    async fn unlink_feature(&self, tier: TierId, feature: FeatureId) -> Result<bool> {
        Ok(self
            .tables
            .write()
            .await
            .tier_features
            .get_mut(&tier)
            .is_some_and(|links| links.remove(&feature)))
    }

    async fn insert_contract(&self, contract: &Contract) -> Result<()> {
        self.tables.write().await.contracts.push(contract.clone());
        Ok(())
    }

    async fn get_contract(&self, id: ContractId) -> Result<Option<Contract>> {
        let tables = self.tables.read().await;
        Ok(tables.contracts.iter().find(|c| c.id == id).cloned())
    }

    async fn contracts_by_owner(&self, owner: UserId) -> Result<Vec<Contract>> {
        let tables = self.tables.read().await;
        Ok(tables
            .contracts
            .iter()
            .filter(|c| c.owner == owner)
            .cloned()
            .collect())
    }

    async fn insert_charge(&self, charge: &Charge) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.ledger_event_ids.insert(charge.external_event_id.clone()) {
            return Err(MarketError::Conflict(format!(
                "ledger already has a row for event {}",
                charge.external_event_id
            )));
        }
        tables.charges.push(charge.clone());
        Ok(())
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables
            .ledger_event_ids
            .insert(subscription.external_event_id.clone())
        {
            return Err(MarketError::Conflict(format!(
                "ledger already has a row for event {}",
                subscription.external_event_id
            )));
        }
        tables.subscriptions.push(subscription.clone());
        Ok(())
    }

    async fn charges_for_tiers(&self, tiers: &[TierId]) -> Result<Vec<Charge>> {
        let tables = self.tables.read().await;
        Ok(tables
            .charges
            .iter()
            .filter(|c| tiers.contains(&c.tier_id))
            .cloned()
            .collect())
    }

    async fn subscriptions_for_tiers(&self, tiers: &[TierId]) -> Result<Vec<Subscription>> {
        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions
            .iter()
            .filter(|s| tiers.contains(&s.tier_id))
            .cloned()
            .collect())
    }

    async fn subscription_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Subscription>> {
        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions
            .iter()
            .find(|s| s.external_subscription_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn set_subscription_status(
        &self,
        external_id: &str,
        status: SubscriptionStatus,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let subscription = tables
            .subscriptions
            .iter_mut()
            .find(|s| s.external_subscription_id.as_deref() == Some(external_id))
            .ok_or_else(|| MarketError::not_found("subscription", external_id))?;
        subscription.status = status;
        subscription.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_prospect(&self, prospect: &Prospect) -> Result<()> {
        self.tables.write().await.prospects.push(prospect.clone());
        Ok(())
    }

    async fn update_prospect(&self, prospect: &Prospect) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.prospects.iter_mut().find(|p| p.id == prospect.id) {
            Some(row) => {
                *row = prospect.clone();
                Ok(())
            }
            None => Err(MarketError::not_found("prospect", prospect.id)),
        }
    }

    async fn get_prospect(&self, id: ProspectId) -> Result<Option<Prospect>> {
        let tables = self.tables.read().await;
        Ok(tables.prospects.iter().find(|p| p.id == id).cloned())
    }

    async fn prospects_by_owner(&self, maintainer: UserId) -> Result<Vec<Prospect>> {
        let tables = self.tables.read().await;
        Ok(tables
            .prospects
            .iter()
            .filter(|p| p.maintainer == maintainer)
            .cloned()
            .collect())
    }

    async fn insert_page(&self, page: &Page) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables
            .pages
            .iter()
            .any(|p| p.owner == page.owner && p.slug == page.slug)
        {
            return Err(MarketError::Conflict(format!(
                "page slug '{}' is already used",
                page.slug
            )));
        }
        tables.pages.push(page.clone());
        Ok(())
    }

    async fn update_page(&self, page: &Page) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.pages.iter_mut().find(|p| p.id == page.id) {
            Some(row) => {
                *row = page.clone();
                Ok(())
            }
            None => Err(MarketError::not_found("page", page.id)),
        }
    }

    async fn get_page(&self, id: PageId) -> Result<Option<Page>> {
        let tables = self.tables.read().await;
        Ok(tables.pages.iter().find(|p| p.id == id).cloned())
    }

    async fn pages_by_owner(&self, owner: UserId) -> Result<Vec<Page>> {
        let tables = self.tables.read().await;
        Ok(tables.pages.iter().filter(|p| p.owner == owner).cloned().collect())
    }

    async fn insert_checkout(&self, checkout: &Checkout) -> Result<()> {
        self.tables
            .write()
            .await
            .checkouts
            .insert(checkout.id, checkout.clone());
        Ok(())
    }

    async fn update_checkout(&self, checkout: &Checkout) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.checkouts.get_mut(&checkout.id) {
            Some(row) => {
                *row = checkout.clone();
                Ok(())
            }
            None => Err(MarketError::not_found("checkout", checkout.id)),
        }
    }

    async fn get_checkout(&self, id: CheckoutId) -> Result<Option<Checkout>> {
        Ok(self.tables.read().await.checkouts.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Cadence;

    #[tokio::test]
    async fn test_ledger_event_ids_are_unique() {
        let store = MemoryStore::new();
        let tier = Tier::new(UserId::new(), "Audit", Cadence::Once, 500).unwrap();
        let customer = UserId::new();

        let first = Charge::new(customer, &tier, 500, "evt_1").unwrap();
        let second = Charge::new(customer, &tier, 500, "evt_1").unwrap();

        store.insert_charge(&first).await.unwrap();
        let err = store.insert_charge(&second).await.unwrap_err();
        assert!(matches!(err, MarketError::Conflict(_)));
        assert_eq!(store.charges_for_tiers(&[tier.id]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_feature_links_are_a_set() {
        let store = MemoryStore::new();
        let owner = UserId::new();
        let tier = TierId::new();
        let feature = Feature::new(owner, "priority-support").unwrap();
        store.insert_feature(&feature).await.unwrap();

        assert!(store.link_feature(tier, feature.id).await.unwrap());
        assert!(!store.link_feature(tier, feature.id).await.unwrap());
        assert_eq!(store.features_for_tier(tier).await.unwrap().len(), 1);

        assert!(store.unlink_feature(tier, feature.id).await.unwrap());
        assert!(!store.unlink_feature(tier, feature.id).await.unwrap());
        assert!(store.features_for_tier(tier).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_page_slug_unique_per_owner() {
        let store = MemoryStore::new();
        let owner = UserId::new();
        store
            .insert_page(&Page::new(owner, "About", "about").unwrap())
            .await
            .unwrap();
        assert!(store
            .insert_page(&Page::new(owner, "About again", "about").unwrap())
            .await
            .is_err());
        store
            .insert_page(&Page::new(UserId::new(), "About", "about").unwrap())
            .await
            .unwrap();
    }
}
