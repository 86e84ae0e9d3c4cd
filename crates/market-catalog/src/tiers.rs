//! Tier & Feature Management
//!
//! Maintainers publish tiers (subscription plans or one-time purchases) and
//! attach features to them. Attach and detach are set operations, so
//! repeating either one is a successful no-op.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use market_core::{
    Cadence, Feature, FeatureId, MarketError, RequestContext, Result, Store, Tier, TierId, UserId,
    model::{DEFAULT_CURRENCY, validate_tier_fields},
    retry_read,
};

/// Input for creating a tier. `cadence` arrives as text from forms and APIs
/// and is validated here.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewTier {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tagline: String,
    pub cadence: String,

    /// Price in cents
    pub price: i64,

    /// Create as an unpublished draft
    #[serde(default)]
    pub draft: bool,
}

/// Partial edit of a tier; `None` leaves a field unchanged
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TierUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tagline: Option<String>,
    pub price: Option<i64>,
    pub published: Option<bool>,
}

/// A tier together with its attached features
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierWithFeatures {
    #[serde(flatten)]
    pub tier: Tier,
    pub features: Vec<Feature>,
}

/// Tier and feature operations over the store
#[derive(Clone)]
pub struct TierService {
    store: Arc<dyn Store>,
    currency: String,
}

impl TierService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            currency: DEFAULT_CURRENCY.into(),
        }
    }

    /// Currency stamped on newly created tiers
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into().to_lowercase();
        self
    }

    /// Create a tier owned by the acting maintainer
    pub async fn create_tier(&self, ctx: &RequestContext, input: NewTier) -> Result<Tier> {
        let owner = ctx.require_actor()?;
        let cadence: Cadence = input.cadence.parse()?;

        let mut tier = Tier::new(owner, input.name, cadence, input.price)?
            .with_copy(input.description, input.tagline);
        tier.published = !input.draft;
        tier.currency.clone_from(&self.currency);

        self.store.insert_tier(&tier).await?;

        tracing::info!(
            request_id = %ctx.request_id,
            tier_id = %tier.id,
            owner = %owner,
            cadence = %tier.cadence,
            price_cents = tier.price_cents,
            "Created tier"
        );

        Ok(tier)
    }

    /// Edit price, copy or publish state of an owned tier
    pub async fn update_tier(
        &self,
        ctx: &RequestContext,
        tier_id: TierId,
        update: TierUpdate,
    ) -> Result<Tier> {
        let mut tier = self.get_tier(tier_id).await?;
        ctx.require_owner(tier.owner, "tier")?;

        if let Some(name) = update.name {
            tier.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            tier.description = description;
        }
        if let Some(tagline) = update.tagline {
            tier.tagline = tagline;
        }
        if let Some(price) = update.price {
            tier.price_cents = price;
        }
        if let Some(published) = update.published {
            tier.published = published;
        }
        validate_tier_fields(&tier.name, tier.price_cents)?;

        self.store.update_tier(&tier).await?;
        tracing::info!(request_id = %ctx.request_id, tier_id = %tier.id, "Updated tier");
        Ok(tier)
    }

    /// Create a feature the acting maintainer can attach to their tiers
    pub async fn create_feature(&self, ctx: &RequestContext, name: &str) -> Result<Feature> {
        let owner = ctx.require_actor()?;
        let feature = Feature::new(owner, name)?;
        self.store.insert_feature(&feature).await?;
        tracing::debug!(feature_id = %feature.id, name = %feature.name, "Created feature");
        Ok(feature)
    }

    /// Attach a feature to a tier. Already attached is a success.
    pub async fn attach_feature(
        &self,
        ctx: &RequestContext,
        tier_id: TierId,
        feature_id: FeatureId,
    ) -> Result<()> {
        self.authorize_link(ctx, tier_id, feature_id).await?;
        let created = self.store.link_feature(tier_id, feature_id).await?;
        tracing::debug!(
            tier_id = %tier_id,
            feature_id = %feature_id,
            created,
            "Attached feature"
        );
        Ok(())
    }

    /// Detach a feature from a tier. Not attached is a success.
    pub async fn detach_feature(
        &self,
        ctx: &RequestContext,
        tier_id: TierId,
        feature_id: FeatureId,
    ) -> Result<()> {
        self.authorize_link(ctx, tier_id, feature_id).await?;
        let removed = self.store.unlink_feature(tier_id, feature_id).await?;
        tracing::debug!(
            tier_id = %tier_id,
            feature_id = %feature_id,
            removed,
            "Detached feature"
        );
        Ok(())
    }

    async fn authorize_link(
        &self,
        ctx: &RequestContext,
        tier_id: TierId,
        feature_id: FeatureId,
    ) -> Result<()> {
        let tier = self.get_tier(tier_id).await?;
        ctx.require_owner(tier.owner, "tier")?;

        let feature = self
            .store
            .get_feature(feature_id)
            .await?
            .ok_or_else(|| MarketError::not_found("feature", feature_id))?;
        ctx.require_owner(feature.owner, "feature")?;
        Ok(())
    }

    pub async fn get_tier(&self, tier_id: TierId) -> Result<Tier> {
        self.store
            .get_tier(tier_id)
            .await?
            .ok_or_else(|| MarketError::not_found("tier", tier_id))
    }

    /// Every tier the user owns, drafts included
    pub async fn list_tiers_for_user(&self, user_id: UserId) -> Result<Vec<TierWithFeatures>> {
        let tiers = retry_read("tiers_by_owner", || self.store.tiers_by_owner(user_id)).await?;
        self.with_features(tiers).await
    }

    /// Published tiers only, for the public site and embeds
    pub async fn list_published_tiers_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<TierWithFeatures>> {
        let tiers = retry_read("tiers_by_owner", || self.store.tiers_by_owner(user_id)).await?;
        let published = tiers.into_iter().filter(|t| t.published).collect();
        self.with_features(published).await
    }

    async fn with_features(&self, tiers: Vec<Tier>) -> Result<Vec<TierWithFeatures>> {
        let mut out = Vec::with_capacity(tiers.len());
        for tier in tiers {
            let features =
                retry_read("features_for_tier", || self.store.features_for_tier(tier.id)).await?;
            out.push(TierWithFeatures { tier, features });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::MemoryStore;

    fn gold() -> NewTier {
        NewTier {
            name: "Gold".into(),
            description: "Top sponsors".into(),
            tagline: "For companies that ship on us".into(),
            cadence: "month".into(),
            price: 1000,
            draft: false,
        }
    }

    fn service() -> TierService {
        TierService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_gold_tier_with_priority_support() {
        let service = service();
        let maintainer = UserId::new();
        let ctx = RequestContext::for_user(maintainer);

        let tier = service.create_tier(&ctx, gold()).await.unwrap();
        let feature = service.create_feature(&ctx, "priority-support").await.unwrap();
        service.attach_feature(&ctx, tier.id, feature.id).await.unwrap();

        let tiers = service.list_tiers_for_user(maintainer).await.unwrap();
        assert_eq!(tiers.len(), 1);
        assert_eq!(tiers[0].tier.name, "Gold");
        assert_eq!(tiers[0].tier.cadence, Cadence::Month);
        assert_eq!(tiers[0].tier.price_cents, 1000);
        assert_eq!(tiers[0].features.len(), 1);
        assert_eq!(tiers[0].features[0].name, "priority-support");
    }

    #[tokio::test]
    async fn test_attach_and_detach_are_idempotent() {
        let service = service();
        let maintainer = UserId::new();
        let ctx = RequestContext::for_user(maintainer);
        let tier = service.create_tier(&ctx, gold()).await.unwrap();
        let feature = service.create_feature(&ctx, "logo-on-readme").await.unwrap();

        service.attach_feature(&ctx, tier.id, feature.id).await.unwrap();
        let once = service.list_tiers_for_user(maintainer).await.unwrap();
        service.attach_feature(&ctx, tier.id, feature.id).await.unwrap();
        let twice = service.list_tiers_for_user(maintainer).await.unwrap();
        assert_eq!(once, twice);

        service.detach_feature(&ctx, tier.id, feature.id).await.unwrap();
        service.detach_feature(&ctx, tier.id, feature.id).await.unwrap();
        let tiers = service.list_tiers_for_user(maintainer).await.unwrap();
        assert!(tiers[0].features.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_cadence_is_validation_error() {
        let service = service();
        let ctx = RequestContext::for_user(UserId::new());
        let mut input = gold();
        input.cadence = "fortnightly".into();

        let err = service.create_tier(&ctx, input).await.unwrap_err();
        assert!(matches!(err, MarketError::Validation(_)));
    }

    #[tokio::test]
    async fn test_anonymous_cannot_create_tier() {
        let service = service();
        let err = service
            .create_tier(&RequestContext::anonymous(), gold())
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Authorization(_)));
    }

    #[tokio::test]
    async fn test_only_owner_can_attach() {
        let service = service();
        let owner_ctx = RequestContext::for_user(UserId::new());
        let tier = service.create_tier(&owner_ctx, gold()).await.unwrap();

        let intruder = RequestContext::for_user(UserId::new());
        let feature = service.create_feature(&intruder, "hijack").await.unwrap();
        let err = service
            .attach_feature(&intruder, tier.id, feature.id)
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::Authorization(_)));
    }

    #[tokio::test]
    async fn test_attach_unknown_feature_is_not_found() {
        let service = service();
        let ctx = RequestContext::for_user(UserId::new());
        let tier = service.create_tier(&ctx, gold()).await.unwrap();
        let err = service
            .attach_feature(&ctx, tier.id, FeatureId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MarketError::NotFound { entity: "feature", .. }));
    }

    #[tokio::test]
    async fn test_published_listing_hides_drafts() {
        let service = service();
        let maintainer = UserId::new();
        let ctx = RequestContext::for_user(maintainer);

        service.create_tier(&ctx, gold()).await.unwrap();
        let mut draft = gold();
        draft.name = "Platinum".into();
        draft.draft = true;
        let platinum = service.create_tier(&ctx, draft).await.unwrap();

        assert_eq!(service.list_tiers_for_user(maintainer).await.unwrap().len(), 2);
        let public = service.list_published_tiers_for_user(maintainer).await.unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].tier.name, "Gold");

        let update = TierUpdate {
            published: Some(true),
            ..TierUpdate::default()
        };
        service.update_tier(&ctx, platinum.id, update).await.unwrap();
        assert_eq!(
            service.list_published_tiers_for_user(maintainer).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn test_update_rejects_negative_price() {
        let service = service();
        let ctx = RequestContext::for_user(UserId::new());
        let tier = service.create_tier(&ctx, gold()).await.unwrap();
        let update = TierUpdate {
            price: Some(-5),
            ..TierUpdate::default()
        };
        assert!(service.update_tier(&ctx, tier.id, update).await.is_err());
        assert_eq!(service.get_tier(tier.id).await.unwrap().price_cents, 1000);
    }

    #[tokio::test]
    async fn test_configured_currency() {
        let service = TierService::new(Arc::new(MemoryStore::new())).with_currency("EUR");
        let ctx = RequestContext::for_user(UserId::new());

        let tier = service.create_tier(&ctx, gold()).await.unwrap();
        assert_eq!(tier.currency, "eur");
    }
}
