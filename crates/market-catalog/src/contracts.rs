//! Contract Resolution
//!
//! Checkout always shows a contract link. A maintainer's own contract wins;
//! otherwise the platform's standard agreement stands in. The fallback is a
//! variant of [`ContractRef`], never a missing value.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use market_core::{
    Contract, ContractId, MarketError, RequestContext, Result, Store, Tier, TierId,
};

/// Platform-wide default terms, shown when a maintainer supplies none
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardAgreement {
    pub name: String,
    pub url: String,
}

impl StandardAgreement {
    pub const DEFAULT_NAME: &'static str = "Standard MSA";

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            name: Self::DEFAULT_NAME.into(),
            url: url.into(),
        }
    }
}

/// The contract a checkout must present
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContractRef {
    /// Maintainer-supplied contract
    Custom(Contract),

    /// Platform default terms (not a stored row)
    Standard(StandardAgreement),
}

impl ContractRef {
    pub fn name(&self) -> &str {
        match self {
            Self::Custom(contract) => &contract.name,
            Self::Standard(standard) => &standard.name,
        }
    }

    /// Link the checkout page renders
    pub fn link(&self) -> &str {
        match self {
            Self::Custom(contract) => &contract.attachment_url,
            Self::Standard(standard) => &standard.url,
        }
    }

    pub const fn is_standard(&self) -> bool {
        matches!(self, Self::Standard(_))
    }
}

/// Contract bookkeeping and resolution
#[derive(Clone)]
pub struct ContractResolver {
    store: Arc<dyn Store>,
    standard: StandardAgreement,
}

impl ContractResolver {
    pub fn new(store: Arc<dyn Store>, standard: StandardAgreement) -> Self {
        Self { store, standard }
    }

    pub const fn standard(&self) -> &StandardAgreement {
        &self.standard
    }

    /// Register a contract for the acting maintainer
    pub async fn create_contract(
        &self,
        ctx: &RequestContext,
        name: &str,
        attachment_url: &str,
    ) -> Result<Contract> {
        let owner = ctx.require_actor()?;
        let contract = Contract::new(owner, name, attachment_url)?;
        self.store.insert_contract(&contract).await?;
        tracing::info!(contract_id = %contract.id, owner = %owner, "Created contract");
        Ok(contract)
    }

    /// Require `contract_id` at checkout for `tier_id`; `None` clears the link
    pub async fn link_contract(
        &self,
        ctx: &RequestContext,
        tier_id: TierId,
        contract_id: Option<ContractId>,
    ) -> Result<Tier> {
        let mut tier = self
            .store
            .get_tier(tier_id)
            .await?
            .ok_or_else(|| MarketError::not_found("tier", tier_id))?;
        ctx.require_owner(tier.owner, "tier")?;

        if let Some(id) = contract_id {
            let contract = self
                .store
                .get_contract(id)
                .await?
                .ok_or_else(|| MarketError::not_found("contract", id))?;
            ctx.require_owner(contract.owner, "contract")?;
        }

        tier.contract_id = contract_id;
        self.store.update_tier(&tier).await?;
        Ok(tier)
    }

    /// Contract for checking out `tier`: the linked contract, else the
    /// owner's latest, else the standard agreement.
    pub async fn resolve_contract_for_tier(&self, tier: &Tier) -> Result<ContractRef> {
        if let Some(id) = tier.contract_id {
            match self.store.get_contract(id).await? {
                Some(contract) if contract.owner == tier.owner => {
                    return Ok(ContractRef::Custom(contract));
                }
                Some(_) => {
                    tracing::warn!(
                        tier_id = %tier.id,
                        contract_id = %id,
                        "Tier links a foreign contract, ignoring"
                    );
                }
                None => {
                    tracing::warn!(
                        tier_id = %tier.id,
                        contract_id = %id,
                        "Tier links a missing contract, ignoring"
                    );
                }
            }
        }

        let latest = self
            .store
            .contracts_by_owner(tier.owner)
            .await?
            .into_iter()
            .next_back();

        Ok(latest.map_or_else(
            || ContractRef::Standard(self.standard.clone()),
            ContractRef::Custom,
        ))
    }

    pub async fn resolve_for_tier_id(&self, tier_id: TierId) -> Result<ContractRef> {
        let tier = self
            .store
            .get_tier(tier_id)
            .await?
            .ok_or_else(|| MarketError::not_found("tier", tier_id))?;
        self.resolve_contract_for_tier(&tier).await
    }
}
