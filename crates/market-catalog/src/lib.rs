//! # market-catalog
//!
//! What a maintainer sells and who buys it.
//!
//! - [`tiers`]: create tiers, attach/detach features, list tiers for the
//!   dashboard and the public site.
//! - [`contracts`]: maintainer contracts and the fallback to the platform's
//!   standard agreement.
//! - [`customers`]: read-only customer and lead dashboards scoped to one
//!   maintainer, plus prospect bookkeeping.
//! - [`navigation`]: site pages and the navigation derived from them.
//!
//! Every operation takes an explicit [`RequestContext`](market_core::RequestContext)
//! when it acts on behalf of a user; public reads take only the owner id.

pub mod contracts;
pub mod customers;
pub mod navigation;
pub mod tiers;

pub use contracts::{ContractRef, ContractResolver, StandardAgreement};
pub use customers::{CustomerDirectory, CustomerView, LeadView, NewProspect};
pub use navigation::{NavContext, NavItem, SiteNavigation};
pub use tiers::{NewTier, TierService, TierUpdate, TierWithFeatures};
