//! # market-core
//!
//! Shared domain model for market.dev: the entities maintainers and customers
//! interact with, the error taxonomy every layer speaks, the explicit request
//! context that replaces ambient session lookups, and the `Store` trait the
//! relational store is reached through.
//!
//! ## Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     market-server (axum)                     │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │   market-catalog             │   market-payments            │
//! │   tiers · contracts ·        │   checkout state machine ·   │
//! │   customers · navigation     │   gateway · webhook · ledger │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │   market-core: model · error · context · Store              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod context;
pub mod error;
pub mod ids;
pub mod model;
pub mod retry;
pub mod store;

pub use context::RequestContext;
pub use error::{MarketError, Result};
pub use ids::{
    ChargeId, CheckoutId, ContractId, FeatureId, PageId, ProspectId, SubscriptionId, TierId,
    UserId,
};
pub use model::{
    Cadence, Charge, ChargeStatus, Checkout, CheckoutStatus, Contract, Feature, Page, Prospect,
    Subscription, SubscriptionStatus, Tier, User,
};
pub use retry::retry_read;
pub use store::{MemoryStore, Store};
