//! # market-payments
//!
//! Checkout and payment ledger for market.dev.
//!
//! ## Two-phase checkout
//!
//! ```text
//! ┌──────────────┐ initiate  ┌──────────────┐  hosted page  ┌──────────────┐
//! │ Tier page    │──────────▶│ CheckoutFlow │──────────────▶│    Stripe    │
//! │ (contract)   │◀──────────│  (pending)   │               │   Checkout   │
//! └──────────────┘ redirect  └──────────────┘               └──────┬───────┘
//!                                   ▲                              │ webhook
//!                                   │ apply_event (by event id)    │
//!                            ┌──────┴───────┐                      │
//!                            │ WebhookHandler│◀────────────────────┘
//!                            └──────────────┘
//! ```
//!
//! Phase one returns before the payment settles. Phase two is idempotent:
//! the processor's event id is unique in the ledger, so redelivered events
//! never create a second Charge or Subscription.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use market_payments::{CheckoutFlow, FlowConfig, InitiateCheckout, StripeClient};
//!
//! let gateway = Arc::new(StripeClient::new("sk_test_xxx", "whsec_xxx"));
//! let flow = CheckoutFlow::new(store, contracts, gateway, FlowConfig::default());
//!
//! let pending = flow.initiate(&ctx, InitiateCheckout {
//!     tier_id,
//!     accept_contract: true,
//! }).await?;
//!
//! // Redirect user to: pending.redirect_url
//! ```

mod checkout;
mod error;
mod event;
mod flow;
mod gateway;
mod state;
mod webhook;

pub use checkout::{SUPPORTED_CURRENCIES, StripeClient};
pub use error::{PaymentError, Result};
pub use event::{PaymentEvent, PaymentEventKind};
pub use flow::{
    CheckoutFlow, CheckoutOutcome, CheckoutView, DEFAULT_PAYMENT_TIMEOUT, EventOutcome,
    FlowConfig, InitiateCheckout, PendingCheckout,
};
pub use gateway::{GatewaySession, PaymentGateway, PaymentRequest, metadata_keys};
pub use state::{CheckoutState, LedgerEntry};
pub use webhook::{Notice, SessionFields, SessionMetadata, WebhookHandler, translate};
