//! Metering of paid calls against per-user balances, plus the
//! subscription/checkout client.

pub mod cost;
pub mod error;
pub mod gate;
pub mod payment;

pub use cost::{
    resolve_cost, split_usage, Charge, ResolvedCost, StageEstimates, ASSUMED_PROMPT_PERCENT,
};
pub use error::BillingError;
pub use gate::{ChargeContext, ChargeOutcome, QuotaGate};
pub use payment::{
    cancel_user_subscription, ensure_customer, start_trial, Customer, PaymentClient, Subscription,
};
