//! Per-user credit counter.
//!
//! [`CreditLedger`] is the only writer of `users.remaining_credits`. The
//! API routes, the billing webhook and the scheduled reset all go through
//! it.

mod ledger;
mod period;


pub use ledger::{
    CreditCheck, CreditError, CreditLedger, MAX_CREDIT_DELTA, ResetSummary, SubscriptionChange,
};
pub use period::one_month_after;
