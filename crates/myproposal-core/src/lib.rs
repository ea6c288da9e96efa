//! `myproposal` Core Library
//!
//! Shared functionality for the `myproposal` server:
//! - Configuration resolution and hierarchy (credit policy, proposals, generation)
//! - Subscription tier and status types
//! - `SQLite` pool helpers and the `define_database!` macro
//! - Tracing and optional `OpenTelemetry` setup

pub mod config;
pub mod db;
pub mod error;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod tier;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use tier::{SubscriptionStatus, SubscriptionTier};
