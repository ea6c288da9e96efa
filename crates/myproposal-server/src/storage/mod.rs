//! `SQLite` storage for the myproposal server.
//!
//! Provides persistence for users, refresh tokens, proposals and their reply
//! threads, billing transactions, audit logs, and processed webhook events.
//! Credit counter writes are crate-private and go through
//! [`crate::credits::CreditLedger`].

mod db;
mod models;
mod queries;
mod queries_billing;
pub(crate) mod queries_credits;
mod queries_proposals;


pub use db::{AppDatabase, DatabaseError};
pub use models::*;
pub use queries::NewUser;
pub use queries_billing::NewTransaction;
pub use queries_proposals::{NewProposal, ProposalEdit};
