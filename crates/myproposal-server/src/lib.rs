//! myproposal server library
//!
//! Backend for myproposal.love:
//! - `SQLite` storage for users, proposals, reply threads, and billing records
//! - Credit ledger with per-tier allotments and period resets
//! - AI proposal generation (OpenAI, Gemini, `DeepSeek`)
//! - Delivery by email (Resend), SMS and WhatsApp (Twilio)
//! - Stripe checkout and webhook processing
//! - JWT sessions, password and Google sign-in, and the axum HTTP API

pub mod auth;
pub mod billing;
pub mod credits;
pub mod generation;
mod http;
pub mod messaging;
pub mod server;
pub mod storage;
