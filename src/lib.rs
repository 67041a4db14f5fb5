//! leadscore — conversion-likelihood scoring for realtor email threads.
//!
//! Scores a conversation 0–100 ("EV score") and decides whether a human
//! should be alerted, via two LLM calls behind per-account rate limits,
//! then persists the result and an audit trail.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod llm;
pub mod model;
pub mod pipeline;
pub mod ratelimit;
pub mod store;
pub mod usage;
