//! Quota Governor Library
//!
//! Client-side adaptive rate limiting for quota-constrained remote APIs:
//! per-endpoint sliding windows, safety-margin scaling, server feedback
//! reconciliation and exponential backoff on violations.

pub mod governor;
pub mod metrics;

pub use governor::{Endpoint, GovernorConfig, GovernorError, Outcome, RateGovernor, Tier};
