//! Adaptive Rate Governor
//!
//! Client-side pacing for calls to a quota-constrained remote API. Each
//! endpoint gets a sliding-window request log sized from the provider's
//! published limits, scaled down by a safety factor. Server feedback is
//! folded back in: headroom headers are recorded for observability and
//! violations trigger exponential backoff.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Rate Governor                          │
//! │        admit(endpoint)  ·  report(endpoint, outcome)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐          │
//! │  │ Quota       │  │ Backoff     │  │ Dashboard   │          │
//! │  │ Catalog     │  │ Policy      │  │ (status)    │          │
//! │  └─────────────┘  └─────────────┘  └─────────────┘          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │   Endpoint Store (one sliding window per endpoint)   │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use quota_governor::governor::{Endpoint, GovernorConfig, Outcome, RateGovernor, Tier};
//!
//! # async fn run() -> Result<(), quota_governor::governor::GovernorError> {
//! let governor = RateGovernor::new(GovernorConfig::new(Tier::Basic).with_safety_factor(0.9))?;
//!
//! governor.admit(Endpoint::GetUsersTweets).await;
//! // ... perform the request ...
//! let backoff = governor.report(Endpoint::GetUsersTweets, Outcome::violation_after(30));
//! tokio::time::sleep(backoff).await;
//! # Ok(())
//! # }
//! ```
//!
//! State is in-memory only and starts empty on every process start.

pub mod backoff;
pub mod catalog;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod feedback;
pub mod manager;
pub mod store;
pub mod window;

pub use backoff::BackoffPolicy;
pub use catalog::{Endpoint, LimitDescriptor, QuotaCatalog, QuotaScope, Tier};
pub use config::GovernorConfig;
pub use dashboard::{EndpointStatus, GovernorStatus, StatusSummary};
pub use error::GovernorError;
pub use feedback::{Outcome, ServerHeadroom};
pub use manager::{Admission, RateGovernor};
pub use store::EndpointStore;
pub use window::EndpointState;
