//! Governor Error Types
//!
//! Admission and reporting never fail. These errors cover configuration
//! problems caught at construction time and the opt-in bounded admission
//! variants.

use std::time::Duration;

/// Error types for governor construction and bounded admission
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GovernorError {
    /// Safety factor outside (0, 1]
    #[error("Invalid safety factor: {0} (must be > 0 and <= 1)")]
    InvalidSafetyFactor(f64),

    /// Tier string not in the quota catalog
    #[error("Unknown API tier: {0}. Must be one of: free, basic, pro, enterprise")]
    UnknownTier(String),

    /// Backoff bounds are unusable
    #[error("Invalid backoff: base {base:?} must be > 0 and <= max {max:?}")]
    InvalidBackoff { base: Duration, max: Duration },

    /// Any other rejected configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Admission could not complete within the caller's budget
    #[error("Admission to {endpoint} would exceed timeout {timeout:?}")]
    AdmissionTimeout { endpoint: String, timeout: Duration },

    /// The caller's cancellation signal fired while waiting
    #[error("Admission to {0} cancelled")]
    Cancelled(String),
}

/// Result alias for governor operations
pub type Result<T> = std::result::Result<T, GovernorError>;
