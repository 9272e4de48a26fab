//! Governor Configuration
//!
//! Construction parameters for the rate governor. Values come from defaults,
//! an optional TOML file and `QUOTA_GOVERNOR_*` environment overrides, in
//! that order. Anything invalid is rejected before a governor is built.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use super::backoff::{BackoffPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY};
use super::catalog::Tier;
use super::error::GovernorError;

/// Default safety factor
pub const DEFAULT_SAFETY_FACTOR: f64 = 0.8;

/// Remaining-count at or below which a low headroom warning is logged
pub const DEFAULT_LOW_HEADROOM_THRESHOLD: u32 = 5;

/// Environment variable names
pub const ENV_TIER: &str = "QUOTA_GOVERNOR_TIER";
pub const ENV_SAFETY_FACTOR: &str = "QUOTA_GOVERNOR_SAFETY_FACTOR";
pub const ENV_MONITORING: &str = "QUOTA_GOVERNOR_MONITORING";
pub const ENV_BASE_DELAY: &str = "QUOTA_GOVERNOR_BASE_DELAY_SECS";
pub const ENV_MAX_DELAY: &str = "QUOTA_GOVERNOR_MAX_DELAY_SECS";
pub const ENV_LOW_HEADROOM: &str = "QUOTA_GOVERNOR_LOW_HEADROOM";

/// Rate governor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Service tier (selects the catalog row)
    pub tier: Tier,

    /// Multiplier in (0, 1] applied to published limits
    pub safety_factor: f64,

    /// Emit per-request status at INFO instead of DEBUG
    pub monitoring_enabled: bool,

    /// Backoff delay after the first violation, in seconds
    pub base_delay_secs: f64,

    /// Backoff ceiling, in seconds
    pub max_delay_secs: f64,

    /// Warn when the server reports this many requests or fewer remaining
    pub low_headroom_threshold: u32,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            tier: Tier::default(),
            safety_factor: DEFAULT_SAFETY_FACTOR,
            monitoring_enabled: true,
            base_delay_secs: DEFAULT_BASE_DELAY.as_secs_f64(),
            max_delay_secs: DEFAULT_MAX_DELAY.as_secs_f64(),
            low_headroom_threshold: DEFAULT_LOW_HEADROOM_THRESHOLD,
        }
    }
}

impl GovernorConfig {
    /// Create a configuration for a tier with default tuning
    pub fn new(tier: Tier) -> Self {
        Self {
            tier,
            ..Self::default()
        }
    }

    /// Set the safety factor
    pub fn with_safety_factor(mut self, safety_factor: f64) -> Self {
        self.safety_factor = safety_factor;
        self
    }

    /// Enable or disable monitoring output
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitoring_enabled = enabled;
        self
    }

    /// Set backoff bounds
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay_secs = base.as_secs_f64();
        self.max_delay_secs = max.as_secs_f64();
        self
    }

    /// Load from environment overrides on top of defaults
    pub fn from_env() -> std::result::Result<Self, GovernorError> {
        let config = Self::default().apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file, then apply environment overrides
    ///
    /// A missing file yields the defaults (plus overrides).
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: GovernorConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded governor configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (normally the process environment)
    ///
    /// Unparseable values are rejected rather than ignored.
    pub fn apply_overrides<F>(mut self, lookup: F) -> std::result::Result<Self, GovernorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(tier) = lookup(ENV_TIER) {
            self.tier = tier.parse()?;
        }
        if let Some(factor) = lookup(ENV_SAFETY_FACTOR) {
            self.safety_factor = parse_value(ENV_SAFETY_FACTOR, &factor)?;
        }
        if let Some(enabled) = lookup(ENV_MONITORING) {
            self.monitoring_enabled = parse_value(ENV_MONITORING, &enabled)?;
        }
        if let Some(base) = lookup(ENV_BASE_DELAY) {
            self.base_delay_secs = parse_value(ENV_BASE_DELAY, &base)?;
        }
        if let Some(max) = lookup(ENV_MAX_DELAY) {
            self.max_delay_secs = parse_value(ENV_MAX_DELAY, &max)?;
        }
        if let Some(threshold) = lookup(ENV_LOW_HEADROOM) {
            self.low_headroom_threshold = parse_value(ENV_LOW_HEADROOM, &threshold)?;
        }
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), GovernorError> {
        if !self.safety_factor.is_finite() || self.safety_factor <= 0.0 || self.safety_factor > 1.0
        {
            return Err(GovernorError::InvalidSafetyFactor(self.safety_factor));
        }
        self.backoff()?;
        Ok(())
    }

    /// Backoff policy built from the configured bounds
    pub fn backoff(&self) -> std::result::Result<BackoffPolicy, GovernorError> {
        let base = secs_to_duration("base_delay_secs", self.base_delay_secs)?;
        let max = secs_to_duration("max_delay_secs", self.max_delay_secs)?;
        BackoffPolicy::new(base, max)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> std::result::Result<T, GovernorError> {
    raw.trim()
        .parse()
        .map_err(|_| GovernorError::InvalidConfig(format!("{}={:?} is not a valid value", key, raw)))
}

fn secs_to_duration(field: &str, secs: f64) -> std::result::Result<Duration, GovernorError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| GovernorError::InvalidConfig(format!("{} must be a non-negative number, got {}", field, secs)))
}
