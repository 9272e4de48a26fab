//! Quota Catalog
//!
//! Static table of the provider's published limits, keyed by service tier
//! and endpoint. Lookups for endpoints a tier does not model fall back to the
//! most conservative descriptor instead of admitting them unchecked.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use super::error::GovernorError;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

/// Fallback limit: 1 request per 15 minutes
pub const FALLBACK_REQUESTS: u32 = 1;
pub const FALLBACK_WINDOW: Duration = Duration::from_secs(15 * MINUTE);

/// Service plan that selects a row of the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Basic,
    Pro,
    Enterprise,
}

impl Tier {
    /// All tiers, cheapest first
    pub const ALL: [Tier; 4] = [Tier::Free, Tier::Basic, Tier::Pro, Tier::Enterprise];

    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Basic => "basic",
            Tier::Pro => "pro",
            Tier::Enterprise => "enterprise",
        }
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Free
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str().to_uppercase())
    }
}

impl FromStr for Tier {
    type Err = GovernorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "basic" => Ok(Tier::Basic),
            "pro" => Ok(Tier::Pro),
            "enterprise" => Ok(Tier::Enterprise),
            _ => Err(GovernorError::UnknownTier(s.to_string())),
        }
    }
}

/// Remote endpoint identifier
///
/// Known endpoints are enumerated; anything else is carried as `Other` and
/// resolves to the fallback descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Endpoint {
    /// User lookup by username
    GetUser,
    /// A user's timeline
    GetUsersTweets,
    /// Recent search
    SearchRecent,
    /// Endpoint the catalog does not model
    Other(String),
}

impl Endpoint {
    /// Endpoints with catalog entries
    pub const KNOWN: [Endpoint; 3] = [
        Endpoint::GetUser,
        Endpoint::GetUsersTweets,
        Endpoint::SearchRecent,
    ];

    /// Canonical snake_case name
    pub fn name(&self) -> &str {
        match self {
            Endpoint::GetUser => "get_user",
            Endpoint::GetUsersTweets => "get_users_tweets",
            Endpoint::SearchRecent => "search_recent",
            Endpoint::Other(name) => name.as_str(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<&str> for Endpoint {
    fn from(name: &str) -> Self {
        match name {
            "get_user" => Endpoint::GetUser,
            "get_users_tweets" => Endpoint::GetUsersTweets,
            "search_recent" => Endpoint::SearchRecent,
            other => Endpoint::Other(other.to_string()),
        }
    }
}

impl From<String> for Endpoint {
    fn from(name: String) -> Self {
        Endpoint::from(name.as_str())
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.name().to_string()
    }
}

/// Whom the provider counts a quota against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaScope {
    /// Counted per authenticated user
    PerUser,
    /// Counted per application
    PerApp,
}

/// Requests allowed per rolling window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitDescriptor {
    /// Maximum requests per window
    pub requests_per_window: u32,

    /// Window length
    #[serde(with = "duration_secs")]
    pub window: Duration,

    /// Quota scope
    pub scope: QuotaScope,
}

impl LimitDescriptor {
    /// Create a new descriptor
    pub const fn new(requests_per_window: u32, window: Duration, scope: QuotaScope) -> Self {
        Self {
            requests_per_window,
            window,
            scope,
        }
    }

    /// The conservative descriptor used for unmodeled endpoints
    pub const fn fallback() -> Self {
        Self::new(FALLBACK_REQUESTS, FALLBACK_WINDOW, QuotaScope::PerApp)
    }

    /// Even spacing if requests were spread uniformly across the window
    pub fn min_interval(&self) -> Duration {
        self.window / self.requests_per_window.max(1)
    }

    /// Ceiling after applying the safety factor, never below 1
    pub fn max_admitted(&self, safety_factor: f64) -> usize {
        let scaled = (self.requests_per_window as f64 * safety_factor).floor() as usize;
        scaled.max(1)
    }
}

/// Tier/endpoint limit table
#[derive(Debug, Clone, Copy, Default)]
pub struct QuotaCatalog;

impl QuotaCatalog {
    /// Look up the descriptor for an endpoint under a tier
    pub fn lookup(tier: Tier, endpoint: &Endpoint) -> LimitDescriptor {
        Self::entry(tier, endpoint).unwrap_or_else(LimitDescriptor::fallback)
    }

    /// Catalog row, if the tier models the endpoint
    pub fn entry(tier: Tier, endpoint: &Endpoint) -> Option<LimitDescriptor> {
        use QuotaScope::{PerApp, PerUser};

        let (requests, window_secs, scope) = match (tier, endpoint) {
            (Tier::Free, Endpoint::GetUser) => (1, 24 * HOUR, PerUser),
            (Tier::Free, Endpoint::GetUsersTweets) => (1, 15 * MINUTE, PerUser),
            (Tier::Free, Endpoint::SearchRecent) => (1, 15 * MINUTE, PerUser),
            (Tier::Basic, Endpoint::GetUser) => (500, 24 * HOUR, PerApp),
            (Tier::Basic, Endpoint::GetUsersTweets) => (10, 15 * MINUTE, PerApp),
            (Tier::Basic, Endpoint::SearchRecent) => (60, 15 * MINUTE, PerApp),
            (Tier::Pro, Endpoint::GetUser) => (300, 15 * MINUTE, PerApp),
            (Tier::Pro, Endpoint::GetUsersTweets) => (1500, 15 * MINUTE, PerApp),
            (Tier::Pro, Endpoint::SearchRecent) => (450, 15 * MINUTE, PerApp),
            _ => return None,
        };

        Some(LimitDescriptor::new(
            requests,
            Duration::from_secs(window_secs),
            scope,
        ))
    }

    /// All modeled rows for a tier
    pub fn rows(tier: Tier) -> Vec<(Endpoint, LimitDescriptor)> {
        Endpoint::KNOWN
            .iter()
            .filter_map(|e| Self::entry(tier, e).map(|d| (e.clone(), d)))
            .collect()
    }
}

pub(crate) mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
