//! Server Feedback
//!
//! Outcomes a caller reports after each paced request, plus parsing of the
//! provider's rate-limit response headers. Malformed or missing header values
//! are treated as absent; parsing never fails.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Header carrying the window's total allowance
pub const HEADER_LIMIT: &str = "x-rate-limit-limit";
/// Header carrying requests left in the current window
pub const HEADER_REMAINING: &str = "x-rate-limit-remaining";
/// Header carrying the window reset as epoch seconds
pub const HEADER_RESET: &str = "x-rate-limit-reset";
/// Header carrying the provider's recovery hint
pub const HEADER_RETRY_AFTER: &str = "retry-after";

/// HTTP status the provider uses for quota violations
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Headroom reported by the server on a successful response
///
/// Kept for observability only; admission never consults it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHeadroom {
    /// Total allowance for the window, if reported
    pub limit: Option<u32>,

    /// Requests remaining before reset
    pub remaining: Option<u32>,

    /// When the server's window resets
    pub reset_at: Option<DateTime<Utc>>,
}

impl ServerHeadroom {
    /// Build from the remaining count and reset epoch seconds
    pub fn new(remaining: u32, reset_epoch_secs: i64) -> Self {
        Self {
            limit: None,
            remaining: Some(remaining),
            reset_at: Utc.timestamp_opt(reset_epoch_secs, 0).single(),
        }
    }

    /// Parse the `x-rate-limit-*` headers
    ///
    /// Header names are matched case-insensitively. Returns `None` when no
    /// usable value is present.
    pub fn from_headers<I, K, V>(headers: I) -> Option<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut headroom = Self {
            limit: None,
            remaining: None,
            reset_at: None,
        };

        for (name, value) in headers {
            let name = name.as_ref();
            let value = value.as_ref().trim();
            if name.eq_ignore_ascii_case(HEADER_LIMIT) {
                headroom.limit = value.parse().ok();
            } else if name.eq_ignore_ascii_case(HEADER_REMAINING) {
                headroom.remaining = value.parse().ok();
            } else if name.eq_ignore_ascii_case(HEADER_RESET) {
                headroom.reset_at = value
                    .parse::<i64>()
                    .ok()
                    .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
            }
        }

        if headroom.limit.is_none() && headroom.remaining.is_none() && headroom.reset_at.is_none() {
            None
        } else {
            Some(headroom)
        }
    }

    /// Whether the remaining count is at or below `threshold`
    pub fn is_low(&self, threshold: u32) -> bool {
        self.remaining.is_some_and(|r| r <= threshold)
    }
}

/// Parse the `retry-after` header
///
/// Accepts delay-seconds or an HTTP date. A zero or past value carries no
/// recovery information and is treated as absent.
pub fn retry_after_from_headers<I, K, V>(headers: I) -> Option<Duration>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    headers
        .into_iter()
        .find(|(name, _)| name.as_ref().eq_ignore_ascii_case(HEADER_RETRY_AFTER))
        .and_then(|(_, value)| parse_retry_after(value.as_ref(), Utc::now()))
}

fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return (secs > 0).then(|| Duration::from_secs(secs));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    (at - now).to_std().ok().filter(|d| !d.is_zero())
}

/// Result of a paced call, as reported back to the governor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The call went through
    Success { headroom: Option<ServerHeadroom> },

    /// The provider rejected the call for exceeding its quota
    Violation { retry_after: Option<Duration> },
}

impl Outcome {
    /// Success without server feedback
    pub fn success() -> Self {
        Outcome::Success { headroom: None }
    }

    /// Success carrying the server's remaining count and reset time
    pub fn success_with(remaining: u32, reset_epoch_secs: i64) -> Self {
        Outcome::Success {
            headroom: Some(ServerHeadroom::new(remaining, reset_epoch_secs)),
        }
    }

    /// Violation without a retry hint
    pub fn violation() -> Self {
        Outcome::Violation { retry_after: None }
    }

    /// Violation with the server's retry hint in seconds
    ///
    /// Zero is no hint, the same as a `retry-after: 0` header.
    pub fn violation_after(retry_after_secs: u64) -> Self {
        Outcome::Violation {
            retry_after: (retry_after_secs > 0).then(|| Duration::from_secs(retry_after_secs)),
        }
    }

    /// Classify a raw response by status code and headers
    pub fn from_response<I, K, V>(status: u16, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let headers: Vec<(K, V)> = headers.into_iter().collect();
        if status == STATUS_TOO_MANY_REQUESTS {
            Outcome::Violation {
                retry_after: retry_after_from_headers(headers),
            }
        } else {
            Outcome::Success {
                headroom: ServerHeadroom::from_headers(headers),
            }
        }
    }

    /// Whether this outcome is a violation
    pub fn is_violation(&self) -> bool {
        matches!(self, Outcome::Violation { .. })
    }
}
