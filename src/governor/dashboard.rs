//! Status Dashboard
//!
//! Point-in-time snapshot of every tracked endpoint, for monitoring and for
//! the end-of-run summary.

use serde::Serialize;
use std::fmt::Write as _;
use std::time::Duration;
use tokio::time::Instant;

use super::catalog::{duration_secs, Endpoint, LimitDescriptor, Tier};
use super::feedback::ServerHeadroom;
use super::manager::RateGovernor;
use super::window::WindowStats;

/// Governor-wide status
#[derive(Debug, Clone, Serialize)]
pub struct GovernorStatus {
    /// Timestamp of snapshot generation
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Configured tier
    pub tier: Tier,

    /// Configured safety factor
    pub safety_factor: f64,

    /// Per-endpoint status, sorted by endpoint name
    pub endpoints: Vec<EndpointStatus>,

    /// Aggregates across endpoints
    pub summary: StatusSummary,
}

/// Status of a single endpoint
#[derive(Debug, Clone, Serialize)]
pub struct EndpointStatus {
    /// Endpoint
    pub endpoint: Endpoint,

    /// Catalog descriptor in effect
    pub limit: LimitDescriptor,

    /// Ceiling after the safety factor
    pub max_admitted: usize,

    /// Requests inside the current window
    pub occupancy: usize,

    /// Planning estimate of request spacing
    #[serde(with = "duration_secs")]
    pub recommended_interval: Duration,

    /// Time until the next window slot frees up, if the window is full
    #[serde(with = "duration_secs")]
    pub next_slot_in: Duration,

    /// Violations since the last success
    pub consecutive_violations: u32,

    /// Most recent server-reported headroom
    pub headroom: Option<ServerHeadroom>,

    /// Requests admitted since start
    pub total_admitted: u64,

    /// Violations reported since start
    pub total_violations: u64,

    /// Time spent waiting for admission since start
    #[serde(with = "duration_secs")]
    pub total_waited: Duration,
}

/// Aggregate statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSummary {
    /// Endpoints tracked
    pub tracked_endpoints: usize,

    /// Requests admitted across all endpoints
    pub total_admitted: u64,

    /// Violations across all endpoints
    pub total_violations: u64,

    /// Endpoints whose window is currently full
    pub saturated_endpoints: usize,

    /// Total admission wait
    #[serde(with = "duration_secs")]
    pub total_waited: Duration,
}

impl GovernorStatus {
    /// Collect a snapshot from a governor
    pub fn collect(governor: &RateGovernor) -> Self {
        let now = Instant::now();
        let safety_factor = governor.config().safety_factor;

        let endpoints: Vec<EndpointStatus> = governor
            .store()
            .entries()
            .into_iter()
            .map(|(endpoint, slot)| {
                let limit = governor.limit_for(&endpoint);
                let stats: WindowStats = slot.state().stats(now, limit.window);
                let max_admitted = limit.max_admitted(safety_factor);
                let next_slot_in = if stats.occupancy >= max_admitted {
                    stats.next_slot_in
                } else {
                    Duration::ZERO
                };

                EndpointStatus {
                    recommended_interval: governor.recommended_interval(endpoint.clone()),
                    endpoint,
                    limit,
                    max_admitted,
                    occupancy: stats.occupancy,
                    next_slot_in,
                    consecutive_violations: stats.consecutive_violations,
                    headroom: stats.headroom,
                    total_admitted: stats.total_admitted,
                    total_violations: stats.total_violations,
                    total_waited: stats.total_waited,
                }
            })
            .collect();

        let summary = Self::build_summary(&endpoints);

        Self {
            timestamp: chrono::Utc::now(),
            tier: governor.tier(),
            safety_factor,
            endpoints,
            summary,
        }
    }

    fn build_summary(endpoints: &[EndpointStatus]) -> StatusSummary {
        endpoints
            .iter()
            .fold(StatusSummary::default(), |mut summary, e| {
                summary.tracked_endpoints += 1;
                summary.total_admitted += e.total_admitted;
                summary.total_violations += e.total_violations;
                summary.total_waited += e.total_waited;
                if e.occupancy >= e.max_admitted {
                    summary.saturated_endpoints += 1;
                }
                summary
            })
    }

    /// Status of one endpoint, if tracked
    pub fn endpoint(&self, endpoint: &Endpoint) -> Option<&EndpointStatus> {
        self.endpoints.iter().find(|e| &e.endpoint == endpoint)
    }

    /// Human-readable summary
    pub fn render(&self) -> String {
        let mut out = String::new();
        let rule = "=".repeat(50);

        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "Rate limit status summary");
        let _ = writeln!(out, "{}", rule);
        let _ = writeln!(out, "Tier:          {}", self.tier);
        let _ = writeln!(out, "Safety factor: {:.0}%", self.safety_factor * 100.0);

        if self.endpoints.is_empty() {
            let _ = writeln!(out, "\nNo endpoints used yet.");
            return out;
        }

        for e in &self.endpoints {
            let _ = writeln!(out, "\n{}:", e.endpoint);
            let _ = writeln!(
                out,
                "   Quota used:           {}/{} ({} minute window)",
                e.occupancy,
                e.max_admitted,
                e.limit.window.as_secs() / 60
            );
            let _ = writeln!(
                out,
                "   Recommended interval: {:.1}s",
                e.recommended_interval.as_secs_f64()
            );
            if !e.next_slot_in.is_zero() {
                let _ = writeln!(
                    out,
                    "   Next slot in:         {:.1}s",
                    e.next_slot_in.as_secs_f64()
                );
            }
            if e.consecutive_violations > 0 {
                let _ = writeln!(out, "   Violation streak:     {}", e.consecutive_violations);
            }
            if let Some(remaining) = e.headroom.and_then(|h| h.remaining) {
                let _ = writeln!(out, "   Server remaining:     {}", remaining);
            }
            if let Some(reset_at) = e.headroom.and_then(|h| h.reset_at) {
                let _ = writeln!(out, "   Server reset:         {}", reset_at.format("%H:%M:%S"));
            }
        }

        let _ = writeln!(
            out,
            "\nTotals: {} admitted, {} violations, {:.1}s waited",
            self.summary.total_admitted,
            self.summary.total_violations,
            self.summary.total_waited.as_secs_f64()
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::governor::config::GovernorConfig;
    use crate::governor::feedback::Outcome;

    fn governor(tier: Tier) -> RateGovernor {
        RateGovernor::new(GovernorConfig::new(tier).with_monitoring(false)).unwrap()
    }

    #[test]
    fn test_empty_status() {
        let status = governor(Tier::Basic).status();
        assert!(status.endpoints.is_empty());
        assert_eq!(status.summary.tracked_endpoints, 0);
        assert!(status.render().contains("No endpoints used yet"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_after_activity() {
        let governor = governor(Tier::Basic);
        governor.admit(Endpoint::GetUsersTweets).await;
        governor.admit(Endpoint::GetUsersTweets).await;
        governor.report(Endpoint::GetUsersTweets, Outcome::success_with(3, 1_700_000_000));
        governor.report(Endpoint::SearchRecent, Outcome::violation());

        let status = governor.status();
        assert_eq!(status.summary.tracked_endpoints, 2);
        assert_eq!(status.summary.total_admitted, 2);
        assert_eq!(status.summary.total_violations, 1);

        let tweets = status.endpoint(&Endpoint::GetUsersTweets).unwrap();
        assert_eq!(tweets.occupancy, 2);
        assert_eq!(tweets.max_admitted, 8);
        assert_eq!(tweets.headroom.unwrap().remaining, Some(3));

        let rendered = status.render();
        assert!(rendered.contains("Tier:          BASIC"));
        assert!(rendered.contains("2/8 (15 minute window)"));
        assert!(rendered.contains("Server remaining:     3"));
        assert!(rendered.contains("Violation streak:     1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_saturated_endpoint_reports_next_slot() {
        let governor = governor(Tier::Free);
        governor.admit(Endpoint::SearchRecent).await;
        tokio::time::advance(Duration::from_secs(100)).await;

        let status = governor.status();
        let search = status.endpoint(&Endpoint::SearchRecent).unwrap();
        assert_eq!(status.summary.saturated_endpoints, 1);
        assert_eq!(search.next_slot_in, Duration::from_secs(800));
    }

    #[test]
    fn test_status_serialization() {
        let governor = governor(Tier::Pro);
        governor.report(Endpoint::GetUser, Outcome::success());
        let json = serde_json::to_value(governor.status()).unwrap();
        assert_eq!(json["tier"], "pro");
        assert_eq!(json["endpoints"][0]["endpoint"], "get_user");
        assert_eq!(json["endpoints"][0]["limit"]["requests_per_window"], 300);
    }
}
