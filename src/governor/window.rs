//! Sliding Window State
//!
//! Per-endpoint request log and feedback counters. The window boundary moves
//! continuously with `now`: a request stops counting exactly one window
//! length after it was admitted, so the log covers `(now - window, now]`.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use super::feedback::ServerHeadroom;

/// Mutable state for one endpoint
#[derive(Debug, Clone, Default)]
pub struct EndpointState {
    /// Admission timestamps still inside the window, oldest first
    request_log: VecDeque<Instant>,

    /// Most recent server-reported headroom
    headroom: Option<ServerHeadroom>,

    /// Violations since the last success
    consecutive_violations: u32,

    total_admitted: u64,
    total_violations: u64,
    total_waited: Duration,
}

/// Point-in-time view of an endpoint, for status output
#[derive(Debug, Clone, Serialize)]
pub struct WindowStats {
    /// Requests inside the current window
    pub occupancy: usize,

    /// Violations since the last success
    pub consecutive_violations: u32,

    /// Most recent server-reported headroom
    pub headroom: Option<ServerHeadroom>,

    /// Requests admitted since start
    pub total_admitted: u64,

    /// Violations reported since start
    pub total_violations: u64,

    /// Time spent waiting for admission since start
    pub total_waited: Duration,

    /// Time until the oldest logged request leaves the window
    pub next_slot_in: Duration,
}

impl EndpointState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop timestamps that have left the window
    pub fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&oldest) = self.request_log.front() {
            if now.saturating_duration_since(oldest) >= window {
                self.request_log.pop_front();
            } else {
                break;
            }
        }
    }

    /// Wait required before one more request fits under `max_admitted`
    ///
    /// Call after `prune`. Zero when the window has room.
    pub fn wait_needed(&self, now: Instant, window: Duration, max_admitted: usize) -> Duration {
        if self.request_log.len() < max_admitted {
            return Duration::ZERO;
        }
        match self.request_log.front() {
            Some(&oldest) => window.saturating_sub(now.saturating_duration_since(oldest)),
            None => Duration::ZERO,
        }
    }

    /// Record an admission at `now`, having waited `waited` for it
    pub fn record(&mut self, now: Instant, waited: Duration) {
        // Concurrent callers may sample `now` out of order before taking the lock
        let at = match self.request_log.back() {
            Some(&last) if last > now => last,
            _ => now,
        };
        self.request_log.push_back(at);
        self.total_admitted += 1;
        self.total_waited += waited;
    }

    /// Record a successful call
    pub fn record_success(&mut self, headroom: Option<ServerHeadroom>) {
        self.consecutive_violations = 0;
        if headroom.is_some() {
            self.headroom = headroom;
        }
    }

    /// Record a violation, returning the new consecutive count
    pub fn record_violation(&mut self) -> u32 {
        self.consecutive_violations = self.consecutive_violations.saturating_add(1);
        self.total_violations += 1;
        self.consecutive_violations
    }

    /// Clear the consecutive violation counter
    pub fn reset_violations(&mut self) {
        self.consecutive_violations = 0;
    }

    /// Requests currently in the log
    pub fn occupancy(&self) -> usize {
        self.request_log.len()
    }

    /// Requests admitted within `(now - window, now]`, without pruning
    pub fn count_within(&self, now: Instant, window: Duration) -> usize {
        self.request_log
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < window)
            .count()
    }

    /// Violations since the last success
    pub fn consecutive_violations(&self) -> u32 {
        self.consecutive_violations
    }

    /// Most recent server-reported headroom
    pub fn headroom(&self) -> Option<ServerHeadroom> {
        self.headroom
    }

    /// Logged timestamps, oldest first
    pub fn timestamps(&self) -> impl Iterator<Item = Instant> + '_ {
        self.request_log.iter().copied()
    }

    /// Snapshot for status output
    pub fn stats(&self, now: Instant, window: Duration) -> WindowStats {
        let next_slot_in = self
            .request_log
            .iter()
            .find(|&&t| now.saturating_duration_since(t) < window)
            .map(|&t| window.saturating_sub(now.saturating_duration_since(t)))
            .unwrap_or(Duration::ZERO);

        WindowStats {
            occupancy: self.count_within(now, window),
            consecutive_violations: self.consecutive_violations,
            headroom: self.headroom,
            total_admitted: self.total_admitted,
            total_violations: self.total_violations,
            total_waited: self.total_waited,
            next_slot_in,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(900);

    #[test]
    fn test_empty_window_needs_no_wait() {
        let state = EndpointState::new();
        assert_eq!(state.wait_needed(Instant::now(), WINDOW, 1), Duration::ZERO);
    }

    #[test]
    fn test_full_window_waits_for_oldest() {
        let start = Instant::now();
        let mut state = EndpointState::new();
        state.record(start, Duration::ZERO);
        state.record(start + Duration::from_secs(100), Duration::ZERO);

        let now = start + Duration::from_secs(300);
        assert_eq!(state.wait_needed(now, WINDOW, 2), Duration::from_secs(600));
        assert_eq!(state.wait_needed(now, WINDOW, 3), Duration::ZERO);
    }

    #[test]
    fn test_prune_slides_boundary() {
        let start = Instant::now();
        let mut state = EndpointState::new();
        state.record(start, Duration::ZERO);
        state.record(start + Duration::from_secs(10), Duration::ZERO);

        state.prune(start + Duration::from_secs(899), WINDOW);
        assert_eq!(state.occupancy(), 2);

        state.prune(start + WINDOW, WINDOW);
        assert_eq!(state.occupancy(), 1);

        state.prune(start + Duration::from_secs(910), WINDOW);
        assert_eq!(state.occupancy(), 0);
    }

    #[test]
    fn test_record_keeps_log_monotonic() {
        let start = Instant::now();
        let mut state = EndpointState::new();
        state.record(start + Duration::from_secs(5), Duration::ZERO);
        state.record(start, Duration::ZERO);

        let ts: Vec<_> = state.timestamps().collect();
        assert!(ts.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_violation_counters() {
        let mut state = EndpointState::new();
        assert_eq!(state.record_violation(), 1);
        assert_eq!(state.record_violation(), 2);

        state.record_success(None);
        assert_eq!(state.consecutive_violations(), 0);
        assert_eq!(state.record_violation(), 1);

        let stats = state.stats(Instant::now(), WINDOW);
        assert_eq!(stats.total_violations, 3);
    }

    #[test]
    fn test_success_keeps_previous_headroom_when_absent() {
        let mut state = EndpointState::new();
        state.record_success(Some(ServerHeadroom::new(4, 1_700_000_000)));
        state.record_success(None);
        assert_eq!(state.headroom().unwrap().remaining, Some(4));
    }

    #[test]
    fn test_stats_next_slot() {
        let start = Instant::now();
        let mut state = EndpointState::new();
        state.record(start, Duration::from_secs(2));

        let stats = state.stats(start + Duration::from_secs(100), WINDOW);
        assert_eq!(stats.occupancy, 1);
        assert_eq!(stats.next_slot_in, Duration::from_secs(800));
        assert_eq!(stats.total_waited, Duration::from_secs(2));
    }
}
