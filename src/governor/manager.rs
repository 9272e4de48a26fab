//! Rate Governor
//!
//! Central admission controller. Callers ask `admit` before each request to
//! the provider and `report` the outcome afterwards.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::backoff::BackoffPolicy;
use super::catalog::{Endpoint, LimitDescriptor, QuotaCatalog, Tier};
use super::config::GovernorConfig;
use super::dashboard::GovernorStatus;
use super::error::{GovernorError, Result};
use super::feedback::Outcome;
use super::store::{EndpointSlot, EndpointStore};
use crate::metrics;

/// Retry multiplier applied to the recommended interval per outstanding violation
pub const VIOLATION_INTERVAL_MULTIPLIER: f64 = 1.5;

/// Share of the recommended interval to leave between consecutive subjects
pub const SUBJECT_GAP_RATIO: f64 = 0.3;

/// Result of a successful admission
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    /// Endpoint admitted to
    pub endpoint: Endpoint,

    /// Time spent waiting for the window (zero when there was room)
    pub waited: Duration,

    /// Requests in the window, including this one
    pub occupancy: usize,

    /// Effective ceiling for the window
    pub max_admitted: usize,
}

enum Step {
    Admitted(Admission),
    Wait {
        wait: Duration,
        occupancy: usize,
        max_admitted: usize,
    },
}

/// Rate governor
///
/// Cloning is cheap and clones share state, so one governor can be handed
/// to every task of a client session.
#[derive(Debug, Clone)]
pub struct RateGovernor {
    /// Configuration
    config: Arc<GovernorConfig>,

    /// Backoff bounds derived from the configuration
    backoff: BackoffPolicy,

    /// Per-endpoint state
    store: EndpointStore,
}

impl RateGovernor {
    /// Create a governor, rejecting invalid configuration
    pub fn new(config: GovernorConfig) -> Result<Self> {
        config.validate()?;
        let backoff = config.backoff()?;
        metrics::init();

        info!(
            tier = %config.tier,
            safety_factor = config.safety_factor,
            monitoring = config.monitoring_enabled,
            "Rate governor initialised"
        );

        Ok(Self {
            config: Arc::new(config),
            backoff,
            store: EndpointStore::new(),
        })
    }

    /// Create a governor for a tier with default tuning
    pub fn for_tier(tier: Tier) -> Result<Self> {
        Self::new(GovernorConfig::new(tier))
    }

    /// Create a governor from `QUOTA_GOVERNOR_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(GovernorConfig::from_env()?)
    }

    /// Current configuration
    pub fn config(&self) -> &GovernorConfig {
        &self.config
    }

    /// Configured tier
    pub fn tier(&self) -> Tier {
        self.config.tier
    }

    /// Backoff bounds in effect
    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    /// Catalog descriptor for an endpoint under the configured tier
    pub fn limit_for(&self, endpoint: &Endpoint) -> LimitDescriptor {
        QuotaCatalog::lookup(self.config.tier, endpoint)
    }

    /// Effective ceiling for an endpoint after the safety factor
    pub fn max_admitted(&self, endpoint: &Endpoint) -> usize {
        self.limit_for(endpoint).max_admitted(self.config.safety_factor)
    }

    /// Wait until one more request to `endpoint` fits in its window
    ///
    /// Never fails; it only delays. Callers on the same endpoint are served
    /// in the order they arrive, callers on other endpoints are unaffected.
    /// Dropping the returned future abandons the wait without recording a
    /// request.
    pub async fn admit(&self, endpoint: impl Into<Endpoint>) -> Admission {
        let endpoint = endpoint.into();
        let slot = self.store.get_or_create(&endpoint);
        let _turn = slot.gate.lock().await;

        let mut waited = Duration::ZERO;
        loop {
            match self.try_admit(&endpoint, &slot, waited) {
                Step::Admitted(admission) => return admission,
                Step::Wait {
                    wait,
                    occupancy,
                    max_admitted,
                } => {
                    self.log_wait(&endpoint, occupancy, max_admitted, wait);
                    sleep(wait).await;
                    waited += wait;
                }
            }
        }
    }

    /// Like `admit`, but give up once `timeout` would be exceeded
    ///
    /// Fails immediately, without sleeping, when the computed wait already
    /// overshoots the budget. A budget too large to represent as a deadline
    /// behaves like plain `admit`.
    pub async fn admit_with_timeout(
        &self,
        endpoint: impl Into<Endpoint>,
        timeout: Duration,
    ) -> Result<Admission> {
        let endpoint = endpoint.into();
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return Ok(self.admit(endpoint).await);
        };

        let slot = self.store.get_or_create(&endpoint);
        let timed_out = || GovernorError::AdmissionTimeout {
            endpoint: endpoint.to_string(),
            timeout,
        };

        let _turn = tokio::time::timeout_at(deadline, slot.gate.lock())
            .await
            .map_err(|_| timed_out())?;

        let mut waited = Duration::ZERO;
        loop {
            match self.try_admit(&endpoint, &slot, waited) {
                Step::Admitted(admission) => return Ok(admission),
                Step::Wait {
                    wait,
                    occupancy,
                    max_admitted,
                } => {
                    let ready_at = Instant::now().checked_add(wait);
                    if ready_at.map_or(true, |at| at > deadline) {
                        debug!(
                            endpoint = %endpoint,
                            wait_secs = wait.as_secs_f64(),
                            "Admission wait exceeds caller timeout"
                        );
                        return Err(timed_out());
                    }
                    self.log_wait(&endpoint, occupancy, max_admitted, wait);
                    sleep(wait).await;
                    waited += wait;
                }
            }
        }
    }

    /// Like `admit`, but abandon the wait when `cancel` resolves
    pub async fn admit_until_cancelled<F>(
        &self,
        endpoint: impl Into<Endpoint>,
        cancel: F,
    ) -> Result<Admission>
    where
        F: Future<Output = ()>,
    {
        let endpoint = endpoint.into();
        let name = endpoint.to_string();
        tokio::select! {
            admission = self.admit(endpoint) => Ok(admission),
            _ = cancel => {
                debug!(endpoint = %name, "Admission cancelled by caller");
                Err(GovernorError::Cancelled(name))
            }
        }
    }

    /// One admission attempt; the caller must hold the slot's gate
    fn try_admit(&self, endpoint: &Endpoint, slot: &EndpointSlot, waited: Duration) -> Step {
        let limit = self.limit_for(endpoint);
        let max_admitted = limit.max_admitted(self.config.safety_factor);
        let now = Instant::now();

        let (wait, occupancy) = {
            let mut state = slot.state();
            state.prune(now, limit.window);
            let wait = state.wait_needed(now, limit.window, max_admitted);
            if wait.is_zero() {
                state.record(now, waited);
            }
            (wait, state.occupancy())
        };

        if !wait.is_zero() {
            return Step::Wait {
                wait,
                occupancy,
                max_admitted,
            };
        }

        self.log_admission(endpoint, occupancy, max_admitted, &limit, waited);
        metrics::observe_admission(endpoint.name(), waited.as_secs_f64(), occupancy);
        Step::Admitted(Admission {
            endpoint: endpoint.clone(),
            waited,
            occupancy,
            max_admitted,
        })
    }

    /// Record the outcome of a call and return how long to back off
    ///
    /// Success clears the violation streak and returns zero. A violation
    /// returns a nonzero server retry hint verbatim, otherwise the
    /// exponential backoff for the current streak. Never suspends.
    pub fn report(&self, endpoint: impl Into<Endpoint>, outcome: Outcome) -> Duration {
        let endpoint = endpoint.into();
        let slot = self.store.get_or_create(&endpoint);

        match outcome {
            Outcome::Success { headroom } => {
                slot.state().record_success(headroom);

                if let Some(headroom) = headroom {
                    if headroom.is_low(self.config.low_headroom_threshold) {
                        warn!(
                            endpoint = %endpoint,
                            remaining = ?headroom.remaining,
                            reset_at = ?headroom.reset_at.map(|t| t.to_rfc3339()),
                            "Server reports low remaining quota"
                        );
                    } else if self.config.monitoring_enabled {
                        debug!(endpoint = %endpoint, remaining = ?headroom.remaining, "Server headroom");
                    }
                }
                Duration::ZERO
            }
            Outcome::Violation { retry_after } => {
                let violations = slot.state().record_violation();
                let wait = self.backoff.wait_for(violations, retry_after);

                if retry_after.is_some() {
                    warn!(
                        endpoint = %endpoint,
                        wait_secs = wait.as_secs_f64(),
                        "Rate limit exceeded, server requested retry delay"
                    );
                } else {
                    warn!(
                        endpoint = %endpoint,
                        wait_secs = wait.as_secs_f64(),
                        attempt = violations,
                        "Rate limit exceeded, backing off exponentially"
                    );
                }
                metrics::observe_violation(endpoint.name(), wait.as_secs_f64());
                wait
            }
        }
    }

    /// `report`, then sleep for the returned backoff
    pub async fn report_and_wait(&self, endpoint: impl Into<Endpoint>, outcome: Outcome) -> Duration {
        let wait = self.report(endpoint, outcome);
        if !wait.is_zero() {
            sleep(wait).await;
        }
        wait
    }

    /// Clear an endpoint's violation streak without reporting a success
    pub fn reset_violations(&self, endpoint: impl Into<Endpoint>) {
        let endpoint = endpoint.into();
        if let Some(slot) = self.store.get(&endpoint) {
            slot.state().reset_violations();
        }
    }

    /// Violations reported since the endpoint's last success
    pub fn consecutive_violations(&self, endpoint: &Endpoint) -> u32 {
        self.store
            .get(endpoint)
            .map(|slot| slot.state().consecutive_violations())
            .unwrap_or(0)
    }

    /// Planning estimate of the spacing between requests
    ///
    /// `min_interval / safety_factor`, scaled by `1.5^violations` while the
    /// endpoint has an outstanding violation streak.
    pub fn recommended_interval(&self, endpoint: impl Into<Endpoint>) -> Duration {
        let endpoint = endpoint.into();
        let base = self.limit_for(&endpoint).min_interval().as_secs_f64() / self.config.safety_factor;

        let violations = self.consecutive_violations(&endpoint);
        let multiplier = if violations > 0 {
            VIOLATION_INTERVAL_MULTIPLIER.powi(violations.min(i32::MAX as u32) as i32)
        } else {
            1.0
        };

        Duration::try_from_secs_f64(base * multiplier).unwrap_or(Duration::MAX)
    }

    /// Extra gap to leave between consecutive subjects (e.g. users)
    pub fn subject_gap(&self, endpoint: impl Into<Endpoint>) -> Duration {
        self.recommended_interval(endpoint).mul_f64(SUBJECT_GAP_RATIO)
    }

    /// Snapshot of every tracked endpoint
    pub fn status(&self) -> GovernorStatus {
        GovernorStatus::collect(self)
    }

    /// Endpoint store (for status collection)
    pub fn store(&self) -> &EndpointStore {
        &self.store
    }

    fn log_admission(
        &self,
        endpoint: &Endpoint,
        occupancy: usize,
        max_admitted: usize,
        limit: &LimitDescriptor,
        waited: Duration,
    ) {
        let window_mins = limit.window.as_secs() / 60;
        if self.config.monitoring_enabled {
            info!(
                endpoint = %endpoint,
                waited_secs = waited.as_secs_f64(),
                "Request status: {}/{} ({} minute window)",
                occupancy,
                max_admitted,
                window_mins
            );
        } else {
            debug!(
                endpoint = %endpoint,
                waited_secs = waited.as_secs_f64(),
                "Request status: {}/{} ({} minute window)",
                occupancy,
                max_admitted,
                window_mins
            );
        }
    }

    fn log_wait(&self, endpoint: &Endpoint, occupancy: usize, max_admitted: usize, wait: Duration) {
        info!(
            endpoint = %endpoint,
            wait_secs = wait.as_secs_f64(),
            "Window full ({}/{}), waiting {:.1}s",
            occupancy,
            max_admitted,
            wait.as_secs_f64()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor(tier: Tier) -> RateGovernor {
        RateGovernor::new(GovernorConfig::new(tier).with_monitoring(false)).unwrap()
    }

    #[test]
    fn test_rejects_invalid_config() {
        let result = RateGovernor::new(GovernorConfig::default().with_safety_factor(0.0));
        assert!(matches!(result, Err(GovernorError::InvalidSafetyFactor(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_immediate_when_room() {
        let governor = governor(Tier::Basic);
        let admission = governor.admit(Endpoint::SearchRecent).await;
        assert_eq!(admission.waited, Duration::ZERO);
        assert_eq!(admission.occupancy, 1);
        assert_eq!(admission.max_admitted, 48);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ceiling_admits_first_call() {
        let governor = governor(Tier::Free);
        let first = governor.admit(Endpoint::GetUsersTweets).await;
        assert_eq!(first.waited, Duration::ZERO);
        assert_eq!(first.max_admitted, 1);

        let second = governor.admit(Endpoint::GetUsersTweets).await;
        assert_eq!(second.waited, Duration::from_secs(900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_with_timeout_fails_fast() {
        let governor = governor(Tier::Free);
        governor.admit("search_recent").await;

        let started = Instant::now();
        let result = governor
            .admit_with_timeout("search_recent", Duration::from_secs(60))
            .await;
        assert!(matches!(result, Err(GovernorError::AdmissionTimeout { .. })));
        assert_eq!(started.elapsed(), Duration::ZERO);

        let admission = governor
            .admit_with_timeout("search_recent", Duration::from_secs(900))
            .await
            .unwrap();
        assert_eq!(admission.waited, Duration::from_secs(900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_with_unbounded_timeout() {
        let basic = governor(Tier::Basic);
        let admission = basic
            .admit_with_timeout(Endpoint::GetUser, Duration::MAX)
            .await
            .unwrap();
        assert_eq!(admission.waited, Duration::ZERO);

        let free = governor(Tier::Free);
        free.admit(Endpoint::SearchRecent).await;
        let admission = free
            .admit_with_timeout(Endpoint::SearchRecent, Duration::from_secs(u64::MAX / 2))
            .await
            .unwrap();
        assert_eq!(admission.waited, Duration::from_secs(900));
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_with_timeout_while_gate_held() {
        let governor = governor(Tier::Free);
        governor.admit(Endpoint::GetUser).await;

        // Holds the gate for a full day waiting on the window
        let waiter = {
            let governor = governor.clone();
            tokio::spawn(async move { governor.admit(Endpoint::GetUser).await })
        };
        tokio::task::yield_now().await;

        let started = Instant::now();
        let result = governor
            .admit_with_timeout(Endpoint::GetUser, Duration::from_secs(30))
            .await;
        assert_eq!(
            result,
            Err(GovernorError::AdmissionTimeout {
                endpoint: "get_user".to_string(),
                timeout: Duration::from_secs(30),
            })
        );
        assert_eq!(started.elapsed(), Duration::from_secs(30));

        let admitted = waiter.await.unwrap();
        assert_eq!(admitted.occupancy, 1);
        assert_eq!(governor.status().endpoints[0].total_admitted, 2);
    }

    #[test]
    fn test_convenience_constructors() {
        let governor = RateGovernor::for_tier(Tier::Pro).unwrap();
        assert_eq!(governor.tier(), Tier::Pro);
        assert_eq!(governor.config().safety_factor, 0.8);
        assert_eq!(governor.backoff(), BackoffPolicy::default());

        assert_eq!(
            RateGovernor::from_env().map(|g| g.config().clone()),
            GovernorConfig::from_env()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_admit_until_cancelled() {
        let governor = governor(Tier::Free);
        governor.admit(Endpoint::GetUser).await;

        let result = governor
            .admit_until_cancelled(Endpoint::GetUser, sleep(Duration::from_secs(10)))
            .await;
        assert!(matches!(result, Err(GovernorError::Cancelled(_))));

        // The abandoned wait left no trace in the window
        let status = governor.status();
        assert_eq!(status.endpoints[0].occupancy, 1);
    }

    #[test]
    fn test_report_backoff_sequence() {
        let governor = governor(Tier::Basic);
        let e = Endpoint::GetUsersTweets;

        assert_eq!(governor.report(e.clone(), Outcome::violation()), Duration::from_secs(1));
        assert_eq!(governor.report(e.clone(), Outcome::violation()), Duration::from_secs(2));
        assert_eq!(governor.report(e.clone(), Outcome::violation()), Duration::from_secs(4));
        assert_eq!(governor.consecutive_violations(&e), 3);

        assert_eq!(governor.report(e.clone(), Outcome::success()), Duration::ZERO);
        assert_eq!(governor.report(e.clone(), Outcome::violation()), Duration::from_secs(1));
    }

    #[test]
    fn test_report_server_hint() {
        let governor = governor(Tier::Basic);
        for _ in 0..5 {
            governor.report("get_user", Outcome::violation());
        }
        let wait = governor.report("get_user", Outcome::violation_after(42));
        assert_eq!(wait, Duration::from_secs(42));
    }

    #[test]
    fn test_report_zero_hint_backs_off() {
        let governor = governor(Tier::Basic);
        assert_eq!(
            governor.report("get_user", Outcome::violation_after(0)),
            Duration::from_secs(1)
        );
        let explicit_zero = Outcome::Violation {
            retry_after: Some(Duration::ZERO),
        };
        assert_eq!(governor.report("get_user", explicit_zero), Duration::from_secs(2));
    }

    #[test]
    fn test_recommended_interval() {
        let governor = governor(Tier::Basic);
        // 900s / 10 requests / 0.8
        let base = governor.recommended_interval(Endpoint::GetUsersTweets);
        assert!((base.as_secs_f64() - 112.5).abs() < 1e-6);

        governor.report(Endpoint::GetUsersTweets, Outcome::violation());
        governor.report(Endpoint::GetUsersTweets, Outcome::violation());
        let scaled = governor.recommended_interval(Endpoint::GetUsersTweets);
        assert!((scaled.as_secs_f64() - 112.5 * 2.25).abs() < 1e-6);

        governor.reset_violations(Endpoint::GetUsersTweets);
        assert_eq!(governor.recommended_interval(Endpoint::GetUsersTweets), base);

        let gap = governor.subject_gap(Endpoint::GetUsersTweets);
        assert!((gap.as_secs_f64() - 33.75).abs() < 1e-6);
    }

    #[test]
    fn test_recommended_interval_does_not_track_endpoint() {
        let governor = governor(Tier::Pro);
        governor.recommended_interval("likes");
        assert_eq!(governor.store().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_report_and_wait_sleeps() {
        let governor = governor(Tier::Basic);
        let started = Instant::now();
        let wait = governor
            .report_and_wait(Endpoint::SearchRecent, Outcome::violation_after(7))
            .await;
        assert_eq!(wait, Duration::from_secs(7));
        assert_eq!(started.elapsed(), Duration::from_secs(7));
    }
}
