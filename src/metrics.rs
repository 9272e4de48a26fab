// Prometheus metrics for governor monitoring
//
// - Admissions per endpoint (counter)
// - Admission wait times (histogram)
// - Provider violations (counter)
// - Backoff durations handed to callers (histogram)
// - Window occupancy (gauge)

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::sync::Once;

// Waits range from zero up to a full day-long window
const WAIT_BUCKETS: &[f64] = &[
    0.0, 0.1, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0, 3600.0, 86400.0,
];

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref ADMISSIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("governor_admissions_total", "Requests admitted by the governor"),
        &["endpoint"]
    ).expect("Failed to create admissions metric");

    pub static ref ADMISSION_WAIT_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("governor_admission_wait_seconds", "Time callers waited for admission")
            .buckets(WAIT_BUCKETS.to_vec()),
        &["endpoint"]
    ).expect("Failed to create admission wait metric");

    pub static ref VIOLATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("governor_violations_total", "Rate-limit violations reported by the provider"),
        &["endpoint"]
    ).expect("Failed to create violations metric");

    pub static ref BACKOFF_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new("governor_backoff_seconds", "Backoff applied after violations")
            .buckets(WAIT_BUCKETS.to_vec()),
        &["endpoint"]
    ).expect("Failed to create backoff metric");

    pub static ref WINDOW_OCCUPANCY: IntGaugeVec = IntGaugeVec::new(
        Opts::new("governor_window_occupancy", "Requests inside the current sliding window"),
        &["endpoint"]
    ).expect("Failed to create window occupancy metric");
}

static INIT: Once = Once::new();

/// Register governor metrics with the registry
///
/// Safe to call repeatedly; registration happens once per process.
pub fn init() {
    INIT.call_once(|| {
        let collectors: [Box<dyn prometheus::core::Collector>; 5] = [
            Box::new(ADMISSIONS_TOTAL.clone()),
            Box::new(ADMISSION_WAIT_SECONDS.clone()),
            Box::new(VIOLATIONS_TOTAL.clone()),
            Box::new(BACKOFF_SECONDS.clone()),
            Box::new(WINDOW_OCCUPANCY.clone()),
        ];
        for collector in collectors {
            if let Err(e) = REGISTRY.register(collector) {
                tracing::warn!("Failed to register governor metric: {}", e);
            }
        }
    });
}

/// Record an admission
pub fn observe_admission(endpoint: &str, waited_secs: f64, occupancy: usize) {
    ADMISSIONS_TOTAL.with_label_values(&[endpoint]).inc();
    ADMISSION_WAIT_SECONDS
        .with_label_values(&[endpoint])
        .observe(waited_secs);
    WINDOW_OCCUPANCY
        .with_label_values(&[endpoint])
        .set(occupancy as i64);
}

/// Record a violation and the backoff handed back for it
pub fn observe_violation(endpoint: &str, backoff_secs: f64) {
    VIOLATIONS_TOTAL.with_label_values(&[endpoint]).inc();
    BACKOFF_SECONDS
        .with_label_values(&[endpoint])
        .observe(backoff_secs);
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    init();
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
