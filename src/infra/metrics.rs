//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention.
//! All counter updates are lock-free; `report` reads them with relaxed
//! loads and never resets them.
//!
//! NOTE: All atomics use Relaxed ordering; these are statistical
//! counters only. Do NOT use these atomics for coordination or logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Exponential bucket boundaries for fetch latency (milliseconds)
/// Buckets: ≤50, ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, >25600
pub const METRICS_BUCKET_BOUNDS: [u64; 10] =
    [50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600];
pub const METRICS_NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_ms: u64) -> usize {
    METRICS_BUCKET_BOUNDS.partition_point(|&bound| bound < latency_ms)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; METRICS_NUM_BUCKETS]) -> [u64; METRICS_NUM_BUCKETS] {
    let mut result = [0u64; METRICS_NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; METRICS_NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    // Last bucket uses 2x the previous bound
    const BUCKET_UPPER_BOUNDS: [u64; METRICS_NUM_BUCKETS] =
        [50, 100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[METRICS_NUM_BUCKETS - 1]
}

/// Lock-free metrics collector
pub struct Metrics {
    /// Map view events processed (monotonic)
    map_events_total: AtomicU64,
    /// Map events that changed nothing (terminal click, drag of absent marker, ...)
    map_events_ignored: AtomicU64,
    /// Position fixes applied to the live tracker
    position_updates_total: AtomicU64,
    /// Position source errors (timeout, unavailable, ...)
    position_errors_total: AtomicU64,
    /// Rate limiter invocations
    throttle_invocations: AtomicU64,
    /// Invocations that fired immediately
    throttle_immediate: AtomicU64,
    /// Invocations deferred to a trailing fire (older pending args discarded)
    throttle_coalesced: AtomicU64,
    /// Directions requests sent
    fetches_issued: AtomicU64,
    /// Successful responses applied as the current route
    fetches_applied: AtomicU64,
    /// Failed requests (network, status, payload)
    fetches_failed: AtomicU64,
    /// Responses discarded because a newer request was issued after them
    responses_stale: AtomicU64,
    /// Fetch latency histogram (ms)
    fetch_latency_buckets: [AtomicU64; METRICS_NUM_BUCKETS],
    fetch_latency_sum_ms: AtomicU64,
    fetch_latency_max_ms: AtomicU64,
    started_at: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            map_events_total: AtomicU64::new(0),
            map_events_ignored: AtomicU64::new(0),
            position_updates_total: AtomicU64::new(0),
            position_errors_total: AtomicU64::new(0),
            throttle_invocations: AtomicU64::new(0),
            throttle_immediate: AtomicU64::new(0),
            throttle_coalesced: AtomicU64::new(0),
            fetches_issued: AtomicU64::new(0),
            fetches_applied: AtomicU64::new(0),
            fetches_failed: AtomicU64::new(0),
            responses_stale: AtomicU64::new(0),
            fetch_latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            fetch_latency_sum_ms: AtomicU64::new(0),
            fetch_latency_max_ms: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    #[inline]
    pub fn record_map_event(&self) {
        self.map_events_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_map_event_ignored(&self) {
        self.map_events_ignored.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_position_update(&self) {
        self.position_updates_total.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_position_error(&self) {
        self.position_errors_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a rate limiter invocation and whether it fired right away
    #[inline]
    pub fn record_throttle_invocation(&self, immediate: bool) {
        self.throttle_invocations.fetch_add(1, Ordering::Relaxed);
        if immediate {
            self.throttle_immediate.fetch_add(1, Ordering::Relaxed);
        } else {
            self.throttle_coalesced.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn record_fetch_issued(&self) {
        self.fetches_issued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fetch_applied(&self) {
        self.fetches_applied.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_fetch_failed(&self) {
        self.fetches_failed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_response_stale(&self) {
        self.responses_stale.fetch_add(1, Ordering::Relaxed);
    }

    /// Record the round trip of a directions request
    #[inline]
    pub fn record_fetch_latency(&self, latency_ms: u64) {
        self.fetch_latency_buckets[bucket_index(latency_ms)].fetch_add(1, Ordering::Relaxed);
        self.fetch_latency_sum_ms.fetch_add(latency_ms, Ordering::Relaxed);
        update_atomic_max(&self.fetch_latency_max_ms, latency_ms);
    }

    /// Take a consistent-enough snapshot of all counters
    pub fn report(&self) -> MetricsSummary {
        let fetch_latency_buckets = load_buckets(&self.fetch_latency_buckets);
        let latency_count: u64 = fetch_latency_buckets.iter().sum();
        let latency_sum = self.fetch_latency_sum_ms.load(Ordering::Relaxed);

        MetricsSummary {
            uptime_secs: self.started_at.elapsed().as_secs(),
            map_events_total: self.map_events_total.load(Ordering::Relaxed),
            map_events_ignored: self.map_events_ignored.load(Ordering::Relaxed),
            position_updates_total: self.position_updates_total.load(Ordering::Relaxed),
            position_errors_total: self.position_errors_total.load(Ordering::Relaxed),
            throttle_invocations: self.throttle_invocations.load(Ordering::Relaxed),
            throttle_immediate: self.throttle_immediate.load(Ordering::Relaxed),
            throttle_coalesced: self.throttle_coalesced.load(Ordering::Relaxed),
            fetches_issued: self.fetches_issued.load(Ordering::Relaxed),
            fetches_applied: self.fetches_applied.load(Ordering::Relaxed),
            fetches_failed: self.fetches_failed.load(Ordering::Relaxed),
            responses_stale: self.responses_stale.load(Ordering::Relaxed),
            fetch_latency_sum_ms: latency_sum,
            fetch_latency_avg_ms: if latency_count > 0 { latency_sum / latency_count } else { 0 },
            fetch_latency_max_ms: self.fetch_latency_max_ms.load(Ordering::Relaxed),
            fetch_latency_p95_ms: percentile_from_buckets(&fetch_latency_buckets, 0.95),
            fetch_latency_buckets,
        }
    }
}

/// Point-in-time copy of all metrics
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub uptime_secs: u64,
    pub map_events_total: u64,
    pub map_events_ignored: u64,
    pub position_updates_total: u64,
    pub position_errors_total: u64,
    pub throttle_invocations: u64,
    pub throttle_immediate: u64,
    pub throttle_coalesced: u64,
    pub fetches_issued: u64,
    pub fetches_applied: u64,
    pub fetches_failed: u64,
    pub responses_stale: u64,
    pub fetch_latency_buckets: [u64; METRICS_NUM_BUCKETS],
    pub fetch_latency_sum_ms: u64,
    pub fetch_latency_avg_ms: u64,
    pub fetch_latency_max_ms: u64,
    pub fetch_latency_p95_ms: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            uptime_secs = %self.uptime_secs,
            map_events = %self.map_events_total,
            map_events_ignored = %self.map_events_ignored,
            position_updates = %self.position_updates_total,
            position_errors = %self.position_errors_total,
            throttle_invocations = %self.throttle_invocations,
            throttle_coalesced = %self.throttle_coalesced,
            fetches_issued = %self.fetches_issued,
            fetches_applied = %self.fetches_applied,
            fetches_failed = %self.fetches_failed,
            responses_stale = %self.responses_stale,
            fetch_avg_ms = %self.fetch_latency_avg_ms,
            fetch_max_ms = %self.fetch_latency_max_ms,
            fetch_p95_ms = %self.fetch_latency_p95_ms,
            "metrics"
        );
    }
}
