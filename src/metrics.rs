//! Prometheus-compatible metrics for the registrar server.
//!
//! Cache and portal activity is labelled by cache domain so a single
//! registry covers every domain.

use prometheus::{self, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Global metrics instance.
static METRICS: std::sync::OnceLock<Arc<Metrics>> = std::sync::OnceLock::new();

/// Get or initialize the global metrics instance.
pub fn get_metrics() -> Arc<Metrics> {
    METRICS.get_or_init(|| Arc::new(Metrics::new())).clone()
}

/// Latency buckets in seconds, 10ms to 30s. Portal calls are slow.
fn fetch_latency_buckets() -> Vec<f64> {
    vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
}

const DOMAIN_LABEL: &[&str] = &["domain"];

/// All metrics for the registrar server.
pub struct Metrics {
    /// Prometheus registry for all metrics.
    pub registry: Registry,

    // =========================================================================
    // Counters
    // =========================================================================
    /// Lookups answered from a cached entry.
    pub cache_hits_total: IntCounterVec,
    /// Lookups that found no usable entry.
    pub cache_misses_total: IntCounterVec,
    /// Fetches issued to the portal.
    pub upstream_fetches_total: IntCounterVec,
    /// Portal fetches that failed.
    pub upstream_failures_total: IntCounterVec,
    /// Tool invocations handled.
    pub tool_calls_total: IntCounter,
    /// Global cache invalidations.
    pub invalidations_total: IntCounter,

    // =========================================================================
    // Gauges
    // =========================================================================
    /// Uptime in seconds.
    pub uptime_seconds: IntGauge,

    // =========================================================================
    // Histograms (durations in seconds)
    // =========================================================================
    /// Portal fetch duration, normalization included.
    pub fetch_duration_seconds: HistogramVec,

    start_time: Instant,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn domain_counter(name: &str, help: &str) -> IntCounterVec {
    IntCounterVec::new(Opts::new(name, help), DOMAIN_LABEL).expect("failed to create counter")
}

impl Metrics {
    /// Create a new metrics instance with all metrics registered.
    pub fn new() -> Self {
        let registry = Registry::new();

        let cache_hits_total = domain_counter(
            "registrar_cache_hits_total",
            "Lookups answered from a cached entry",
        );
        let cache_misses_total = domain_counter(
            "registrar_cache_misses_total",
            "Lookups that found no usable cached entry",
        );
        let upstream_fetches_total = domain_counter(
            "registrar_upstream_fetches_total",
            "Fetches issued to the portal",
        );
        let upstream_failures_total = domain_counter(
            "registrar_upstream_failures_total",
            "Portal fetches that failed",
        );

        let tool_calls_total =
            IntCounter::new("registrar_tool_calls_total", "Total number of tool calls")
                .expect("failed to create counter");
        let invalidations_total = IntCounter::new(
            "registrar_invalidations_total",
            "Total number of global cache invalidations",
        )
        .expect("failed to create counter");

        let uptime_seconds = IntGauge::new("registrar_uptime_seconds", "Server uptime in seconds")
            .expect("failed to create gauge");

        let fetch_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "registrar_fetch_duration_seconds",
                "Portal fetch duration in seconds",
            )
            .buckets(fetch_latency_buckets()),
            DOMAIN_LABEL,
        )
        .expect("failed to create histogram");

        for collector in [
            Box::new(cache_hits_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(cache_misses_total.clone()),
            Box::new(upstream_fetches_total.clone()),
            Box::new(upstream_failures_total.clone()),
            Box::new(tool_calls_total.clone()),
            Box::new(invalidations_total.clone()),
            Box::new(uptime_seconds.clone()),
            Box::new(fetch_duration_seconds.clone()),
        ] {
            registry
                .register(collector)
                .expect("failed to register metric");
        }

        Self {
            registry,
            cache_hits_total,
            cache_misses_total,
            upstream_fetches_total,
            upstream_failures_total,
            tool_calls_total,
            invalidations_total,
            uptime_seconds,
            fetch_duration_seconds,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Update the uptime gauge.
    pub fn update_uptime(&self) {
        self.uptime_seconds.set(self.uptime_secs() as i64);
    }

    /// Export metrics in Prometheus text format.
    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;
        self.update_uptime();

        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Export metrics as JSON, one counter map per domain.
    pub fn export_json(&self) -> MetricsSnapshot {
        self.update_uptime();
        let mut domains: BTreeMap<String, DomainCounters> = BTreeMap::new();
        for domain in crate::cache::CacheDomain::ALL {
            let label = [domain.as_str()];
            let hits = self.cache_hits_total.with_label_values(&label).get();
            let misses = self.cache_misses_total.with_label_values(&label).get();
            let fetches = self.upstream_fetches_total.with_label_values(&label).get();
            let failures = self.upstream_failures_total.with_label_values(&label).get();
            let fetch_duration = HistogramSnapshot::from_prometheus(
                &self.fetch_duration_seconds.with_label_values(&label),
            );
            domains.insert(
                domain.as_str().to_string(),
                DomainCounters {
                    hits,
                    misses,
                    fetches,
                    failures,
                    fetch_duration,
                },
            );
        }
        MetricsSnapshot {
            tool_calls_total: self.tool_calls_total.get(),
            invalidations_total: self.invalidations_total.get(),
            uptime_seconds: self.uptime_seconds.get(),
            domains,
        }
    }

    /// Start a timer that records duration to a histogram when dropped.
    pub fn start_timer(histogram: &Histogram) -> HistogramTimer {
        HistogramTimer {
            histogram: histogram.clone(),
            start: Instant::now(),
        }
    }
}

/// Timer that records duration to a histogram when dropped.
pub struct HistogramTimer {
    histogram: Histogram,
    start: Instant,
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

impl HistogramTimer {
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Snapshot of all metrics for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub tool_calls_total: u64,
    pub invalidations_total: u64,
    pub uptime_seconds: i64,
    pub domains: BTreeMap<String, DomainCounters>,
}

/// Process-wide counters for one cache domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainCounters {
    pub hits: u64,
    pub misses: u64,
    pub fetches: u64,
    pub failures: u64,
    pub fetch_duration: HistogramSnapshot,
}

/// Snapshot of a histogram for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub sum: f64,
    pub mean: Option<f64>,
}

impl HistogramSnapshot {
    /// Create a snapshot from a prometheus histogram.
    pub fn from_prometheus(h: &Histogram) -> Self {
        let count = h.get_sample_count();
        let sum = h.get_sample_sum();
        Self {
            count,
            sum,
            mean: (count > 0).then(|| sum / count as f64),
        }
    }
}
