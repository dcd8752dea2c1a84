//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub pools_detected: IntCounter,
    pub duplicates_suppressed: IntCounterVec,
    pub candidates_rejected: IntCounterVec,
    pub decode_failures: IntCounter,
    pub buys_submitted: IntCounter,
    pub buys_failed: IntCounter,
    pub partial_exits: IntCounter,
    pub full_exits: IntCounterVec,
    pub sell_retries: IntCounter,

    // Gauges
    pub gate_state: IntGauge,
    pub registry_size: IntGauge,

    // Histograms
    pub buy_latency: Histogram,
    pub sell_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let pools_detected = IntCounter::with_opts(Opts::new(
            "sniper_pools_detected_total",
            "New pools admitted by the pool ledger",
        ))?;

        let duplicates_suppressed = IntCounterVec::new(
            Opts::new(
                "sniper_duplicates_suppressed_total",
                "Notifications dropped because the id was already seen",
            ),
            &["scope"],
        )?;

        let candidates_rejected = IntCounterVec::new(
            Opts::new(
                "sniper_candidates_rejected_total",
                "Candidates rejected by the filter chain",
            ),
            &["filter"],
        )?;

        let decode_failures = IntCounter::with_opts(Opts::new(
            "sniper_decode_failures_total",
            "Notification payloads that could not be decoded",
        ))?;

        let buys_submitted =
            IntCounter::with_opts(Opts::new("sniper_buys_submitted_total", "Buys that landed"))?;

        let buys_failed =
            IntCounter::with_opts(Opts::new("sniper_buys_failed_total", "Buys that failed"))?;

        let partial_exits = IntCounter::with_opts(Opts::new(
            "sniper_partial_exits_total",
            "Tier-1 partial exits",
        ))?;

        let full_exits = IntCounterVec::new(
            Opts::new("sniper_full_exits_total", "Full exits by reason"),
            &["reason"],
        )?;

        let sell_retries = IntCounter::with_opts(Opts::new(
            "sniper_sell_retries_total",
            "Sell submissions beyond the first attempt",
        ))?;

        let gate_state = IntGauge::with_opts(Opts::new(
            "sniper_gate_state",
            "Position gate state (0 idle, 1 in trade, 2 faulted)",
        ))?;

        let registry_size = IntGauge::with_opts(Opts::new(
            "sniper_token_accounts",
            "Mints known to the token account registry",
        ))?;

        let buy_latency = Histogram::with_opts(
            HistogramOpts::new("sniper_buy_latency_seconds", "Buy build and submission latency")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        )?;

        let sell_latency = Histogram::with_opts(
            HistogramOpts::new("sniper_sell_latency_seconds", "Sell submission latency")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        )?;

        // Register all metrics
        registry.register(Box::new(pools_detected.clone()))?;
        registry.register(Box::new(duplicates_suppressed.clone()))?;
        registry.register(Box::new(candidates_rejected.clone()))?;
        registry.register(Box::new(decode_failures.clone()))?;
        registry.register(Box::new(buys_submitted.clone()))?;
        registry.register(Box::new(buys_failed.clone()))?;
        registry.register(Box::new(partial_exits.clone()))?;
        registry.register(Box::new(full_exits.clone()))?;
        registry.register(Box::new(sell_retries.clone()))?;
        registry.register(Box::new(gate_state.clone()))?;
        registry.register(Box::new(registry_size.clone()))?;
        registry.register(Box::new(buy_latency.clone()))?;
        registry.register(Box::new(sell_latency.clone()))?;

        Ok(Self {
            registry,
            pools_detected,
            duplicates_suppressed,
            candidates_rejected,
            decode_failures,
            buys_submitted,
            buys_failed,
            partial_exits,
            full_exits,
            sell_retries,
            gate_state,
            registry_size,
            buy_latency,
            sell_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render every registered metric in the Prometheus text format
    pub fn export(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
