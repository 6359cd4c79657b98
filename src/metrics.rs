//! Prometheus counters for the read and submit paths

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::time::Instant;

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Reconciliation
    pub polls_total: IntCounter,
    pub poll_failures: IntCounter,
    pub rate_limit_cooldowns: IntCounter,
    pub history_merges: IntCounter,
    pub pushed_events: IntCounter,

    // Submission outcomes
    pub submissions_total: IntCounter,
    pub submissions_confirmed: IntCounter,
    pub submissions_rejected: IntCounter,
    pub submissions_expired: IntCounter,
    pub submissions_declined: IntCounter,

    // Gauges
    pub history_size: IntGauge,
    pub observed_slot: IntGauge,

    // Histograms
    pub rpc_latency: Histogram,
    pub confirm_latency: Histogram,
}

impl Metrics {
    /// Register every collector on a fresh registry
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let polls_total =
            IntCounter::with_opts(Opts::new("throne_polls_total", "Reconciliation polls run"))?;
        let poll_failures = IntCounter::with_opts(Opts::new(
            "throne_poll_failures_total",
            "Polls that ended in a transport or rate-limit error",
        ))?;
        let rate_limit_cooldowns = IntCounter::with_opts(Opts::new(
            "throne_rate_limit_cooldowns_total",
            "Times the reconciler entered a rate-limit cooldown",
        ))?;
        let history_merges = IntCounter::with_opts(Opts::new(
            "throne_history_merges_total",
            "History entries merged from any source",
        ))?;
        let pushed_events = IntCounter::with_opts(Opts::new(
            "throne_pushed_events_total",
            "Bid events received from the push subscription",
        ))?;

        let submissions_total = IntCounter::with_opts(Opts::new(
            "throne_submissions_total",
            "Transactions handed to the submitter",
        ))?;
        let submissions_confirmed = IntCounter::with_opts(Opts::new(
            "throne_submissions_confirmed_total",
            "Submissions confirmed by the ledger",
        ))?;
        let submissions_rejected = IntCounter::with_opts(Opts::new(
            "throne_submissions_rejected_total",
            "Submissions rejected by the program or the ledger",
        ))?;
        let submissions_expired = IntCounter::with_opts(Opts::new(
            "throne_submissions_expired_total",
            "Submissions whose blockhash expired before landing",
        ))?;
        let submissions_declined = IntCounter::with_opts(Opts::new(
            "throne_submissions_declined_total",
            "Submissions the signer refused to sign",
        ))?;

        let history_size = IntGauge::with_opts(Opts::new(
            "throne_history_size",
            "Entries currently held in the history book",
        ))?;
        let observed_slot = IntGauge::with_opts(Opts::new(
            "throne_observed_slot",
            "Context slot of the newest account view",
        ))?;

        let rpc_latency = Histogram::with_opts(
            HistogramOpts::new("throne_rpc_latency_seconds", "RPC call latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        let confirm_latency = Histogram::with_opts(
            HistogramOpts::new(
                "throne_confirm_latency_seconds",
                "Time from send to final submission outcome",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        )?;

        registry.register(Box::new(polls_total.clone()))?;
        registry.register(Box::new(poll_failures.clone()))?;
        registry.register(Box::new(rate_limit_cooldowns.clone()))?;
        registry.register(Box::new(history_merges.clone()))?;
        registry.register(Box::new(pushed_events.clone()))?;
        registry.register(Box::new(submissions_total.clone()))?;
        registry.register(Box::new(submissions_confirmed.clone()))?;
        registry.register(Box::new(submissions_rejected.clone()))?;
        registry.register(Box::new(submissions_expired.clone()))?;
        registry.register(Box::new(submissions_declined.clone()))?;
        registry.register(Box::new(history_size.clone()))?;
        registry.register(Box::new(observed_slot.clone()))?;
        registry.register(Box::new(rpc_latency.clone()))?;
        registry.register(Box::new(confirm_latency.clone()))?;

        Ok(Self {
            registry,
            polls_total,
            poll_failures,
            rate_limit_cooldowns,
            history_merges,
            pushed_events,
            submissions_total,
            submissions_confirmed,
            submissions_rejected,
            submissions_expired,
            submissions_declined,
            history_size,
            observed_slot,
            rpc_latency,
            confirm_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Prometheus text exposition of every registered metric
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %e, "Failed to encode metrics");
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(|| {
        Metrics::new().unwrap_or_else(|e| panic!("Failed to initialize metrics: {e}"))
    });
    &METRICS
}

/// Timer helper for measuring operation duration
pub struct Timer {
    start: Instant,
    histogram_name: Option<&'static str>,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            histogram_name: None,
        }
    }

    /// Create a timer with a histogram name for automatic recording
    pub fn with_name(histogram_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            histogram_name: Some(histogram_name),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    /// Finish the timer and record to the associated histogram
    pub fn finish(self) {
        let duration = self.elapsed_secs();
        match self.histogram_name {
            Some("rpc_latency_seconds") => metrics().rpc_latency.observe(duration),
            Some("confirm_latency_seconds") => metrics().confirm_latency.observe(duration),
            Some(name) => tracing::debug!("Unknown histogram name: {}", name),
            None => {}
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_registered_metrics() {
        let m = Metrics::new().unwrap();
        m.polls_total.inc();
        m.rpc_latency.observe(0.02);
        let text = m.render();
        assert!(text.contains("throne_polls_total 1"));
        assert!(text.contains("throne_rpc_latency_seconds_bucket"));
    }

    #[test]
    fn test_timer_records_into_global_histogram() {
        let before = metrics().rpc_latency.get_sample_count();
        Timer::with_name("rpc_latency_seconds").finish();
        assert!(metrics().rpc_latency.get_sample_count() > before);
    }
}
