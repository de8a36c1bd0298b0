//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

/// Submission metrics, owned by whoever builds the engine
pub struct Metrics {
    registry: Registry,

    // Counters
    pub batches_submitted: IntCounter,
    pub batches_confirmed: IntCounter,
    pub batches_failed: IntCounterVec,
    pub batches_skipped: IntCounter,
    pub pipelines_assembled: IntCounter,

    // Histograms
    pub confirmation_latency: Histogram,
    pub build_latency: Histogram,
}

impl Metrics {
    /// Create a metrics set on a fresh registry
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let batches_submitted = IntCounter::with_opts(Opts::new(
            "govflow_batches_submitted_total",
            "Batches sent to the RPC endpoint",
        ))?;

        let batches_confirmed = IntCounter::with_opts(Opts::new(
            "govflow_batches_confirmed_total",
            "Batches confirmed on-chain",
        ))?;

        let batches_failed = IntCounterVec::new(
            Opts::new(
                "govflow_batches_failed_total",
                "Batches that reached a Failed outcome",
            ),
            &["category"],
        )?;

        let batches_skipped = IntCounter::with_opts(Opts::new(
            "govflow_batches_skipped_total",
            "Batches skipped after an earlier failure or cancellation",
        ))?;

        let pipelines_assembled = IntCounter::with_opts(Opts::new(
            "govflow_pipelines_assembled_total",
            "Proposal pipelines assembled",
        ))?;

        let confirmation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "govflow_confirmation_latency_seconds",
                "Time from send to observed confirmation",
            )
            .buckets(vec![0.25, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
        )?;

        let build_latency = Histogram::with_opts(
            HistogramOpts::new(
                "govflow_build_latency_seconds",
                "Checkpoint fetch plus envelope build time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;

        registry.register(Box::new(batches_submitted.clone()))?;
        registry.register(Box::new(batches_confirmed.clone()))?;
        registry.register(Box::new(batches_failed.clone()))?;
        registry.register(Box::new(batches_skipped.clone()))?;
        registry.register(Box::new(pipelines_assembled.clone()))?;
        registry.register(Box::new(confirmation_latency.clone()))?;
        registry.register(Box::new(build_latency.clone()))?;

        Ok(Self {
            registry,
            batches_submitted,
            batches_confirmed,
            batches_failed,
            batches_skipped,
            pipelines_assembled,
            confirmation_latency,
            build_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_failure(&self, category: &str) {
        self.batches_failed.with_label_values(&[category]).inc();
    }

    /// Failures recorded under one category
    pub fn failures(&self, category: &str) -> u64 {
        self.batches_failed.with_label_values(&[category]).get()
    }

    /// Render in the Prometheus text exposition format
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
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
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
