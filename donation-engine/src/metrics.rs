//! Prometheus metrics for the donation engine
//!
//! # Metrics
//!
//! - `engine_submissions_total` - Operations handed to the chain, by kind
//! - `engine_confirmed_total` - Confirmed operations, by kind
//! - `engine_reverted_total` - Reverted operations, by kind
//! - `engine_unknown_outcomes_total` - Finality waits that timed out
//! - `engine_overloaded_total` - Enqueues rejected by a full mailbox
//! - `engine_sequencer_depth` - Requests waiting in the sequencer mailbox
//! - `engine_pending_records` - Mirror rows awaiting resolution
//! - `engine_sweep_resolutions_total` - Sweep resolutions, by result
//! - `engine_submission_duration_seconds` - Submit-to-settle latency

use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct EngineMetrics {
    pub submissions_total: IntCounterVec,
    pub confirmed_total: IntCounterVec,
    pub reverted_total: IntCounterVec,
    pub unknown_total: IntCounter,
    pub overloaded_total: IntCounter,
    pub sequencer_depth: IntGauge,
    pub pending_records: IntGauge,
    pub sweep_resolutions_total: IntCounterVec,
    pub submission_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl EngineMetrics {
    /// Create a collector with its own registry
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let submissions_total = IntCounterVec::new(
            Opts::new("engine_submissions_total", "Operations handed to the chain"),
            &["kind"],
        )?;
        registry.register(Box::new(submissions_total.clone()))?;

        let confirmed_total = IntCounterVec::new(
            Opts::new("engine_confirmed_total", "Confirmed operations"),
            &["kind"],
        )?;
        registry.register(Box::new(confirmed_total.clone()))?;

        let reverted_total = IntCounterVec::new(
            Opts::new("engine_reverted_total", "Reverted operations"),
            &["kind"],
        )?;
        registry.register(Box::new(reverted_total.clone()))?;

        let unknown_total = IntCounter::with_opts(Opts::new(
            "engine_unknown_outcomes_total",
            "Finality waits that ended without a settled status",
        ))?;
        registry.register(Box::new(unknown_total.clone()))?;

        let overloaded_total = IntCounter::with_opts(Opts::new(
            "engine_overloaded_total",
            "Enqueues rejected by a full sequencer mailbox",
        ))?;
        registry.register(Box::new(overloaded_total.clone()))?;

        let sequencer_depth = IntGauge::with_opts(Opts::new(
            "engine_sequencer_depth",
            "Requests waiting in the sequencer mailbox",
        ))?;
        registry.register(Box::new(sequencer_depth.clone()))?;

        let pending_records = IntGauge::with_opts(Opts::new(
            "engine_pending_records",
            "Mirror rows awaiting chain resolution",
        ))?;
        registry.register(Box::new(pending_records.clone()))?;

        let sweep_resolutions_total = IntCounterVec::new(
            Opts::new(
                "engine_sweep_resolutions_total",
                "Pending-record sweep resolutions",
            ),
            &["result"],
        )?;
        registry.register(Box::new(sweep_resolutions_total.clone()))?;

        let submission_duration = Histogram::with_opts(
            HistogramOpts::new(
                "engine_submission_duration_seconds",
                "Submit-to-settle latency",
            )
            .buckets(vec![0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 5.0, 30.0]),
        )?;
        registry.register(Box::new(submission_duration.clone()))?;

        Ok(Self {
            submissions_total,
            confirmed_total,
            reverted_total,
            unknown_total,
            overloaded_total,
            sequencer_depth,
            pending_records,
            sweep_resolutions_total,
            submission_duration,
            registry,
        })
    }

    /// Render the registry in Prometheus text format
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_ok() {
            String::from_utf8(buffer).unwrap_or_default()
        } else {
            String::new()
        }
    }
}
