//! Prometheus metrics for the reconciler.
//!
//! [`ReconcilerMetrics`] owns a dedicated [`Registry`] that the `/metrics`
//! endpoint encodes into the Prometheus text exposition format.

use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, Histogram,
    HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

pub struct ReconcilerMetrics {
    pub registry: Registry,

    // ── Counters ────────────────────────────────────────────────────────
    /// Cycles that completed, including idle ones.
    pub cycles_total: IntCounter,
    /// Cycles abandoned with an error (each one causes a backoff).
    pub cycle_failures_total: IntCounter,
    /// Events projected, labelled by event kind.
    pub events_applied_total: IntCounterVec,
    /// Events skipped because they were already applied.
    pub events_duplicate_total: IntCounter,
    /// Logs with a known signature that failed to decode.
    pub decode_errors_total: IntCounter,
    /// Events recorded as anomalies instead of being projected.
    pub anomalies_total: IntCounter,
    /// Log ranges split after the node refused them.
    pub range_splits_total: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    pub last_processed_block: IntGauge,
    pub chain_height: IntGauge,
    pub lag_blocks: IntGauge,

    // ── Histograms ──────────────────────────────────────────────────────
    pub cycle_duration_ms: Histogram,
}

impl ReconcilerMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let cycles_total = register_int_counter_with_registry!(
            Opts::new("typhoon_cycles_total", "Completed reconciliation cycles"),
            registry
        )?;
        let cycle_failures_total = register_int_counter_with_registry!(
            Opts::new(
                "typhoon_cycle_failures_total",
                "Reconciliation cycles abandoned with an error"
            ),
            registry
        )?;
        let events_applied_total = register_int_counter_vec_with_registry!(
            Opts::new("typhoon_events_applied_total", "Events projected into the mirror"),
            &["kind"],
            registry
        )?;
        let events_duplicate_total = register_int_counter_with_registry!(
            Opts::new(
                "typhoon_events_duplicate_total",
                "Events skipped because they were already applied"
            ),
            registry
        )?;
        let decode_errors_total = register_int_counter_with_registry!(
            Opts::new("typhoon_decode_errors_total", "Logs that failed to decode"),
            registry
        )?;
        let anomalies_total = register_int_counter_with_registry!(
            Opts::new(
                "typhoon_anomalies_total",
                "Events recorded as anomalies in the audit log"
            ),
            registry
        )?;
        let range_splits_total = register_int_counter_with_registry!(
            Opts::new(
                "typhoon_range_splits_total",
                "Log ranges bisected after the node refused them"
            ),
            registry
        )?;

        let last_processed_block = register_int_gauge_with_registry!(
            Opts::new(
                "typhoon_last_processed_block",
                "Cursor: last chain block fully projected"
            ),
            registry
        )?;
        let chain_height = register_int_gauge_with_registry!(
            Opts::new("typhoon_chain_height", "Finalized chain height last observed"),
            registry
        )?;
        let lag_blocks = register_int_gauge_with_registry!(
            Opts::new("typhoon_lag_blocks", "Chain height minus cursor"),
            registry
        )?;

        // 1 ms to ~16 s.
        let cycle_duration_ms = register_histogram_with_registry!(
            HistogramOpts::new("typhoon_cycle_duration_ms", "Cycle wall time in milliseconds")
                .buckets(prometheus::exponential_buckets(1.0, 2.0, 15)?),
            registry
        )?;

        Ok(Self {
            registry,
            cycles_total,
            cycle_failures_total,
            events_applied_total,
            events_duplicate_total,
            decode_errors_total,
            anomalies_total,
            range_splits_total,
            last_processed_block,
            chain_height,
            lag_blocks,
            cycle_duration_ms,
        })
    }

    /// Record the cursor/height pair and the lag derived from it.
    pub fn observe_progress(&self, cursor: u64, height: u64) {
        self.last_processed_block.set(clamp(cursor));
        self.chain_height.set(clamp(height));
        self.lag_blocks.set(clamp(height.saturating_sub(cursor)));
    }

    /// Encode every metric in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn clamp(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
