// Private module declaration
mod server;

use prometheus::{Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

use crate::domain::order::{BatchResult, OrderError, OrderStatus};

// Re-export for public API
pub use server::start_metrics_server;

// ============================================================================
// Metrics Module - Prometheus metrics for the order lifecycle
// ============================================================================
//
// - Status transitions (by from/to) and their failures (by error kind)
// - Batch runs, per-order outcomes and batch duration
// - Statistics scans and their duration
// - Store retries
//
// Scraped via /metrics.
// ============================================================================

pub struct Metrics {
    registry: Registry,

    pub transitions_total: IntCounterVec,
    pub transition_failures_total: IntCounterVec,
    pub transition_duration: HistogramVec,

    pub batch_runs_total: IntCounter,
    pub batch_orders_total: IntCounterVec,
    pub batch_duration: Histogram,

    pub stats_computations_total: IntCounter,
    pub stats_duration: Histogram,

    pub store_retries_total: IntCounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new("order_transitions_total", "Committed order status transitions"),
            &["from", "to"],
        )?;
        registry.register(Box::new(transitions_total.clone()))?;

        let transition_failures_total = IntCounterVec::new(
            Opts::new("order_transition_failures_total", "Rejected order status transitions"),
            &["reason"],
        )?;
        registry.register(Box::new(transition_failures_total.clone()))?;

        let transition_duration = HistogramVec::new(
            HistogramOpts::new("order_transition_duration_seconds", "Single transition latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["to"],
        )?;
        registry.register(Box::new(transition_duration.clone()))?;

        let batch_runs_total = IntCounter::new("order_batch_runs_total", "Batch status updates started")?;
        registry.register(Box::new(batch_runs_total.clone()))?;

        let batch_orders_total = IntCounterVec::new(
            Opts::new("order_batch_orders_total", "Orders processed by batch updates"),
            &["outcome"],
        )?;
        registry.register(Box::new(batch_orders_total.clone()))?;

        let batch_duration = Histogram::with_opts(
            HistogramOpts::new("order_batch_duration_seconds", "Batch status update duration")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )?;
        registry.register(Box::new(batch_duration.clone()))?;

        let stats_computations_total =
            IntCounter::new("order_stats_computations_total", "Order statistics recomputations")?;
        registry.register(Box::new(stats_computations_total.clone()))?;

        let stats_duration = Histogram::with_opts(
            HistogramOpts::new("order_stats_duration_seconds", "Order statistics scan duration")
                .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(stats_duration.clone()))?;

        let store_retries_total = IntCounterVec::new(
            Opts::new("order_store_retries_total", "Extra attempts spent on transient store failures"),
            &["operation"],
        )?;
        registry.register(Box::new(store_retries_total.clone()))?;

        Ok(Self {
            registry,
            transitions_total,
            transition_failures_total,
            transition_duration,
            batch_runs_total,
            batch_orders_total,
            batch_duration,
            stats_computations_total,
            stats_duration,
            store_retries_total,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_transition(&self, from: OrderStatus, to: OrderStatus, seconds: f64) {
        self.transitions_total.with_label_values(&[from.as_str(), to.as_str()]).inc();
        self.transition_duration.with_label_values(&[to.as_str()]).observe(seconds);
    }

    pub fn record_transition_failure(&self, error: &OrderError) {
        self.transition_failures_total.with_label_values(&[error.kind()]).inc();
    }

    pub fn record_batch(&self, result: &BatchResult, seconds: f64) {
        self.batch_runs_total.inc();
        self.batch_orders_total
            .with_label_values(&["success"])
            .inc_by(result.success_count as u64);
        self.batch_orders_total
            .with_label_values(&["failure"])
            .inc_by(result.failure_count as u64);
        self.batch_duration.observe(seconds);
    }

    pub fn record_stats(&self, seconds: f64) {
        self.stats_computations_total.inc();
        self.stats_duration.observe(seconds);
    }

    pub fn record_retries(&self, operation: &str, attempts: u32) {
        if attempts > 1 {
            self.store_retries_total
                .with_label_values(&[operation])
                .inc_by(u64::from(attempts - 1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_without_collisions() {
        let metrics = Metrics::new().unwrap();
        metrics.record_transition(OrderStatus::Pending, OrderStatus::Confirmed, 0.002);
        metrics.record_transition_failure(&OrderError::NotFound(9));
        metrics.record_retries("transition", 3);

        let names: Vec<_> = metrics
            .registry()
            .gather()
            .iter()
            .map(|family| family.name().to_string())
            .collect();

        assert!(names.contains(&"order_transitions_total".to_string()));
        assert!(names.contains(&"order_transition_failures_total".to_string()));
        assert_eq!(
            metrics.store_retries_total.with_label_values(&["transition"]).get(),
            2
        );
    }
}
