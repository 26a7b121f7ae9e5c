use std::sync::Arc;

use crate::config::Config;
use crate::domain::order::{
    BatchStatusProcessor, OrderCommandHandler, OrderDetailsAssembler, OrderStateMachine, StatsAggregator,
};
use crate::lookup::{CustomerDirectory, ProductCatalog};
use crate::metrics::Metrics;
use crate::store::OrderStore;

// ============================================================================
// Order Lifecycle Service
// ============================================================================
//
// Wires the order components over one shared store. Holds no mutable state
// of its own; clones share the same store and metrics.
//
// ============================================================================

#[derive(Clone)]
pub struct OrderLifecycle {
    pub commands: Arc<OrderCommandHandler>,
    pub machine: Arc<OrderStateMachine>,
    pub batch: Arc<BatchStatusProcessor>,
    pub stats: Arc<StatsAggregator>,
    pub details: Arc<OrderDetailsAssembler>,
}

impl OrderLifecycle {
    pub fn new(
        store: Arc<dyn OrderStore>,
        customers: Arc<dyn CustomerDirectory>,
        products: Arc<dyn ProductCatalog>,
        config: &Config,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        let timeout = config.store_timeout;

        let mut machine = OrderStateMachine::new(store.clone(), timeout);
        let mut stats = StatsAggregator::new(store.clone(), timeout);
        if let Some(metrics) = &metrics {
            machine = machine.with_metrics(metrics.clone());
            stats = stats.with_metrics(metrics.clone());
        }
        let machine = Arc::new(machine);

        let mut batch = BatchStatusProcessor::new(machine.clone(), config.batch_concurrency, config.retry.clone());
        if let Some(metrics) = metrics {
            batch = batch.with_metrics(metrics);
        }

        Self {
            commands: Arc::new(OrderCommandHandler::new(store.clone(), customers.clone(), timeout)),
            machine,
            batch: Arc::new(batch),
            stats: Arc::new(stats),
            details: Arc::new(OrderDetailsAssembler::new(store, customers, products, timeout)),
        }
    }
}
