use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, RetryConfig};

use super::aggregate::Order;
use super::errors::OrderError;
use super::state_machine::{request_stamp, OrderStateMachine};
use super::value_objects::{OrderId, OrderStatus};

// ============================================================================
// Batch Status Processor
// ============================================================================
//
// Partial-success model: each order goes through the same optimistic
// transition path as a single request. A failure is recorded and the batch
// moves on; earlier commits are never undone.
//
// Orders run with bounded parallelism. Transient store failures are retried
// per order; a retry after a commit whose acknowledgement was lost counts as
// a success. Cancelling the token stops orders that have not started yet;
// in-flight and committed transitions are kept.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: Uuid,
    pub target: OrderStatus,
    pub total_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// In request order
    pub succeeded: Vec<OrderId>,
    pub failure_details: BTreeMap<OrderId, String>,
    pub cancelled: bool,
    pub timestamp: DateTime<Utc>,
}

impl BatchResult {
    /// Percentage of orders that transitioned; 0 for an empty batch.
    pub fn success_rate(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        (self.success_count as f64 * 100.0) / self.total_count as f64
    }
}

struct BatchAccumulator {
    batch_id: Uuid,
    target: OrderStatus,
    total_count: usize,
    succeeded: Vec<(usize, OrderId)>,
    failures: BTreeMap<OrderId, String>,
}

impl BatchAccumulator {
    fn new(batch_id: Uuid, target: OrderStatus, total_count: usize) -> Self {
        Self {
            batch_id,
            target,
            total_count,
            succeeded: Vec::with_capacity(total_count),
            failures: BTreeMap::new(),
        }
    }

    fn record(&mut self, position: usize, order_id: OrderId, outcome: Result<Order, OrderError>) {
        match outcome {
            Ok(_) => self.succeeded.push((position, order_id)),
            Err(err) => {
                self.failures.insert(order_id, err.to_string());
            }
        }
    }

    fn finish(mut self, cancelled: bool) -> BatchResult {
        self.succeeded.sort_unstable_by_key(|(position, _)| *position);
        let succeeded: Vec<OrderId> = self.succeeded.into_iter().map(|(_, id)| id).collect();

        BatchResult {
            batch_id: self.batch_id,
            target: self.target,
            total_count: self.total_count,
            success_count: succeeded.len(),
            failure_count: self.failures.len(),
            succeeded,
            failure_details: self.failures,
            cancelled,
            timestamp: Utc::now(),
        }
    }
}

pub struct BatchStatusProcessor {
    machine: Arc<OrderStateMachine>,
    concurrency: usize,
    retry: RetryConfig,
    metrics: Option<Arc<Metrics>>,
}

impl BatchStatusProcessor {
    pub fn new(machine: Arc<OrderStateMachine>, concurrency: usize, retry: RetryConfig) -> Self {
        Self {
            machine,
            concurrency: concurrency.max(1),
            retry,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn apply_batch(
        &self,
        order_ids: &[OrderId],
        target: OrderStatus,
        operator: &str,
        notes: Option<String>,
    ) -> BatchResult {
        self.apply_batch_with_cancel(order_ids, target, operator, notes, &CancellationToken::new())
            .await
    }

    /// Like [`apply_batch`](Self::apply_batch), stopping early once `cancel` fires.
    pub async fn apply_batch_with_cancel(
        &self,
        order_ids: &[OrderId],
        target: OrderStatus,
        operator: &str,
        notes: Option<String>,
        cancel: &CancellationToken,
    ) -> BatchResult {
        let started = Instant::now();
        let batch_id = Uuid::new_v4();
        let order_ids = distinct(order_ids);

        tracing::info!(
            batch_id = %batch_id,
            total = order_ids.len(),
            to = %target,
            operator,
            "Batch status update started"
        );

        let tasks = stream::iter(order_ids.iter().copied().enumerate()).map(|(position, order_id)| {
            let notes = notes.clone();
            async move {
                if cancel.is_cancelled() {
                    return (position, order_id, Err(OrderError::Cancelled));
                }

                // One stamp per order, so a retry recognises its own earlier commit.
                let stamp = request_stamp();
                let outcome = retry_on_transient(&self.retry, |_| {
                    self.machine
                        .transition_stamped(order_id, target, operator, notes.clone(), stamp)
                })
                .await;

                if let Some(metrics) = &self.metrics {
                    metrics.record_retries("transition", outcome.attempts());
                }
                (position, order_id, outcome.into_result())
            }
        });

        let outcomes: Vec<(usize, OrderId, Result<Order, OrderError>)> =
            tasks.buffer_unordered(self.concurrency).collect().await;

        let mut accumulator = BatchAccumulator::new(batch_id, target, order_ids.len());
        for (position, order_id, outcome) in outcomes {
            accumulator.record(position, order_id, outcome);
        }
        let result = accumulator.finish(cancel.is_cancelled());

        tracing::info!(
            batch_id = %batch_id,
            total = result.total_count,
            succeeded = result.success_count,
            failed = result.failure_count,
            cancelled = result.cancelled,
            "Batch status update finished"
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_batch(&result, started.elapsed().as_secs_f64());
        }

        result
    }
}

/// Drop repeated ids, keeping first-occurrence order.
fn distinct(order_ids: &[OrderId]) -> Vec<OrderId> {
    let mut seen = HashSet::with_capacity(order_ids.len());
    order_ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

// ============================================================================
// Unit Tests
// ============================================================================
