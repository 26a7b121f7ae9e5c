use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::metrics::Metrics;
use crate::store::{bounded, OrderFilter, OrderStore};

use super::aggregate::Order;
use super::errors::OrderError;
use super::value_objects::{round_money, OrderStatus, OrderType};

// ============================================================================
// Order Statistics
// ============================================================================
//
// Every figure is recomputed from the matching orders on each call. There are
// no running counters to drift when a batch fails halfway. Readers are not
// synchronised with writers, so a snapshot may be slightly stale.
//
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderStats {
    pub pending: u64,
    pub confirmed: u64,
    pub processing: u64,
    pub shipped: u64,
    pub delivered: u64,
    pub completed: u64,
    pub cancelled: u64,
    pub total: u64,

    /// Sum of `total_amount` over completed orders only
    pub total_revenue: Decimal,
    pub average_order_value: Decimal,

    pub sales_orders: u64,
    pub rental_orders: u64,
}

/// One row of a breakdown: how many orders share `key` and their share in percent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRow {
    pub key: String,
    pub count: u64,
    pub percentage: Decimal,
}

impl OrderStats {
    pub fn from_orders(orders: &[Order]) -> Self {
        let mut stats = OrderStats::default();

        for order in orders {
            *stats.count_mut(order.status) += 1;
            stats.total += 1;

            match order.order_type() {
                OrderType::Sales => stats.sales_orders += 1,
                OrderType::Rental => stats.rental_orders += 1,
            }

            if order.status == OrderStatus::Completed {
                stats.total_revenue += order.amounts.total_amount;
            }
        }

        if stats.completed > 0 {
            stats.average_order_value = round_money(stats.total_revenue / Decimal::from(stats.completed));
        }

        stats
    }

    pub fn count(&self, status: OrderStatus) -> u64 {
        match status {
            OrderStatus::Pending => self.pending,
            OrderStatus::Confirmed => self.confirmed,
            OrderStatus::Processing => self.processing,
            OrderStatus::Shipped => self.shipped,
            OrderStatus::Delivered => self.delivered,
            OrderStatus::Completed => self.completed,
            OrderStatus::Cancelled => self.cancelled,
        }
    }

    fn count_mut(&mut self, status: OrderStatus) -> &mut u64 {
        match status {
            OrderStatus::Pending => &mut self.pending,
            OrderStatus::Confirmed => &mut self.confirmed,
            OrderStatus::Processing => &mut self.processing,
            OrderStatus::Shipped => &mut self.shipped,
            OrderStatus::Delivered => &mut self.delivered,
            OrderStatus::Completed => &mut self.completed,
            OrderStatus::Cancelled => &mut self.cancelled,
        }
    }

    pub fn completion_rate(&self) -> Decimal {
        percentage(self.completed, self.total)
    }

    pub fn cancellation_rate(&self) -> Decimal {
        percentage(self.cancelled, self.total)
    }

    /// Orders still waiting on staff: pending, confirmed or processing.
    pub fn attention_count(&self) -> u64 {
        self.pending + self.confirmed + self.processing
    }

    pub fn status_distribution(&self) -> Vec<DistributionRow> {
        OrderStatus::ALL
            .into_iter()
            .map(|status| self.row(status.as_str(), self.count(status)))
            .collect()
    }

    pub fn type_distribution(&self) -> Vec<DistributionRow> {
        vec![
            self.row(OrderType::Sales.as_str(), self.sales_orders),
            self.row(OrderType::Rental.as_str(), self.rental_orders),
        ]
    }

    fn row(&self, key: &str, count: u64) -> DistributionRow {
        DistributionRow {
            key: key.to_string(),
            count,
            percentage: percentage(count, self.total),
        }
    }
}

/// `part / total * 100`, two decimal places, 0 for an empty total.
fn percentage(part: u64, total: u64) -> Decimal {
    if total == 0 {
        return Decimal::ZERO;
    }
    round_money(Decimal::from(part) * Decimal::ONE_HUNDRED / Decimal::from(total))
}

pub struct StatsAggregator {
    store: Arc<dyn OrderStore>,
    store_timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn OrderStore>, store_timeout: Duration) -> Self {
        Self {
            store,
            store_timeout,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn compute_stats(&self, filter: &OrderFilter) -> Result<OrderStats, OrderError> {
        let started = Instant::now();

        if filter.is_reversed() {
            tracing::warn!(from = ?filter.from, to = ?filter.to, "Reversed date range, swapping bounds");
        }
        let filter = filter.clone().normalized();

        let orders = bounded(self.store_timeout, self.store.query_by_filter(&filter)).await?;
        let stats = OrderStats::from_orders(&orders);

        tracing::debug!(
            total = stats.total,
            completed = stats.completed,
            revenue = %stats.total_revenue,
            "Order statistics computed"
        );

        if let Some(metrics) = &self.metrics {
            metrics.record_stats(started.elapsed().as_secs_f64());
        }

        Ok(stats)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
