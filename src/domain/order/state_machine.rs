use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, SubsecRound, Utc};

use crate::metrics::Metrics;
use crate::store::{bounded, OrderStore};

use super::aggregate::Order;
use super::audit::{NewLogEntry, ACTION_STATUS_CHANGE};
use super::errors::OrderError;
use super::validator::{ConsistencyValidator, ValidationReport};
use super::value_objects::{OrderId, OrderStatus};

// ============================================================================
// Order State Machine
// ============================================================================
//
// transition(): load → check table → validate persisted data → conditional
// save (status + log in one unit) → updated order.
//
// Every failure path leaves the order and its log untouched. The save is
// conditioned on the status read at the start, so a concurrent writer turns
// into ConcurrentModification instead of a lost update.
//
// Each request carries a stamp that becomes the log row's timestamp. A retry
// with the same stamp that finds its own log row already committed (the
// write landed but the acknowledgement was lost) reports success.
//
// ============================================================================

pub struct OrderStateMachine {
    store: Arc<dyn OrderStore>,
    store_timeout: Duration,
    metrics: Option<Arc<Metrics>>,
}

impl OrderStateMachine {
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

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub fn store_timeout(&self) -> Duration {
        self.store_timeout
    }

    /// Move an order to `target`, appending exactly one audit row on success.
    pub async fn transition(
        &self,
        order_id: OrderId,
        target: OrderStatus,
        operator: &str,
        notes: Option<String>,
    ) -> Result<Order, OrderError> {
        self.transition_stamped(order_id, target, operator, notes, request_stamp())
            .await
    }

    /// Same as [`transition`](Self::transition), but repeatable: calling it
    /// again with the same `stamp` after a lost acknowledgement returns the
    /// committed order instead of an `IllegalTransition`.
    pub async fn transition_stamped(
        &self,
        order_id: OrderId,
        target: OrderStatus,
        operator: &str,
        notes: Option<String>,
        stamp: DateTime<Utc>,
    ) -> Result<Order, OrderError> {
        let started = Instant::now();

        tracing::debug!(order_id, to = %target, operator, "Transition requested");

        match self.apply(order_id, target, operator, notes, stamp).await {
            Ok((from, order)) => {
                tracing::info!(
                    order_id,
                    from = %from,
                    to = %target,
                    operator,
                    "Order status changed"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.record_transition(from, target, started.elapsed().as_secs_f64());
                }
                Ok(order)
            }
            Err(err) => {
                tracing::warn!(order_id, to = %target, error = %err, "Transition rejected");
                if let Some(metrics) = &self.metrics {
                    metrics.record_transition_failure(&err);
                }
                Err(err)
            }
        }
    }

    /// Legal next statuses for the order as currently stored.
    pub async fn available_transitions(&self, order_id: OrderId) -> Result<Vec<OrderStatus>, OrderError> {
        let order = self.load(order_id).await?;
        Ok(order.status.allowed_transitions().to_vec())
    }

    /// Run the consistency checks against the order as currently stored.
    pub async fn validate(&self, order_id: OrderId) -> Result<ValidationReport, OrderError> {
        let order = self.load(order_id).await?;
        self.check_consistency(&order).await
    }

    async fn apply(
        &self,
        order_id: OrderId,
        target: OrderStatus,
        operator: &str,
        notes: Option<String>,
        stamp: DateTime<Utc>,
    ) -> Result<(OrderStatus, Order), OrderError> {
        if operator.trim().is_empty() {
            return Err(OrderError::validation("operator", "must not be empty"));
        }

        let mut order = self.load(order_id).await?;
        let from = order.status;

        if !from.can_transition_to(target) {
            if from == target {
                if let Some(previous) = self.committed_by(order_id, target, operator, stamp).await? {
                    tracing::info!(order_id, to = %target, "Status change was already committed");
                    return Ok((previous, order));
                }
            }
            return Err(OrderError::IllegalTransition { from, to: target });
        }

        let report = self.check_consistency(&order).await?;
        if !report.is_valid() {
            return Err(OrderError::ConsistencyViolation(report.into_violations()));
        }

        let entry = NewLogEntry::status_change(from, target, operator, notes, stamp);

        let rows = bounded(
            self.store_timeout,
            self.store.save_status(order_id, from, target, stamp, entry),
        )
        .await?;

        if rows == 0 {
            return Err(OrderError::ConcurrentModification {
                order_id,
                expected: from,
            });
        }

        order.status = target;
        order.updated_at = stamp;
        Ok((from, order))
    }

    /// The `from` status of the latest log row, if that row is the status
    /// change this request (`operator`, `stamp`) wrote.
    async fn committed_by(
        &self,
        order_id: OrderId,
        target: OrderStatus,
        operator: &str,
        stamp: DateTime<Utc>,
    ) -> Result<Option<OrderStatus>, OrderError> {
        let logs = bounded(self.store_timeout, self.store.load_logs(order_id)).await?;
        Ok(logs
            .last()
            .filter(|log| {
                log.action == ACTION_STATUS_CHANGE
                    && log.to_status == Some(target)
                    && log.operator == operator
                    && log.created_at == stamp
            })
            .and_then(|log| log.from_status))
    }

    async fn load(&self, order_id: OrderId) -> Result<Order, OrderError> {
        bounded(self.store_timeout, self.store.load(order_id))
            .await?
            .ok_or(OrderError::NotFound(order_id))
    }

    async fn check_consistency(&self, order: &Order) -> Result<ValidationReport, OrderError> {
        let items = bounded(self.store_timeout, self.store.load_items(order.id)).await?;
        let shipping = bounded(self.store_timeout, self.store.load_shipping(order.id)).await?;

        let mut report = ConsistencyValidator::validate(order, &items);
        if let Some(shipping) = &shipping {
            report.merge(ConsistencyValidator::validate_shipping(shipping));
        }
        Ok(report)
    }
}

/// Timestamp for a new request, truncated to what the database keeps so a
/// stored log row compares equal to it.
pub fn request_stamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::test_support::{draft, seed, standard_items};
    use crate::domain::order::{OrderAmounts, OrderItem, OrderLog, ShippingInfo, ACTION_STATUS_CHANGE};
    use crate::store::{InMemoryOrderStore, OrderFilter, StoreError};
    use crate::utils::IsTransient;
    use async_trait::async_trait;
    use chrono::DateTime;
    use rust_decimal::Decimal;

    fn machine(store: Arc<InMemoryOrderStore>) -> OrderStateMachine {
        OrderStateMachine::new(store, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_pending_to_shipped_is_illegal_and_leaves_order_untouched() {
        let store = Arc::new(InMemoryOrderStore::new());
        let id = seed(&*store, OrderStatus::Pending).await;

        let err = machine(store.clone())
            .transition(id, OrderStatus::Shipped, "opA", None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrderError::IllegalTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::Shipped
            }
        ));
        assert_eq!(store.load(id).await.unwrap().unwrap().status, OrderStatus::Pending);
        assert_eq!(store.load_logs(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delivered_to_completed_appends_one_log_row() {
        let store = Arc::new(InMemoryOrderStore::new());
        let id = seed(&*store, OrderStatus::Delivered).await;
        let logs_before = store.load_logs(id).await.unwrap().len();

        let order = machine(store.clone())
            .transition(id, OrderStatus::Completed, "opA", Some("closing".into()))
            .await
            .unwrap();

        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(store.load(id).await.unwrap().unwrap().status, OrderStatus::Completed);

        let logs = store.load_logs(id).await.unwrap();
        assert_eq!(logs.len(), logs_before + 1);

        let last = logs.last().unwrap();
        assert_eq!(last.action, ACTION_STATUS_CHANGE);
        assert_eq!(last.operator, "opA");
        assert_eq!(last.notes.as_deref(), Some("closing"));
        assert_eq!(last.from_status, Some(OrderStatus::Delivered));
        assert_eq!(last.to_status, Some(OrderStatus::Completed));
    }

    #[tokio::test]
    async fn test_every_pair_outside_the_table_is_rejected() {
        let store = Arc::new(InMemoryOrderStore::new());
        let machine = machine(store.clone());

        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                if from.can_transition_to(to) {
                    continue;
                }
                let id = seed(&*store, from).await;

                let err = machine.transition(id, to, "opA", None).await.unwrap_err();
                assert!(
                    matches!(err, OrderError::IllegalTransition { .. }),
                    "{from} -> {to}: {err}"
                );
                assert_eq!(store.load(id).await.unwrap().unwrap().status, from);
            }
        }
    }

    #[tokio::test]
    async fn test_missing_order_is_not_found() {
        let store = Arc::new(InMemoryOrderStore::new());
        let err = machine(store)
            .transition(404, OrderStatus::Confirmed, "opA", None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::NotFound(404)));
    }

    #[tokio::test]
    async fn test_blank_operator_is_rejected_before_store_access() {
        let store = Arc::new(InMemoryOrderStore::new());
        let id = seed(&*store, OrderStatus::Pending).await;
        store.fail_next(1);

        let err = machine(store.clone())
            .transition(id, OrderStatus::Confirmed, "  ", None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Validation { .. }));

        // The injected failure is still pending, so nothing touched the store.
        assert!(store.load(id).await.is_err());
    }

    #[tokio::test]
    async fn test_inconsistent_order_cannot_advance() {
        let store = Arc::new(InMemoryOrderStore::new());
        let mut corrupt = draft("ORD9000000001");
        corrupt.amounts = OrderAmounts {
            subtotal: "190.00".parse().unwrap(),
            shipping_fee: "10.00".parse().unwrap(),
            discount: Decimal::ZERO,
            total_amount: "200.00".parse().unwrap(),
        };
        let id = store
            .insert(corrupt, standard_items(), NewLogEntry::created("seed", Utc::now()))
            .await
            .unwrap()
            .id;

        let err = machine(store.clone())
            .transition(id, OrderStatus::Confirmed, "opA", None)
            .await
            .unwrap_err();

        match err {
            OrderError::ConsistencyViolation(violations) => {
                assert_eq!(violations[0].field, "subtotal");
                assert_eq!(violations[0].expected, "200.00");
                assert_eq!(violations[0].actual, "190.00");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(store.load(id).await.unwrap().unwrap().status, OrderStatus::Pending);
        assert_eq!(store.load_logs(id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_shipping_dates_block_transition() {
        let store = Arc::new(InMemoryOrderStore::new());
        let id = seed(&*store, OrderStatus::Shipped).await;
        let shipped_at = Utc::now();
        store
            .save_shipping(
                id,
                ShippingInfo {
                    company: "SF Express".into(),
                    tracking_number: "SF100".into(),
                    shipped_at: Some(shipped_at),
                    delivered_at: Some(shipped_at - chrono::Duration::days(1)),
                },
                NewLogEntry::shipping_update("seed", None, shipped_at),
            )
            .await
            .unwrap();

        let err = machine(store)
            .transition(id, OrderStatus::Delivered, "opA", None)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::ConsistencyViolation(_)));
    }

    #[tokio::test]
    async fn test_slow_store_surfaces_transient_timeout() {
        let store = Arc::new(InMemoryOrderStore::new());
        let id = seed(&*store, OrderStatus::Pending).await;
        store.set_latency(Duration::from_millis(100));

        let machine = OrderStateMachine::new(store.clone(), Duration::from_millis(10));
        let err = machine
            .transition(id, OrderStatus::Confirmed, "opA", None)
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::Store(StoreError::Timeout(_))));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_available_transitions_follow_current_status() {
        let store = Arc::new(InMemoryOrderStore::new());
        let shipped = seed(&*store, OrderStatus::Shipped).await;
        let completed = seed(&*store, OrderStatus::Completed).await;
        let machine = machine(store);

        assert_eq!(
            machine.available_transitions(shipped).await.unwrap(),
            vec![OrderStatus::Delivered, OrderStatus::Cancelled]
        );
        assert!(machine.available_transitions(completed).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replayed_stamp_acknowledges_its_own_commit() {
        let store = Arc::new(InMemoryOrderStore::new());
        let id = seed(&*store, OrderStatus::Pending).await;
        let machine = machine(store.clone());
        let stamp = request_stamp();

        let first = machine
            .transition_stamped(id, OrderStatus::Confirmed, "opA", None, stamp)
            .await
            .unwrap();
        let replay = machine
            .transition_stamped(id, OrderStatus::Confirmed, "opA", None, stamp)
            .await
            .unwrap();
        assert_eq!(replay.status, OrderStatus::Confirmed);
        assert_eq!(replay.updated_at, first.updated_at);
        assert_eq!(store.load_logs(id).await.unwrap().len(), 2);

        // A fresh request, or another operator, is still a self-transition.
        let later = stamp + chrono::Duration::microseconds(1);
        let err = machine
            .transition_stamped(id, OrderStatus::Confirmed, "opA", None, later)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::IllegalTransition { .. }));
        let err = machine
            .transition_stamped(id, OrderStatus::Confirmed, "opB", None, stamp)
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::IllegalTransition { .. }));
    }

    /// Lets another writer cancel the order between the read and the write.
    struct RacingStore {
        inner: InMemoryOrderStore,
    }

    #[async_trait]
    impl OrderStore for RacingStore {
        async fn load(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
            self.inner.load(order_id).await
        }

        async fn load_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError> {
            self.inner.load_items(order_id).await
        }

        async fn load_shipping(&self, order_id: OrderId) -> Result<Option<ShippingInfo>, StoreError> {
            self.inner.load_shipping(order_id).await
        }

        async fn load_logs(&self, order_id: OrderId) -> Result<Vec<OrderLog>, StoreError> {
            self.inner.load_logs(order_id).await
        }

        async fn insert(
            &self,
            draft: crate::domain::order::OrderDraft,
            items: Vec<OrderItem>,
            log: NewLogEntry,
        ) -> Result<Order, StoreError> {
            self.inner.insert(draft, items, log).await
        }

        async fn save_status(
            &self,
            order_id: OrderId,
            expected: OrderStatus,
            new_status: OrderStatus,
            updated_at: DateTime<Utc>,
            log: NewLogEntry,
        ) -> Result<u64, StoreError> {
            let rival = NewLogEntry::status_change(expected, OrderStatus::Cancelled, "opB", None, updated_at);
            self.inner
                .save_status(order_id, expected, OrderStatus::Cancelled, updated_at, rival)
                .await?;
            self.inner
                .save_status(order_id, expected, new_status, updated_at, log)
                .await
        }

        async fn save_shipping(
            &self,
            order_id: OrderId,
            shipping: ShippingInfo,
            log: NewLogEntry,
        ) -> Result<u64, StoreError> {
            self.inner.save_shipping(order_id, shipping, log).await
        }

        async fn append_log(&self, order_id: OrderId, entry: NewLogEntry) -> Result<OrderLog, StoreError> {
            self.inner.append_log(order_id, entry).await
        }

        async fn query_by_filter(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
            self.inner.query_by_filter(filter).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_writer_wins_and_loser_writes_nothing() {
        let store = Arc::new(RacingStore {
            inner: InMemoryOrderStore::new(),
        });
        let id = seed(&*store, OrderStatus::Shipped).await;

        let machine = OrderStateMachine::new(store.clone(), Duration::from_secs(1));
        let err = machine
            .transition(id, OrderStatus::Delivered, "opA", None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OrderError::ConcurrentModification {
                expected: OrderStatus::Shipped,
                ..
            }
        ));

        assert_eq!(store.load(id).await.unwrap().unwrap().status, OrderStatus::Cancelled);
        let logs = store.load_logs(id).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1].operator, "opB");
    }
}
