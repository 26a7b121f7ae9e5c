use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{OrderFilter, OrderStore, StoreError};
use crate::domain::order::{NewLogEntry, Order, OrderDraft, OrderId, OrderItem, OrderLog, OrderStatus, ShippingInfo};

// ============================================================================
// In-Memory Order Store
// ============================================================================
//
// Every write takes the single table lock, so a status update and its log
// row are observed together or not at all. Latency and outage injection let
// callers exercise timeout and retry paths without a database.
//
// ============================================================================

#[derive(Default)]
struct Tables {
    next_order_id: OrderId,
    next_log_id: i64,
    orders: BTreeMap<OrderId, Order>,
    order_numbers: HashMap<String, OrderId>,
    items: HashMap<OrderId, Vec<OrderItem>>,
    shipping: HashMap<OrderId, ShippingInfo>,
    logs: HashMap<OrderId, Vec<OrderLog>>,
}

impl Tables {
    fn push_log(&mut self, order_id: OrderId, entry: NewLogEntry) -> OrderLog {
        self.next_log_id += 1;
        let log = entry.into_log(self.next_log_id, order_id);
        self.logs.entry(order_id).or_default().push(log.clone());
        log
    }
}

#[derive(Default)]
pub struct InMemoryOrderStore {
    tables: RwLock<Tables>,
    latency_ms: AtomicU64,
    pending_failures: AtomicU32,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make the next `count` calls fail with `StoreError::Unavailable`.
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    async fn enter(&self) -> Result<(), StoreError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let consumed = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if consumed.is_ok() {
            return Err(StoreError::Unavailable("injected outage".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn load(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        self.enter().await?;
        Ok(self.tables.read().await.orders.get(&order_id).cloned())
    }

    async fn load_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        self.enter().await?;
        Ok(self.tables.read().await.items.get(&order_id).cloned().unwrap_or_default())
    }

    async fn load_shipping(&self, order_id: OrderId) -> Result<Option<ShippingInfo>, StoreError> {
        self.enter().await?;
        Ok(self.tables.read().await.shipping.get(&order_id).cloned())
    }

    async fn load_logs(&self, order_id: OrderId) -> Result<Vec<OrderLog>, StoreError> {
        self.enter().await?;
        Ok(self.tables.read().await.logs.get(&order_id).cloned().unwrap_or_default())
    }

    async fn insert(
        &self,
        draft: OrderDraft,
        items: Vec<OrderItem>,
        log: NewLogEntry,
    ) -> Result<Order, StoreError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;

        if tables.order_numbers.contains_key(&draft.order_number) {
            return Err(StoreError::Conflict(format!(
                "order_number {} already exists",
                draft.order_number
            )));
        }

        tables.next_order_id += 1;
        let order_id = tables.next_order_id;
        let order = Order::from_draft(order_id, draft);

        tables.order_numbers.insert(order.order_number.clone(), order_id);
        tables.orders.insert(order_id, order.clone());
        tables.items.insert(order_id, items);
        tables.push_log(order_id, log);

        Ok(order)
    }

    async fn save_status(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        new_status: OrderStatus,
        updated_at: DateTime<Utc>,
        log: NewLogEntry,
    ) -> Result<u64, StoreError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;

        match tables.orders.get_mut(&order_id) {
            Some(order) if order.status == expected => {
                order.status = new_status;
                order.updated_at = updated_at;
            }
            _ => return Ok(0),
        }

        tables.push_log(order_id, log);
        Ok(1)
    }

    async fn save_shipping(
        &self,
        order_id: OrderId,
        shipping: ShippingInfo,
        log: NewLogEntry,
    ) -> Result<u64, StoreError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;

        if !tables.orders.contains_key(&order_id) {
            return Ok(0);
        }

        tables.shipping.insert(order_id, shipping);
        tables.push_log(order_id, log);
        Ok(1)
    }

    async fn append_log(&self, order_id: OrderId, entry: NewLogEntry) -> Result<OrderLog, StoreError> {
        self.enter().await?;
        let mut tables = self.tables.write().await;

        if !tables.orders.contains_key(&order_id) {
            return Err(StoreError::MissingOrder(format!("order {order_id}")));
        }
        Ok(tables.push_log(order_id, entry))
    }

    async fn query_by_filter(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        self.enter().await?;
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .filter(|order| filter.matches(order))
            .cloned()
            .collect())
    }
}
