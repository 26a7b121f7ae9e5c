// ============================================================================
// Order Store - Persistence Boundary
// ============================================================================
//
// Transactional access to orders, items, shipping records and audit logs.
//
// Implementations:
// - PgOrderStore       - PostgreSQL via sqlx
// - InMemoryOrderStore - single-process store for tests and the demo binary
//
// ============================================================================

mod filter;
mod memory;
mod postgres;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::order::{NewLogEntry, Order, OrderDraft, OrderId, OrderItem, OrderLog, OrderStatus, ShippingInfo};
use crate::utils::IsTransient;

pub use filter::OrderFilter;
pub use memory::InMemoryOrderStore;
pub use postgres::PgOrderStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    #[error("Referenced order does not exist: {0}")]
    MissingOrder(String),

    #[error("Stored row could not be decoded: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Unavailable(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => StoreError::Unavailable("connection pool timed out".into()),
            sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed | sqlx::Error::Io(_) => {
                StoreError::Unavailable(err.to_string())
            }
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                StoreError::MissingOrder(db.message().to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn load(&self, order_id: OrderId) -> Result<Option<Order>, StoreError>;

    async fn load_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError>;

    async fn load_shipping(&self, order_id: OrderId) -> Result<Option<ShippingInfo>, StoreError>;

    async fn load_logs(&self, order_id: OrderId) -> Result<Vec<OrderLog>, StoreError>;

    /// Insert order, items and the creation log as one unit.
    /// A duplicate order number yields `StoreError::Conflict`.
    async fn insert(
        &self,
        draft: OrderDraft,
        items: Vec<OrderItem>,
        log: NewLogEntry,
    ) -> Result<Order, StoreError>;

    /// Set the status only if the stored status still equals `expected`, and
    /// append `log` in the same unit. Returns rows affected; 0 means another
    /// writer got there first and nothing was written.
    async fn save_status(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        new_status: OrderStatus,
        updated_at: DateTime<Utc>,
        log: NewLogEntry,
    ) -> Result<u64, StoreError>;

    /// Upsert the shipping record and append `log` in the same unit.
    async fn save_shipping(
        &self,
        order_id: OrderId,
        shipping: ShippingInfo,
        log: NewLogEntry,
    ) -> Result<u64, StoreError>;

    /// Append a free-standing audit row. An unknown order yields
    /// `StoreError::MissingOrder` and writes nothing.
    async fn append_log(&self, order_id: OrderId, entry: NewLogEntry) -> Result<OrderLog, StoreError>;

    async fn query_by_filter(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError>;
}

/// Run a store call with a deadline; an elapsed deadline is a transient failure.
pub async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
