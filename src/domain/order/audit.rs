use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::value_objects::{OrderId, OrderStatus};

// ============================================================================
// Order Audit Log
// ============================================================================
//
// Append-only. One entry per committed state change; entries are never
// updated or removed.
//
// ============================================================================

pub const ACTION_CREATED: &str = "created";
pub const ACTION_STATUS_CHANGE: &str = "status_change";
pub const ACTION_SHIPPING_UPDATE: &str = "shipping_update";

/// A persisted audit row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLog {
    pub id: i64,
    pub order_id: OrderId,
    pub action: String,
    pub operator: String,
    pub notes: Option<String>,
    pub from_status: Option<OrderStatus>,
    pub to_status: Option<OrderStatus>,
    pub created_at: DateTime<Utc>,
}

/// An audit row waiting to be written in the same unit as its state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewLogEntry {
    pub action: String,
    pub operator: String,
    pub notes: Option<String>,
    pub from_status: Option<OrderStatus>,
    pub to_status: Option<OrderStatus>,
    pub created_at: DateTime<Utc>,
}

impl NewLogEntry {
    pub fn created(operator: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            action: ACTION_CREATED.to_string(),
            operator: operator.into(),
            notes: None,
            from_status: None,
            to_status: Some(OrderStatus::Pending),
            created_at: at,
        }
    }

    pub fn status_change(
        from: OrderStatus,
        to: OrderStatus,
        operator: impl Into<String>,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            action: ACTION_STATUS_CHANGE.to_string(),
            operator: operator.into(),
            notes,
            from_status: Some(from),
            to_status: Some(to),
            created_at: at,
        }
    }

    pub fn shipping_update(operator: impl Into<String>, notes: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            action: ACTION_SHIPPING_UPDATE.to_string(),
            operator: operator.into(),
            notes,
            from_status: None,
            to_status: None,
            created_at: at,
        }
    }

    pub fn into_log(self, id: i64, order_id: OrderId) -> OrderLog {
        OrderLog {
            id,
            order_id,
            action: self.action,
            operator: self.operator,
            notes: self.notes,
            from_status: self.from_status,
            to_status: self.to_status,
            created_at: self.created_at,
        }
    }
}
