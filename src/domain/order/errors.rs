use crate::store::StoreError;
use crate::utils::IsTransient;

use super::validator::Violation;
use super::value_objects::{OrderId, OrderStatus};

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    #[error("IllegalTransition({from}, {to})")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },

    #[error("ConsistencyViolation: {}", describe(.0))]
    ConsistencyViolation(Vec<Violation>),

    #[error("ConcurrentModification: order {order_id} is no longer {expected}")]
    ConcurrentModification { order_id: OrderId, expected: OrderStatus },

    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Order number already exists: {0}")]
    DuplicateOrderNumber(String),

    #[error("Cancelled before processing")]
    Cancelled,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrderError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        OrderError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Stable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            OrderError::NotFound(_) => "not_found",
            OrderError::IllegalTransition { .. } => "illegal_transition",
            OrderError::ConsistencyViolation(_) => "consistency_violation",
            OrderError::ConcurrentModification { .. } => "concurrent_modification",
            OrderError::Validation { .. } => "validation",
            OrderError::DuplicateOrderNumber(_) => "duplicate_order_number",
            OrderError::Cancelled => "cancelled",
            OrderError::Store(_) => "store",
        }
    }
}

impl IsTransient for OrderError {
    fn is_transient(&self) -> bool {
        match self {
            OrderError::Store(err) => err.is_transient(),
            _ => false,
        }
    }
}

fn describe(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
