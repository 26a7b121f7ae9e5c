use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// Display Lookups
// ============================================================================
//
// Customer and product names shown next to an order. These never feed the
// state machine or the validator; a missing entry just leaves the display
// fields empty.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerDisplay {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDisplay {
    pub name: String,
    pub model: Option<String>,
}

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn resolve_customer_display(&self, customer_id: i64) -> Option<CustomerDisplay>;
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn resolve_product_display(&self, product_id: i64) -> Option<ProductDisplay>;
}

/// Fixed lookup tables, filled at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    customers: HashMap<i64, CustomerDisplay>,
    products: HashMap<i64, ProductDisplay>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_customer(mut self, customer_id: i64, display: CustomerDisplay) -> Self {
        self.customers.insert(customer_id, display);
        self
    }

    pub fn with_product(mut self, product_id: i64, display: ProductDisplay) -> Self {
        self.products.insert(product_id, display);
        self
    }
}

#[async_trait]
impl CustomerDirectory for StaticDirectory {
    async fn resolve_customer_display(&self, customer_id: i64) -> Option<CustomerDisplay> {
        let display = self.customers.get(&customer_id).cloned();
        if display.is_none() {
            tracing::debug!(customer_id, "No display entry for customer");
        }
        display
    }
}

#[async_trait]
impl ProductCatalog for StaticDirectory {
    async fn resolve_product_display(&self, product_id: i64) -> Option<ProductDisplay> {
        self.products.get(&product_id).cloned()
    }
}
