use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lookup::{CustomerDirectory, ProductCatalog, ProductDisplay};
use crate::store::{bounded, OrderStore};

use super::aggregate::{Order, OrderItem, ShippingInfo};
use super::audit::OrderLog;
use super::errors::OrderError;
use super::value_objects::{OrderId, OrderStatus};

/// An item with the product's current display name attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemLine {
    pub item: OrderItem,
    pub product: Option<ProductDisplay>,
}

/// Everything an order page shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: Order,
    pub items: Vec<ItemLine>,
    pub shipping: Option<ShippingInfo>,
    pub logs: Vec<OrderLog>,
    pub available_transitions: Vec<OrderStatus>,
}

/// Read-only view of an order aggregate. Display fields come from the
/// directories at read time and are never written back.
pub struct OrderDetailsAssembler {
    store: Arc<dyn OrderStore>,
    customers: Arc<dyn CustomerDirectory>,
    products: Arc<dyn ProductCatalog>,
    store_timeout: Duration,
}

impl OrderDetailsAssembler {
    pub fn new(
        store: Arc<dyn OrderStore>,
        customers: Arc<dyn CustomerDirectory>,
        products: Arc<dyn ProductCatalog>,
        store_timeout: Duration,
    ) -> Self {
        Self {
            store,
            customers,
            products,
            store_timeout,
        }
    }

    pub async fn order_details(&self, order_id: OrderId) -> Result<OrderDetails, OrderError> {
        let mut order = bounded(self.store_timeout, self.store.load(order_id))
            .await?
            .ok_or(OrderError::NotFound(order_id))?;

        let items = bounded(self.store_timeout, self.store.load_items(order_id)).await?;
        let shipping = bounded(self.store_timeout, self.store.load_shipping(order_id)).await?;
        let logs = bounded(self.store_timeout, self.store.load_logs(order_id)).await?;

        // Fall back to the snapshot taken at creation.
        if let Some(display) = self.customers.resolve_customer_display(order.customer_id).await {
            order.customer_name = Some(display.name);
            order.customer_phone = display.phone;
            order.customer_email = display.email;
        }

        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            let product = self.products.resolve_product_display(item.product_id).await;
            lines.push(ItemLine { item, product });
        }

        let available_transitions = order.status.allowed_transitions().to_vec();

        Ok(OrderDetails {
            order,
            items: lines,
            shipping,
            logs,
            available_transitions,
        })
    }
}
