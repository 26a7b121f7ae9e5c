use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rust_decimal::Decimal;

use super::{
    Currency, NewLogEntry, Order, OrderAmounts, OrderDraft, OrderId, OrderItem, OrderKind, OrderStatus,
    PaymentStatus,
};
use crate::store::OrderStore;

static NEXT_ORDER_NUMBER: AtomicU64 = AtomicU64::new(1);

pub fn money(value: &str) -> Decimal {
    value.parse().unwrap()
}

/// qty 2 @ 50.00 and qty 1 @ 100.00, subtotal 200.00.
pub fn standard_items() -> Vec<OrderItem> {
    vec![
        OrderItem::new(101, 2, money("50.00")),
        OrderItem::new(102, 1, money("100.00")),
    ]
}

fn standard_amounts() -> OrderAmounts {
    OrderAmounts {
        subtotal: money("200.00"),
        shipping_fee: money("10.00"),
        discount: money("0.00"),
        total_amount: money("210.00"),
    }
}

/// Pending sales draft matching [`standard_items`].
pub fn draft(order_number: &str) -> OrderDraft {
    let now = Utc::now();
    OrderDraft {
        order_number: order_number.to_string(),
        kind: OrderKind::Sales,
        status: OrderStatus::Pending,
        payment_status: PaymentStatus::Pending,
        customer_id: 1,
        customer_name: Some("Zhang Wei".into()),
        customer_phone: Some("13800000000".into()),
        customer_email: None,
        amounts: standard_amounts(),
        currency: Currency::Cny,
        notes: None,
        created_by: "admin".into(),
        created_at: now,
        updated_at: now,
    }
}

pub fn sales_order(id: OrderId) -> Order {
    Order::from_draft(id, draft(&format!("ORD{id:010}")))
}

pub fn with_amounts(mut order: Order, subtotal: &str, shipping_fee: &str, discount: &str, total: &str) -> Order {
    order.amounts = OrderAmounts {
        subtotal: money(subtotal),
        shipping_fee: money(shipping_fee),
        discount: money(discount),
        total_amount: money(total),
    };
    order
}

fn unique_order_number() -> String {
    format!("ORD{:010}", NEXT_ORDER_NUMBER.fetch_add(1, Ordering::SeqCst))
}

/// Store a consistent order already sitting in `status`.
pub async fn seed(store: &dyn OrderStore, status: OrderStatus) -> OrderId {
    let mut draft = draft(&unique_order_number());
    draft.status = status;
    store
        .insert(draft, standard_items(), NewLogEntry::created("seed", Utc::now()))
        .await
        .unwrap()
        .id
}

/// Store a consistent single-item order whose total is `total`.
pub async fn seed_with_total(store: &dyn OrderStore, status: OrderStatus, total: &str) -> OrderId {
    let mut draft = draft(&unique_order_number());
    draft.status = status;
    draft.amounts = OrderAmounts {
        subtotal: money(total),
        shipping_fee: Decimal::ZERO,
        discount: Decimal::ZERO,
        total_amount: money(total),
    };
    store
        .insert(
            draft,
            vec![OrderItem::new(101, 1, money(total))],
            NewLogEntry::created("seed", Utc::now()),
        )
        .await
        .unwrap()
        .id
}
