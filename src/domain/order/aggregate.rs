use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::value_objects::{Currency, OrderId, OrderStatus, OrderType, PaymentStatus, RentalPeriod};

// ============================================================================
// Order Aggregate
// ============================================================================
//
// An order together with its items, optional shipping record and audit log
// is one unit of consistency. Items, shipping and logs are loaded separately
// from the store; this module only holds the value types.
//
// ============================================================================

/// Sales orders carry no rental window; rental orders always do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OrderKind {
    Sales,
    Rental(RentalPeriod),
}

impl OrderKind {
    pub fn order_type(&self) -> OrderType {
        match self {
            OrderKind::Sales => OrderType::Sales,
            OrderKind::Rental(_) => OrderType::Rental,
        }
    }

    pub fn rental_period(&self) -> Option<&RentalPeriod> {
        match self {
            OrderKind::Sales => None,
            OrderKind::Rental(period) => Some(period),
        }
    }
}

/// Declared money fields. `total_amount` is checked against the others,
/// never recomputed behind the caller's back.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderAmounts {
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub discount: Decimal,
    pub total_amount: Decimal,
}

impl OrderAmounts {
    /// `subtotal + shipping_fee - discount`, or `None` if it overflows.
    pub fn expected_total(&self) -> Option<Decimal> {
        self.subtotal
            .checked_add(self.shipping_fee)?
            .checked_sub(self.discount)
    }
}

/// Everything about an order except its store-assigned id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub order_number: String,
    pub kind: OrderKind,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub customer_id: i64,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub amounts: OrderAmounts,
    pub currency: Currency,
    pub notes: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub kind: OrderKind,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,

    // Authoritative reference; the display fields below are snapshots.
    pub customer_id: i64,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,

    pub amounts: OrderAmounts,
    pub currency: Currency,
    pub notes: Option<String>,

    // Audit
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn from_draft(id: OrderId, draft: OrderDraft) -> Self {
        Self {
            id,
            order_number: draft.order_number,
            kind: draft.kind,
            status: draft.status,
            payment_status: draft.payment_status,
            customer_id: draft.customer_id,
            customer_name: draft.customer_name,
            customer_phone: draft.customer_phone,
            customer_email: draft.customer_email,
            amounts: draft.amounts,
            currency: draft.currency,
            notes: draft.notes,
            created_by: draft.created_by,
            created_at: draft.created_at,
            updated_at: draft.updated_at,
        }
    }

    pub fn order_type(&self) -> OrderType {
        self.kind.order_type()
    }
}

// ============================================================================
// Order Item
// ============================================================================

/// A line item. `total_price` can only change through the setters, which
/// recompute it from `unit_price * quantity`. The product saturates instead
/// of panicking; the validator reports the overflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: i64,
    quantity: i32,
    unit_price: Decimal,
    total_price: Decimal,
}

impl OrderItem {
    pub fn new(product_id: i64, quantity: i32, unit_price: Decimal) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
            total_price: unit_price.saturating_mul(Decimal::from(quantity)),
        }
    }

    /// Rebuild an item exactly as stored, including a possibly stale total.
    pub fn from_persisted(product_id: i64, quantity: i32, unit_price: Decimal, total_price: Decimal) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
            total_price,
        }
    }

    pub fn quantity(&self) -> i32 {
        self.quantity
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn total_price(&self) -> Decimal {
        self.total_price
    }

    /// `unit_price * quantity`, or `None` if it overflows.
    pub fn expected_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }

    pub fn set_quantity(&mut self, quantity: i32) {
        self.quantity = quantity;
        self.total_price = self.unit_price.saturating_mul(Decimal::from(quantity));
    }

    pub fn set_unit_price(&mut self, unit_price: Decimal) {
        self.unit_price = unit_price;
        self.total_price = unit_price.saturating_mul(Decimal::from(self.quantity));
    }
}

// ============================================================================
// Shipping
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShippingInfo {
    pub company: String,
    pub tracking_number: String,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn money(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_item_total_follows_factors() {
        let mut item = OrderItem::new(7, 2, money("50.00"));
        assert_eq!(item.total_price(), money("100.00"));

        item.set_quantity(3);
        assert_eq!(item.total_price(), money("150.00"));

        item.set_unit_price(money("10.50"));
        assert_eq!(item.total_price(), money("31.50"));
    }

    #[test]
    fn test_persisted_item_keeps_stored_total() {
        let item = OrderItem::from_persisted(7, 2, money("50.00"), money("90.00"));
        assert_eq!(item.total_price(), money("90.00"));
        assert_eq!(item.expected_total(), Some(money("100.00")));
    }

    #[test]
    fn test_oversized_item_saturates_instead_of_panicking() {
        let item = OrderItem::new(7, 2, Decimal::MAX);
        assert_eq!(item.total_price(), Decimal::MAX);
        assert_eq!(item.expected_total(), None);
    }

    #[test]
    fn test_expected_total() {
        let amounts = OrderAmounts {
            subtotal: money("200.00"),
            shipping_fee: money("10.00"),
            discount: money("5.00"),
            total_amount: money("205.00"),
        };
        assert_eq!(amounts.expected_total(), Some(money("205.00")));

        let huge = OrderAmounts {
            subtotal: Decimal::MAX,
            shipping_fee: money("1.00"),
            ..amounts
        };
        assert_eq!(huge.expected_total(), None);
    }

    #[test]
    fn test_order_kind_serialization_carries_rental_fields_only_for_rentals() {
        let sales = serde_json::to_value(OrderKind::Sales).unwrap();
        assert_eq!(sales, serde_json::json!({ "type": "sales" }));

        let period = RentalPeriod::new(
            chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            chrono::NaiveDate::from_ymd_opt(2024, 5, 3).unwrap(),
        );
        let rental = serde_json::to_value(OrderKind::Rental(period)).unwrap();
        assert_eq!(rental["type"], "rental");
        assert_eq!(rental["rental_days"], 3);
    }
}
