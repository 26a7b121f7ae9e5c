use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::value_objects::{Currency, OrderType, PaymentStatus};

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrderItem {
    pub product_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
}

/// Input for a new order. Amounts are declared by the caller and checked
/// against the items, not derived from them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrderCommand {
    pub order_number: String,
    pub order_type: OrderType,
    pub customer_id: i64,
    pub items: Vec<NewOrderItem>,

    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub discount: Decimal,
    pub total_amount: Decimal,
    #[serde(default)]
    pub currency: Currency,
    #[serde(default)]
    pub payment_status: PaymentStatus,

    // Rental orders only
    #[serde(default)]
    pub rental_start_date: Option<NaiveDate>,
    #[serde(default)]
    pub rental_end_date: Option<NaiveDate>,

    #[serde(default)]
    pub notes: Option<String>,
    pub created_by: String,
}
