use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::errors::OrderError;

// ============================================================================
// Order Value Objects
// ============================================================================

/// Store-assigned order identifier.
pub type OrderId = i64;

/// Smallest currency unit; amounts closer than this are considered equal.
pub const MONEY_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Decimal places stored for every money column.
pub const MONEY_SCALE: u32 = 2;

/// Upper bound on a single order's total amount.
pub const MAX_ORDER_AMOUNT: Decimal = Decimal::from_parts(99_999_999, 0, 0, false, 2);

/// Upper bound on the number of line items per order.
pub const MAX_ORDER_ITEMS: usize = 50;

/// Round a monetary value to cents, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// True when two amounts differ by at most one cent. A difference too large
/// to represent never matches.
pub fn amounts_match(expected: Decimal, actual: Decimal) -> bool {
    expected
        .checked_sub(actual)
        .is_some_and(|diff| diff.abs() <= MONEY_TOLERANCE)
}

/// True when `value` has no digits below the cent, ignoring trailing zeros.
pub fn is_whole_cents(value: Decimal) -> bool {
    value.normalize().scale() <= MONEY_SCALE
}

/// Order numbers are three upper-case ASCII letters followed by ten digits.
pub fn is_valid_order_number(order_number: &str) -> bool {
    let bytes = order_number.as_bytes();
    bytes.len() == 13
        && bytes[..3].iter().all(u8::is_ascii_uppercase)
        && bytes[3..].iter().all(u8::is_ascii_digit)
}

// ============================================================================
// Order Status + Transition Table
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Completed,
        OrderStatus::Cancelled,
    ];

    /// The legal next statuses. This table is the only place transitions are defined.
    pub fn allowed_transitions(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Processing, Cancelled],
            Processing => &[Shipped, Cancelled],
            Shipped => &[Delivered, Cancelled],
            Delivered => &[Completed],
            Completed | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, target: OrderStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| OrderError::validation("status", format!("unknown order status '{s}'")))
    }
}

// ============================================================================
// Payment Status
// ============================================================================

/// Tracked independently of [`OrderStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(OrderError::validation(
                "payment_status",
                format!("unknown payment status '{other}'"),
            )),
        }
    }
}

// ============================================================================
// Order Type / Currency
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Sales,
    Rental,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Sales => "sales",
            OrderType::Rental => "rental",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderType {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sales" => Ok(OrderType::Sales),
            "rental" => Ok(OrderType::Rental),
            other => Err(OrderError::validation(
                "type",
                format!("unknown order type '{other}', expected sales or rental"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Cny,
    Usd,
    Eur,
}

impl Currency {
    pub fn as_str(self) -> &'static str {
        match self {
            Currency::Cny => "CNY",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
        }
    }
}

impl FromStr for Currency {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CNY" => Ok(Currency::Cny),
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            other => Err(OrderError::validation("currency", format!("unsupported currency '{other}'"))),
        }
    }
}

// ============================================================================
// Rental Period
// ============================================================================

/// Rental window. `rental_days` is stored alongside the dates so a corrupted
/// row can be detected rather than silently re-derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RentalPeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub rental_days: i64,
}

impl RentalPeriod {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            rental_days: Self::inclusive_days(start_date, end_date),
        }
    }

    /// Day count with both ends included: 1st..3rd is three days.
    pub fn inclusive_days(start_date: NaiveDate, end_date: NaiveDate) -> i64 {
        (end_date - start_date).num_days() + 1
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
