use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::aggregate::{Order, OrderAmounts, OrderDraft, OrderItem, OrderKind, ShippingInfo};
use super::value_objects::{amounts_match, RentalPeriod};

// ============================================================================
// Consistency Validator
// ============================================================================
//
// Checks that an order's declared amounts agree with its line items. Every
// rule is evaluated; the report lists all violations in rule order so a
// caller can present a complete correction list.
//
// ============================================================================

const OVERFLOW_EXPECTED: &str = "a representable amount";
const OVERFLOW_ACTUAL: &str = "overflow";

/// One broken rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub expected: String,
    pub actual: String,
}

impl Violation {
    fn new(field: impl Into<String>, expected: impl ToString, actual: impl ToString) -> Self {
        Self {
            field: field.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: expected {}, actual {}", self.field, self.expected, self.actual)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn into_violations(self) -> Vec<Violation> {
        self.violations
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.violations.extend(other.violations);
    }

    fn push(&mut self, violation: Violation) {
        self.violations.push(violation);
    }
}

pub struct ConsistencyValidator;

impl ConsistencyValidator {
    /// Validate a persisted order against its items.
    pub fn validate(order: &Order, items: &[OrderItem]) -> ValidationReport {
        Self::check(&order.amounts, &order.kind, items)
    }

    /// Validate an order that has not been stored yet.
    pub fn validate_draft(draft: &OrderDraft, items: &[OrderItem]) -> ValidationReport {
        Self::check(&draft.amounts, &draft.kind, items)
    }

    /// `delivered_at` must not precede `shipped_at`.
    pub fn validate_shipping(shipping: &ShippingInfo) -> ValidationReport {
        let mut report = ValidationReport::default();
        if let (Some(shipped_at), Some(delivered_at)) = (shipping.shipped_at, shipping.delivered_at) {
            if delivered_at < shipped_at {
                report.push(Violation::new(
                    "shipping.delivered_at",
                    format!(">= {}", shipped_at.to_rfc3339()),
                    delivered_at.to_rfc3339(),
                ));
            }
        }
        report
    }

    fn check(amounts: &OrderAmounts, kind: &OrderKind, items: &[OrderItem]) -> ValidationReport {
        let mut report = ValidationReport::default();

        Self::check_non_negative(amounts, &mut report);

        if items.is_empty() {
            report.push(Violation::new("items", "at least 1 item", 0));
        }

        for (index, item) in items.iter().enumerate() {
            Self::check_item(index, item, &mut report);
        }

        let item_sum = items
            .iter()
            .try_fold(Decimal::ZERO, |sum, item| sum.checked_add(item.total_price()));
        match item_sum {
            Some(sum) if !amounts_match(sum, amounts.subtotal) => {
                report.push(Violation::new("subtotal", sum, amounts.subtotal));
            }
            Some(_) => {}
            None => report.push(Violation::new("subtotal", OVERFLOW_EXPECTED, OVERFLOW_ACTUAL)),
        }

        match amounts.expected_total() {
            Some(expected) if !amounts_match(expected, amounts.total_amount) => {
                report.push(Violation::new("total_amount", expected, amounts.total_amount));
            }
            Some(_) => {}
            None => report.push(Violation::new("total_amount", OVERFLOW_EXPECTED, OVERFLOW_ACTUAL)),
        }

        if let OrderKind::Rental(period) = kind {
            Self::check_rental(period, &mut report);
        }

        report
    }

    fn check_non_negative(amounts: &OrderAmounts, report: &mut ValidationReport) {
        let fields = [
            ("subtotal", amounts.subtotal),
            ("shipping_fee", amounts.shipping_fee),
            ("discount", amounts.discount),
            ("total_amount", amounts.total_amount),
        ];
        for (field, value) in fields {
            if value.is_sign_negative() && !value.is_zero() {
                report.push(Violation::new(field, ">= 0", value));
            }
        }
    }

    fn check_item(index: usize, item: &OrderItem, report: &mut ValidationReport) {
        if item.quantity() <= 0 {
            report.push(Violation::new(format!("items[{index}].quantity"), "> 0", item.quantity()));
        }
        if item.unit_price() <= Decimal::ZERO {
            report.push(Violation::new(format!("items[{index}].unit_price"), "> 0", item.unit_price()));
        }
        let field = format!("items[{index}].total_price");
        match item.expected_total() {
            Some(expected) if !amounts_match(expected, item.total_price()) => {
                report.push(Violation::new(field, expected, item.total_price()));
            }
            Some(_) => {}
            None => report.push(Violation::new(field, OVERFLOW_EXPECTED, OVERFLOW_ACTUAL)),
        }
    }

    fn check_rental(period: &RentalPeriod, report: &mut ValidationReport) {
        if period.start_date >= period.end_date {
            report.push(Violation::new(
                "rental_end_date",
                format!("after {}", period.start_date),
                period.end_date,
            ));
            return;
        }

        let expected_days = RentalPeriod::inclusive_days(period.start_date, period.end_date);
        if period.rental_days != expected_days {
            report.push(Violation::new("rental_days", expected_days, period.rental_days));
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
