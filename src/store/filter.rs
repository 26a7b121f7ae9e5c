use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::order::{Order, OrderStatus, OrderType};

/// Restricts which orders a statistics scan reads. Dates are inclusive and
/// compare against the UTC calendar day of `created_at`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub order_type: Option<OrderType>,
    pub status: Option<OrderStatus>,
}

impl OrderFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, order_type: OrderType) -> Self {
        self.order_type = Some(order_type);
        self
    }

    pub fn with_status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// True when `from` is after `to`.
    pub fn is_reversed(&self) -> bool {
        matches!((self.from, self.to), (Some(from), Some(to)) if from > to)
    }

    /// Swap a reversed date range so it reads the intended window.
    pub fn normalized(mut self) -> Self {
        if self.is_reversed() {
            std::mem::swap(&mut self.from, &mut self.to);
        }
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        let day = order.created_at.date_naive();
        self.from.map_or(true, |from| day >= from)
            && self.to.map_or(true, |to| day <= to)
            && self.order_type.map_or(true, |t| order.order_type() == t)
            && self.status.map_or(true, |s| order.status == s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::test_support::sales_order;
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
    }

    #[test]
    fn test_reversed_range_is_swapped() {
        let filter = OrderFilter::between(day(20), day(10)).normalized();
        assert_eq!(filter.from, Some(day(10)));
        assert_eq!(filter.to, Some(day(20)));
    }

    #[test]
    fn test_date_bounds_are_inclusive() {
        let mut order = sales_order(1);
        order.created_at = Utc.with_ymd_and_hms(2024, 7, 20, 23, 59, 0).unwrap();

        assert!(OrderFilter::between(day(10), day(20)).matches(&order));
        assert!(!OrderFilter::between(day(10), day(19)).matches(&order));
        assert!(OrderFilter::between(day(20), day(20)).matches(&order));
    }

    #[test]
    fn test_type_and_status_restrict() {
        let order = sales_order(1);
        assert!(OrderFilter::all().with_type(OrderType::Sales).matches(&order));
        assert!(!OrderFilter::all().with_type(OrderType::Rental).matches(&order));
        assert!(!OrderFilter::all().with_status(OrderStatus::Completed).matches(&order));
    }
}
