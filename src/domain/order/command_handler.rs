use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::lookup::CustomerDirectory;
use crate::store::{bounded, OrderStore, StoreError};

use super::aggregate::{Order, OrderAmounts, OrderDraft, OrderItem, OrderKind, ShippingInfo};
use super::audit::NewLogEntry;
use super::commands::CreateOrderCommand;
use super::errors::OrderError;
use super::validator::ConsistencyValidator;
use super::value_objects::{
    is_valid_order_number, is_whole_cents, OrderId, OrderStatus, OrderType, RentalPeriod, MAX_ORDER_AMOUNT,
    MAX_ORDER_ITEMS,
};

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Orchestrates: Command → shape checks → Draft → ConsistencyValidator → Store
//
// Shape problems are rejected before any store access. Consistency problems
// are rejected before commit. The order row, its items and the "created" log
// row are inserted as one unit.
//
// ============================================================================

pub struct OrderCommandHandler {
    store: Arc<dyn OrderStore>,
    customers: Arc<dyn CustomerDirectory>,
    store_timeout: Duration,
}

impl OrderCommandHandler {
    pub fn new(store: Arc<dyn OrderStore>, customers: Arc<dyn CustomerDirectory>, store_timeout: Duration) -> Self {
        Self {
            store,
            customers,
            store_timeout,
        }
    }

    /// Create a pending order.
    pub async fn create(&self, command: CreateOrderCommand) -> Result<Order, OrderError> {
        check_shape(&command)?;

        let (draft, items) = self.build_draft(command).await?;

        let report = ConsistencyValidator::validate_draft(&draft, &items);
        if !report.is_valid() {
            tracing::warn!(
                order_number = %draft.order_number,
                violations = report.violations().len(),
                "Rejected inconsistent order"
            );
            return Err(OrderError::ConsistencyViolation(report.into_violations()));
        }

        let order_number = draft.order_number.clone();
        let log = NewLogEntry::created(draft.created_by.clone(), draft.created_at);

        let order = bounded(self.store_timeout, self.store.insert(draft, items, log))
            .await
            .map_err(|err| match err {
                StoreError::Conflict(_) => OrderError::DuplicateOrderNumber(order_number.clone()),
                other => OrderError::Store(other),
            })?;

        tracing::info!(
            order_id = order.id,
            order_number = %order.order_number,
            order_type = %order.order_type(),
            total_amount = %order.amounts.total_amount,
            "Order created"
        );

        Ok(order)
    }

    /// Upsert the shipping record and log the change.
    pub async fn record_shipping(
        &self,
        order_id: OrderId,
        shipping: ShippingInfo,
        operator: &str,
    ) -> Result<(), OrderError> {
        if operator.trim().is_empty() {
            return Err(OrderError::validation("operator", "must not be empty"));
        }
        if shipping.company.trim().is_empty() {
            return Err(OrderError::validation("shipping.company", "must not be empty"));
        }
        if shipping.tracking_number.trim().is_empty() {
            return Err(OrderError::validation("shipping.tracking_number", "must not be empty"));
        }

        let report = ConsistencyValidator::validate_shipping(&shipping);
        if !report.is_valid() {
            return Err(OrderError::ConsistencyViolation(report.into_violations()));
        }

        let notes = format!("{} {}", shipping.company, shipping.tracking_number);
        let log = NewLogEntry::shipping_update(operator, Some(notes), Utc::now());

        let rows = bounded(self.store_timeout, self.store.save_shipping(order_id, shipping, log)).await?;
        if rows == 0 {
            return Err(OrderError::NotFound(order_id));
        }

        tracing::info!(order_id, operator, "Shipping info recorded");
        Ok(())
    }

    async fn build_draft(&self, command: CreateOrderCommand) -> Result<(OrderDraft, Vec<OrderItem>), OrderError> {
        let kind = match command.order_type {
            OrderType::Sales => OrderKind::Sales,
            OrderType::Rental => match (command.rental_start_date, command.rental_end_date) {
                (Some(start), Some(end)) => OrderKind::Rental(RentalPeriod::new(start, end)),
                _ => {
                    return Err(OrderError::validation(
                        "rental_dates",
                        "rental orders need both a start and an end date",
                    ))
                }
            },
        };

        let items = command
            .items
            .iter()
            .map(|item| OrderItem::new(item.product_id, item.quantity, item.unit_price))
            .collect();

        let display = self.customers.resolve_customer_display(command.customer_id).await;
        let (customer_name, customer_phone, customer_email) = match display {
            Some(d) => (Some(d.name), d.phone, d.email),
            None => (None, None, None),
        };

        let now = Utc::now();
        let draft = OrderDraft {
            order_number: command.order_number,
            kind,
            status: OrderStatus::Pending,
            payment_status: command.payment_status,
            customer_id: command.customer_id,
            customer_name,
            customer_phone,
            customer_email,
            amounts: OrderAmounts {
                subtotal: command.subtotal,
                shipping_fee: command.shipping_fee,
                discount: command.discount,
                total_amount: command.total_amount,
            },
            currency: command.currency,
            notes: command.notes,
            created_by: command.created_by,
            created_at: now,
            updated_at: now,
        };

        Ok((draft, items))
    }
}

fn check_shape(command: &CreateOrderCommand) -> Result<(), OrderError> {
    if !is_valid_order_number(&command.order_number) {
        return Err(OrderError::validation(
            "order_number",
            format!(
                "'{}' must be three upper-case letters followed by ten digits",
                command.order_number
            ),
        ));
    }
    if command.created_by.trim().is_empty() {
        return Err(OrderError::validation("created_by", "must not be empty"));
    }
    if command.customer_id <= 0 {
        return Err(OrderError::validation("customer_id", "must be positive"));
    }

    if command.items.is_empty() {
        return Err(OrderError::validation("items", "at least one item is required"));
    }
    if command.items.len() > MAX_ORDER_ITEMS {
        return Err(OrderError::validation(
            "items",
            format!("at most {MAX_ORDER_ITEMS} items per order, got {}", command.items.len()),
        ));
    }
    for (index, item) in command.items.iter().enumerate() {
        if item.quantity <= 0 {
            return Err(OrderError::validation(format!("items[{index}].quantity"), "must be positive"));
        }
        if item.unit_price <= Decimal::ZERO {
            return Err(OrderError::validation(format!("items[{index}].unit_price"), "must be positive"));
        }
        check_money(format!("items[{index}].unit_price"), item.unit_price)?;

        let line_total = item.unit_price.checked_mul(Decimal::from(item.quantity));
        if !line_total.is_some_and(|total| total <= MAX_ORDER_AMOUNT) {
            return Err(OrderError::validation(
                format!("items[{index}]"),
                format!("unit_price * quantity must not exceed {MAX_ORDER_AMOUNT}"),
            ));
        }
    }

    check_money("subtotal", command.subtotal)?;
    check_money("shipping_fee", command.shipping_fee)?;
    check_money("discount", command.discount)?;
    check_money("total_amount", command.total_amount)?;

    if command.order_type == OrderType::Sales
        && (command.rental_start_date.is_some() || command.rental_end_date.is_some())
    {
        return Err(OrderError::validation(
            "rental_dates",
            "only rental orders carry rental dates",
        ));
    }

    Ok(())
}

/// Money must fit the stored column: whole cents, at most `MAX_ORDER_AMOUNT`.
fn check_money(field: impl Into<String>, value: Decimal) -> Result<(), OrderError> {
    if !is_whole_cents(value) {
        return Err(OrderError::validation(field, format!("{value} has more than two decimal places")));
    }
    if value > MAX_ORDER_AMOUNT {
        return Err(OrderError::validation(field, format!("must not exceed {MAX_ORDER_AMOUNT}")));
    }
    Ok(())
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::test_support::{money, seed};
    use crate::domain::order::{NewOrderItem, ACTION_CREATED, ACTION_SHIPPING_UPDATE};
    use crate::lookup::{CustomerDisplay, StaticDirectory};
    use crate::store::{InMemoryOrderStore, OrderFilter};
    use chrono::NaiveDate;

    fn handler(store: Arc<InMemoryOrderStore>) -> OrderCommandHandler {
        let directory = StaticDirectory::new().with_customer(
            1,
            CustomerDisplay {
                name: "Wang Fang".into(),
                phone: Some("13700000000".into()),
                email: Some("wang@example.com".into()),
            },
        );
        OrderCommandHandler::new(store, Arc::new(directory), Duration::from_secs(1))
    }

    fn command(order_number: &str) -> CreateOrderCommand {
        CreateOrderCommand {
            order_number: order_number.into(),
            order_type: OrderType::Sales,
            customer_id: 1,
            items: vec![
                NewOrderItem {
                    product_id: 101,
                    quantity: 2,
                    unit_price: money("50.00"),
                },
                NewOrderItem {
                    product_id: 102,
                    quantity: 1,
                    unit_price: money("100.00"),
                },
            ],
            subtotal: money("200.00"),
            shipping_fee: money("10.00"),
            discount: money("0.00"),
            total_amount: money("210.00"),
            currency: Default::default(),
            payment_status: Default::default(),
            rental_start_date: None,
            rental_end_date: None,
            notes: None,
            created_by: "admin".into(),
        }
    }

    #[tokio::test]
    async fn test_create_stores_pending_order_with_creation_log() {
        let store = Arc::new(InMemoryOrderStore::new());
        let order = handler(store.clone()).create(command("ORD2024000001")).await.unwrap();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.customer_name.as_deref(), Some("Wang Fang"));
        assert_eq!(order.amounts.total_amount, money("210.00"));
        assert_eq!(store.load_items(order.id).await.unwrap().len(), 2);

        let logs = store.load_logs(order.id).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, ACTION_CREATED);
    }

    #[tokio::test]
    async fn test_mismatched_subtotal_is_rejected_before_commit() {
        let store = Arc::new(InMemoryOrderStore::new());
        let mut cmd = command("ORD2024000001");
        cmd.subtotal = money("190.00");
        cmd.total_amount = money("200.00");

        let err = handler(store.clone()).create(cmd).await.unwrap_err();

        match err {
            OrderError::ConsistencyViolation(violations) => assert_eq!(violations[0].field, "subtotal"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(store.query_by_filter(&OrderFilter::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_total_is_checked_not_recomputed() {
        let store = Arc::new(InMemoryOrderStore::new());
        let mut cmd = command("ORD2024000001");
        cmd.total_amount = money("200.00");

        let err = handler(store).create(cmd).await.unwrap_err();
        assert!(matches!(err, OrderError::ConsistencyViolation(ref v) if v[0].field == "total_amount"));
    }

    #[tokio::test]
    async fn test_duplicate_order_number_is_reported() {
        let store = Arc::new(InMemoryOrderStore::new());
        let handler = handler(store);
        handler.create(command("ORD2024000001")).await.unwrap();

        let err = handler.create(command("ORD2024000001")).await.unwrap_err();
        assert!(matches!(err, OrderError::DuplicateOrderNumber(ref n) if n == "ORD2024000001"));
    }

    #[tokio::test]
    async fn test_shape_errors_never_reach_the_store() {
        let store = Arc::new(InMemoryOrderStore::new());
        let handler = handler(store.clone());

        let bad_number = command("ORD-1");
        assert!(matches!(
            handler.create(bad_number).await,
            Err(OrderError::Validation { ref field, .. }) if field == "order_number"
        ));

        let mut zero_qty = command("ORD2024000002");
        zero_qty.items[0].quantity = 0;
        assert!(matches!(
            handler.create(zero_qty).await,
            Err(OrderError::Validation { ref field, .. }) if field == "items[0].quantity"
        ));

        let mut too_many = command("ORD2024000003");
        too_many.items = (0..=MAX_ORDER_ITEMS as i64)
            .map(|product_id| NewOrderItem {
                product_id,
                quantity: 1,
                unit_price: money("1.00"),
            })
            .collect();
        assert!(matches!(
            handler.create(too_many).await,
            Err(OrderError::Validation { ref field, .. }) if field == "items"
        ));

        let mut too_expensive = command("ORD2024000004");
        too_expensive.total_amount = money("1000000.00");
        assert!(matches!(
            handler.create(too_expensive).await,
            Err(OrderError::Validation { ref field, .. }) if field == "total_amount"
        ));

        assert!(store.query_by_filter(&OrderFilter::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_unit_price_is_rejected_without_panicking() {
        let store = Arc::new(InMemoryOrderStore::new());
        let handler = handler(store.clone());

        let mut max_price = command("ORD2024000001");
        max_price.items = vec![NewOrderItem {
            product_id: 101,
            quantity: 2,
            unit_price: Decimal::MAX,
        }];
        assert!(matches!(
            handler.create(max_price).await,
            Err(OrderError::Validation { ref field, .. }) if field == "items[0].unit_price"
        ));

        let mut large_line = command("ORD2024000002");
        large_line.items[0].unit_price = money("600000.00");
        assert!(matches!(
            handler.create(large_line).await,
            Err(OrderError::Validation { ref field, .. }) if field == "items[0]"
        ));

        assert!(store.query_by_filter(&OrderFilter::all()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sub_cent_amounts_are_rejected() {
        let store = Arc::new(InMemoryOrderStore::new());
        let handler = handler(store.clone());

        let mut fine_price = command("ORD2024000001");
        fine_price.items[0].unit_price = money("50.005");
        assert!(matches!(
            handler.create(fine_price).await,
            Err(OrderError::Validation { ref field, .. }) if field == "items[0].unit_price"
        ));

        let mut fine_fee = command("ORD2024000002");
        fine_fee.shipping_fee = money("10.001");
        assert!(matches!(
            handler.create(fine_fee).await,
            Err(OrderError::Validation { ref field, .. }) if field == "shipping_fee"
        ));

        // Trailing zeros are not extra precision.
        let mut padded = command("ORD2024000003");
        padded.subtotal = money("200.0000");
        assert!(handler.create(padded).await.is_ok());

        assert_eq!(store.query_by_filter(&OrderFilter::all()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rental_order_gets_inclusive_day_count() {
        let store = Arc::new(InMemoryOrderStore::new());
        let mut cmd = command("RNT2024000001");
        cmd.order_type = OrderType::Rental;
        cmd.rental_start_date = NaiveDate::from_ymd_opt(2024, 5, 1);
        cmd.rental_end_date = NaiveDate::from_ymd_opt(2024, 5, 7);

        let order = handler(store).create(cmd).await.unwrap();
        assert_eq!(order.kind.rental_period().unwrap().rental_days, 7);
    }

    #[tokio::test]
    async fn test_rental_fields_must_match_order_type() {
        let store = Arc::new(InMemoryOrderStore::new());
        let handler = handler(store);

        let mut missing_end = command("RNT2024000001");
        missing_end.order_type = OrderType::Rental;
        missing_end.rental_start_date = NaiveDate::from_ymd_opt(2024, 5, 1);
        assert!(matches!(handler.create(missing_end).await, Err(OrderError::Validation { .. })));

        let mut sales_with_dates = command("ORD2024000001");
        sales_with_dates.rental_start_date = NaiveDate::from_ymd_opt(2024, 5, 1);
        assert!(matches!(
            handler.create(sales_with_dates).await,
            Err(OrderError::Validation { .. })
        ));

        let mut reversed = command("RNT2024000002");
        reversed.order_type = OrderType::Rental;
        reversed.rental_start_date = NaiveDate::from_ymd_opt(2024, 5, 7);
        reversed.rental_end_date = NaiveDate::from_ymd_opt(2024, 5, 1);
        assert!(matches!(
            handler.create(reversed).await,
            Err(OrderError::ConsistencyViolation(ref v)) if v[0].field == "rental_end_date"
        ));
    }

    #[tokio::test]
    async fn test_record_shipping_upserts_and_logs() {
        let store = Arc::new(InMemoryOrderStore::new());
        let id = seed(&*store, OrderStatus::Processing).await;
        let handler = handler(store.clone());
        let shipped_at = Utc::now();

        let info = ShippingInfo {
            company: "SF Express".into(),
            tracking_number: "SF1234567890".into(),
            shipped_at: Some(shipped_at),
            delivered_at: None,
        };
        handler.record_shipping(id, info.clone(), "opA").await.unwrap();

        assert_eq!(store.load_shipping(id).await.unwrap(), Some(info.clone()));
        let logs = store.load_logs(id).await.unwrap();
        assert_eq!(logs.last().unwrap().action, ACTION_SHIPPING_UPDATE);

        let backwards = ShippingInfo {
            delivered_at: Some(shipped_at - chrono::Duration::hours(1)),
            ..info.clone()
        };
        assert!(matches!(
            handler.record_shipping(id, backwards, "opA").await,
            Err(OrderError::ConsistencyViolation(_))
        ));

        assert!(matches!(
            handler.record_shipping(999, info, "opA").await,
            Err(OrderError::NotFound(999))
        ));
    }
}
