use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPool;
use sqlx::{FromRow, PgConnection};

use super::{OrderFilter, OrderStore, StoreError};
use crate::domain::order::{
    NewLogEntry, Order, OrderAmounts, OrderDraft, OrderError, OrderId, OrderItem, OrderKind, OrderLog,
    OrderStatus, OrderType, RentalPeriod, ShippingInfo,
};

// ============================================================================
// PostgreSQL Order Store
// ============================================================================
//
// Each multi-row write runs in one transaction. Status updates are
// conditioned on the previously read status (`WHERE status = $expected`) so
// a concurrent writer makes the update hit zero rows instead of blocking.
//
// Schema lives in migrations/.
//
// ============================================================================

macro_rules! select_orders {
    ($tail:literal) => {
        concat!(
            "SELECT id, order_number, order_type, status, payment_status, customer_id, ",
            "customer_name, customer_phone, customer_email, subtotal, shipping_fee, discount, ",
            "total_amount, currency, rental_start_date, rental_end_date, rental_days, notes, ",
            "created_by, created_at, updated_at FROM orders ",
            $tail
        )
    };
}

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {e}")))?;
        tracing::info!("Order schema migrations applied");
        Ok(())
    }
}

// ============================================================================
// Row Mapping
// ============================================================================

#[derive(FromRow)]
struct OrderRow {
    id: i64,
    order_number: String,
    order_type: String,
    status: String,
    payment_status: String,
    customer_id: i64,
    customer_name: Option<String>,
    customer_phone: Option<String>,
    customer_email: Option<String>,
    subtotal: Decimal,
    shipping_fee: Decimal,
    discount: Decimal,
    total_amount: Decimal,
    currency: String,
    rental_start_date: Option<NaiveDate>,
    rental_end_date: Option<NaiveDate>,
    rental_days: Option<i64>,
    notes: Option<String>,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct ItemRow {
    product_id: i64,
    quantity: i32,
    unit_price: Decimal,
    total_price: Decimal,
}

#[derive(FromRow)]
struct ShippingRow {
    company: String,
    tracking_number: String,
    shipped_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
}

#[derive(FromRow)]
struct LogRow {
    id: i64,
    order_id: i64,
    action: String,
    operator: String,
    notes: Option<String>,
    from_status: Option<String>,
    to_status: Option<String>,
    created_at: DateTime<Utc>,
}

fn decode<T>(column: &str, value: &str) -> Result<T, StoreError>
where
    T: FromStr<Err = OrderError>,
{
    value
        .parse()
        .map_err(|e: OrderError| StoreError::Corrupt(format!("{column}: {e}")))
}

fn decode_status(column: &str, value: Option<String>) -> Result<Option<OrderStatus>, StoreError> {
    value.as_deref().map(|v| decode(column, v)).transpose()
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let kind = match decode::<OrderType>("order_type", &row.order_type)? {
            OrderType::Sales => OrderKind::Sales,
            OrderType::Rental => match (row.rental_start_date, row.rental_end_date, row.rental_days) {
                (Some(start_date), Some(end_date), Some(rental_days)) => OrderKind::Rental(RentalPeriod {
                    start_date,
                    end_date,
                    rental_days,
                }),
                _ => {
                    return Err(StoreError::Corrupt(format!(
                        "rental order {} is missing rental dates",
                        row.id
                    )))
                }
            },
        };

        Ok(Order {
            id: row.id,
            order_number: row.order_number,
            kind,
            status: decode("status", &row.status)?,
            payment_status: decode("payment_status", &row.payment_status)?,
            customer_id: row.customer_id,
            customer_name: row.customer_name,
            customer_phone: row.customer_phone,
            customer_email: row.customer_email,
            amounts: OrderAmounts {
                subtotal: row.subtotal,
                shipping_fee: row.shipping_fee,
                discount: row.discount,
                total_amount: row.total_amount,
            },
            currency: decode("currency", &row.currency)?,
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TryFrom<LogRow> for OrderLog {
    type Error = StoreError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        Ok(OrderLog {
            id: row.id,
            order_id: row.order_id,
            action: row.action,
            operator: row.operator,
            notes: row.notes,
            from_status: decode_status("from_status", row.from_status)?,
            to_status: decode_status("to_status", row.to_status)?,
            created_at: row.created_at,
        })
    }
}

async fn insert_log(
    conn: &mut PgConnection,
    order_id: OrderId,
    entry: NewLogEntry,
) -> Result<OrderLog, StoreError> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO order_logs (order_id, action, operator, notes, from_status, to_status, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING id",
    )
    .bind(order_id)
    .bind(&entry.action)
    .bind(&entry.operator)
    .bind(&entry.notes)
    .bind(entry.from_status.map(OrderStatus::as_str))
    .bind(entry.to_status.map(OrderStatus::as_str))
    .bind(entry.created_at)
    .fetch_one(&mut *conn)
    .await?;

    Ok(entry.into_log(id, order_id))
}

// ============================================================================
// OrderStore Implementation
// ============================================================================

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn load(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
        let row: Option<OrderRow> = sqlx::query_as(select_orders!("WHERE id = $1"))
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Order::try_from).transpose()
    }

    async fn load_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            "SELECT product_id, quantity, unit_price, total_price
             FROM order_items WHERE order_id = $1 ORDER BY line_no",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| OrderItem::from_persisted(r.product_id, r.quantity, r.unit_price, r.total_price))
            .collect())
    }

    async fn load_shipping(&self, order_id: OrderId) -> Result<Option<ShippingInfo>, StoreError> {
        let row: Option<ShippingRow> = sqlx::query_as(
            "SELECT company, tracking_number, shipped_at, delivered_at
             FROM order_shipping WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| ShippingInfo {
            company: r.company,
            tracking_number: r.tracking_number,
            shipped_at: r.shipped_at,
            delivered_at: r.delivered_at,
        }))
    }

    async fn load_logs(&self, order_id: OrderId) -> Result<Vec<OrderLog>, StoreError> {
        let rows: Vec<LogRow> = sqlx::query_as(
            "SELECT id, order_id, action, operator, notes, from_status, to_status, created_at
             FROM order_logs WHERE order_id = $1 ORDER BY id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(OrderLog::try_from).collect()
    }

    async fn insert(
        &self,
        draft: OrderDraft,
        items: Vec<OrderItem>,
        log: NewLogEntry,
    ) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let rental = draft.kind.rental_period().copied();

        let (order_id,): (i64,) = sqlx::query_as(
            "INSERT INTO orders (
                order_number, order_type, status, payment_status, customer_id,
                customer_name, customer_phone, customer_email,
                subtotal, shipping_fee, discount, total_amount, currency,
                rental_start_date, rental_end_date, rental_days,
                notes, created_by, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            RETURNING id",
        )
        .bind(&draft.order_number)
        .bind(draft.kind.order_type().as_str())
        .bind(draft.status.as_str())
        .bind(draft.payment_status.as_str())
        .bind(draft.customer_id)
        .bind(&draft.customer_name)
        .bind(&draft.customer_phone)
        .bind(&draft.customer_email)
        .bind(draft.amounts.subtotal)
        .bind(draft.amounts.shipping_fee)
        .bind(draft.amounts.discount)
        .bind(draft.amounts.total_amount)
        .bind(draft.currency.as_str())
        .bind(rental.map(|r| r.start_date))
        .bind(rental.map(|r| r.end_date))
        .bind(rental.map(|r| r.rental_days))
        .bind(&draft.notes)
        .bind(&draft.created_by)
        .bind(draft.created_at)
        .bind(draft.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        for (line_no, item) in items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items (order_id, line_no, product_id, quantity, unit_price, total_price)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(order_id)
            .bind(line_no as i32)
            .bind(item.product_id)
            .bind(item.quantity())
            .bind(item.unit_price())
            .bind(item.total_price())
            .execute(&mut *tx)
            .await?;
        }

        insert_log(&mut *tx, order_id, log).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = order_id,
            order_number = %draft.order_number,
            item_count = items.len(),
            "Inserted order"
        );

        Ok(Order::from_draft(order_id, draft))
    }

    async fn save_status(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        new_status: OrderStatus,
        updated_at: DateTime<Utc>,
        log: NewLogEntry,
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let rows = sqlx::query("UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3 AND status = $4")
            .bind(new_status.as_str())
            .bind(updated_at)
            .bind(order_id)
            .bind(expected.as_str())
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if rows == 0 {
            tx.rollback().await?;
            return Ok(0);
        }

        insert_log(&mut *tx, order_id, log).await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn save_shipping(
        &self,
        order_id: OrderId,
        shipping: ShippingInfo,
        log: NewLogEntry,
    ) -> Result<u64, StoreError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            tx.rollback().await?;
            return Ok(0);
        }

        let rows = sqlx::query(
            "INSERT INTO order_shipping (order_id, company, tracking_number, shipped_at, delivered_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (order_id) DO UPDATE SET
                company = EXCLUDED.company,
                tracking_number = EXCLUDED.tracking_number,
                shipped_at = EXCLUDED.shipped_at,
                delivered_at = EXCLUDED.delivered_at",
        )
        .bind(order_id)
        .bind(&shipping.company)
        .bind(&shipping.tracking_number)
        .bind(shipping.shipped_at)
        .bind(shipping.delivered_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        insert_log(&mut *tx, order_id, log).await?;
        tx.commit().await?;
        Ok(rows)
    }

    async fn append_log(&self, order_id: OrderId, entry: NewLogEntry) -> Result<OrderLog, StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_log(&mut *conn, order_id, entry).await
    }

    async fn query_by_filter(&self, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
        let rows: Vec<OrderRow> = sqlx::query_as(select_orders!(
            "WHERE ($1::date IS NULL OR (created_at AT TIME ZONE 'UTC')::date >= $1)
               AND ($2::date IS NULL OR (created_at AT TIME ZONE 'UTC')::date <= $2)
               AND ($3::text IS NULL OR order_type = $3)
               AND ($4::text IS NULL OR status = $4)
             ORDER BY id"
        ))
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.order_type.map(OrderType::as_str))
        .bind(filter.status.map(OrderStatus::as_str))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Order::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_unknown_status() {
        let err = decode::<OrderStatus>("status", "archived").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn test_select_macro_appends_clause() {
        let sql = select_orders!("WHERE id = $1");
        assert!(sql.starts_with("SELECT id, order_number"));
        assert!(sql.ends_with("FROM orders WHERE id = $1"));
    }
}
