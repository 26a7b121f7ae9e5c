use std::sync::Arc;

use actix::prelude::*;
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use order_lifecycle::actors::{
    ApplyBatch, ComputeStats, CreateOrder, GetOrderDetails, OrderLifecycleActor, RecordShipping, TransitionOrder,
};
use order_lifecycle::config::Config;
use order_lifecycle::domain::order::{CreateOrderCommand, NewOrderItem, OrderStatus, OrderType, ShippingInfo};
use order_lifecycle::lookup::{CustomerDisplay, ProductDisplay, StaticDirectory};
use order_lifecycle::metrics::{self, Metrics};
use order_lifecycle::service::OrderLifecycle;
use order_lifecycle::store::{InMemoryOrderStore, OrderFilter, OrderStore, PgOrderStore};

#[actix::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Default to INFO level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,order_lifecycle=debug")),
        )
        .init();

    tracing::info!("🚀 Starting order lifecycle service");

    let config = Config::from_env()?;

    // === 1. Store ===
    let store: Arc<dyn OrderStore> = match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to PostgreSQL...");
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(config.store_timeout)
                .connect(url)
                .await?;
            let store = PgOrderStore::new(pool);
            store.migrate().await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(InMemoryOrderStore::new())
        }
    };

    // === 2. Prometheus metrics ===
    let metrics = Arc::new(Metrics::new()?);
    tracing::info!("📊 Metrics registry created with {} metrics", metrics.registry().gather().len());

    let registry = metrics.registry().clone();
    let metrics_port = config.metrics_port;
    actix::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(registry, metrics_port).await {
            tracing::error!(error = %e, "Metrics server error");
        }
    });

    // === 3. Lookups + service ===
    let directory = Arc::new(
        StaticDirectory::new()
            .with_customer(
                1,
                CustomerDisplay {
                    name: "Demo Customer".into(),
                    phone: Some("13800000000".into()),
                    email: Some("demo@example.com".into()),
                },
            )
            .with_product(
                1001,
                ProductDisplay {
                    name: "Companion Robot".into(),
                    model: Some("YX-200".into()),
                },
            ),
    );

    let lifecycle = OrderLifecycle::new(store, directory.clone(), directory, &config, Some(metrics));
    let actor = OrderLifecycleActor::new(lifecycle).start();

    // === 4. Demonstrate the order lifecycle ===
    tracing::info!("📝 Demonstrating order lifecycle");

    let mut order_ids = Vec::new();
    for n in 1..=3 {
        let unit_price = Decimal::new(129_900, 2);
        let order = actor
            .send(CreateOrder(CreateOrderCommand {
                order_number: format!("DEM{:010}", (chrono::Utc::now().timestamp() % 1_000_000_000) * 10 + n),
                order_type: OrderType::Sales,
                customer_id: 1,
                items: vec![NewOrderItem {
                    product_id: 1001,
                    quantity: 1,
                    unit_price,
                }],
                subtotal: unit_price,
                shipping_fee: Decimal::new(2_000, 2),
                discount: Decimal::ZERO,
                total_amount: unit_price + Decimal::new(2_000, 2),
                currency: Default::default(),
                payment_status: Default::default(),
                rental_start_date: None,
                rental_end_date: None,
                notes: None,
                created_by: "demo".into(),
            }))
            .await??;
        tracing::info!(order_id = order.id, order_number = %order.order_number, "✅ Order created");
        order_ids.push(order.id);
    }

    let batch = actor
        .send(ApplyBatch {
            order_ids: order_ids.clone(),
            target: OrderStatus::Confirmed,
            operator: "demo".into(),
            notes: Some("bulk confirmation".into()),
            cancel: None,
        })
        .await?;
    tracing::info!(
        batch_id = %batch.batch_id,
        succeeded = batch.success_count,
        failed = batch.failure_count,
        "✅ Batch confirmation finished"
    );

    let first = order_ids[0];
    actor
        .send(TransitionOrder {
            order_id: first,
            target: OrderStatus::Processing,
            operator: "demo".into(),
            notes: None,
        })
        .await??;
    actor
        .send(RecordShipping {
            order_id: first,
            shipping: ShippingInfo {
                company: "SF Express".into(),
                tracking_number: "SF0000000001".into(),
                shipped_at: Some(chrono::Utc::now()),
                delivered_at: None,
            },
            operator: "demo".into(),
        })
        .await??;
    for target in [OrderStatus::Shipped, OrderStatus::Delivered, OrderStatus::Completed] {
        actor
            .send(TransitionOrder {
                order_id: first,
                target,
                operator: "demo".into(),
                notes: None,
            })
            .await??;
    }

    // Completed orders are terminal; this one is expected to fail.
    if let Err(e) = actor
        .send(TransitionOrder {
            order_id: first,
            target: OrderStatus::Cancelled,
            operator: "demo".into(),
            notes: None,
        })
        .await?
    {
        tracing::info!(order_id = first, error = %e, "Rejected as expected");
    }

    let details = actor.send(GetOrderDetails(first)).await??;
    tracing::info!(
        order_id = first,
        status = %details.order.status,
        log_entries = details.logs.len(),
        "📦 Order details"
    );

    let stats = actor.send(ComputeStats(OrderFilter::all())).await??;
    tracing::info!(
        total = stats.total,
        completed = stats.completed,
        revenue = %stats.total_revenue,
        average = %stats.average_order_value,
        completion_rate = %stats.completion_rate(),
        "📈 Order statistics"
    );

    tracing::info!("🎉 Demo complete! Metrics stay available until Ctrl-C");
    tokio::signal::ctrl_c().await?;

    Ok(())
}
