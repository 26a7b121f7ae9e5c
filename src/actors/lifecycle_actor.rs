use actix::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::domain::order::{
    BatchResult, CreateOrderCommand, Order, OrderDetails, OrderError, OrderId, OrderStats, OrderStatus,
    ShippingInfo, ValidationReport,
};
use crate::service::OrderLifecycle;
use crate::store::OrderFilter;

// ============================================================================
// Actor Messages
// ============================================================================

#[derive(Message)]
#[rtype(result = "Result<Order, OrderError>")]
pub struct CreateOrder(pub CreateOrderCommand);

#[derive(Message)]
#[rtype(result = "Result<Order, OrderError>")]
pub struct TransitionOrder {
    pub order_id: OrderId,
    pub target: OrderStatus,
    pub operator: String,
    pub notes: Option<String>,
}

#[derive(Message)]
#[rtype(result = "BatchResult")]
pub struct ApplyBatch {
    pub order_ids: Vec<OrderId>,
    pub target: OrderStatus,
    pub operator: String,
    pub notes: Option<String>,
    pub cancel: Option<CancellationToken>,
}

#[derive(Message)]
#[rtype(result = "Result<(), OrderError>")]
pub struct RecordShipping {
    pub order_id: OrderId,
    pub shipping: ShippingInfo,
    pub operator: String,
}

#[derive(Message)]
#[rtype(result = "Result<OrderStats, OrderError>")]
pub struct ComputeStats(pub OrderFilter);

#[derive(Message)]
#[rtype(result = "Result<ValidationReport, OrderError>")]
pub struct ValidateOrder(pub OrderId);

#[derive(Message)]
#[rtype(result = "Result<OrderDetails, OrderError>")]
pub struct GetOrderDetails(pub OrderId);

// ============================================================================
// Order Lifecycle Actor - entry point for the (external) controller layer
// ============================================================================
//
// Thin adapter: every handler clones the shared service and runs the
// operation as a future, so a slow batch never blocks other requests.
//
// ============================================================================

pub struct OrderLifecycleActor {
    lifecycle: OrderLifecycle,
}

impl OrderLifecycleActor {
    pub fn new(lifecycle: OrderLifecycle) -> Self {
        Self { lifecycle }
    }
}

impl Actor for OrderLifecycleActor {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::info!("OrderLifecycleActor started");
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Handler<CreateOrder> for OrderLifecycleActor {
    type Result = ResponseFuture<Result<Order, OrderError>>;

    fn handle(&mut self, msg: CreateOrder, _: &mut Self::Context) -> Self::Result {
        let commands = self.lifecycle.commands.clone();
        Box::pin(async move { commands.create(msg.0).await })
    }
}

impl Handler<TransitionOrder> for OrderLifecycleActor {
    type Result = ResponseFuture<Result<Order, OrderError>>;

    fn handle(&mut self, msg: TransitionOrder, _: &mut Self::Context) -> Self::Result {
        let machine = self.lifecycle.machine.clone();
        Box::pin(async move {
            machine
                .transition(msg.order_id, msg.target, &msg.operator, msg.notes)
                .await
        })
    }
}

impl Handler<ApplyBatch> for OrderLifecycleActor {
    type Result = ResponseFuture<BatchResult>;

    fn handle(&mut self, msg: ApplyBatch, _: &mut Self::Context) -> Self::Result {
        let batch = self.lifecycle.batch.clone();
        Box::pin(async move {
            let cancel = msg.cancel.unwrap_or_default();
            batch
                .apply_batch_with_cancel(&msg.order_ids, msg.target, &msg.operator, msg.notes, &cancel)
                .await
        })
    }
}

impl Handler<RecordShipping> for OrderLifecycleActor {
    type Result = ResponseFuture<Result<(), OrderError>>;

    fn handle(&mut self, msg: RecordShipping, _: &mut Self::Context) -> Self::Result {
        let commands = self.lifecycle.commands.clone();
        Box::pin(async move {
            commands
                .record_shipping(msg.order_id, msg.shipping, &msg.operator)
                .await
        })
    }
}

impl Handler<ComputeStats> for OrderLifecycleActor {
    type Result = ResponseFuture<Result<OrderStats, OrderError>>;

    fn handle(&mut self, msg: ComputeStats, _: &mut Self::Context) -> Self::Result {
        let stats = self.lifecycle.stats.clone();
        Box::pin(async move { stats.compute_stats(&msg.0).await })
    }
}

impl Handler<ValidateOrder> for OrderLifecycleActor {
    type Result = ResponseFuture<Result<ValidationReport, OrderError>>;

    fn handle(&mut self, msg: ValidateOrder, _: &mut Self::Context) -> Self::Result {
        let machine = self.lifecycle.machine.clone();
        Box::pin(async move { machine.validate(msg.0).await })
    }
}

impl Handler<GetOrderDetails> for OrderLifecycleActor {
    type Result = ResponseFuture<Result<OrderDetails, OrderError>>;

    fn handle(&mut self, msg: GetOrderDetails, _: &mut Self::Context) -> Self::Result {
        let details = self.lifecycle.details.clone();
        Box::pin(async move { details.order_details(msg.0).await })
    }
}
