// ============================================================================
// Actors Module
// ============================================================================
//
// Message-based front door to the order lifecycle. Business rules live in the
// domain services; the actor only routes messages to them.
//
// ============================================================================

// Private module declarations
mod lifecycle_actor;

// Re-export only what's needed in the public API
pub use lifecycle_actor::{
    ApplyBatch, ComputeStats, CreateOrder, GetOrderDetails, OrderLifecycleActor, RecordShipping,
    TransitionOrder, ValidateOrder,
};
