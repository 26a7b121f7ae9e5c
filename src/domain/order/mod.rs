// ============================================================================
// Order Domain - Lifecycle of Sales and Rental Orders
// ============================================================================
//
// - Value objects (OrderStatus + transition table, money rules, RentalPeriod)
// - Aggregate types (Order, OrderItem, ShippingInfo) and audit log entries
// - ConsistencyValidator (amounts vs. items)
// - OrderStateMachine (single-order transition)
// - OrderCommandHandler (creation, shipping updates)
// - BatchStatusProcessor (partial-success batch transitions)
// - StatsAggregator (dashboard figures recomputed from stored orders)
// - OrderDetailsAssembler (read model with display fields)
//
// ============================================================================

pub mod value_objects;
pub mod errors;
pub mod aggregate;
pub mod audit;
pub mod validator;
pub mod state_machine;
pub mod commands;
pub mod command_handler;
pub mod batch;
pub mod stats;
pub mod details;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export for convenience
pub use value_objects::*;
pub use errors::*;
pub use aggregate::*;
pub use audit::*;
pub use validator::*;
pub use state_machine::*;
pub use commands::*;
pub use command_handler::*;
pub use batch::*;
pub use stats::*;
pub use details::*;
