// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// Each aggregate has its own subdirectory with value objects, errors,
// commands, the aggregate types and the services that operate on them.
//
// ============================================================================

pub mod order;
