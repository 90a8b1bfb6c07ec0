//! Idempotency module
//!
//! Prevents duplicate request processing using idempotency keys.

mod repository;

pub use repository::{IdempotencyError, IdempotencyKey, IdempotencyRepository, IdempotencyStatus};
