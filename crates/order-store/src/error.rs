use common::{OrderId, SagaId};
use domain::OrderStatus;
use thiserror::Error;

use crate::Version;

/// Errors that can occur when interacting with the order store or the saga
/// journal.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No order with this id exists.
    #[error("order not found: {0}")]
    NotFound(OrderId),

    /// A conditional status update found the order in a different status.
    #[error("order {id} is {actual}, expected {expected}")]
    StatusChanged {
        id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// A journal append was based on a stale version.
    #[error(
        "concurrency conflict for saga {saga_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        saga_id: SagaId,
        expected: Version,
        actual: Version,
    },

    /// Records handed to the journal are malformed.
    #[error("invalid journal record: {0}")]
    InvalidRecord(String),

    /// A stored row could not be mapped back to a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// The store refused the write. Used by the in-memory store's fault
    /// injection.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
