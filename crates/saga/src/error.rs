//! Saga error types.

use common::{IdError, OrderId, ProductId, SagaId};
use domain::{OrderError, OrderStatus};
use order_store::StoreError;
use thiserror::Error;

/// Errors returned to callers of the order operations.
///
/// Every variant maps to one stable [`ErrorKind`].
#[derive(Debug, Error)]
pub enum SagaError {
    /// Caller input is malformed. Detected before any side effect.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A referenced order or product does not exist.
    #[error("{0}")]
    NotFound(String),

    #[error(
        "insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// A remote call failed in transport or timed out.
    #[error("dependency failure: {0}")]
    Dependency(String),

    /// A stock write failed while reserving.
    #[error("stock reservation failed: {0}")]
    Reservation(String),

    /// The order store rejected a write.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

/// Stable, transport independent classification of a [`SagaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "InvalidArgument",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::FailedPrecondition => "FailedPrecondition",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SagaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SagaError::Validation(_) => ErrorKind::InvalidArgument,
            SagaError::NotFound(_) => ErrorKind::NotFound,
            SagaError::InsufficientStock { .. } | SagaError::InvalidTransition { .. } => {
                ErrorKind::FailedPrecondition
            }
            SagaError::Dependency(_) | SagaError::Reservation(_) | SagaError::Persistence(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            SagaError::Validation(_) => "validation",
            SagaError::NotFound(_) => "not_found",
            SagaError::InsufficientStock { .. } => "insufficient_stock",
            SagaError::InvalidTransition { .. } => "invalid_transition",
            SagaError::Dependency(_) => "dependency",
            SagaError::Reservation(_) => "reservation",
            SagaError::Persistence(_) => "persistence",
        }
    }

    /// Maps an order store failure. `NotFound` keeps its meaning, everything
    /// else is a persistence failure.
    pub(crate) fn from_store(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => SagaError::NotFound(format!("order not found: {id}")),
            other => SagaError::Persistence(other.to_string()),
        }
    }
}

impl From<OrderError> for SagaError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::InvalidTransition { from, to } => SagaError::InvalidTransition { from, to },
            other => SagaError::Validation(other.to_string()),
        }
    }
}

impl From<IdError> for SagaError {
    fn from(err: IdError) -> Self {
        SagaError::Validation(err.to_string())
    }
}

/// A stock write that should have undone an earlier one but did not.
///
/// Never returned to callers. Reported at error level with everything needed
/// to repair inventory by hand.
#[derive(Debug, Clone, Error)]
#[error("failed to return {quantity} of product {product_id}: {reason}")]
pub struct CompensationFailure {
    pub saga_id: Option<SagaId>,
    pub order_id: Option<OrderId>,
    pub product_id: ProductId,
    pub quantity: i64,
    /// The stock value the failed write tried to establish, when known.
    pub intended_stock: Option<i64>,
    pub reason: String,
}

impl CompensationFailure {
    pub(crate) fn report(&self) {
        tracing::error!(
            saga_id = ?self.saga_id.map(|id| id.to_string()),
            order_id = ?self.order_id.map(|id| id.as_i64()),
            product_id = %self.product_id,
            quantity = self.quantity,
            intended_stock = ?self.intended_stock,
            reason = %self.reason,
            "compensation failed; inventory needs manual reconciliation"
        );
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
