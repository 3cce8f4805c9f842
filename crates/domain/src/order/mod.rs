//! Order records, line validation and the status state machine.

mod commands;
mod entity;
mod state;
mod value_objects;

pub use commands::{CreateOrder, LineRequest};
pub use entity::{NewOrder, Order};
pub use state::{OrderStatus, Transition};
pub use value_objects::{Money, OrderItem, OrderLine};

use common::IdError;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// An identifier was zero or negative.
    #[error(transparent)]
    InvalidId(#[from] IdError),

    /// Order has no items.
    #[error("order must contain at least one item")]
    NoItems,

    /// A requested line failed validation.
    #[error("item {index}: {reason}")]
    InvalidLine { index: usize, reason: String },

    /// Invalid price.
    #[error("invalid price: {price} (must be a non-negative amount within range)")]
    InvalidPrice { price: f64 },

    /// Status string is not one of the known values.
    #[error("unknown order status: {0:?} (expected pending, completed or cancelled)")]
    UnknownStatus(String),

    /// Transition not present in the status table.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
}
