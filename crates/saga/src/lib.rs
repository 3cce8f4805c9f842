//! Order fulfillment across a remote inventory service.
//!
//! Creating an order reserves stock product by product with conditional
//! writes and only then persists the order. A failure in between hands the
//! reserved stock back. Every step is journaled so [`SagaReconciler`] can
//! finish runs a crash interrupted.
//!
//! [`OrderService`] is the entry point for transports.

pub mod aggregate;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
mod journal;
pub mod lifecycle;
pub mod reconciler;
pub mod service;
pub mod services;
pub mod state;
mod stock;

pub use aggregate::{Reservation, SagaInstance};
pub use config::SagaConfig;
pub use coordinator::OrderFulfillmentSaga;
pub use error::{CompensationFailure, ErrorKind, SagaError};
pub use events::SagaEvent;
pub use lifecycle::OrderLifecycle;
pub use reconciler::{SagaReconciler, SweepReport};
pub use service::OrderService;
pub use services::{
    HttpInventoryGateway, InMemoryInventory, InventoryCall, InventoryError, InventoryGateway,
    ProductSnapshot,
};
pub use state::SagaState;
